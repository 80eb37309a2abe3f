pub mod blocks;
pub mod clip;
pub mod history;
pub mod ids;
pub mod mixer;
pub mod mutate;
pub mod persistence;
pub mod project;
