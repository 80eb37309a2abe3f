// state local to the tui that the backend never needs to see
// playing is synced from DisplayState per loop
#[derive(Clone, Debug, Default)]
pub struct TuiState {
    pub help: bool, // key legend shown in the footer
    pub playing: bool,
}
