// to be called on startup and quit; saves the project so we can reload it later
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, error, warn};

use crate::pipeline::project::ProjectState;

pub const CHIPTRACK_DIR: &str = ".chiptrack";
const PROJECT_FILE: &str = "project.json";
const BACKUP_FILE: &str = "project.json.bak";

// <project_dir>/.chiptrack/project.json
pub fn project_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CHIPTRACK_DIR).join(PROJECT_FILE)
}

// <project_dir>/.chiptrack/project.json.bak, where an unreadable project is kept
pub fn backup_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CHIPTRACK_DIR).join(BACKUP_FILE)
}

/// None when there is nothing (readable) to load; the caller starts fresh.
/// A file that exists but doesn't parse is moved to the backup path first, so
/// the next save can't overwrite it.
pub fn load_project(project_dir: &Path) -> Option<ProjectState> {
    let path = project_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<ProjectState>(&data) {
        Ok(mut project) => {
            project.ensure_active_pattern();
            debug!(path = %path.display(), patterns = project.patterns.len(), "project loaded");
            Some(project)
        }
        Err(err) => {
            let backup = backup_file_path(project_dir);
            match std::fs::rename(&path, &backup) {
                Ok(()) => warn!(path = %path.display(), backup = %backup.display(), %err,
                    "project file unreadable, kept a backup and starting fresh"),
                Err(rename_err) => error!(path = %path.display(), %err, %rename_err,
                    "project file unreadable and could not be backed up"),
            }
            None
        }
    }
}

// Save the project to disk, making the directory if it doesn't exist already
pub fn save_project(project_dir: &Path, state: &ProjectState) -> anyhow::Result<()> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
