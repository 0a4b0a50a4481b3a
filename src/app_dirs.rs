use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tapline")
    }

    pub fn config_path() -> PathBuf {
        Self::project()
            .map(|pd| pd.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("tapline_config.json"))
    }

    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("tapline");
            Some(state_dir.join("results.db"))
        } else {
            Self::project().map(|proj_dirs| proj_dirs.data_local_dir().join("results.db"))
        }
    }

    /// Log files go next to the results db; the terminal belongs to the UI.
    pub fn log_dir() -> PathBuf {
        Self::db_path()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(std::env::temp_dir)
    }
}
