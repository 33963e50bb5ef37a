// ABOUTME: Platform config paths and tilde expansion for user-supplied file paths.
// ABOUTME: The per-user config file lives at <config dir>/fanout/config.toml.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

const APPLICATION: &str = "fanout";

/// Platform directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

/// Config directory (e.g. ~/.config/fanout/), or the current directory when
/// no home directory can be determined
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user config file
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Expand a leading `~` to the home directory.
/// Falls back to the path unchanged (with a warning) when the home directory is unknown.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    let Some(rest) = rest else {
        return PathBuf::from(path);
    };

    match BaseDirs::new() {
        Some(base_dirs) if rest.is_empty() => base_dirs.home_dir().to_path_buf(),
        Some(base_dirs) => base_dirs.home_dir().join(rest),
        None => {
            tracing::warn!(path = %path, "Could not determine home directory, leaving path unexpanded");
            PathBuf::from(path)
        }
    }
}
