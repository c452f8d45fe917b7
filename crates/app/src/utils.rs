use anyhow::{anyhow, Result};
use providers::ChatError;
use std::path::{Path, PathBuf};

/// Store file to use: the explicit path if given, else `storage.json` in the
/// platform config directory.
pub fn store_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    directories::ProjectDirs::from("com.local", "Stream Chat", "StreamChat")
        .map(|p| p.config_dir().join("storage.json"))
        .ok_or_else(|| anyhow!("no config directory available, pass --store"))
}

/// Errors the session already rendered through the sink.
pub fn is_rendered(err: &ChatError) -> bool {
    matches!(
        err,
        ChatError::AuthMissing { .. }
            | ChatError::AuthInvalid { .. }
            | ChatError::Http { .. }
            | ChatError::Transport(_)
    )
}
