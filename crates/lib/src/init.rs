//! Initialize a profile: create its directory and write the bundled default `profiles.yaml`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

static DEFAULT_PROFILE: &str = include_str!("../config/profiles.yaml");

/// Create the profile directory and the default profile if it does not exist.
/// An existing profile is left untouched. Returns the profile directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_PROFILE)
            .with_context(|| format!("writing default profile to {}", config_path.display()))?;
        log::info!("created default profile at {}", config_path.display());
    } else {
        log::debug!("profile already exists at {}, skipping", config_path.display());
    }
    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_profile_parses_to_defaults() {
        let config = crate::config::parse_config(DEFAULT_PROFILE).unwrap();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.relay.max_message_chars, 4096);
        assert!(config.telegram.bot_token.is_none());
        assert!(config.tool_servers.is_empty());
    }

    #[test]
    fn init_writes_once() {
        let dir = std::env::temp_dir().join(format!("courier-init-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("profiles.yaml");
        let created = init_config_dir(&path).unwrap();
        assert_eq!(created, dir.join("nested"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_PROFILE);

        std::fs::write(&path, "server:\n  port: 1\n").unwrap();
        init_config_dir(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "server:\n  port: 1\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
