//! Session configuration.
//!
//! Defaults can come from an optional `quill.toml` in the base
//! directory; command-line flags override the file. The file is
//! deliberately small:
//!
//! ```toml
//! directory = "scripts"
//! max_use_depth = 10
//! banner = false
//! cache_capacity = 64
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolved configuration for one session
#[derive(Debug, Clone)]
pub struct Config {
    /// Print the startup banner
    pub banner: bool,
    /// Non-interactive terminal: no prompts
    pub terminal_dumb: bool,
    /// Echo each parsed statement before its result
    pub echo: bool,
    /// Take over stdin/stdout as a system terminal
    pub system: bool,
    /// Foreign-value provider to load at startup
    pub foreign: Option<String>,
    /// Base directory for `use` and Datalog `.input`
    pub directory: PathBuf,
    /// Maximum recursive `use` depth; negative means unbounded
    pub max_use_depth: i32,
    /// Compiled-statement cache bound; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            banner: true,
            terminal_dumb: false,
            echo: false,
            system: true,
            foreign: None,
            directory: PathBuf::from("."),
            max_use_depth: 10,
            cache_capacity: 64,
        }
    }
}

/// The optional `quill.toml` file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub directory: Option<PathBuf>,
    pub max_use_depth: Option<i32>,
    pub banner: Option<bool>,
    pub cache_capacity: Option<usize>,
}

impl Config {
    /// Merge a config file's settings under this configuration
    pub fn with_file(mut self, file: &ConfigFile) -> Self {
        if let Some(directory) = &file.directory {
            self.directory = directory.clone();
        }
        if let Some(depth) = file.max_use_depth {
            self.max_use_depth = depth;
        }
        if let Some(banner) = file.banner {
            self.banner = banner;
        }
        if let Some(capacity) = file.cache_capacity {
            self.cache_capacity = capacity;
        }
        self
    }

    /// Load `quill.toml` from a directory, if present
    pub fn load_file(directory: &Path) -> ConfigFile {
        let path = directory.join("quill.toml");
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|error| {
                tracing::warn!("ignoring malformed {}: {}", path.display(), error);
                ConfigFile::default()
            }),
            Err(_) => ConfigFile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.banner);
        assert!(!config.echo);
        assert_eq!(config.max_use_depth, 10);
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn test_file_overrides() {
        let file: ConfigFile =
            toml::from_str("banner = false\nmax_use_depth = 3\n").unwrap();
        let config = Config::default().with_file(&file);
        assert!(!config.banner);
        assert_eq!(config.max_use_depth, 3);
        // Unset fields keep their defaults.
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let file: Result<ConfigFile, _> = toml::from_str("banner = \"maybe\"");
        assert!(file.is_err());
    }
}
