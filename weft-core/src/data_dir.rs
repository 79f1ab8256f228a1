//! Data directory management
//!
//! Platform-specific paths for weft data storage:
//! - `identity.key` — host Ed25519 private key
//! - `threads.db` — thread/log metadata (redb)
//! - `blocks.db` — content-addressed blocks (redb)

use std::path::{Path, PathBuf};

const APP_NAME: &str = "weft";

/// Data directory configuration.
#[derive(Debug, Clone)]
pub struct DataDir {
    base: PathBuf,
}

impl DataDir {
    /// Create a DataDir with a custom base path.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create a DataDir using the platform-specific data directory.
    ///
    /// - Linux: `~/.local/share/weft/`
    /// - macOS: `~/Library/Application Support/weft/`
    /// - Windows: `C:\Users\<user>\AppData\Roaming\weft\`
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join(APP_NAME)))
    }

    /// Get the base directory path.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Get the path to the host identity key file.
    pub fn identity_key(&self) -> PathBuf {
        self.base.join("identity.key")
    }

    /// Get the path to the thread metadata database.
    pub fn threads_db(&self) -> PathBuf {
        self.base.join("threads.db")
    }

    /// Get the path to the block database.
    pub fn blocks_db(&self) -> PathBuf {
        self.base.join("blocks.db")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)
    }
}

impl Default for DataDir {
    fn default() -> Self {
        Self::default_location().unwrap_or_else(|| Self::new("./data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_path() {
        let dd = DataDir::new("/custom/path");
        assert_eq!(dd.base(), Path::new("/custom/path"));
        assert_eq!(dd.identity_key(), PathBuf::from("/custom/path/identity.key"));
        assert_eq!(dd.threads_db(), PathBuf::from("/custom/path/threads.db"));
        assert_eq!(dd.blocks_db(), PathBuf::from("/custom/path/blocks.db"));
    }

    #[test]
    fn test_default_impl() {
        let dd = DataDir::default();
        assert!(dd.base().to_str().is_some());
    }
}
