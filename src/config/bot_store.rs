//! Persisted bot list
//!
//! Loads and saves ~/.config/botfleet/bots.json, a pretty-printed JSON array of
//! absolute bot directory paths.

use crate::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk list of registered bot directories
#[derive(Debug, Clone)]
pub struct BotStore {
    path: PathBuf,
}

impl BotStore {
    /// Create a store backed by a specific file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store backed by the default file
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    /// Get the default store path (~/.config/botfleet/bots.json)
    pub fn default_path() -> PathBuf {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("botfleet");
        path.push("bots.json");
        path
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved bot directories.
    ///
    /// A missing file is an empty list. Entries are returned as saved; the
    /// caller decides what to do with directories that no longer exist.
    pub fn load(&self) -> Result<Vec<PathBuf>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No bot list yet");
            return Ok(Vec::new());
        }

        tracing::info!(path = %self.path.display(), "Loading bot list");

        let content = fs::read_to_string(&self.path)?;
        let paths: Vec<PathBuf> = serde_json::from_str(&content)?;

        tracing::debug!(bots = paths.len(), "Bot list loaded");

        Ok(paths)
    }

    /// Save the bot directories, replacing the file atomically
    pub fn save(&self, paths: &[PathBuf]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        tracing::info!(path = %self.path.display(), bots = paths.len(), "Saving bot list");

        let json = serde_json::to_string_pretty(paths)?;
        let mut file = NamedTempFile::new_in(&parent)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

impl Default for BotStore {
    fn default() -> Self {
        Self::open_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_path() {
        let path = BotStore::default_path();
        assert!(path.ends_with("botfleet/bots.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let store = BotStore::new("/nonexistent/botfleet/bots.json");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = BotStore::new(temp_dir.path().join("nested/dir/bots.json"));

        let paths = vec![PathBuf::from("/srv/bots/alpha"), PathBuf::from("/srv/bots/beta")];
        store.save(&paths).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, paths);
    }

    #[test]
    fn test_saved_format_is_indented_array() {
        let temp_dir = TempDir::new().unwrap();
        let store = BotStore::new(temp_dir.path().join("bots.json"));

        store.save(&[PathBuf::from("/srv/bots/alpha")]).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "[\n  \"/srv/bots/alpha\"\n]");
    }

    #[test]
    fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = BotStore::new(temp_dir.path().join("bots.json"));

        store.save(&[PathBuf::from("/a"), PathBuf::from("/b")]).unwrap();
        store.save(&[PathBuf::from("/b")]).unwrap();

        assert_eq!(store.load().unwrap(), vec![PathBuf::from("/b")]);
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bots.json");
        fs::write(&path, "{ not an array").unwrap();

        let result = BotStore::new(&path).load();
        assert!(matches!(result, Err(crate::FleetError::Json(_))));
    }
}
