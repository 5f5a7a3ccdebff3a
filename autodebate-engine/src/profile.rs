//! The user's background profile, a plain markdown file.
//!
//! Its contents are appended to every participant's framing unless a
//! request carries its own context.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the profile location.
pub const PROFILE_ENV: &str = "AUTODEBATE_PROFILE";

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$AUTODEBATE_PROFILE`, else `~/.autodebate/profile.md`.
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var(PROFILE_ENV) {
            return Self::new(path);
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".autodebate").join("profile.md"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Profile text, or `None` when the file is absent or blank.
    pub fn load(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn save(&self, content: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)
    }

    pub fn exists(&self) -> bool {
        std::fs::metadata(&self.path).is_ok_and(|m| m.len() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_profile_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profile.md"));
        assert!(!store.exists());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_creates_parent_dirs_and_trims_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("a").join("profile.md"));
        store.save("\n  I teach secondary school physics.\n").unwrap();
        assert!(store.exists());
        assert_eq!(store.load().as_deref(), Some("I teach secondary school physics."));
    }

    #[test]
    fn blank_profile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profile.md"));
        store.save("   \n").unwrap();
        assert_eq!(store.load(), None);
    }
}
