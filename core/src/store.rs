use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Well-known credential keys.
pub const ACCESS_TOKEN: &str = "access_token";
pub const TOKEN_TYPE: &str = "token_type";
pub const SESSION_ID: &str = "session_id";

/// File-backed key/value store for the handful of credentials the client
/// keeps between runs: the bearer token, its type, and the wikipedia
/// surface's session id. Values are read back from disk on every access so
/// a token written by one handle is seen by every other handle on its next
/// call.
#[derive(Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        Self { root }
    }

    /// Throwaway store rooted in a unique temp directory, for tests and
    /// smoke runs.
    pub fn in_memory() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("quill-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.txt"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let contents = fs::read_to_string(self.key_path(key)).ok()?;
        let value = contents.trim_end_matches('\n').to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root).ok();
        fs::write(self.key_path(key), value)?;
        Ok(())
    }

    /// Idempotent: removing an absent key is not an error.
    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.key_path(key));
    }

    pub fn clear(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}
