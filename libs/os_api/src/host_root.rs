use std::path::{Path, PathBuf};

/// Environment variable naming the host filesystem root.
pub const HOST_ROOT_ENV: &str = "HOST_ROOT";

/// Root of the filesystem holding `/proc` and `/sys`.
///
/// Defaults to `/`; pointing it elsewhere reads a mounted host image instead of
/// the live system. Every reader takes this explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoot {
    root: PathBuf,
}

impl Default for HostRoot {
    fn default() -> Self {
        Self::new("/")
    }
}

impl HostRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads [`HOST_ROOT_ENV`], falling back to `/` when unset or empty.
    pub fn from_env() -> Self {
        match std::env::var_os(HOST_ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `<root>/proc/<rel>`
    pub fn proc(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("proc").join(rel)
    }

    /// `<root>/sys/<rel>`
    pub fn sys(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("sys").join(rel)
    }
}
