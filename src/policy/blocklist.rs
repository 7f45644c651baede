//! Blocklist loading from disk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::policy::canonical::canonicalize;

/// Error type for blocklist loading.
#[derive(Error, Debug)]
pub enum BlockListError {
    #[error("Failed to read blocklist {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A set of canonicalized hostnames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    hosts: HashSet<String>,
}

impl BlockList {
    /// An empty blocklist: every host is allowed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a blocklist from raw host entries.
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| canonicalize(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    /// Parse blocklist file contents.
    ///
    /// One hostname per line. Blank lines and `#` comments are ignored.
    pub fn parse(content: &str) -> Self {
        Self::from_hosts(content.lines().map(|line| match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        }))
    }

    /// Load a blocklist file. A read failure is returned, never swallowed.
    pub fn load(path: &Path) -> Result<Self, BlockListError> {
        let content = fs::read_to_string(path).map_err(|source| BlockListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::parse(&content);

        tracing::info!(path = ?path, entries = list.len(), "Blocklist loaded");
        Ok(list)
    }

    /// Membership test for an already canonicalized host.
    pub fn contains(&self, canonical_host: &str) -> bool {
        self.hosts.contains(canonical_host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
