//! A minimal discovery-only job: walks a directory tree and feeds every
//! regular file's relative path through the driver, without touching file
//! contents. Useful on its own (inventory/dry-run) and as the smallest
//! possible example of the [`Task`] contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::{PeerHandle, Task};

use super::relative_files;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("source path does not exist or is not readable: {0}")]
    SourceUnreadable(PathBuf),
}

pub struct TreeWalk {
    root: PathBuf,
    visited: Vec<PathBuf>,
}

impl TreeWalk {
    pub fn new(root: PathBuf) -> Self {
        Self { root, visited: Vec::new() }
    }

    /// Paths visited by this peer's own `process()` calls, for diagnostics.
    pub fn visited(&self) -> &[PathBuf] {
        &self.visited
    }
}

impl Task<PathBuf> for TreeWalk {
    type Error = WalkError;

    fn create(&mut self, peer: &mut PeerHandle<'_, PathBuf>) -> Result<(), Self::Error> {
        if !self.root.is_dir() {
            return Err(WalkError::SourceUnreadable(self.root.clone()));
        }
        for rel in relative_files(&self.root) {
            peer.enq(rel);
        }
        Ok(())
    }

    fn process(&mut self, peer: &mut PeerHandle<'_, PathBuf>) -> Result<(), Self::Error> {
        if let Some(path) = peer.deq() {
            tracing::debug!(rank = peer.rank().get(), path = %path.display(), "visited");
            self.visited.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerState;
    use crate::rank::Rank;

    #[test]
    fn seeds_one_item_per_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let mut state = PeerState::new(Rank(0), 1);
        let mut task = TreeWalk::new(dir.path().to_path_buf());
        task.create(&mut PeerHandle::new(&mut state)).unwrap();
        assert_eq!(state.workq.len(), 2);
    }
}
