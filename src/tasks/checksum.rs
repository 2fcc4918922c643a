//! Standalone checksum verification: re-walks a previously-copied tree and
//! confirms each destination file's digest matches its source counterpart,
//! without copying any bytes. Digests are computed whole-file instead of
//! per-chunk since nothing here needs to interleave with an in-flight copy.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::task::{PeerHandle, Task};

use super::relative_files;

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("source path does not exist or is not readable: {0}")]
    SourceUnreadable(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> ChecksumError {
    ChecksumError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch,
    DestMissing,
}

pub struct ChecksumTask {
    src: PathBuf,
    dest: PathBuf,
    results: Vec<(PathBuf, Verdict)>,
}

fn digest_file(path: &std::path::Path) -> Result<String, ChecksumError> {
    let mut file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha3_256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl ChecksumTask {
    pub fn new(src: PathBuf, dest: PathBuf) -> Self {
        Self { src, dest, results: Vec::new() }
    }

    pub fn results(&self) -> &[(PathBuf, Verdict)] {
        &self.results
    }

    pub fn mismatches(&self) -> usize {
        self.results.iter().filter(|(_, v)| *v != Verdict::Match).count()
    }
}

impl Task<PathBuf> for ChecksumTask {
    type Error = ChecksumError;

    fn create(&mut self, peer: &mut PeerHandle<'_, PathBuf>) -> Result<(), Self::Error> {
        if !self.src.is_dir() {
            return Err(ChecksumError::SourceUnreadable(self.src.clone()));
        }
        for rel in relative_files(&self.src) {
            peer.enq(rel);
        }
        Ok(())
    }

    fn process(&mut self, peer: &mut PeerHandle<'_, PathBuf>) -> Result<(), Self::Error> {
        let Some(rel) = peer.deq() else { return Ok(()) };
        let dest_path = self.dest.join(&rel);
        if !dest_path.is_file() {
            self.results.push((rel, Verdict::DestMissing));
            return Ok(());
        }

        let src_digest = digest_file(&self.src.join(&rel))?;
        let dest_digest = digest_file(&dest_path)?;
        let verdict = if src_digest == dest_digest { Verdict::Match } else { Verdict::Mismatch };
        self.results.push((rel, verdict));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerState;
    use crate::rank::Rank;

    #[test]
    fn flags_mismatched_and_missing_files() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("same.txt"), b"abc").unwrap();
        std::fs::write(dest.path().join("same.txt"), b"abc").unwrap();
        std::fs::write(src.path().join("diff.txt"), b"abc").unwrap();
        std::fs::write(dest.path().join("diff.txt"), b"xyz").unwrap();
        std::fs::write(src.path().join("missing.txt"), b"abc").unwrap();

        let mut state = PeerState::new(Rank(0), 1);
        let mut task = ChecksumTask::new(src.path().to_path_buf(), dest.path().to_path_buf());
        task.create(&mut PeerHandle::new(&mut state)).unwrap();
        while !state.workq.is_empty() {
            task.process(&mut PeerHandle::new(&mut state)).unwrap();
        }

        assert_eq!(task.mismatches(), 2);
        assert_eq!(task.results().len(), 3);
    }
}
