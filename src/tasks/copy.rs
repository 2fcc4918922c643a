//! Chunked parallel copy: the main job this crate exists to run. Splits
//! every regular file under `src` into `chunk_size`-byte pieces (the unit
//! of work a peer can steal), copies each piece independently, and
//! optionally records a per-chunk checksum. Read/write file descriptors are
//! cached with an LRU instead of growing without limit.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::task::{PeerHandle, Task};

use super::relative_files;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyChunk {
    pub rel_path: PathBuf,
    pub offset: u64,
    pub length: u64,
    pub is_last: bool,
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("source path does not exist or is not readable: {0}")]
    SourceUnreadable(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("short read on {path}: expected {expected} bytes, got {got}")]
    ShortRead { path: PathBuf, expected: u64, got: usize },
}

fn io_err(path: &Path, source: std::io::Error) -> CopyError {
    CopyError::Io { path: path.to_path_buf(), source }
}

/// One chunk's recorded digest, keyed by destination path.
pub struct ChunkDigest {
    pub offset: u64,
    pub length: u64,
    pub digest: String,
}

pub struct CopyTask {
    src: PathBuf,
    dest: PathBuf,
    chunk_size: u64,
    verify_checksum: bool,
    preserve: bool,
    rfd_cache: LruCache<PathBuf, File>,
    wfd_cache: LruCache<PathBuf, File>,
    checksums: HashMap<PathBuf, Vec<ChunkDigest>>,
}

impl CopyTask {
    pub fn new(src: PathBuf, dest: PathBuf, chunk_size: u64, fd_cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(fd_cache_size.max(1)).unwrap();
        Self {
            src,
            dest,
            chunk_size: chunk_size.max(1),
            verify_checksum: false,
            preserve: false,
            rfd_cache: LruCache::new(cap),
            wfd_cache: LruCache::new(cap),
            checksums: HashMap::new(),
        }
    }

    pub fn with_checksum(mut self, on: bool) -> Self {
        self.verify_checksum = on;
        self
    }

    pub fn with_preserve(mut self, on: bool) -> Self {
        self.preserve = on;
        self
    }

    pub fn checksums(&self) -> &HashMap<PathBuf, Vec<ChunkDigest>> {
        &self.checksums
    }

    fn open_read(&mut self, rel: &Path) -> Result<&mut File, CopyError> {
        if !self.rfd_cache.contains(rel) {
            let path = self.src.join(rel);
            let file = File::open(&path).map_err(|e| io_err(&path, e))?;
            self.rfd_cache.put(rel.to_path_buf(), file);
        }
        Ok(self.rfd_cache.get_mut(rel).expect("just inserted"))
    }

    fn open_write(&mut self, rel: &Path) -> Result<&mut File, CopyError> {
        if !self.wfd_cache.contains(rel) {
            let path = self.dest.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| io_err(&path, e))?;
            self.wfd_cache.put(rel.to_path_buf(), file);
        }
        Ok(self.wfd_cache.get_mut(rel).expect("just inserted"))
    }

    fn copy_chunk(&mut self, chunk: &CopyChunk) -> Result<(), CopyError> {
        let mut buf = vec![0u8; chunk.length as usize];
        {
            let rfd = self.open_read(&chunk.rel_path)?;
            rfd.seek(SeekFrom::Start(chunk.offset)).map_err(|e| io_err(&chunk.rel_path, e))?;
            let read = rfd.read(&mut buf).map_err(|e| io_err(&chunk.rel_path, e))?;
            if read as u64 != chunk.length {
                return Err(CopyError::ShortRead {
                    path: chunk.rel_path.clone(),
                    expected: chunk.length,
                    got: read,
                });
            }
        }

        let digest = self.verify_checksum.then(|| {
            let mut hasher = Sha3_256::new();
            hasher.update(&buf);
            format!("{:x}", hasher.finalize())
        });

        {
            let wfd = self.open_write(&chunk.rel_path)?;
            wfd.seek(SeekFrom::Start(chunk.offset)).map_err(|e| io_err(&chunk.rel_path, e))?;
            wfd.write_all(&buf).map_err(|e| io_err(&chunk.rel_path, e))?;
        }

        if let Some(digest) = digest {
            self.checksums.entry(chunk.rel_path.clone()).or_default().push(ChunkDigest {
                offset: chunk.offset,
                length: chunk.length,
                digest,
            });
        }

        if chunk.is_last && self.preserve {
            let src_path = self.src.join(&chunk.rel_path);
            let dest_path = self.dest.join(&chunk.rel_path);
            let perms = fs::metadata(&src_path).map_err(|e| io_err(&src_path, e))?.permissions();
            fs::set_permissions(&dest_path, perms).map_err(|e| io_err(&dest_path, e))?;
        }

        Ok(())
    }

    fn enq_file(&self, peer: &mut PeerHandle<'_, CopyChunk>, rel: PathBuf, size: u64) {
        if size == 0 {
            peer.enq(CopyChunk { rel_path: rel, offset: 0, length: 0, is_last: true });
            return;
        }
        let mut offset = 0;
        while offset < size {
            let length = self.chunk_size.min(size - offset);
            let is_last = offset + length == size;
            peer.enq(CopyChunk { rel_path: rel.clone(), offset, length, is_last });
            offset += length;
        }
    }
}

impl Task<CopyChunk> for CopyTask {
    type Error = CopyError;

    fn create(&mut self, peer: &mut PeerHandle<'_, CopyChunk>) -> Result<(), Self::Error> {
        if !self.src.is_dir() {
            return Err(CopyError::SourceUnreadable(self.src.clone()));
        }
        for rel in relative_files(&self.src) {
            let size = fs::metadata(self.src.join(&rel)).map_err(|e| io_err(&rel, e))?.len();
            self.enq_file(peer, rel, size);
        }
        Ok(())
    }

    fn process(&mut self, peer: &mut PeerHandle<'_, CopyChunk>) -> Result<(), Self::Error> {
        let Some(chunk) = peer.deq() else { return Ok(()) };
        self.copy_chunk(&chunk)
    }

    fn checkpoint_snapshot(&self) -> Option<Vec<u8>> {
        let total_chunks: usize = self.checksums.values().map(Vec::len).sum();
        bincode::serialize(&(total_chunks as u64,)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerState;
    use crate::rank::Rank;

    #[test]
    fn splits_large_files_into_bounded_chunks() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("big.bin"), vec![7u8; 10]).unwrap();

        let mut state = PeerState::new(Rank(0), 1);
        let mut task = CopyTask::new(src.path().to_path_buf(), dest.path().to_path_buf(), 4, 8);
        task.create(&mut PeerHandle::new(&mut state)).unwrap();
        assert_eq!(state.workq.len(), 3);
        assert_eq!(state.workq.iter().map(|c| c.length).sum::<u64>(), 10);
    }

    #[test]
    fn round_trips_file_contents() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("file.txt"), b"hello world").unwrap();

        let mut state = PeerState::new(Rank(0), 1);
        let mut task = CopyTask::new(src.path().to_path_buf(), dest.path().to_path_buf(), 1024, 8)
            .with_checksum(true);
        task.create(&mut PeerHandle::new(&mut state)).unwrap();
        while !state.workq.is_empty() {
            task.process(&mut PeerHandle::new(&mut state)).unwrap();
        }

        let copied = std::fs::read(dest.path().join("file.txt")).unwrap();
        assert_eq!(copied, b"hello world");
        assert_eq!(task.checksums().len(), 1);
    }
}
