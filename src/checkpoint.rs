//! Checkpoint persistence: an opaque, atomically-written snapshot of one
//! peer's work queue plus whatever task-specific bytes the registered
//! `Task` wants to ride alongside it.
//!
//! Encoding and the temp-file-then-rename discipline mirror the atomic
//! writer pattern used elsewhere in this dependency stack for config and
//! state files: write to a sibling temp path, then rename onto the target so
//! a reader never observes a partially-written file.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::rank::Rank;

#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub job: String,
    pub id: String,
    pub dir: PathBuf,
    pub interval: Duration,
}

/// The opaque record persisted per peer: ring neighbors (useful to sanity
/// check a restart lands on the same topology), the queue snapshot, and a
/// running total of bytes/items the task cares about.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointRecord<W> {
    pub src: Rank,
    pub dest: Rank,
    pub workq: Vec<W>,
    pub totalsize: u64,
    pub task_snapshot: Option<Vec<u8>>,
}

/// Drives the "has enough time passed" decision and owns the atomic-write
/// mechanics; does not interpret `W` beyond requiring it serialize.
pub struct Checkpointer {
    config: CheckpointConfig,
    last: Option<Instant>,
}

impl Checkpointer {
    pub fn new(config: CheckpointConfig) -> Self {
        Self { config, last: None }
    }

    /// `now - last_checkpoint >= interval`, true unconditionally on the
    /// first call.
    pub fn due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.config.interval,
        }
    }

    pub fn path(&self, rank: Rank) -> PathBuf {
        self.config
            .dir
            .join(format!(".{}_workq.{}.{}", self.config.job, self.config.id, rank.get()))
    }

    pub fn write<W>(
        &mut self,
        rank: Rank,
        src: Rank,
        dest: Rank,
        workq: &VecDeque<W>,
        totalsize: u64,
        task_snapshot: Option<Vec<u8>>,
        now: Instant,
    ) -> io::Result<()>
    where
        W: Serialize + Clone,
    {
        let record = CheckpointRecord {
            src,
            dest,
            workq: workq.iter().cloned().collect(),
            totalsize,
            task_snapshot,
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        atomic_write(&self.path(rank), &bytes)?;
        self.last = Some(now);
        Ok(())
    }

    /// Removed on successful job completion; absence is not an error.
    pub fn remove(&self, rank: Rank) -> io::Result<()> {
        match fs::remove_file(self.path(rank)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

pub fn load<W>(path: impl AsRef<Path>) -> io::Result<CheckpointRecord<W>>
where
    W: for<'de> Deserialize<'de>,
{
    let bytes = fs::read(path)?;
    bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write `bytes` to a temp file beside `target`, then rename into place.
fn atomic_write(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".into());
    let temp_path = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn write_then_load_round_trips_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = Checkpointer::new(CheckpointConfig {
            job: "copy".into(),
            id: "1".into(),
            dir: dir.path().to_path_buf(),
            interval: Duration::from_secs(30),
        });
        let rank = Rank(0);
        let mut q: VecDeque<u32> = VecDeque::new();
        q.push_back(1);
        q.push_back(2);
        q.push_back(3);

        assert!(cp.due(Instant::now()));
        cp.write(rank, Rank(1), Rank(1), &q, 3, None, Instant::now()).unwrap();
        assert!(!cp.due(Instant::now()));

        let record: CheckpointRecord<u32> = load(cp.path(rank)).unwrap();
        assert_eq!(record.workq, vec![1, 2, 3]);
        assert_eq!(record.totalsize, 3);

        cp.remove(rank).unwrap();
        assert!(load::<u32>(cp.path(rank)).is_err());
    }
}
