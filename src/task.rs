//! The Task contract: the seam through which concrete jobs (tree
//! walk, parallel copy, checksum verification — see `crate::tasks`) plug
//! into the reusable driver.

use crate::peer::PeerState;
use crate::rank::Rank;

/// What the core exposes to a registered [`Task`]. Deliberately narrower
/// than [`PeerState`]: a task can enqueue, dequeue, replace the queue,
/// raise abort, and read its own identity, but never touches token or
/// request-handling state — that belongs exclusively to the driver.
pub struct PeerHandle<'a, W> {
    state: &'a mut PeerState<W>,
}

impl<'a, W> PeerHandle<'a, W> {
    pub(crate) fn new(state: &'a mut PeerState<W>) -> Self {
        Self { state }
    }

    pub fn rank(&self) -> Rank {
        self.state.rank
    }

    pub fn size(&self) -> usize {
        self.state.size
    }

    pub fn enq(&mut self, item: W) {
        self.state.enq(item);
    }

    pub fn deq(&mut self) -> Option<W> {
        self.state.deq()
    }

    pub fn set_queue(&mut self, items: impl IntoIterator<Item = W>) {
        self.state.set_queue(items);
    }

    /// Cooperative, monotonic abort. Setting this does not itself
    /// broadcast to other peers — the driver's `begin` loop notices the
    /// flag and calls `bcast_abort` on the task's behalf the next time it
    /// would otherwise issue a new work request.
    pub fn abort(&mut self) {
        self.state.abort = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.state.abort
    }

    /// Snapshot of the current queue, for a task's own checkpoint encoding.
    /// Only valid to call between a `deq()` returning and `process()`
    /// returning — the driver never mutates the queue outside that
    /// window.
    pub fn workq(&self) -> impl Iterator<Item = &W> {
        self.state.workq.iter()
    }
}

/// A pluggable job running on top of the work-stealing/termination-detection
/// core. `W` is the opaque work-item type this task operates on.
pub trait Task<W> {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Called exactly once, on rank 0 only, before the main loop starts.
    /// Seeds the initial workload via `peer.enq`.
    fn create(&mut self, peer: &mut PeerHandle<'_, W>) -> Result<(), Self::Error> {
        let _ = peer;
        Ok(())
    }

    /// Called whenever the local queue is non-empty and the peer is not
    /// aborting. Must dequeue exactly one item via `peer.deq()`; may
    /// enqueue any number of new items. Must not block on the network.
    fn process(&mut self, peer: &mut PeerHandle<'_, W>) -> Result<(), Self::Error>;

    /// Optional: a serializable snapshot of task-specific bookkeeping to
    /// accompany the queue snapshot in a checkpoint. The core never
    /// interprets the bytes.
    fn checkpoint_snapshot(&self) -> Option<Vec<u8>> {
        None
    }
}
