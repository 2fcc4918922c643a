//! The per-peer data model. Every field here is owned exclusively by
//! the one driver loop running this peer; nothing is ever shared across
//! peers except through the [`crate::transport::Transport`].

use std::collections::{HashSet, VecDeque};

pub use crate::rank::Rank;

/// Whether this peer has sent work "backward" in the ring since it last
/// released the termination token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessColor {
    White,
    Black,
    /// Absorbing: the peer has observed global termination and will not
    /// revert.
    Terminate,
}

/// Cleanup-barrier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierPhase {
    NotStarted,
    Started,
    Done,
}

/// The mutable state of one peer.
pub struct PeerState<W> {
    pub rank: Rank,
    pub size: usize,

    pub workq: VecDeque<W>,

    pub process_color: ProcessColor,

    pub token_is_local: bool,
    pub token_color: Option<super::transport::TokenColor>,
    pub token_src: Rank,
    pub token_dest: Rank,
    /// Whether an outgoing token send is still in flight. The in-process
    /// channel transport's sends complete synchronously, so this is mostly
    /// relevant for bookkeeping and for the cleanup-drain discipline;
    /// a future non-blocking-send-capable transport would set this from an
    /// actual request handle.
    pub token_send_pending: bool,

    pub request_outstanding: bool,
    pub requested_of_rank: Option<Rank>,

    pub pending_requesters: Vec<Rank>,

    pub abort: bool,

    pub barrier_phase: BarrierPhase,

    /// Diagnostics only: items processed / requests issued, surfaced by the
    /// CLI summary, not interpreted by the core.
    pub processed_count: u64,
}

impl<W> PeerState<W> {
    pub fn new(rank: Rank, size: usize) -> Self {
        let token_is_local = rank.get() == 0;
        let token_color = if token_is_local {
            Some(super::transport::TokenColor::White)
        } else {
            None
        };

        Self {
            rank,
            size,
            workq: VecDeque::new(),
            process_color: ProcessColor::White,
            token_is_local,
            token_color,
            token_src: rank.pred(size),
            token_dest: rank.succ(size),
            token_send_pending: false,
            request_outstanding: false,
            requested_of_rank: None,
            pending_requesters: Vec::new(),
            abort: false,
            barrier_phase: BarrierPhase::NotStarted,
            processed_count: 0,
        }
    }

    /// Append a work item to the back of the queue.
    pub fn enq(&mut self, item: W) {
        self.workq.push_back(item);
    }

    /// Pop the front work item, if any.
    pub fn deq(&mut self) -> Option<W> {
        self.workq.pop_front()
    }

    /// Replace the entire queue (used on checkpoint
    /// restart).
    pub fn set_queue(&mut self, items: impl IntoIterator<Item = W>) {
        self.workq = items.into_iter().collect();
    }

    pub fn is_empty(&self) -> bool {
        self.workq.is_empty()
    }
}

/// De-duplicating requester list: a rank should only ever appear once
/// between drains, but `request_check` explicitly doesn't forbid a peer
/// asking twice before being answered in pathological schedules. Kept as a
/// free function rather than a type so `PeerState::pending_requesters`
/// stays a plain, easily-tested `Vec`.
pub fn dedup_requesters(requesters: &mut Vec<Rank>) {
    let mut seen = HashSet::with_capacity(requesters.len());
    requesters.retain(|r| seen.insert(*r));
}
