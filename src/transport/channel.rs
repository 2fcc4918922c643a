//! In-process ring transport: one OS thread per simulated peer, wired
//! together with `crossbeam-channel`.
//!
//! There is no MPI (or other network) binding available in this crate's
//! dependency ecosystem, and the peer set is fixed at startup anyway (no
//! dynamic join/leave), so a single-process simulation of the ring is both
//! sufficient and far easier to property-test than a real multi-host
//! transport would be. The drain-into-a-local-buffer-then-match shape below
//! is the same poll-then-backoff-sleep idiom as a deque-stealing worker
//! pool, translated from "steal work from a sibling deque" to "drain my
//! inbound channel and match by tag/source".

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::TransportError;
use crate::rank::{Rank, Source};

use super::{Message, Tag, Transport};

struct Envelope<W> {
    from: Rank,
    tag: Tag,
    msg: Message<W>,
}

/// One peer's end of the in-process ring. Built by [`build_cluster`]; moved
/// into the OS thread that runs that peer's driver loop. Only that thread
/// ever touches `pending`, so a `RefCell` suffices even though `Sender`
/// clones of this peer's inbound channel are held by every other peer.
pub struct ChannelTransport<W> {
    rank: Rank,
    size: usize,
    senders: Vec<Sender<Envelope<W>>>,
    inbox: Receiver<Envelope<W>>,
    pending: RefCell<VecDeque<Envelope<W>>>,
    barrier_count: Arc<AtomicUsize>,
    barrier_joined: Cell<bool>,
}

impl<W> ChannelTransport<W> {
    /// Non-blocking drain of everything currently sitting in the channel
    /// into the local staging buffer. Safe to call as often as desired;
    /// never blocks.
    fn drain(&self) {
        let mut pending = self.pending.borrow_mut();
        while let Ok(envelope) = self.inbox.try_recv() {
            pending.push_back(envelope);
        }
    }

    fn matches(envelope: &Envelope<W>, source: Source, tag: Tag) -> bool {
        envelope.tag == tag
            && match source {
                Source::Any => true,
                Source::From(r) => envelope.from == r,
            }
    }
}

impl<W> Transport<W> for ChannelTransport<W> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: Rank, tag: Tag, msg: Message<W>) -> Result<(), TransportError> {
        self.senders[dest.get()]
            .send(Envelope {
                from: self.rank,
                tag,
                msg,
            })
            .map_err(|_| TransportError::SendFailed {
                dest,
                reason: "peer disconnected".into(),
            })
    }

    fn probe(&self, source: Source, tag: Tag) -> Result<Option<Rank>, TransportError> {
        self.drain();
        Ok(self
            .pending
            .borrow()
            .iter()
            .find(|e| Self::matches(e, source, tag))
            .map(|e| e.from))
    }

    fn recv(&self, source: Rank, tag: Tag) -> Result<Message<W>, TransportError> {
        self.drain();
        let mut pending = self.pending.borrow_mut();
        let idx = pending
            .iter()
            .position(|e| Self::matches(e, Source::From(source), tag))
            .ok_or(TransportError::RecvFailed {
                source,
                reason: "recv called with nothing matching pending (probe first)".into(),
            })?;
        // SAFETY net for FIFO: `remove` at an interior index is only
        // reachable here when a message of a *different* tag from the same
        // sender arrived first; same-tag traffic from one sender is always
        // at index 0 among its own tag by channel order.
        Ok(pending.remove(idx).expect("index came from position").msg)
    }

    fn barrier_join(&self) -> Result<bool, TransportError> {
        if !self.barrier_joined.get() {
            self.barrier_count.fetch_add(1, Ordering::SeqCst);
            self.barrier_joined.set(true);
        }
        Ok(self.barrier_count.load(Ordering::SeqCst) == self.size)
    }
}

/// Backoff sleep applied after `rounds` consecutive empty probes, capped so
/// it never exceeds a caller-supplied ceiling (typically the checkpoint
/// interval). Doubles each round once every local queue has gone dry, the
/// way a work-stealing pool backs off once it finds nothing to steal.
pub fn poll_backoff(rounds: u32, ceiling: Duration) -> Duration {
    let millis = 1u64.saturating_shl(rounds.min(10));
    Duration::from_millis(millis).min(ceiling)
}

/// Build a fully-connected ring of `size` [`ChannelTransport`]s, one per
/// rank, ready to be handed one each to `size` OS threads.
pub fn build_cluster<W>(size: usize) -> Vec<ChannelTransport<W>> {
    assert!(size > 0, "a cluster needs at least one peer");

    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..size).map(|_| channel::unbounded::<Envelope<W>>()).unzip();

    let barrier_count = Arc::new(AtomicUsize::new(0));

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelTransport {
            rank: Rank(rank),
            size,
            senders: senders.clone(),
            inbox,
            pending: RefCell::new(VecDeque::new()),
            barrier_count: barrier_count.clone(),
            barrier_joined: Cell::new(false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::Source;

    #[test]
    fn delivers_in_order_per_tag() {
        let mut cluster: Vec<ChannelTransport<u32>> = build_cluster(2);
        let b = cluster.pop().unwrap();
        let a = cluster.pop().unwrap();

        a.send(Rank(1), Tag::WorkReply, Message::ReplyHeader(super::super::ReplyHeader::Count(2)))
            .unwrap();
        a.send(Rank(1), Tag::WorkReply, Message::ReplyItems(vec![1, 2]))
            .unwrap();

        assert_eq!(b.probe(Source::From(Rank(0)), Tag::WorkReply).unwrap(), Some(Rank(0)));
        match b.recv(Rank(0), Tag::WorkReply).unwrap() {
            Message::ReplyHeader(super::super::ReplyHeader::Count(n)) => assert_eq!(n, 2),
            other => panic!("unexpected {other:?}"),
        }
        match b.recv(Rank(0), Tag::WorkReply).unwrap() {
            Message::ReplyItems(items) => assert_eq!(items, vec![1, 2]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn probe_reports_absence_without_consuming() {
        let cluster: Vec<ChannelTransport<u32>> = build_cluster(2);
        let a = &cluster[0];
        assert_eq!(a.probe(Source::Any, Tag::Token).unwrap(), None);
    }

    #[test]
    fn barrier_join_waits_for_every_peer() {
        let cluster: Vec<ChannelTransport<u32>> = build_cluster(3);

        assert!(!cluster[0].barrier_join().unwrap());
        assert!(!cluster[1].barrier_join().unwrap());

        // Repeated polling by a peer that already arrived must not count twice.
        assert!(!cluster[0].barrier_join().unwrap());

        assert!(cluster[2].barrier_join().unwrap());
        assert!(cluster[0].barrier_join().unwrap());
    }
}
