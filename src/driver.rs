//! The reusable driver loop: request handling, work splitting, requesting,
//! termination detection and cleanup, wired together around a registered
//! [`Task`].

use std::time::Instant;

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::checkpoint::Checkpointer;
use crate::error::{CoreError, TransportError};
use crate::peer::{dedup_requesters, BarrierPhase, PeerState, ProcessColor};
use crate::rank::{Rank, Source};
use crate::task::{PeerHandle, Task};
use crate::token::check_for_term;
use crate::transport::channel::poll_backoff;
use crate::transport::{Message, RequestSignal, ReplyHeader, Tag, Transport};

/// How the job ended, reported up to whoever called [`Driver::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Terminated,
    Aborted,
}

fn wrap(rank: Rank, e: TransportError) -> CoreError {
    CoreError::Transport { rank, source: e }
}

fn task_err<E: std::error::Error + Send + Sync + 'static>(rank: Rank, e: E) -> CoreError {
    CoreError::Task { rank, source: Box::new(e) }
}

/// Equal split: reserve `ceil(w / (r+1))` for the local peer first (the "+1"
/// models the local share, as one of `r+1` total claimants), then divide
/// what's left evenly across the `r` requesters, with the remainder going
/// one-per-requester starting from the first. This always keeps at least
/// `ceil(w/(r+1))` locally rather than only "when possible" — a plain `w / r`
/// split across requesters alone can starve the local peer entirely.
fn spread_counts(w: usize, r: usize) -> (usize, Vec<usize>) {
    if r == 0 {
        return (w, Vec::new());
    }
    let shares = r + 1;
    let self_share = w.div_ceil(shares);
    let remaining = w - self_share;
    let base = remaining / r;
    let extra = remaining % r;
    let counts = (0..r).map(|i| base + usize::from(i < extra)).collect();
    (self_share, counts)
}

pub struct Driver<'t, W, T: Transport<W>> {
    state: PeerState<W>,
    transport: &'t T,
    rng: StdRng,
    checkpointer: Option<Checkpointer>,
    backoff_rounds: u32,
    abort_broadcast_sent: bool,
}

impl<'t, W, T: Transport<W>> Driver<'t, W, T> {
    pub fn new(transport: &'t T) -> Self {
        Self {
            state: PeerState::new(transport.rank(), transport.size()),
            transport,
            rng: StdRng::from_entropy(),
            checkpointer: None,
            backoff_rounds: 0,
            abort_broadcast_sent: false,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Injectable PRNG source: determinism not required, but tests want
    /// reproducible peer selection.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn rank(&self) -> Rank {
        self.state.rank
    }

    pub fn processed_count(&self) -> u64 {
        self.state.processed_count
    }

    /// Entry point. Runs `task.create()` on rank 0, then the main loop
    /// until global termination or abort, then the cleanup barrier.
    pub fn begin<Tk>(&mut self, task: &mut Tk) -> Result<Outcome, CoreError>
    where
        Tk: Task<W>,
        W: Clone + serde::Serialize,
    {
        if self.state.rank.get() == 0 {
            task.create(&mut PeerHandle::new(&mut self.state))
                .map_err(|e| task_err(self.state.rank, e))?;
        }

        loop {
            self.maybe_broadcast_abort()?;

            self.request_check()?;

            if self.state.is_empty() {
                self.request_work()?;
            }

            if !self.state.is_empty() && !self.state.abort {
                self.backoff_rounds = 0;
                self.maybe_checkpoint(task);
                if let Err(e) = task.process(&mut PeerHandle::new(&mut self.state)) {
                    tracing::warn!(
                        rank = self.state.rank.get(),
                        error = %e,
                        "task process() failed; treating the item as consumed"
                    );
                }
                self.state.processed_count += 1;
            } else {
                if check_for_term(&mut self.state, self.transport)? == ProcessColor::Terminate {
                    break;
                }
                self.backoff();
            }
        }

        self.cleanup()?;

        if !self.state.abort {
            if let Some(cp) = &self.checkpointer {
                cp.remove(self.state.rank).ok();
            }
        }

        Ok(if self.state.abort { Outcome::Aborted } else { Outcome::Terminated })
    }

    fn backoff(&mut self) {
        self.backoff_rounds = self.backoff_rounds.saturating_add(1);
        let ceiling = self
            .checkpointer
            .as_ref()
            .map(|_| std::time::Duration::from_millis(50))
            .unwrap_or(std::time::Duration::from_millis(20));
        std::thread::sleep(poll_backoff(self.backoff_rounds, ceiling));
    }

    fn maybe_checkpoint<Tk: Task<W>>(&mut self, task: &Tk)
    where
        W: Clone + serde::Serialize,
    {
        let Some(cp) = &mut self.checkpointer else { return };
        let now = Instant::now();
        if !cp.due(now) {
            return;
        }
        let snapshot = task.checkpoint_snapshot();
        let totalsize = self.state.processed_count + self.state.workq.len() as u64;
        if let Err(e) = cp.write(
            self.state.rank,
            self.state.token_src,
            self.state.token_dest,
            &self.state.workq,
            totalsize,
            snapshot,
            now,
        ) {
            tracing::warn!(rank = self.state.rank.get(), error = %e, "checkpoint write failed");
        }
    }

    /// Drain all pending `WORK_REQUEST`s, then answer them.
    fn request_check(&mut self) -> Result<(), CoreError>
    where
        W: Clone,
    {
        self.request_check_inner(false)
    }

    fn request_check_inner(&mut self, cleanup: bool) -> Result<(), CoreError>
    where
        W: Clone,
    {
        loop {
            let present = self
                .transport
                .probe(Source::Any, Tag::WorkRequest)
                .map_err(|e| wrap(self.state.rank, e))?;
            let Some(from) = present else { break };
            match self
                .transport
                .recv(from, Tag::WorkRequest)
                .map_err(|e| wrap(self.state.rank, e))?
            {
                Message::Request(RequestSignal::Abort) => {
                    self.state.abort = true;
                    break;
                }
                Message::Request(RequestSignal::Normal) => {
                    self.state.pending_requesters.push(from);
                }
                other => {
                    return Err(CoreError::Protocol {
                        rank: self.state.rank,
                        message: format!("expected a work request, got {other:?}"),
                    })
                }
            }
        }

        if self.state.pending_requesters.is_empty() {
            return Ok(());
        }
        dedup_requesters(&mut self.state.pending_requesters);

        if cleanup || self.state.abort || self.state.is_empty() {
            self.reply_no_work()
        } else {
            self.send_work_to_many()
        }
    }

    fn reply_no_work(&mut self) -> Result<(), CoreError> {
        let header = if self.state.abort { ReplyHeader::Abort } else { ReplyHeader::Zero };
        let requesters = std::mem::take(&mut self.state.pending_requesters);
        for dest in requesters {
            self.transport
                .send(dest, Tag::WorkReply, Message::ReplyHeader(header))
                .map_err(|e| wrap(self.state.rank, e))?;
        }
        Ok(())
    }

    /// Split the local queue across every pending requester and reply.
    fn send_work_to_many(&mut self) -> Result<(), CoreError>
    where
        W: Clone,
    {
        let requesters = std::mem::take(&mut self.state.pending_requesters);
        let (_self_share, counts) = spread_counts(self.state.workq.len(), requesters.len());

        for (dest, count) in requesters.into_iter().zip(counts) {
            if count == 0 {
                self.transport
                    .send(dest, Tag::WorkReply, Message::ReplyHeader(ReplyHeader::Zero))
                    .map_err(|e| wrap(self.state.rank, e))?;
                continue;
            }

            if dest.get() < self.state.rank.get() || dest == self.state.token_src {
                self.state.process_color = ProcessColor::Black;
            }

            let items: Vec<W> = self.state.workq.drain(..count).collect();
            self.transport
                .send(dest, Tag::WorkReply, Message::ReplyHeader(ReplyHeader::Count(count)))
                .map_err(|e| wrap(self.state.rank, e))?;
            self.transport
                .send(dest, Tag::WorkReply, Message::ReplyItems(items))
                .map_err(|e| wrap(self.state.rank, e))?;
        }
        Ok(())
    }

    /// Send a work request to a random peer if none is already outstanding.
    fn request_work(&mut self) -> Result<(), CoreError> {
        self.request_work_inner(false)
    }

    fn request_work_inner(&mut self, cleanup: bool) -> Result<(), CoreError> {
        if self.state.request_outstanding {
            let source = self.state.requested_of_rank.expect("outstanding request has a target");
            let present = self
                .transport
                .probe(Source::From(source), Tag::WorkReply)
                .map_err(|e| wrap(self.state.rank, e))?
                .is_some();
            if present {
                self.receive_reply(source)?;
                self.state.request_outstanding = false;
                self.state.requested_of_rank = None;
            }
            return Ok(());
        }

        if cleanup {
            return Ok(());
        }

        if self.state.size == 1 {
            return Ok(());
        }

        let dest = Rank::new(self.rng.gen_range(0..self.state.size));
        let signal = if self.state.abort { RequestSignal::Abort } else { RequestSignal::Normal };
        self.transport
            .send(dest, Tag::WorkRequest, Message::Request(signal))
            .map_err(|e| wrap(self.state.rank, e))?;
        self.state.request_outstanding = true;
        self.state.requested_of_rank = Some(dest);
        Ok(())
    }

    fn receive_reply(&mut self, source: Rank) -> Result<(), CoreError> {
        let header = match self
            .transport
            .recv(source, Tag::WorkReply)
            .map_err(|e| wrap(self.state.rank, e))?
        {
            Message::ReplyHeader(h) => h,
            other => {
                return Err(CoreError::Protocol {
                    rank: self.state.rank,
                    message: format!("expected a work-reply header, got {other:?}"),
                })
            }
        };

        match header {
            ReplyHeader::Abort => {
                self.state.abort = true;
                Ok(())
            }
            ReplyHeader::Zero => Ok(()),
            ReplyHeader::Count(expected) => {
                match self
                    .transport
                    .recv(source, Tag::WorkReply)
                    .map_err(|e| wrap(self.state.rank, e))?
                {
                    Message::ReplyItems(items) => {
                        if items.len() != expected {
                            return Err(CoreError::Protocol {
                                rank: self.state.rank,
                                message: format!(
                                    "work-reply count header said {expected} items, payload carried {}",
                                    items.len()
                                ),
                            });
                        }
                        self.state.workq.extend(items);
                        Ok(())
                    }
                    other => Err(CoreError::Protocol {
                        rank: self.state.rank,
                        message: format!("expected work-reply items, got {other:?}"),
                    }),
                }
            }
        }
    }

    /// Broadcasts abort exactly once, the first driver iteration after
    /// `abort` becomes true for any reason (a task's own `peer.abort()`
    /// call, or an abort observed from an incoming request/reply). Bounds
    /// propagation to one hop from this peer to every other, rather than
    /// relying on abort trickling out as a side effect of this peer's queue
    /// eventually emptying.
    fn maybe_broadcast_abort(&mut self) -> Result<(), CoreError> {
        if self.state.abort && !self.abort_broadcast_sent {
            self.abort_broadcast_sent = true;
            self.bcast_abort()?;
        }
        Ok(())
    }

    /// Sets `abort` locally, then tells every other peer.
    pub fn bcast_abort(&mut self) -> Result<(), CoreError> {
        self.state.abort = true;
        for r in 0..self.state.size {
            if r == self.state.rank.get() {
                continue;
            }
            self.transport
                .send(Rank::new(r), Tag::WorkRequest, Message::Request(RequestSignal::Abort))
                .map_err(|e| wrap(self.state.rank, e))?;
        }
        Ok(())
    }

    /// Drain in-flight traffic, then wait at the cross-peer barrier, before
    /// returning. The drain (`request_check_inner`/`request_work_inner`)
    /// keeps running every iteration even after this peer has locally
    /// quiesced, so it stays responsive to `WORK_REQUEST`s from peers still
    /// a few ring hops behind — a peer parked in a blocking wait here could
    /// starve exactly the peer it's waiting on.
    fn cleanup(&mut self) -> Result<(), CoreError>
    where
        W: Clone,
    {
        self.state.barrier_phase = BarrierPhase::Started;
        loop {
            self.request_check_inner(true)?;
            self.request_work_inner(true)?;

            if let Some(token_src_present) = self
                .transport
                .probe(Source::From(self.state.token_src), Tag::Token)
                .map_err(|e| wrap(self.state.rank, e))?
            {
                self.transport
                    .recv(token_src_present, Tag::Token)
                    .map_err(|e| wrap(self.state.rank, e))?;
            }

            if !self.state.request_outstanding && !self.state.token_send_pending {
                let all_arrived = self.transport.barrier_join().map_err(|e| wrap(self.state.rank, e))?;
                if all_arrived {
                    break;
                }
                self.backoff();
            }
        }
        self.state.barrier_phase = BarrierPhase::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_split_reserves_local_share() {
        assert_eq!(spread_counts(4, 1), (2, vec![2]));
        assert_eq!(spread_counts(2, 1), (1, vec![1]));
        assert_eq!(spread_counts(1, 3), (1, vec![0, 0, 0]));
        assert_eq!(spread_counts(0, 2), (0, vec![0, 0]));
        assert_eq!(spread_counts(10, 0), (10, vec![]));
    }

    #[test]
    fn equal_split_conserves_total() {
        for w in 0..20 {
            for r in 0..6 {
                let (self_share, counts) = spread_counts(w, r);
                assert_eq!(self_share + counts.iter().sum::<usize>(), w);
            }
        }
    }
}
