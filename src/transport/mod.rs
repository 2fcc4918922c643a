//! The message-passing seam between the core driver and however bytes
//! actually move between peers.
//!
//! The driver, the termination detector (`crate::token`) and the splitting
//! logic (`crate::driver`) only ever talk to the [`Transport`] trait. The
//! concrete [`channel::ChannelTransport`] realizes it across OS threads in a
//! single process; a real network transport could implement the same trait
//! without the driver changing at all.

pub mod channel;

use crate::error::TransportError;
use crate::rank::{Rank, Source};

/// The three wire tags from the wire protocol table. Ordering is only
/// guaranteed between messages sharing the same `(sender, receiver, tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    WorkRequest,
    WorkReply,
    Token,
}

/// Payload sent on `WORK_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSignal {
    Normal,
    Abort,
}

/// The first message of a `WORK_REPLY` pair: either a terminal sentinel, or
/// a count announcing that a payload message of that many items follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyHeader {
    Zero,
    Abort,
    Count(usize),
}

/// The token's color, carried on the `TOKEN` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenColor {
    White,
    Black,
    Terminate,
}

/// Everything that can cross the wire, tagged by which [`Tag`] it travels on.
#[derive(Debug, Clone)]
pub enum Message<W> {
    Request(RequestSignal),
    ReplyHeader(ReplyHeader),
    ReplyItems(Vec<W>),
    Token(TokenColor),
}

/// Message-passing interface a peer uses to talk to the rest of the ring.
///
/// Implementations must guarantee FIFO delivery between any one
/// `(sender, receiver, tag)` triple but need not order across tags or
/// across senders.
pub trait Transport<W> {
    fn rank(&self) -> Rank;
    fn size(&self) -> usize;

    /// Blocking send of one message. Only ever used for the small control
    /// payloads (request/reply-header/count/token); the work-item payload
    /// message is also sent this way but is expected to be posted
    /// immediately after its header, never out of order.
    fn send(&self, dest: Rank, tag: Tag, msg: Message<W>) -> Result<(), TransportError>;

    /// Non-blocking check for a pending message matching `source`/`tag`.
    /// Returns the concrete sender rank when present (relevant when
    /// `source == Source::Any`). Never consumes the message.
    fn probe(&self, source: Source, tag: Tag) -> Result<Option<Rank>, TransportError>;

    /// Receive a message already known present via a prior successful
    /// `probe` for the same `(source, tag)`. Implementations may treat a
    /// call with nothing present as a protocol violation (the driver never
    /// does this).
    fn recv(&self, source: Rank, tag: Tag) -> Result<Message<W>, TransportError>;

    /// Join the distributed cleanup barrier. Idempotent — safe to call every
    /// round of the cleanup loop — and non-blocking: it registers this peer
    /// as arrived (once) and reports whether every peer has now arrived.
    ///
    /// A blocking rendezvous here would be unsafe: a peer that has satisfied
    /// its own local cleanup condition but stops servicing `WORK_REQUEST`s
    /// while parked in a blocking wait can deadlock a peer still lagging a
    /// few ring hops behind on the termination cascade, which needs one more
    /// reply before it can arrive itself. Polling this alongside the rest of
    /// the cleanup drain loop keeps every peer responsive until the whole
    /// cluster has actually arrived.
    fn barrier_join(&self) -> Result<bool, TransportError>;
}
