//! Error types for the core work-stealing/termination-detection runtime.

use thiserror::Error;

use crate::peer::Rank;

/// Errors the core can raise. Transport and protocol errors are fatal and are
/// never recovered from inside the driver loop; task errors are opaque and
/// left entirely to the registered [`crate::task::Task`] to act on.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A send, probe, or receive on the transport failed.
    #[error("transport error on rank {rank}: {source}")]
    Transport {
        rank: Rank,
        #[source]
        source: TransportError,
    },

    /// The driver observed state that should be impossible under the wire
    /// protocol (e.g. a second `TOKEN` arriving while one is still locally
    /// held, or a `WORK_REPLY` count message with no following payload).
    #[error("protocol violation on rank {rank}: {message}")]
    Protocol { rank: Rank, message: String },

    /// The registered task's `create()` call returned an error. Always
    /// fatal and propagated: `create()` failing means no work was ever
    /// seeded, so there is nothing left for the cluster to make progress
    /// on. `process()` errors do *not* surface here — the driver logs them
    /// and treats the item as consumed, leaving the task itself to decide
    /// (via its own `abort()` call) whether a failure should end the job.
    #[error("task error on rank {rank}: {source}")]
    Task {
        rank: Rank,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors from the [`crate::transport::Transport`] implementation itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("send to rank {dest} failed: {reason}")]
    SendFailed { dest: Rank, reason: String },

    #[error("receive from rank {source} failed: {reason}")]
    RecvFailed { source: Rank, reason: String },

    #[error("peer {rank} disconnected from the ring")]
    Disconnected { rank: Rank },
}

pub type CoreResult<T> = Result<T, CoreError>;
