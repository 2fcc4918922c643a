//! A work-stealing, message-passing parallel file-copy engine.
//!
//! The reusable core (peer state, transport seam, work-request/reply
//! protocol, and Dijkstra-Safra ring termination detection) lives here;
//! concrete jobs plug in through [`task::Task`]. See `crate::tasks` for the
//! bundled tree-walk, copy and checksum tasks.

pub mod checkpoint;
pub mod driver;
pub mod error;
pub mod peer;
pub mod rank;
pub mod settings;
pub mod task;
pub mod tasks;
pub mod token;
pub mod transport;

pub use driver::{Driver, Outcome};
pub use error::{CoreError, CoreResult, TransportError};
pub use rank::Rank;
pub use task::{PeerHandle, Task};
pub use transport::Transport;
