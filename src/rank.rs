//! Peer identity within a fixed-size ring.

use std::fmt;

/// The integer identity of a peer, `r ∈ [0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub struct Rank(pub usize);

impl Rank {
    pub const fn new(r: usize) -> Self {
        Self(r)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// `(rank - 1) mod size`: this peer's predecessor on the token ring.
    pub fn pred(self, size: usize) -> Rank {
        Rank((self.0 + size - 1) % size)
    }

    /// `(rank + 1) mod size`: this peer's successor on the token ring.
    pub fn succ(self, size: usize) -> Rank {
        Rank((self.0 + 1) % size)
    }

    pub fn is_last(self, size: usize) -> bool {
        self.0 == size - 1
    }
}

impl From<usize> for Rank {
    fn from(v: usize) -> Self {
        Rank(v)
    }
}

/// `probe`'s source filter: either a specific rank, or a wildcard matching
/// any sender (MPI's `ANY_SOURCE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    From(Rank),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Any => write!(f, "any"),
            Source::From(r) => write!(f, "{r}"),
        }
    }
}
