//! Command-line surface: `src`, `dest`, checksum/preserve flags, chunk
//! size, and checkpoint id/interval, through `clap`'s derive API with a
//! `Cli`/subcommand split.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A work-stealing, message-passing parallel file-copy engine.
#[derive(Parser, Debug)]
#[command(version, about, propagate_version = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub copy: CopyArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a copy job (same as the default command).
    Copy(CopyArgs),

    /// Verify a destination tree against its source via checksum, without copying.
    Verify(CopyArgs),

    /// Resume a job from a previously written checkpoint set.
    Resume {
        #[command(flatten)]
        args: CopyArgs,

        /// Checkpoint id to resume from (matches `--checkpoint-id` of the original run).
        #[arg(long)]
        checkpoint_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct CopyArgs {
    /// Source directory to walk and copy from.
    pub src: PathBuf,

    /// Destination directory to copy into.
    pub dest: PathBuf,

    /// Number of cooperating peers to simulate (the ring size N).
    #[arg(long, short = 'n', default_value_t = 4)]
    pub peers: usize,

    /// Bytes per copy chunk, accepts a plain integer or a suffix like `1m`/`64k`.
    #[arg(long, default_value = "1m")]
    pub chunksize: String,

    /// Verify each copied file's checksum against the source.
    #[arg(long, short = 'c')]
    pub checksum: bool,

    /// Preserve source file metadata (mode, mtime) on the destination.
    #[arg(long, short = 'p')]
    pub preserve: bool,

    /// Seconds between checkpoint writes.
    #[arg(long, default_value_t = 30)]
    pub checkpoint_interval: u64,

    /// Identifier embedded in checkpoint filenames; a random id is generated if omitted.
    #[arg(long)]
    pub checkpoint_id: Option<String>,
}

/// Parses a chunk size like `1m`, `64k`, or a bare byte count.
pub fn parse_chunk_size(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();
    let (digits, mult) = match s.strip_suffix('k') {
        Some(d) => (d, 1024u64),
        None => match s.strip_suffix('m') {
            Some(d) => (d, 1024 * 1024),
            None => match s.strip_suffix('g') {
                Some(d) => (d, 1024 * 1024 * 1024),
                None => (s.as_str(), 1),
            },
        },
    };
    digits
        .parse::<u64>()
        .map(|n| n * mult)
        .map_err(|_| format!("invalid chunk size: {s}"))
}
