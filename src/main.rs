use std::thread;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

use ringcopy::checkpoint::{CheckpointConfig, Checkpointer};
use ringcopy::driver::{Driver, Outcome};
use ringcopy::settings::Settings;
use ringcopy::tasks::checksum::ChecksumTask;
use ringcopy::tasks::copy::CopyTask;
use ringcopy::transport::channel::build_cluster;

mod cli;
mod logging;
mod panic_handler;

use cli::{parse_chunk_size, Cli, Commands, CopyArgs};

fn main() -> Result<()> {
    panic_handler::install()?;
    logging::init()?;

    let cli = Cli::parse();
    let settings = Settings::load().wrap_err("loading configuration")?;

    let (args, checkpoint_id, verify_only) = match cli.command {
        Some(Commands::Copy(args)) => (args, None, false),
        Some(Commands::Verify(args)) => (args, None, true),
        Some(Commands::Resume { args, checkpoint_id }) => (args, Some(checkpoint_id), false),
        None => (cli.copy, None, false),
    };

    let peers = args.peers.max(1);
    let chunk_size = parse_chunk_size(&args.chunksize).map_err(color_eyre::eyre::Report::msg)?;
    info!(peers, src = %args.src.display(), dest = %args.dest.display(), "starting job");

    if verify_only {
        run_verify(&args, peers)
    } else {
        run_copy(&args, peers, chunk_size, &settings, checkpoint_id)
    }
}

fn run_copy(
    args: &CopyArgs,
    peers: usize,
    chunk_size: u64,
    settings: &Settings,
    checkpoint_id: Option<String>,
) -> Result<()> {
    use ringcopy::tasks::copy::CopyChunk;

    let cluster = build_cluster::<CopyChunk>(peers);
    let job_id = checkpoint_id.unwrap_or_else(|| std::process::id().to_string());
    let checkpoint_interval = Duration::from_secs(args.checkpoint_interval);

    let outcomes: Vec<Result<Outcome>> = thread::scope(|scope| {
        let handles: Vec<_> = cluster
            .into_iter()
            .map(|transport| {
                let args = args.clone();
                let job_id = job_id.clone();
                scope.spawn(move || -> Result<Outcome> {
                    let span = logging::peer_span(transport.rank().get());
                    let _enter = span.enter();

                    let mut task = CopyTask::new(
                        args.src.clone(),
                        args.dest.clone(),
                        chunk_size,
                        settings.fd_cache_size,
                    )
                    .with_checksum(args.checksum)
                    .with_preserve(args.preserve);

                    let checkpointer = Checkpointer::new(CheckpointConfig {
                        job: "copy".into(),
                        id: job_id,
                        dir: args.dest.clone(),
                        interval: checkpoint_interval,
                    });

                    let mut driver = Driver::new(&transport).with_checkpointer(checkpointer);
                    driver.begin(&mut task).map_err(color_eyre::eyre::Report::new)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("peer thread panicked")).collect()
    });

    report(outcomes)
}

fn run_verify(args: &CopyArgs, peers: usize) -> Result<()> {
    use std::path::PathBuf;

    let cluster = build_cluster::<PathBuf>(peers);
    let outcomes: Vec<Result<Outcome>> = thread::scope(|scope| {
        let handles: Vec<_> = cluster
            .into_iter()
            .map(|transport| {
                let args = args.clone();
                scope.spawn(move || -> Result<Outcome> {
                    let span = logging::peer_span(transport.rank().get());
                    let _enter = span.enter();
                    let mut task = ChecksumTask::new(args.src.clone(), args.dest.clone());
                    Driver::new(&transport)
                        .begin(&mut task)
                        .map_err(color_eyre::eyre::Report::new)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("peer thread panicked")).collect()
    });

    report(outcomes)
}

fn report(outcomes: Vec<Result<Outcome>>) -> Result<()> {
    let mut aborted = false;
    for outcome in outcomes {
        match outcome? {
            Outcome::Terminated => {}
            Outcome::Aborted => aborted = true,
        }
    }
    if aborted {
        println!("job aborted");
    } else {
        println!("job complete");
    }
    Ok(())
}
