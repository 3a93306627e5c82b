use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Drive the SSTDMS offline engine from the command line.
///
/// Cache partitions and the outbox persist under `--cache-dir`, so each
/// invocation picks up where the previous one left off.
#[derive(Parser, Debug)]
#[command(name = "sstdms-sw", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format for all subcommands.
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Worker configuration file. Defaults to `sstdms-sw.toml` when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding cache partitions and the outbox.
    #[arg(long, default_value = "target/sstdms-cache", global = true)]
    pub cache_dir: PathBuf,

    /// Log engine decisions to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Precache the static manifest into the current static partition.
    Install,

    /// Delete superseded partitions and take control.
    Activate,

    /// Send one request through the worker.
    Fetch(FetchArgs),

    /// List partitions and their entry counts.
    Caches,

    /// Print the version label the worker reports.
    Version,

    /// Queue a write for background sync.
    Enqueue(EnqueueArgs),

    /// Replay the outbox.
    Sync(SyncArgs),

    /// Build the notification for a push payload.
    Push(PushArgs),
}

// ── fetch ────────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// Request method.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// `Accept` header; pass `text/html` to fetch as a page navigation.
    #[arg(long)]
    pub accept: Option<String>,

    /// Answer as if the network were down.
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}

// ── enqueue ──────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct EnqueueArgs {
    /// Absolute URL, or a path resolved against the configured origin.
    #[arg(long)]
    pub url: String,

    /// Request method.
    #[arg(long, default_value = "POST")]
    pub method: String,

    /// JSON request body.
    #[arg(long)]
    pub body: Option<String>,
}

// ── sync ─────────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Sync tag; only the configured tag replays the outbox.
    #[arg(long)]
    pub tag: Option<String>,
}

// ── push ─────────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct PushArgs {
    /// Push payload as JSON text.
    #[arg(long)]
    pub payload: Option<String>,
}
