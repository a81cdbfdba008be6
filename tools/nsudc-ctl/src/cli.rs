use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Drive the NSUDC offline pipeline from a terminal.
#[derive(Parser, Debug)]
#[command(name = "nsudc-ctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the storage file and cache snapshot.
    #[arg(long, default_value = ".nsudc", global = true)]
    pub data_dir: PathBuf,

    /// Site configuration (TOML). Defaults apply when absent.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for all subcommands.
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Default log filter: `debug` with `--verbose`, else `warn`. `RUST_LOG`
    /// overrides it unless `--verbose` is given.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or discard the saved registration draft.
    #[command(subcommand)]
    Draft(DraftCommand),

    /// Inspect or replay queued submissions.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Populate, migrate or list the offline caches.
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Generate a debate motion.
    #[command(subcommand)]
    Motion(MotionCommand),

    /// Check the announcements feed for something new.
    #[command(subcommand)]
    Announcements(AnnouncementsCommand),
}

#[derive(Subcommand, Debug)]
pub enum DraftCommand {
    /// Print the saved draft.
    Show,
    /// Delete the saved draft.
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// List queued submissions, oldest first.
    List,
    /// Re-send every queued submission.
    Flush,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Fetch the static manifest into the static cache.
    Install,
    /// Delete caches from older versions.
    Activate,
    /// List caches and their entries.
    List,
}

#[derive(Subcommand, Debug)]
pub enum MotionCommand {
    /// Ask the motion service, falling back to a static list.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Debate topic, e.g. "Technology".
    #[arg(long)]
    pub topic: String,

    /// Debate format (BP, Asian, WUDC, ...).
    #[arg(long, default_value = "BP")]
    pub format: String,

    /// Static motions (JSON array) used when the service is unavailable.
    #[arg(long)]
    pub motions: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum AnnouncementsCommand {
    /// Compare the feed's newest announcement with the last one seen.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to announcements.json.
    #[arg(long)]
    pub file: PathBuf,
}
