use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use nsudc_pwa::PwaError;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use nsudc_ctl::cli::{
    AnnouncementsCommand, CacheCommand, Cli, Command, DraftCommand, MotionCommand, QueueCommand,
};
use nsudc_ctl::commands::{self, Context};
use nsudc_ctl::http::ReqwestClient;
use nsudc_ctl::{output, store};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(value) => {
            let _ = output::emit(cli.output, &value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            output::emit_error(cli.output, exit_code_to_u8(&code), &e.to_string());
            code
        }
    }
}

fn run(cli: &Cli) -> Result<Value, PwaError> {
    let config = store::load_config(cli.config.as_deref())?;
    let client = || ReqwestClient::new(&config.origin, Duration::from_secs(config.submit.timeout_secs));
    let ctx = Context::new(config.clone(), &cli.data_dir);

    match &cli.command {
        Command::Draft(DraftCommand::Show) => commands::draft_show(&ctx),
        Command::Draft(DraftCommand::Clear) => commands::draft_clear(&ctx),
        Command::Queue(QueueCommand::List) => commands::queue_list(&ctx),
        Command::Queue(QueueCommand::Flush) => commands::queue_flush(&ctx, client()?),
        Command::Cache(CacheCommand::Install) => commands::cache_install(&ctx, client()?),
        Command::Cache(CacheCommand::Activate) => commands::cache_activate(&ctx, client()?),
        Command::Cache(CacheCommand::List) => commands::cache_list(&ctx),
        Command::Motion(MotionCommand::Generate(args)) => commands::motion_generate(
            &ctx,
            client()?,
            &args.topic,
            &args.format,
            args.motions.as_deref(),
            seed(),
        ),
        Command::Announcements(AnnouncementsCommand::Check(args)) => {
            commands::announcements_check(&ctx, &args.file)
        }
    }
}

/// Log to stderr; library `log` records are bridged into the subscriber.
fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new(cli.log_directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_directive()))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Selection seed for the static motion fallback.
fn seed() -> u64 {
    chrono::Utc::now().timestamp_subsec_nanos() as u64
}

fn exit_code_to_u8(code: &ExitCode) -> u8 {
    // ExitCode does not expose its value.
    if *code == ExitCode::from(2) {
        2
    } else {
        1
    }
}
