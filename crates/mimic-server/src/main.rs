use clap::{Args, Parser, Subcommand};
use mimic_server::config::{Config, Overrides};
use mimic_server::record::{session::parse_status_list, start_recording_server, RecordOptions};
use mimic_server::replay::{start_replay_server, ReplayOptions};
use mimic_server::server::MockServer;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mimic",
    version,
    about = "Generate a working HTTP mock server from an OpenAPI spec"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a mock server from an OpenAPI spec
    Start(StartArgs),
    /// Record live traffic through a pass-through proxy
    Record(RecordArgs),
    /// Replay a recorded session
    Replay(ReplayArgs),
    /// Generate a spec from a recording (not yet implemented)
    GenerateSpec,
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Path to the OpenAPI spec (YAML or JSON)
    #[arg(short, long)]
    spec: Option<PathBuf>,

    /// Port to run the server on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind the server to
    #[arg(long)]
    host: Option<String>,

    /// Path to a config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Watch the spec file for changes
    #[arg(long, overrides_with = "no_watch")]
    watch: bool,

    /// Disable watching
    #[arg(long)]
    no_watch: bool,

    /// Enable stateful mode
    #[arg(long, overrides_with = "stateless")]
    stateful: bool,

    /// Disable stateful mode
    #[arg(long)]
    stateless: bool,

    /// Seed for deterministic data generation
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Upstream base URL to proxy to
    #[arg(short, long)]
    target: String,

    /// Session file (.json) or output directory
    #[arg(short, long, default_value = "recordings")]
    output: PathBuf,

    /// Port to run the proxy on
    #[arg(short, long, default_value = "3002")]
    port: u16,

    /// Host to bind the proxy to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Only record paths matching this substring or /regex/
    #[arg(long)]
    include: Option<String>,

    /// Only record these response statuses (comma-separated)
    #[arg(long)]
    status_filter: Option<String>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Path to a recorded session file
    #[arg(short, long)]
    recording: PathBuf,

    /// Port to run the replay server on
    #[arg(short, long, default_value = "3003")]
    port: u16,

    /// Host to bind the replay server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Wrap around to the first entry after the last
    #[arg(long = "loop")]
    loop_replay: bool,

    /// Play back each entry's recorded latency
    #[arg(long)]
    latency: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), anyhow::Error> {
    match command {
        Command::Start(args) => {
            let overrides = Overrides {
                spec: args.spec,
                host: args.host,
                port: args.port,
                watch: flag_pair(args.watch, args.no_watch),
                stateful: flag_pair(args.stateful, args.stateless),
                seed: args.seed,
            };
            let config = Config::load(args.config.as_deref(), &overrides)?;
            MockServer::new(config)?.bind().await?.serve().await
        }
        Command::Record(args) => {
            let options = RecordOptions {
                target: args.target,
                output: args.output,
                host: args.host,
                port: args.port,
                include: args.include,
                status_filter: args.status_filter.as_deref().and_then(parse_status_list),
            };
            start_recording_server(options).await?.wait().await
        }
        Command::Replay(args) => {
            let options = ReplayOptions {
                recording: args.recording,
                host: args.host,
                port: args.port,
                loop_replay: args.loop_replay,
                use_latency: args.latency,
            };
            start_replay_server(options).await?.wait().await
        }
        Command::GenerateSpec => {
            anyhow::bail!("generate-spec is not implemented yet")
        }
    }
}

/// `--flag` / `--no-flag` pair to an optional override.
fn flag_pair(enable: bool, disable: bool) -> Option<bool> {
    if enable {
        Some(true)
    } else if disable {
        Some(false)
    } else {
        None
    }
}
