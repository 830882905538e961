mod cli;
mod core;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ai-usage-tracker",
    about = "Collect Cursor and Claude Code usage and forward it to a dashboard",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect on an interval until interrupted (default)
    Monitor {
        /// Send results to the dashboard instead of only displaying them
        #[arg(long)]
        live: bool,
    },
    /// Run a single collection cycle
    Once {
        /// Send results to the dashboard instead of only displaying them
        #[arg(long)]
        live: bool,
    },
    /// Show Claude Code usage month by month
    Monthly,
    /// Write the upload payloads to JSON files instead of sending them
    Export {
        /// Output directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Save the dashboard API token
    Configure {
        /// API token from the dashboard
        token: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file and local data sources
    Check,
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "ai_usage_tracker=debug"
    } else {
        "ai_usage_tracker=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let color_setting = crate::core::config::AppConfig::load()
        .map(|c| c.settings.color)
        .unwrap_or_else(|_| "auto".to_string());
    let output_opts = cli::output::OutputOptions {
        format: if cli.json {
            cli::output::OutputFormat::Json
        } else {
            match cli.format.as_deref() {
                Some("json") => cli::output::OutputFormat::Json,
                _ => cli::output::OutputFormat::Text,
            }
        },
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color, &color_setting),
        verbose: cli.verbose,
    };

    match cli.command {
        None => cli::usage_cmd::monitor(false, &output_opts).await?,
        Some(Commands::Monitor { live }) => cli::usage_cmd::monitor(live, &output_opts).await?,
        Some(Commands::Once { live }) => cli::usage_cmd::once(live, &output_opts).await?,
        Some(Commands::Monthly) => cli::usage_cmd::monthly(&output_opts).await?,
        Some(Commands::Export { dir }) => cli::export_cmd::run(dir, &output_opts).await?,
        Some(Commands::Configure { token }) => cli::config_cmd::configure(&token, &output_opts)?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
        },
    }

    Ok(())
}
