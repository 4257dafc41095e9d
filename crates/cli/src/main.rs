mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// meter2car - Charge your car with surplus solar power
#[derive(Parser)]
#[command(name = "meter2car")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the configuration file (default: ~/.config/meter2car/meter2car.toml)
  #[arg(short, long, global = true, env = "METER2CAR_CONFIG")]
  config: Option<PathBuf>,

  /// Base URL of the go-e charger, overriding the configuration
  #[arg(long, global = true)]
  url: Option<String>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the surplus charging control loop
  Run,

  /// Show the charger status
  Status,

  /// Take a reading from the smart meter
  Meter {
    /// Replay frames from a capture file instead of the serial port
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Number of readings to take
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,
  },

  /// Allow or forbid charging
  Charge {
    #[arg(value_enum)]
    state: cmd::ChargeState,
  },

  /// Set the charging current in A
  Ampere {
    ampere: u8,
  },

  /// Print the effective configuration
  Config,
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = dispatch(cli).await {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

async fn dispatch(cli: Cli) -> Result<()> {
  let options = cmd::GlobalOptions {
    config: cli.config,
    url: cli.url,
    output: cli.output,
  };

  match cli.command {
    Commands::Run => cmd::cmd_run(&options).await,
    Commands::Status => cmd::cmd_status(&options).await,
    Commands::Meter { replay, count } => cmd::cmd_meter(&options, replay.as_deref(), count),
    Commands::Charge { state } => cmd::cmd_charge(&options, state).await,
    Commands::Ampere { ampere } => cmd::cmd_ampere(&options, ampere).await,
    Commands::Config => cmd::cmd_config(&options),
  }
}
