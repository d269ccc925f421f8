use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terminjaeger::utils::shutdown;

mod commands;

#[derive(Parser)]
#[command(
    name = "terminjaeger",
    version,
    about = "Finds and books vaccination appointments across several centres",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search until an appointment is booked
    Search {
        /// Profile with codes, target zones, contact and time window
        #[arg(short, long, default_value = "profile.json")]
        profile: PathBuf,

        /// Seconds between two search requests
        #[arg(long)]
        poll_delay: Option<u64>,
    },

    /// List the vaccination centres known to the catalog
    Zones {
        /// Only show zones served by this host
        #[arg(long)]
        host: Option<String>,
    },

    /// Request a new access code via SMS PIN
    Code {
        /// PLZ of the centre the code is requested for
        #[arg(long)]
        plz: String,

        /// Email address the code is sent to
        #[arg(long)]
        email: String,

        /// Mobile number in +49 format
        #[arg(long)]
        phone: String,

        /// Birthday as dd.mm.yyyy
        #[arg(long)]
        birthday: String,
    },

    /// Check a profile without touching the network
    Validate {
        #[arg(short, long, default_value = "profile.json")]
        profile: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let (handle, signal) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            handle.shutdown();
        }
    });

    match cli.command {
        Commands::Search {
            profile,
            poll_delay,
        } => {
            tracing::info!(
                profile = %profile.display(),
                poll_delay = ?poll_delay,
                "Starting search command"
            );
            let config = commands::load_config(cli.config.as_deref())?;
            commands::search(config, &profile, poll_delay, signal).await?;
        }

        Commands::Zones { host } => {
            tracing::info!(host = ?host, "Starting zones command");
            let config = commands::load_config(cli.config.as_deref())?;
            commands::zones(config, host).await?;
        }

        Commands::Code {
            plz,
            email,
            phone,
            birthday,
        } => {
            tracing::info!(plz = %plz, "Starting code command");
            let config = commands::load_config(cli.config.as_deref())?;
            commands::code(config, plz, email, phone, birthday, signal).await?;
        }

        Commands::Validate { profile } => {
            commands::validate(&profile)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("terminjaeger=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new("terminjaeger=info,warn")
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
