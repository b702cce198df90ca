// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Medspa - conversation pipeline for a med-spa AI receptionist.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use medspa::{serve, telemetry};

/// Medspa - conversation pipeline for a med-spa AI receptionist.
#[derive(Parser, Debug)]
#[command(name = "medspa", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run workers, outbox delivery and messaging loops in one process.
    Serve,
    /// Run workers and outbox delivery against a shared queue.
    Worker,
    /// Run the SMS retry sender and hosted-number poller.
    Messaging,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate configuration, printing any diagnostics.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match medspa_config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            medspa_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    if let Commands::Config {
        action: ConfigCommands::Check,
    } = cli.command
    {
        println!(
            "medspa: configuration ok (queue={:?}, jobs={:?}, workers={})",
            config.queue.backend, config.jobs.backend, config.worker.count
        );
        return;
    }

    telemetry::init_tracing(&config.observability.log_level);
    if let Err(e) = telemetry::init_metrics(&config.observability) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Worker => serve::run_worker(config).await,
        Commands::Messaging => serve::run_messaging(config).await,
        Commands::Config { .. } => Ok(()),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "medspa exited with an error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
