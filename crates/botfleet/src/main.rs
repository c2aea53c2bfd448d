// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Botfleet - an operator for a fleet of Telegram bots.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Botfleet - an operator for a fleet of Telegram bots.
#[derive(Parser, Debug)]
#[command(name = "botfleet", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of ./botfleet.toml.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the lifecycle monitor and dispatcher until interrupted.
    Serve,
    /// Manage registered bots.
    Bots {
        #[command(subcommand)]
        action: commands::BotsAction,
    },
    /// Queue a text message for delivery.
    Send {
        /// Bot to send from.
        bot: String,
        /// Chat id, or @username of a public channel.
        chat: String,
        /// Message text.
        text: String,
    },
    /// Show a queued job.
    Job {
        id: i64,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match botfleet_config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            botfleet_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Bots { action }) => commands::run_bots(&config, action).await,
        Some(Commands::Send { bot, chat, text }) => {
            commands::run_send(&config, bot, chat, text).await
        }
        Some(Commands::Job { id }) => commands::run_job(&config, id).await,
        Some(Commands::Config) => commands::run_config(&config),
        None => {
            println!("botfleet: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
