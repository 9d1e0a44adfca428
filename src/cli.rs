//! Command-line interface for game_of_death.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Game of Death - two-team Game of Life orchestrator
#[derive(Parser, Debug)]
#[command(name = "game_of_death")]
#[command(about = "Runs the phase loop and query server for a ledger-backed Game of Life battle", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the tick driver and the HTTP/WebSocket server
    Serve {
        /// Path to the TOML config file
        #[arg(short, long, default_value = "game_of_death.toml")]
        config: PathBuf,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect finished games
    Records {
        /// Path to the TOML config file
        #[arg(short, long, default_value = "game_of_death.toml")]
        config: PathBuf,

        /// What to show
        #[command(subcommand)]
        action: RecordsAction,
    },
}

/// Record inspection commands
#[derive(Subcommand, Debug)]
pub enum RecordsAction {
    /// List records, most recent first
    List {
        /// Only games this account took part in
        #[arg(long)]
        participant: Option<String>,
    },

    /// Show one record
    Show {
        /// Game id
        id: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides_parse() {
        let cli = Cli::try_parse_from(["game_of_death", "serve", "--port", "4000"])
            .expect("parse");
        match cli.command {
            Command::Serve { port, host, config } => {
                assert_eq!(port, Some(4000));
                assert!(host.is_none());
                assert_eq!(config, PathBuf::from("game_of_death.toml"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_records_show_parses_id() {
        let cli = Cli::try_parse_from(["game_of_death", "records", "show", "7"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Records {
                action: RecordsAction::Show { id: 7 },
                ..
            }
        ));
    }
}
