use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_API_KEY, ENV_BACKEND_TIMEOUT_SECS, ENV_BACKEND_URL, ENV_CONFIG, ENV_DEEPSEEK_API_KEY,
    ENV_PAYLOAD,
};

#[derive(Parser)]
#[command(name = "agentmark")]
#[command(version, about = "Live dual-agent trace dashboard", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, short = 'b', global = true, env = ENV_BACKEND_URL)]
    pub backend_url: Option<String>,

    /// Backend request timeout in seconds
    #[arg(long, global = true, env = ENV_BACKEND_TIMEOUT_SECS)]
    pub timeout_secs: Option<u64>,

    /// Model API key forwarded to the backend
    #[arg(long, global = true, env = ENV_API_KEY, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Fallback API key
    #[arg(long, global = true, hide = true, env = ENV_DEEPSEEK_API_KEY, hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// Payload bitstring hidden in the primary track
    #[arg(long, global = true, env = ENV_PAYLOAD)]
    pub payload: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start a live session and auto-play it until both agents finish
    Run {
        /// Task for the agents
        #[arg(long, short = 'q')]
        query: String,

        /// Erasure rate in percent (0-100)
        #[arg(long, short = 'e')]
        erasure_rate: Option<u32>,

        /// Auto-play period in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Continue a saved conversation with a new user message
    Resume {
        /// Saved trajectory id
        trajectory_id: String,

        /// Message to append
        #[arg(long, short = 'p')]
        prompt: String,

        /// Erasure rate in percent (0-100)
        #[arg(long, short = 'e')]
        erasure_rate: Option<u32>,
    },
    /// Score both agents of a session
    Evaluate {
        /// Session or trajectory id
        session_id: String,

        /// Language of the judge's reason
        #[arg(long, short = 'l')]
        language: Option<String>,
    },
    /// Saved history commands
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum HistoryCommands {
    /// List saved trajectories
    List,
    /// Delete one or more saved trajectories
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete every saved trajectory. Requires confirmation.
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Pin or unpin a saved trajectory
    Pin { id: String },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
    pub payload: Option<String>,
    pub erasure_rate: Option<u32>,
    pub autoplay_interval_ms: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let (erasure_rate, autoplay_interval_ms) = match &cli.command {
        Some(Commands::Run {
            erasure_rate,
            interval_ms,
            ..
        }) => (*erasure_rate, *interval_ms),
        Some(Commands::Resume { erasure_rate, .. }) => (*erasure_rate, None),
        _ => (None, None),
    };
    let config = CliConfig {
        config: cli.config,
        backend_url: cli.backend_url,
        timeout_secs: cli.timeout_secs,
        api_key: cli.api_key.or(cli.deepseek_api_key),
        payload: cli.payload,
        erasure_rate,
        autoplay_interval_ms,
    };
    (config, cli.command)
}

/// Print top-level help when no command is given
pub fn print_help() {
    use clap::CommandFactory;
    let _ = Cli::command().print_help();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "agentmark",
            "--backend-url",
            "http://localhost:9000",
            "run",
            "--query",
            "weather in Paris",
            "-e",
            "40",
        ])
        .unwrap();
        assert_eq!(cli.backend_url.as_deref(), Some("http://localhost:9000"));
        match cli.command {
            Some(Commands::Run {
                query,
                erasure_rate,
                ..
            }) => {
                assert_eq!(query, "weather in Paris");
                assert_eq!(erasure_rate, Some(40));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_history_delete_many() {
        let cli = Cli::try_parse_from(["agentmark", "history", "delete", "a", "b"]).unwrap();
        match cli.command {
            Some(Commands::History {
                command: HistoryCommands::Delete { ids },
            }) => assert_eq!(ids, vec!["a", "b"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_history_delete_requires_id() {
        assert!(Cli::try_parse_from(["agentmark", "history", "delete"]).is_err());
    }
}
