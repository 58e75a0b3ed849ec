use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agent-pricing", version, about = "Pricing service for agent runs")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the pricing HTTP server (default)
    Serve,

    /// Calculate the cost of a run
    Cost(CostArgs),

    /// Re-fetch pricing from upstream providers
    Refresh {
        /// Refresh a single canonical model (e.g. anthropic/claude-3-opus)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List stored model pricing
    Models,

    /// Show pricing cache status
    Status,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct CostArgs {
    /// Runner-supplied model name
    #[arg(short, long)]
    pub model: String,

    /// Runner type (e.g. codex, claude-code)
    #[arg(short, long, default_value = "")]
    pub runner_type: String,

    #[arg(long, default_value_t = 0)]
    pub input: i64,

    #[arg(long, default_value_t = 0)]
    pub output: i64,

    #[arg(long, default_value_t = 0)]
    pub cache_read: i64,

    #[arg(long, default_value_t = 0)]
    pub cache_creation: i64,

    #[arg(long, default_value_t = 0)]
    pub web_search: i64,

    #[arg(long, default_value_t = 0)]
    pub server_tool_use: i64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with secrets masked)
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_cost() {
        let args = vec![
            "agent-pricing",
            "cost",
            "--model",
            "claude-3-opus",
            "--runner-type",
            "claude-code",
            "--input",
            "1000",
            "--cache-read",
            "2000",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Cost(args) => {
                assert_eq!(args.model, "claude-3-opus");
                assert_eq!(args.runner_type, "claude-code");
                assert_eq!(args.input, 1000);
                assert_eq!(args.cache_read, 2000);
                assert_eq!(args.output, 0);
            }
            _ => panic!("Expected Cost command"),
        }
    }

    #[test]
    fn test_cli_parsing_refresh_model() {
        let args = vec!["agent-pricing", "refresh", "--model", "openai/gpt-4o"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Refresh { model } => {
                assert_eq!(model.as_deref(), Some("openai/gpt-4o"));
            }
            _ => panic!("Expected Refresh command"),
        }
    }

    #[test]
    fn test_cli_parsing_global_config() {
        let args = vec!["agent-pricing", "config", "show", "--config", "/etc/pricing.toml"];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/pricing.toml"));
        match cli.get_command() {
            Commands::Config { action } => {
                assert!(matches!(action, ConfigCommands::Show));
            }
            _ => panic!("Expected Config command"),
        }
    }
}
