//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

/// Prism - Transparency in Coverage MRF ETL
#[derive(Parser, Debug)]
#[command(name = "prism", version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "prism.yaml", env = "PRISM_CONFIG")]
    pub config: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, env = "PRISM_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ETL pipelines for every configured payer
    Run(commands::run::RunArgs),

    /// Check the configuration file and print a summary
    ValidateConfig(commands::validate::ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let cli = Cli::parse_from(["prism", "run"]);
        assert_eq!(cli.config, "prism.yaml");
        assert!(cli.log_level.is_none());
        assert!(matches!(cli.command, Commands::Run(_)));

        let cli = Cli::parse_from([
            "prism",
            "--config",
            "staging.yaml",
            "--log-level",
            "debug",
            "validate-config",
        ]);
        assert_eq!(cli.config, "staging.yaml");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }
}
