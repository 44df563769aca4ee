use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::Result;

#[derive(Parser)]
#[command(
    name = "wayfarer",
    version,
    about = "Autonomous web app explorer that records structured test plans"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a web application and write a test plan
    Explore {
        /// Start URL; exploration never leaves its origin
        url: String,

        /// Stop after this many successful navigations
        #[arg(long)]
        max_navigations: Option<u32>,

        /// Absolute interaction budget for the run
        #[arg(long)]
        max_clicks: Option<u32>,

        /// Where to write the test plan JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,

        /// Consult the configured decision oracle when picking elements
        #[arg(long)]
        oracle: bool,

        /// Print the resulting plan as JSON on stdout, nothing else
        #[arg(long)]
        json: bool,

        /// Read configuration from this file instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List Chromium-family browsers found on this machine
    Browsers,

    /// Inspect or initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Explore {
                url,
                max_navigations,
                max_clicks,
                output,
                headed,
                oracle,
                json,
                config,
            } => {
                commands::explore::run(commands::explore::ExploreOptions {
                    url,
                    max_navigations,
                    max_clicks,
                    output,
                    headed,
                    oracle,
                    json,
                    config_path: config,
                })
                .await
            }
            Commands::Browsers => commands::browsers::run(),
            Commands::Config { action } => match action {
                ConfigAction::Show => commands::config::show(),
                ConfigAction::Path => commands::config::path(),
                ConfigAction::Init => commands::config::init(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_explore_with_overrides() {
        let cli = Cli::try_parse_from([
            "wayfarer",
            "explore",
            "https://example.com",
            "--max-navigations",
            "5",
            "--max-clicks",
            "30",
            "--headed",
            "-o",
            "plan.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Explore {
                url,
                max_navigations,
                max_clicks,
                headed,
                output,
                ..
            } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(max_navigations, Some(5));
                assert_eq!(max_clicks, Some(30));
                assert!(headed);
                assert_eq!(output.unwrap(), PathBuf::from("plan.json"));
            }
            _ => panic!("expected explore command"),
        }
    }

    #[test]
    fn explore_requires_a_url() {
        assert!(Cli::try_parse_from(["wayfarer", "explore"]).is_err());
    }

    #[test]
    fn config_subcommands_parse() {
        for action in ["show", "path", "init"] {
            assert!(Cli::try_parse_from(["wayfarer", "config", action]).is_ok());
        }
    }
}
