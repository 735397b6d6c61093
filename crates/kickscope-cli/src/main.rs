//! Kickscope CLI - submit football videos for performance analysis
//!
//! Usage:
//! ```bash
//! # Upload a local video and wait for the results
//! kickscope upload match.mp4
//!
//! # Analyze a YouTube video
//! kickscope youtube "https://www.youtube.com/watch?v=..."
//!
//! # Follow or inspect an analysis started earlier
//! kickscope watch <ANALYSIS_ID>
//! kickscope status <ANALYSIS_ID>
//! kickscope results <ANALYSIS_ID>
//!
//! # Point the client at another analysis service
//! kickscope config set-api-url http://localhost:5000/api/analysis
//! ```

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kickscope_core::{init_logging, LoggingOptions, SettingsManager, SettingsOverrides};

use commands::CommandContext;
use output::Output;

#[derive(Parser)]
#[command(
    name = "kickscope",
    version,
    about = "Football video performance analysis client",
    long_about = "Submits a match video (local file or YouTube URL) to the analysis service, \
                  follows the analysis and prints the performance metrics and suggestions."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Analysis service base URL (overrides KICKSCOPE_API_URL and the settings file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Delay between status checks in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Status checks before giving up
    #[arg(long, global = true)]
    max_polls: Option<u32>,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding settings.json
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a video file and wait for the analysis
    Upload {
        /// Video file to analyze
        file: PathBuf,
    },

    /// Submit a YouTube video and wait for the analysis
    Youtube {
        /// YouTube video URL
        url: String,
    },

    /// Show the current status of an analysis
    Status {
        /// Analysis identifier
        analysis_id: String,
    },

    /// Fetch and print the results of a completed analysis
    Results {
        /// Analysis identifier
        analysis_id: String,
    },

    /// Follow an analysis started earlier until it finishes
    Watch {
        /// Analysis identifier
        analysis_id: String,
    },

    /// Show or change client settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,

    /// Store the analysis service base URL
    SetApiUrl {
        /// Base URL, e.g. https://example.com/api/analysis
        url: String,
    },

    /// Delete the settings file and return to defaults
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&LoggingOptions {
        verbosity: cli.verbose,
        log_dir: cli.log_file.clone(),
    });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::alert(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match cli.settings_dir {
        Some(dir) => SettingsManager::new(dir),
        None => SettingsManager::for_platform()?,
    };

    let mut ctx = CommandContext {
        manager,
        overrides: SettingsOverrides {
            api_url: cli.api_url,
            poll_interval_ms: cli.interval_ms,
            max_polls: cli.max_polls,
        },
        output: Output::new(cli.json),
    };

    match cli.command {
        Command::Upload { file } => commands::upload(&mut ctx, file).await,
        Command::Youtube { url } => commands::youtube(&mut ctx, url).await,
        Command::Status { analysis_id } => commands::status(&mut ctx, analysis_id).await,
        Command::Results { analysis_id } => commands::results(&mut ctx, analysis_id).await,
        Command::Watch { analysis_id } => commands::watch(&mut ctx, analysis_id).await,
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&ctx),
            ConfigAction::SetApiUrl { url } => commands::config_set_api_url(&ctx, url),
            ConfigAction::Reset => commands::config_reset(&ctx),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kickscope",
            "youtube",
            "https://youtu.be/abc",
            "--api-url",
            "http://localhost:5000",
            "--interval-ms",
            "500",
            "-vv",
            "--json",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Youtube { ref url } if url == "https://youtu.be/abc"));
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(cli.interval_ms, Some(500));
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["kickscope", "config", "set-api-url", "http://x"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::SetApiUrl { .. }
            }
        ));
        assert!(Cli::try_parse_from(["kickscope", "upload"]).is_err());
    }
}
