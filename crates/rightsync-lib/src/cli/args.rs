use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub enum Command {
    Download {
        manifest_path: String,
        config_path: Option<String>,
        output_dir: Option<String>,
        max_in_flight: Option<usize>,
        max_attempts: Option<usize>,
        backoff_base_ms: Option<u64>,
        request_timeout_secs: Option<u64>,
    },
    Verify {
        manifest_path: String,
        config_path: Option<String>,
        output_dir: Option<String>,
    },
}

pub struct Args {
    pub command: Command,
    pub log_level: Level,
}

#[derive(Debug, Parser)]
#[command(
    name = "rightsync",
    version,
    about = "Synchronize ServerTemplate and RightScript attachments with local files"
)]
struct Cli {
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Sets the level of verbosity",
        action = ArgAction::Count,
        global = true
    )]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Download every attachment listed in a manifest
    Download {
        #[arg(
            short = 'm',
            long = "manifest",
            value_name = "FILE",
            help = "Sets the attachment manifest path",
            default_value = "attachments.json"
        )]
        manifest: String,

        #[arg(
            short = 'c',
            long = "config",
            value_name = "FILE",
            help = "Optional config file with download settings and output path"
        )]
        config: Option<String>,

        #[arg(
            short = 'o',
            long = "output-dir",
            value_name = "DIR",
            help = "Directory relative attachment locations are resolved against"
        )]
        output_dir: Option<String>,

        #[arg(
            long = "max-in-flight",
            value_name = "N",
            help = "Maximum number of simultaneous downloads [default: 4]"
        )]
        max_in_flight: Option<usize>,

        #[arg(
            long = "max-attempts",
            value_name = "N",
            help = "Maximum attempts per attachment [default: 10]"
        )]
        max_attempts: Option<usize>,

        #[arg(
            long = "backoff-base-ms",
            value_name = "MS",
            help = "Delay before the first retry, doubled on each further retry [default: 500]"
        )]
        backoff_base_ms: Option<u64>,

        #[arg(
            long = "request-timeout-secs",
            value_name = "SECS",
            help = "Per-request timeout, 0 disables it [default: 300]"
        )]
        request_timeout_secs: Option<u64>,
    },

    /// Check local attachments against a manifest without downloading
    Verify {
        #[arg(
            short = 'm',
            long = "manifest",
            value_name = "FILE",
            help = "Sets the attachment manifest path",
            default_value = "attachments.json"
        )]
        manifest: String,

        #[arg(
            short = 'c',
            long = "config",
            value_name = "FILE",
            help = "Optional config file for output path fallback"
        )]
        config: Option<String>,

        #[arg(
            short = 'o',
            long = "output-dir",
            value_name = "DIR",
            help = "Directory relative attachment locations are resolved against"
        )]
        output_dir: Option<String>,
    },
}

pub fn parse_args() -> Args {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    Args {
        command: cli.command.into(),
        log_level,
    }
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Download {
                manifest,
                config,
                output_dir,
                max_in_flight,
                max_attempts,
                backoff_base_ms,
                request_timeout_secs,
            } => Command::Download {
                manifest_path: manifest,
                config_path: config,
                output_dir,
                max_in_flight,
                max_attempts,
                backoff_base_ms,
                request_timeout_secs,
            },
            CliCommand::Verify {
                manifest,
                config,
                output_dir,
            } => Command::Verify {
                manifest_path: manifest,
                config_path: config,
                output_dir,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command.into()
    }

    #[test]
    fn test_download_defaults() {
        let Command::Download {
            manifest_path,
            config_path,
            max_in_flight,
            ..
        } = parse(&["rightsync", "download"])
        else {
            panic!("expected download command");
        };
        assert_eq!(manifest_path, "attachments.json");
        assert_eq!(config_path, None);
        assert_eq!(max_in_flight, None);
    }

    #[test]
    fn test_download_overrides() {
        let Command::Download {
            output_dir,
            max_attempts,
            backoff_base_ms,
            ..
        } = parse(&[
            "rightsync",
            "-vv",
            "download",
            "-o",
            "out",
            "--max-attempts",
            "3",
            "--backoff-base-ms",
            "10",
        ])
        else {
            panic!("expected download command");
        };
        assert_eq!(output_dir.as_deref(), Some("out"));
        assert_eq!(max_attempts, Some(3));
        assert_eq!(backoff_base_ms, Some(10));
    }

    #[test]
    fn test_verify_command() {
        let command = parse(&["rightsync", "verify", "-m", "st.json"]);
        assert!(matches!(
            command,
            Command::Verify { ref manifest_path, .. } if manifest_path == "st.json"
        ));
    }
}
