use crate::cli::args::Command;
use crate::cli::params::{DownloadParams, VerifyParams};
use crate::config::{Config, load_config};
use crate::error::RightSyncError;
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ResolvedCommand {
    Download(DownloadParams),
    Verify(VerifyParams),
}

fn load_optional_config(config_path: Option<&str>) -> Result<Config, RightSyncError> {
    match config_path {
        Some(config_path) => load_config(config_path),
        None => Ok(Config::default()),
    }
}

/// Flag first, then `output.path` from the config, then the manifest's own directory.
fn resolve_output_dir(
    output_dir: Option<String>,
    app_config: &Config,
    manifest_path: &Path,
) -> PathBuf {
    output_dir
        .map(PathBuf::from)
        .or_else(|| app_config.output.path.clone())
        .unwrap_or_else(|| match manifest_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
}

pub fn resolve_command(command: Command) -> Result<ResolvedCommand, RightSyncError> {
    match command {
        Command::Download {
            manifest_path,
            config_path,
            output_dir,
            max_in_flight,
            max_attempts,
            backoff_base_ms,
            request_timeout_secs,
        } => {
            let app_config = load_optional_config(config_path.as_deref())?;

            let mut options = app_config.download.to_options();
            if let Some(max_in_flight) = max_in_flight {
                options.max_in_flight = max_in_flight;
            }
            if let Some(max_attempts) = max_attempts {
                options.max_attempts = max_attempts;
            }
            if let Some(backoff_base_ms) = backoff_base_ms {
                options.backoff_base = Duration::from_millis(backoff_base_ms);
            }
            if let Some(request_timeout_secs) = request_timeout_secs {
                options.request_timeout =
                    (request_timeout_secs > 0).then(|| Duration::from_secs(request_timeout_secs));
            }

            for (name, value) in [
                ("max-in-flight", options.max_in_flight),
                ("max-attempts", options.max_attempts),
            ] {
                if value == 0 {
                    return Err(RightSyncError::CliArgumentValidation {
                        details: format!("{name} must be greater than 0."),
                    });
                }
            }

            let manifest_path = Path::new(&manifest_path);
            let manifest = Manifest::load_from_file(manifest_path)?;

            Ok(ResolvedCommand::Download(DownloadParams {
                manifest,
                output_dir: resolve_output_dir(output_dir, &app_config, manifest_path),
                options,
            }))
        }
        Command::Verify {
            manifest_path,
            config_path,
            output_dir,
        } => {
            let app_config = load_optional_config(config_path.as_deref())?;
            let manifest_path = Path::new(&manifest_path);
            let manifest = Manifest::load_from_file(manifest_path)?;

            Ok(ResolvedCommand::Verify(VerifyParams {
                manifest,
                output_dir: resolve_output_dir(output_dir, &app_config, manifest_path),
            }))
        }
    }
}
