//! Runtime configuration, read from the environment.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::error::ConfigError;

/// Everything the job runtime needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct Config {
    /// Parent directory for per-job workspaces and cookie jars.
    pub downloads_dir: PathBuf,

    /// Directory for status snapshots and job transcripts.
    pub status_dir: PathBuf,

    /// Limiter capacity: at most this many jobs run or upload at once.
    pub max_concurrent_jobs: usize,

    /// External tool command; the first word is the program, the rest are
    /// leading arguments.
    pub tool_command: Vec<String>,

    /// Output filename template passed to the tool.
    pub output_template: String,

    /// Base URL creator targets are resolved against.
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            downloads_dir: PathBuf::from("downloads"),
            status_dir: PathBuf::from("status"),
            max_concurrent_jobs: 3,
            tool_command: vec!["kemono-dl".to_string()],
            output_template: "[{published}] [{title}]--{filename}".to_string(),
            base_url: "https://kemono.cr".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset. Reads a `.env` file when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let defaults = Config::default();

        let max_concurrent_jobs = match env::var("MAX_CONCURRENT_JOBS") {
            Ok(raw) => parse_capacity(&raw)?,
            Err(_) => defaults.max_concurrent_jobs,
        };

        let tool_command = match env::var("DOWNLOAD_TOOL") {
            Ok(raw) => {
                let command = split_command(&raw);
                if command.is_empty() {
                    return Err(ConfigError {
                        key: "DOWNLOAD_TOOL".to_string(),
                        value: raw,
                        reason: "expected at least a program name".to_string(),
                    });
                }
                command
            }
            Err(_) => defaults.tool_command,
        };

        Ok(Config {
            downloads_dir: env::var("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            status_dir: env::var("STATUS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.status_dir),
            max_concurrent_jobs,
            tool_command,
            output_template: env::var("OUTPUT_TEMPLATE").unwrap_or(defaults.output_template),
            base_url: env::var("BASE_URL").unwrap_or(defaults.base_url),
        })
    }
}

/// Splits a command string on whitespace, e.g. `"python3 -m kemono_dl"`.
fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Parses the limiter capacity. Zero is rejected; a zero-capacity
/// limiter never admits a job.
fn parse_capacity(raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError {
            key: "MAX_CONCURRENT_JOBS".to_string(),
            value: raw.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.tool_command, vec!["kemono-dl"]);
        assert!(config.base_url.starts_with("https://"));
    }

    #[test]
    fn command_splitting_handles_module_invocations() {
        assert_eq!(
            split_command("python3 -m kemono_dl"),
            vec!["python3", "-m", "kemono_dl"]
        );
        assert_eq!(split_command("  gallery-dl  "), vec!["gallery-dl"]);
        assert!(split_command("").is_empty());
    }

    #[test]
    fn capacity_rejects_zero_and_non_numbers() {
        let err = parse_capacity("0").unwrap_err();
        assert_eq!(err.key, "MAX_CONCURRENT_JOBS");
        assert_eq!(err.reason, "expected a positive integer");

        assert!(parse_capacity("many").is_err());
        assert!(parse_capacity("-2").is_err());
        assert_eq!(parse_capacity("8").unwrap(), 8);
    }
}
