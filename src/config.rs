use crate::checkpoint::DEFAULT_BATCH_LIMIT;
use crate::error::{SessionError, SessionResult};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:5000";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_bind_address: SocketAddr,
    /// Row limit applied to every batch request
    pub batch_limit: usize,
    /// Base for empty or relative `root_directory` values in requests
    pub default_root: Option<PathBuf>,
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind_address: default_bind(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            default_root: None,
            graceful_shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            batch_limit: cli_batch_limit,
            default_root: cli_default_root,
            shutdown_timeout_secs: cli_shutdown_timeout,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            batch_limit: file_batch_limit,
            default_root: file_default_root,
            shutdown_timeout_secs: file_shutdown_timeout,
        } = file_config;

        Ok(Self {
            http_bind_address: cli_http_bind.or(file_http_bind).unwrap_or_else(default_bind),
            batch_limit: cli_batch_limit
                .or(file_batch_limit)
                .unwrap_or(DEFAULT_BATCH_LIMIT),
            default_root: cli_default_root.or(file_default_root),
            graceful_shutdown_timeout_secs: cli_shutdown_timeout
                .or(file_shutdown_timeout)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        })
    }

    /// Fail fast on settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_limit > 0, "batch limit must be greater than zero");
        anyhow::ensure!(
            self.graceful_shutdown_timeout_secs > 0,
            "shutdown timeout must be greater than zero"
        );
        if let Some(root) = self.default_root.as_ref() {
            anyhow::ensure!(
                !root.exists() || root.is_dir(),
                "default root {:?} is not a directory",
                root
            );
        }
        Ok(())
    }

    /// Resolve a request's storage root against the configured default.
    ///
    /// Absolute roots are used as given. Relative roots are joined onto the
    /// default root and may not climb out of it.
    pub fn resolve_root(&self, requested: &str) -> SessionResult<PathBuf> {
        let requested = requested.trim();
        match (&self.default_root, requested.is_empty()) {
            (Some(base), true) => Ok(base.clone()),
            (None, true) => Err(root_error(
                "root_directory is empty and no default root is configured",
            )),
            (Some(base), false) if Path::new(requested).is_relative() => {
                if Path::new(requested)
                    .components()
                    .any(|part| matches!(part, Component::ParentDir))
                {
                    return Err(root_error(format!(
                        "relative root_directory {requested:?} escapes the default root"
                    )));
                }
                Ok(base.join(requested))
            }
            _ => Ok(PathBuf::from(requested)),
        }
    }
}

fn root_error(message: impl Into<String>) -> SessionError {
    SessionError::Config {
        document: "request",
        message: message.into(),
    }
}

fn default_bind() -> SocketAddr {
    DEFAULT_HTTP_BIND
        .parse()
        .expect("default bind address valid")
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "expectation-server",
    about = "HTTP service running expectation suites against filesystem data contexts",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML, JSON or TOML)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "EXPECTATION_SERVER_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "EXPECTATION_SERVER_BATCH_LIMIT",
        value_name = "ROWS",
        help = "Row limit applied to every batch request",
        value_parser = clap::value_parser!(usize)
    )]
    pub batch_limit: Option<usize>,

    #[arg(
        long,
        env = "EXPECTATION_SERVER_DEFAULT_ROOT",
        value_name = "DIR",
        help = "Storage root used for empty or relative request roots"
    )]
    pub default_root: Option<PathBuf>,

    #[arg(
        long,
        env = "EXPECTATION_SERVER_SHUTDOWN_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Seconds to wait for in-flight requests on shutdown"
    )]
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    batch_limit: Option<usize>,
    default_root: Option<PathBuf>,
    shutdown_timeout_secs: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        "toml" => toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_port_5000() {
        let config = ServerConfig::from_args(CliArgs::default()).unwrap();
        assert_eq!(config.http_bind_address.port(), 5000);
        assert_eq!(config.batch_limit, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        fs::write(&path, "batch_limit: 50\nhttp_bind: 127.0.0.1:7000\n").unwrap();

        let config = ServerConfig::from_args(CliArgs {
            config: Some(path),
            batch_limit: Some(10),
            ..CliArgs::default()
        })
        .unwrap();
        assert_eq!(config.batch_limit, 10);
        assert_eq!(config.http_bind_address.port(), 7000);
    }

    #[test]
    fn toml_files_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "shutdown_timeout_secs = 5\n").unwrap();

        let config = ServerConfig::from_args(CliArgs {
            config: Some(path),
            ..CliArgs::default()
        })
        .unwrap();
        assert_eq!(config.graceful_shutdown_timeout_secs, 5);
    }

    #[test]
    fn zero_batch_limit_fails_validation() {
        let config = ServerConfig {
            batch_limit: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_root_uses_default_for_empty_and_relative() {
        let config = ServerConfig {
            default_root: Some(PathBuf::from("/srv/gx")),
            ..ServerConfig::default()
        };
        assert_eq!(config.resolve_root("").unwrap(), PathBuf::from("/srv/gx"));
        assert_eq!(
            config.resolve_root("team-a").unwrap(),
            PathBuf::from("/srv/gx/team-a")
        );
        assert_eq!(config.resolve_root("/abs").unwrap(), PathBuf::from("/abs"));
        assert!(ServerConfig::default().resolve_root("  ").unwrap_err().is_config());
    }

    #[test]
    fn relative_root_cannot_climb_out_of_default_root() {
        let config = ServerConfig {
            default_root: Some(PathBuf::from("/srv/gx")),
            ..ServerConfig::default()
        };
        assert!(config.resolve_root("../../etc").unwrap_err().is_config());
        assert!(config.resolve_root("team-a/../../x").unwrap_err().is_config());
        assert_eq!(
            config.resolve_root("team-a/./nightly").unwrap(),
            PathBuf::from("/srv/gx/team-a/./nightly")
        );
    }
}
