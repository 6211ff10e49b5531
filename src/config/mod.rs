use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Temporary storage and extraction settings
    pub downloads: DownloadsConfig,

    /// Per-client limits on the download endpoint
    pub rate_limit: RateLimitConfig,

    /// Verbose yt-dlp output and debug logging
    pub debug: bool,

    /// File the values were loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Directory with the static front-end
    pub public_dir: PathBuf,

    /// Deployment environment name
    pub environment: String,

    /// Seconds to wait for in-flight responses on shutdown
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Directory for temporary audio files
    pub dir: PathBuf,

    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Wall-clock bound on a single extraction
    pub extraction_timeout_secs: u64,

    /// How often the orphan sweep runs
    pub reaper_interval_secs: u64,

    /// Files older than this are removed by the sweep
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window (0 disables the limit)
    pub max_requests: u32,

    /// Window length
    pub window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3005,
            public_dir: PathBuf::from("public"),
            environment: "development".to_string(),
            shutdown_grace_secs: 10,
        }
    }
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("downloads"),
            yt_dlp_path: "yt-dlp".to_string(),
            extraction_timeout_secs: 3 * 60,
            reaper_interval_secs: 15 * 60,
            retention_secs: 60 * 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window_secs: 15 * 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            downloads: DownloadsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            debug: false,
            source: None,
        }
    }
}

impl Config {
    /// Load configuration from the file named on the command line (if any),
    /// then apply command line and environment overrides
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        // Runs before logging is set up; `display` reports the source later.
        let mut config = match Self::find_config_file(cli.config.as_deref())? {
            Some(path) => {
                let mut config = Self::load(&path)?;
                config.source = Some(path);
                config
            }
            None => Self::default(),
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Default location of the user-level configuration file
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("audio-relay").join("config.yaml"))
    }

    fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        // Current directory first for easy local runs
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        Ok(Self::default_config_path()
            .ok()
            .filter(|path| path.exists()))
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(dir) = &cli.downloads_dir {
            self.downloads.dir = dir.clone();
        }
        if let Some(dir) = &cli.public_dir {
            self.server.public_dir = dir.clone();
        }
        if let Some(environment) = &cli.environment {
            self.server.environment = environment.clone();
        }
        if let Some(yt_dlp) = &cli.yt_dlp {
            self.downloads.yt_dlp_path = yt_dlp.clone();
        }
        self.debug |= cli.debug;
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.downloads.extraction_timeout_secs == 0 {
            anyhow::bail!("downloads.extraction_timeout_secs must be greater than zero");
        }
        if self.downloads.reaper_interval_secs == 0 {
            anyhow::bail!("downloads.reaper_interval_secs must be greater than zero");
        }
        if self.downloads.retention_secs == 0 {
            anyhow::bail!("downloads.retention_secs must be greater than zero");
        }
        if self.rate_limit.max_requests > 0 && self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be greater than zero");
        }
        if self.downloads.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("downloads.yt_dlp_path must not be empty");
        }

        self.socket_addr()?;

        Ok(())
    }

    /// Address the listener binds to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.host))?;
        Ok(SocketAddr::new(host, self.server.port))
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.downloads.extraction_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.downloads.reaper_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.downloads.retention_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs)
    }

    /// Default tracing filter when RUST_LOG is not set
    pub fn log_filter(&self) -> String {
        let level = if self.debug { "debug" } else { "info" };
        format!("audio_relay={0},tower_http={0}", level)
    }

    /// Log the effective configuration
    pub fn display(&self) {
        tracing::info!(
            source = ?self.source,
            addr = %format!("{}:{}", self.server.host, self.server.port),
            downloads_dir = %self.downloads.dir.display(),
            public_dir = %self.server.public_dir.display(),
            environment = %self.server.environment,
            debug = self.debug,
            "Effective configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3005);
        assert_eq!(config.extraction_timeout(), Duration::from_secs(180));
        assert_eq!(config.reaper_interval(), Duration::from_secs(900));
        assert_eq!(config.retention(), Duration::from_secs(3600));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.rate_limit.max_requests, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(
            &path,
            "server:\n  port: 4000\n  environment: production\ndownloads:\n  retention_secs: 120\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "audio-relay",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "5000",
        ])
        .unwrap();
        let config = Config::from_cli(&cli).unwrap();

        assert_eq!(config.server.port, 5000);
        assert!(config.is_production());
        assert_eq!(config.retention(), Duration::from_secs(120));
        // untouched sections keep their defaults
        assert_eq!(config.extraction_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_file_settings_drive_logging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "debug: true\nserver:\n  environment: production\n").unwrap();

        let cli = Cli::try_parse_from(["audio-relay", "--config", path.to_str().unwrap()])
            .unwrap();
        let config = Config::from_cli(&cli).unwrap();

        assert_eq!(config.log_filter(), "audio_relay=debug,tower_http=debug");
        assert!(config.is_production());
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(
            Config::default().log_filter(),
            "audio_relay=info,tower_http=info"
        );
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let cli = Cli::try_parse_from(["audio-relay", "--config", "/nonexistent/relay.yaml"])
            .unwrap();
        assert!(Config::from_cli(&cli).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.downloads.extraction_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.server.port = 9999;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9999);
    }
}
