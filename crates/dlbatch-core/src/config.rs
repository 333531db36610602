use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Invalid values that would make a run meaningless.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("worker_count must be at least 1")]
    NoWorkers,
    #[error("job_timeout_secs must be at least 1")]
    ZeroTimeout,
    #[error("check_interval_secs must be a non-negative number of seconds a duration can hold (got {0})")]
    BadInterval(f64),
    #[error("downloader.program must not be empty")]
    EmptyProgram,
}

/// How the external downloader is invoked (optional `[downloader]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Executable name or path (looked up in PATH).
    pub program: String,
    /// Retries the downloader performs internally for one job.
    pub max_retries: u32,
    /// Seconds between SIGTERM and SIGKILL when a run is cancelled.
    pub terminate_grace_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: "spotdl".to_string(),
            max_retries: 10,
            terminate_grace_secs: 3,
        }
    }
}

/// Run configuration loaded from `~/.config/dlbatch/config.toml`.
///
/// Every key is optional; missing keys take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Text file with one job URL per line.
    pub input_file: PathBuf,
    /// Directory the downloader writes into (created at run start).
    pub download_dir: PathBuf,
    /// Number of concurrent workers per pass.
    pub worker_count: usize,
    /// Pause after each job and between worker launches, in seconds.
    pub check_interval_secs: f64,
    /// Wall-clock budget for one downloader process, in seconds.
    pub job_timeout_secs: u64,
    /// Cookie file handed to the downloader.
    pub cookies_file: PathBuf,
    /// Append-only transcript of every job's output.
    pub track_log: PathBuf,
    /// Failed job URLs, one per line; truncated at the start of each pass.
    pub failed_log: PathBuf,
    pub downloader: DownloaderConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("spotdl_list.txt"),
            download_dir: default_download_dir(),
            worker_count: 3,
            check_interval_secs: 1.0,
            job_timeout_secs: 120,
            cookies_file: PathBuf::from("cookies.txt"),
            track_log: PathBuf::from("track_log.txt"),
            failed_log: PathBuf::from("failed_tracks.txt"),
            downloader: DownloaderConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if Duration::try_from_secs_f64(self.check_interval_secs).is_err() {
            return Err(ConfigError::BadInterval(self.check_interval_secs));
        }
        if self.downloader.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        Ok(())
    }

    /// Out-of-range values (rejected by `validate`) saturate instead of panicking.
    pub fn check_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.downloader.terminate_grace_secs)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Output path template handed to the downloader: `<download_dir>/{artist} - {title}`.
    pub fn output_template(&self) -> String {
        self.download_dir
            .join("{artist} - {title}")
            .to_string_lossy()
            .into_owned()
    }
}

/// `$HOME/Music/SpotDL-Downloads`, or a relative `SpotDL-Downloads` without a home dir.
fn default_download_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join("Music").join("SpotDL-Downloads"),
        _ => PathBuf::from("SpotDL-Downloads"),
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlbatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BatchConfig::default();
        let toml = default_cfg.to_toml_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load and validate configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<BatchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: BatchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.worker_count, 3);
        assert_eq!(cfg.job_timeout_secs, 120);
        assert_eq!(cfg.check_interval(), Duration::from_secs(1));
        assert_eq!(cfg.cookies_file, PathBuf::from("cookies.txt"));
        assert_eq!(cfg.downloader.program, "spotdl");
        assert_eq!(cfg.downloader.max_retries, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = BatchConfig::default();
        let toml = cfg.to_toml_string().unwrap();
        let parsed: BatchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.worker_count, cfg.worker_count);
        assert_eq!(parsed.download_dir, cfg.download_dir);
        assert_eq!(parsed.failed_log, cfg.failed_log);
        assert_eq!(parsed.downloader.program, cfg.downloader.program);
    }

    #[test]
    fn config_toml_partial_file_uses_defaults() {
        let toml = r#"
            input_file = "list.txt"
            worker_count = 8
            check_interval_secs = 0.5

            [downloader]
            program = "/opt/spotdl/bin/spotdl"
        "#;
        let cfg: BatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.input_file, PathBuf::from("list.txt"));
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.check_interval(), Duration::from_millis(500));
        assert_eq!(cfg.job_timeout_secs, 120);
        assert_eq!(cfg.downloader.program, "/opt/spotdl/bin/spotdl");
        assert_eq!(cfg.downloader.max_retries, 10);
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut cfg = BatchConfig::default();
        cfg.worker_count = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NoWorkers));

        let mut cfg = BatchConfig::default();
        cfg.job_timeout_secs = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

        let mut cfg = BatchConfig::default();
        cfg.check_interval_secs = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::BadInterval(_))));

        let mut cfg = BatchConfig::default();
        cfg.check_interval_secs = 1e20;
        assert_eq!(cfg.validate(), Err(ConfigError::BadInterval(1e20)));
        assert_eq!(cfg.check_interval(), Duration::MAX);

        let mut cfg = BatchConfig::default();
        cfg.check_interval_secs = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::BadInterval(_))));

        let mut cfg = BatchConfig::default();
        cfg.downloader.program = "  ".to_string();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyProgram));
    }

    #[test]
    fn output_template_lives_in_download_dir() {
        let mut cfg = BatchConfig::default();
        cfg.download_dir = PathBuf::from("/music");
        assert_eq!(cfg.output_template(), "/music/{artist} - {title}");
    }

    #[test]
    fn load_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "worker_count = 0\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());

        fs::write(&path, "check_interval_secs = 1e20\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::BadInterval(_))));

        fs::write(&path, "worker_count = 2\n").unwrap();
        assert_eq!(load_from_path(&path).unwrap().worker_count, 2);
    }
}
