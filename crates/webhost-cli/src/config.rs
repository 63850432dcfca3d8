//! Configuration Vault – reads/writes `~/.webhost/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use webhost_runtime::BrowserConfig;
use webhost_types::WebhostError;

/// Persisted settings stored in `~/.webhost/config.toml`.
///
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial URL.
    pub url: String,
    /// Let `WEBHOST_URL` replace [`url`](Self::url).
    pub environment_override: bool,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
    pub max_fps: u32,
    pub fps_sampling: bool,
    pub page_group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_storage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_storage: Option<String>,
    pub languages: Vec<String>,
    pub certificate_check: bool,
    pub transparent: bool,
    /// Persistence root handed to the engine.
    pub data_path: String,
    /// Helper processes that must be running for the engine to count as
    /// operational.
    pub mandatory_processes: Vec<String>,
    pub grace_period_secs: u64,
    pub teardown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let browser = BrowserConfig::default();
        Self {
            url: browser.url,
            environment_override: false,
            width: browser.width,
            height: browser.height,
            scale_factor: browser.scale_factor,
            max_fps: browser.max_fps,
            fps_sampling: browser.fps_sampling,
            page_group: browser.page_group,
            user_agent: None,
            cookie_storage: None,
            local_storage: None,
            languages: Vec::new(),
            certificate_check: browser.certificate_check,
            transparent: browser.transparent,
            data_path: browser.data_path,
            mandatory_processes: vec![
                "WPENetworkProcess".to_string(),
                "WPEWebProcess".to_string(),
            ],
            grace_period_secs: webhost_health::DEFAULT_GRACE_PERIOD.as_secs(),
            teardown_timeout_ms: browser.teardown_timeout.as_millis() as u64,
        }
    }
}

/// What the process health monitor needs from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub mandatory: Vec<String>,
    pub grace_period: Duration,
}

impl Config {
    pub fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            url: self.url.clone(),
            width: self.width,
            height: self.height,
            scale_factor: self.scale_factor,
            max_fps: self.max_fps,
            fps_sampling: self.fps_sampling,
            page_group: self.page_group.clone(),
            user_agent: self.user_agent.clone(),
            cookie_storage: self.cookie_storage.clone(),
            local_storage: self.local_storage.clone(),
            languages: self.languages.clone(),
            certificate_check: self.certificate_check,
            transparent: self.transparent,
            data_path: self.data_path.clone(),
            teardown_timeout: Duration::from_millis(self.teardown_timeout_ms),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            mandatory: self.mandatory_processes.clone(),
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }

    /// Defaults with the `WEBHOST_*` overrides applied, used whenever no
    /// usable file exists.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        apply_env_overrides(&mut cfg);
        cfg
    }
}

impl MonitorSettings {
    /// Settings for an engine that spawns no helper processes. The
    /// configured names would never appear, so nothing is mandatory.
    pub fn without_helpers(self) -> Self {
        Self {
            mandatory: Vec::new(),
            ..self
        }
    }
}

/// Return the path to `~/.webhost/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".webhost").join("config.toml")
}

/// Load the config from disk, environment overrides applied. Returns `None`
/// if the file does not exist.
pub fn load() -> Result<Option<Config>, WebhostError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, WebhostError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        WebhostError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| WebhostError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `WEBHOST_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WEBHOST_URL` | `url`, only with `environment_override = true` |
/// | `WEBHOST_WIDTH` | `width` |
/// | `WEBHOST_HEIGHT` | `height` |
/// | `WEBHOST_MAX_FPS` | `max_fps` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if cfg.environment_override
        && let Ok(url) = std::env::var("WEBHOST_URL")
        && !url.is_empty()
    {
        cfg.url = url;
    }
    override_u32("WEBHOST_WIDTH", &mut cfg.width);
    override_u32("WEBHOST_HEIGHT", &mut cfg.height);
    override_u32("WEBHOST_MAX_FPS", &mut cfg.max_fps);
}

fn override_u32(var: &str, field: &mut u32) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.trim().parse::<u32>()
    {
        *field = n;
    }
}

/// Save the config to disk, creating `~/.webhost/` if necessary.
pub fn save(cfg: &Config) -> Result<(), WebhostError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), WebhostError> {
    let io_err = |what: &str, e: std::io::Error| WebhostError::Config(format!("{what}: {e}"));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create config directory", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("failed to restrict config directory", e))?;
        }
    }

    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| WebhostError::Config(format!("failed to serialize config: {e}")))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    Ok(())
}
