use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_ENV: &str = "SUNO_UNFOLLOW_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub platform: PlatformConfig,
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub harvest: HarvestConfig,
    pub pacing: PacingConfig,
    pub contract: ContractConfig,
    pub progress: ProgressConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_base: String,
    pub page_size: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://suno.com".to_string(),
            api_base: "https://studio-api.prod.suno.com".to_string(),
            page_size: 20,
        }
    }
}

impl PlatformConfig {
    /// Absolute URL for a path on the web app (not the API host).
    pub fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_data_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub blocked_url_patterns: Vec<String>,
    pub navigation_timeout_s: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            user_data_dir: PathBuf::from(".browser_data"),
            executable: None,
            viewport: (1920, 1080),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            blocked_url_patterns: ["*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            navigation_timeout_s: 60,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_s)
    }

    /// Create the profile directory if needed and prove it is writable.
    pub fn prepare_data_dir(&self) -> Result<PathBuf> {
        ensure_writable_dir(&self.user_data_dir)?;
        tracing::info!(dir = %self.user_data_dir.display(), "using browser data directory");
        Ok(self.user_data_dir.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub profile_path: String,
    pub probe_attempts: u32,
    pub probe_timeout_s: u64,
    pub probe_gap_s: u64,
    pub login_wait_s: u64,
    pub poll_interval_ms: u64,
    pub settle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_path: "/me".to_string(),
            probe_attempts: 3,
            probe_timeout_s: 10,
            probe_gap_s: 2,
            login_wait_s: 300,
            poll_interval_ms: 500,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarvestConfig {
    pub capture_timeout_s: u64,
    pub refresh_attempts: u32,
    pub refresh_backoff_s: u64,
    pub nudge_interval_ms: u64,
    pub settle_ms: u64,
    pub ready_timeout_s: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            capture_timeout_s: 20,
            refresh_attempts: 3,
            refresh_backoff_s: 5,
            nudge_interval_ms: 1000,
            settle_ms: 2000,
            ready_timeout_s: 10,
        }
    }
}

/// Retry bounds and the randomized waits used to stay under the platform's
/// abuse detection. Ranges are `[min, max]` seconds, inclusive.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub max_attempts: u32,
    pub page_delay_ms: u64,
    pub transient_backoff_s: u64,
    pub max_auth_refreshes: u32,
    pub unfollow_cooldown_s: (u64, u64),
    pub unexpected_status_backoff_s: (u64, u64),
    pub error_backoff_s: (u64, u64),
    pub batch_size: usize,
    pub batch_pause_s: (u64, u64),
    pub default_retry_after_s: u64,
    pub session_error_cooldown_s: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            page_delay_ms: 1000,
            transient_backoff_s: 5,
            max_auth_refreshes: 3,
            unfollow_cooldown_s: (30, 60),
            unexpected_status_backoff_s: (10, 15),
            error_backoff_s: (15, 30),
            batch_size: 5,
            batch_pause_s: (60, 120),
            default_retry_after_s: 60,
            session_error_cooldown_s: 5,
        }
    }
}

/// Selectors, field names and header names observed on one version of the
/// web app. The platform changes these without notice.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContractConfig {
    pub version: String,
    pub login_selectors: Vec<String>,
    pub profile_url_markers: Vec<String>,
    pub following_ready_selector: String,
    pub total_field: String,
    pub profiles_field: String,
    pub handle_field: String,
    pub authorization_header: String,
    pub session_id_header: String,
    pub device_id_header: String,
    pub affiliate_id_header: String,
    pub affiliate_fallback: String,
    pub content_type: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            version: "2024-12".to_string(),
            login_selectors: [
                ".profile-section",
                "[data-testid=\"profile\"]",
                "div[role=\"navigation\"]",
                "button:has-text(\"Following\")",
                "button:has-text(\"My Profile\")",
                "a:has-text(\"My Profile\")",
                "div:has-text(\"Following\")",
                ".header-user-menu",
                ".user-profile",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            profile_url_markers: vec!["/me".to_string(), "/profile".to_string()],
            following_ready_selector: "button:has-text(\"Following\")".to_string(),
            total_field: "num_total_profiles".to_string(),
            profiles_field: "profiles".to_string(),
            handle_field: "handle".to_string(),
            authorization_header: "authorization".to_string(),
            session_id_header: "session-id".to_string(),
            device_id_header: "device-id".to_string(),
            affiliate_id_header: "affiliate-id".to_string(),
            affiliate_fallback: "undefined".to_string(),
            content_type: "text/plain;charset=UTF-8".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProgressConfig {
    pub ledger_path: PathBuf,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("unfollow_progress.txt"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("logs/suno-unfollow.log"),
            filter: "suno_unfollow=info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML: {}", path.display()))?;
        Ok(config)
    }

    /// Load from `$SUNO_UNFOLLOW_CONFIG` or `config.toml`. A missing file is
    /// not an error; a present but unparseable one is.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Create `dir` if missing, then write and remove a probe file.
pub fn ensure_writable_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let probe = dir.join("test_write");
    std::fs::write(&probe, b"test")
        .with_context(|| format!("Directory not writable: {}", dir.display()))?;
    std::fs::remove_file(&probe)
        .with_context(|| format!("Directory not writable: {}", dir.display()))?;
    Ok(())
}
