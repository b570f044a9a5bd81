//! Configuration Vault – reads/writes `~/.wayfind/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Backend API key.  Wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.is_empty() { "<not set>" } else { "<redacted>" })
    }
}

/// Persisted operator configuration stored in `~/.wayfind/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the PostgREST-compatible backend.  Empty runs offline
    /// against an in-memory gateway.
    #[serde(default)]
    pub backend_url: String,

    #[serde(default, skip_serializing_if = "ApiKey::is_empty")]
    pub api_key: ApiKey,

    /// Login id that opens an admin session (case-insensitive).
    #[serde(default = "default_admin_code")]
    pub admin_code: String,

    /// Phase label applied at startup (`pre-test` / `post-test`).
    #[serde(default = "default_phase")]
    pub phase: String,

    /// TOML floor plan; the built-in two-area plan when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_plan: Option<PathBuf>,

    /// SQLite trip journal; in-memory when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,

    /// Simulation ticks per second during `/walk`.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Simulated walking speed in metres per second.
    #[serde(default = "default_walk_speed")]
    pub walk_speed: f32,
}

fn default_admin_code() -> String {
    "ADMIN2026".to_string()
}
fn default_phase() -> String {
    "pre-test".to_string()
}
fn default_tick_hz() -> u32 {
    10
}
fn default_walk_speed() -> f32 {
    5.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: ApiKey::default(),
            admin_code: default_admin_code(),
            phase: default_phase(),
            floor_plan: None,
            journal_path: None,
            tick_hz: default_tick_hz(),
            walk_speed: default_walk_speed(),
        }
    }
}

impl Config {
    pub fn is_offline(&self) -> bool {
        self.backend_url.trim().is_empty()
    }
}

/// Return the path to `~/.wayfind/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".wayfind").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `WAYFIND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WAYFIND_BACKEND_URL` | `backend_url` |
/// | `WAYFIND_API_KEY` | `api_key` |
/// | `WAYFIND_ADMIN_CODE` | `admin_code` |
/// | `WAYFIND_PHASE` | `phase` |
/// | `WAYFIND_JOURNAL_PATH` | `journal_path` |
/// | `WAYFIND_TICK_HZ` | `tick_hz` (ignored unless a positive integer) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WAYFIND_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Ok(v) = std::env::var("WAYFIND_API_KEY") {
        cfg.api_key = ApiKey::new(v);
    }
    if let Ok(v) = std::env::var("WAYFIND_ADMIN_CODE")
        && !v.trim().is_empty()
    {
        cfg.admin_code = v;
    }
    if let Ok(v) = std::env::var("WAYFIND_PHASE") {
        cfg.phase = v;
    }
    if let Ok(v) = std::env::var("WAYFIND_JOURNAL_PATH") {
        cfg.journal_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("WAYFIND_TICK_HZ")
        && let Ok(hz) = v.trim().parse::<u32>()
        && hz > 0
    {
        cfg.tick_hz = hz;
    }
}

/// Save the config to disk, creating `~/.wayfind/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // The file may hold the API key: owner read/write only (rw-------).
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
