//! YAML configuration for the migration service.
//!
//! # Storage layout
//!
//! ```text
//! ~/.geoferry/
//!   config.yaml   (mode 0600, directory mode 0700)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function takes the home directory explicitly
//! (`fn_at(home: &Path, …)`), so tests can point it at a `TempDir`.
//! Callers resolve the real one with [`home`].
//!
//! Secrets may be kept out of the file and supplied through the environment;
//! see [`Config::apply_env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const ENV_SOURCE_URL: &str = "GEOFERRY_SOURCE_URL";
pub const ENV_SOURCE_AUTH: &str = "GEOFERRY_SOURCE_AUTH";
pub const ENV_SINK_URL: &str = "GEOFERRY_SINK_URL";
pub const ENV_SINK_KEY: &str = "GEOFERRY_SINK_KEY";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
}

/// Where pending records are read from (Firebase Realtime Database REST).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL, e.g. `https://<project>-default-rtdb.firebaseio.com`.
    pub url: String,
    /// Path under the base URL holding the pending records.
    pub root: String,
    /// Database secret or ID token sent as `?auth=`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            root: "/".to_string(),
            auth: None,
        }
    }
}

/// Where canonical rows are written (PostgREST, as exposed by Supabase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Project URL, e.g. `https://<ref>.supabase.co`.
    pub url: String,
    pub api_key: String,
    pub devices_table: String,
    pub locations_table: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            devices_table: "devices".to_string(),
            locations_table: "location_history".to_string(),
        }
    }
}

/// Loop tuning for the sync controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Pause between the end of one cycle and the start of the next.
    pub poll_interval_secs: u64,
    /// Delete records from the source once they are committed to the sink.
    pub cleanup: bool,
    /// Consecutive fetch failures after which the loop halts.
    pub max_consecutive_failures: u32,
    /// Upper bound on every single request to the source or sink.
    pub request_timeout_secs: u64,
    /// Run the whole pipeline but never insert or delete.
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            cleanup: true,
            max_consecutive_failures: 5,
            request_timeout_secs: 10,
            dry_run: false,
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Sleep used after a failed fetch: a fixed 2× the poll interval.
    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.saturating_mul(2))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Overrides + validation
// ---------------------------------------------------------------------------

impl Config {
    /// Overlay connection settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Same as [`Config::apply_env`] with an injectable lookup, so tests don't
    /// have to mutate the real environment.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_SOURCE_URL) {
            self.source.url = url;
        }
        if let Some(auth) = non_empty(ENV_SOURCE_AUTH) {
            self.source.auth = Some(auth);
        }
        if let Some(url) = non_empty(ENV_SINK_URL) {
            self.sink.url = url;
        }
        if let Some(key) = non_empty(ENV_SINK_KEY) {
            self.sink.api_key = key;
        }
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_source()?;
        check_url("sink.url", &self.sink.url)?;
        if self.sink.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "sink.api_key is empty (set it in the file or via {ENV_SINK_KEY})"
            )));
        }
        if self.sink.devices_table.trim().is_empty() || self.sink.locations_table.trim().is_empty()
        {
            return Err(ConfigError::Invalid("sink table names must not be empty".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("sync.poll_interval_secs must be > 0".into()));
        }
        if self.sync.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_consecutive_failures must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The subset of [`Config::validate`] a read-only source client needs.
    /// Sink settings are not looked at.
    pub fn validate_source(&self) -> Result<(), ConfigError> {
        check_url("source.url", &self.source.url)?;
        if self.sync.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("sync.request_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Copy with secrets replaced, for printing.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        copy.source.auth = copy.source.auth.as_deref().map(mask);
        if !copy.sink.api_key.is_empty() {
            copy.sink.api_key = mask(&copy.sink.api_key);
        }
        copy
    }
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} is empty")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "{field} must start with http:// or https://, got '{url}'"
        )));
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.geoferry/`
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".geoferry")
}

/// `<home>/.geoferry/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.geoferry/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Like [`load_at`], but a missing file yields [`Config::default`].
pub fn load_or_default_at(home: &Path) -> Result<Config, ConfigError> {
    match load_at(home) {
        Err(ConfigError::NotFound { .. }) => Ok(Config::default()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Scaffold a default config file.
///
/// Idempotent: if the file already exists and `force` is false, loads and
/// returns it unchanged.
pub fn init_at(home: &Path, force: bool) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if path.exists() && !force {
        return load_at(home);
    }
    let config = Config::default();
    save_at(home, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The user's home directory, where `.geoferry/` lives.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn runnable() -> Config {
        let mut config = Config::default();
        config.source.url = "https://tracker-default-rtdb.firebaseio.com".into();
        config.sink.url = "https://ref.supabase.co".into();
        config.sink.api_key = "anon-key".into();
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = SyncSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.backoff_interval(), Duration::from_secs(4));
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_consecutive_failures, 5);
        assert!(settings.cleanup);
        assert!(!settings.dry_run);
    }

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(config_path_at(home.path()).ends_with(".geoferry/config.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip_and_perms() {
        let home = TempDir::new().expect("tempdir");
        let config = runnable();
        save_at(home.path(), &config).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, config);
        assert!(!config_path_at(home.path())
            .with_file_name("config.yaml.tmp")
            .exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(config_path_at(home.path()))
                .expect("meta")
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn partial_file_fills_defaults() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(config_dir_at(home.path())).expect("mkdir");
        std::fs::write(
            config_path_at(home.path()),
            "sync:\n  poll_interval_secs: 7\n",
        )
        .expect("write");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded.sync.poll_interval_secs, 7);
        assert_eq!(loaded.sync.max_consecutive_failures, 5);
        assert_eq!(loaded.sink.locations_table, "location_history");
        assert_eq!(loaded.source.root, "/");
    }

    #[test]
    fn load_missing_returns_not_found_and_default_fallback_works() {
        let home = TempDir::new().expect("tempdir");
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert_eq!(
            load_or_default_at(home.path()).expect("default"),
            Config::default()
        );
    }

    #[test]
    fn init_is_idempotent_unless_forced() {
        let home = TempDir::new().expect("tempdir");
        init_at(home.path(), false).expect("init");
        save_at(home.path(), &runnable()).expect("save");

        let kept = init_at(home.path(), false).expect("second init");
        assert_eq!(kept.sink.api_key, "anon-key");

        let reset = init_at(home.path(), true).expect("forced init");
        assert!(reset.sink.api_key.is_empty());
    }

    #[test]
    fn env_overrides_replace_connection_settings() {
        let vars: HashMap<&str, &str> = [
            (ENV_SOURCE_URL, "http://127.0.0.1:9000"),
            (ENV_SOURCE_AUTH, "secret"),
            (ENV_SINK_KEY, "service-key"),
            (ENV_SINK_URL, "  "),
        ]
        .into_iter()
        .collect();
        let mut config = runnable();
        config.apply_vars(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.source.url, "http://127.0.0.1:9000");
        assert_eq!(config.source.auth.as_deref(), Some("secret"));
        assert_eq!(config.sink.api_key, "service-key");
        assert_eq!(config.sink.url, "https://ref.supabase.co", "blank env is ignored");
    }

    #[test]
    fn validate_rejects_unrunnable_settings() {
        assert!(runnable().validate().is_ok());
        assert!(Config::default().validate().is_err());

        let mut bad_url = runnable();
        bad_url.sink.url = "ftp://nope".into();
        assert!(matches!(bad_url.validate(), Err(ConfigError::Invalid(_))));

        let mut zero_interval = runnable();
        zero_interval.sync.poll_interval_secs = 0;
        assert!(zero_interval.validate().is_err());

        let mut zero_threshold = runnable();
        zero_threshold.sync.max_consecutive_failures = 0;
        assert!(zero_threshold.validate().is_err());
    }

    #[test]
    fn validate_source_ignores_sink_settings() {
        let mut config = Config::default();
        config.source.url = "https://db.firebaseio.com".into();
        assert!(config.validate_source().is_ok());
        assert!(config.validate().is_err(), "sink is still unset");

        let mut no_source = runnable();
        no_source.source.url = String::new();
        assert!(matches!(no_source.validate_source(), Err(ConfigError::Invalid(_))));

        let mut zero_timeout = config.clone();
        zero_timeout.sync.request_timeout_secs = 0;
        assert!(zero_timeout.validate_source().is_err());
    }

    #[test]
    fn redacted_masks_secrets() {
        let mut config = runnable();
        config.source.auth = Some("abcdefgh".into());
        let shown = config.redacted();
        assert_eq!(shown.source.auth.as_deref(), Some("abcd…"));
        assert_eq!(shown.sink.api_key, "anon…");
    }
}
