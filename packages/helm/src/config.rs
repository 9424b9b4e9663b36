use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use stream_session::ConnectionPolicy;

// Two equivalent ways to configure:
//
//   config.toml:     [policy]
//                    probe_interval_secs = 5
//
//   env var:         HELM_POLICY__PROBE_INTERVAL_SECS=5   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub policy: PolicyFileConfig,
}

/// Session selection (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Remote session identity to attach to.
    #[serde(default)]
    pub id: Option<String>,
}

/// Lifecycle timing knobs (lives under `[policy]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyFileConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_liveness_poll_ms")]
    pub liveness_poll_ms: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_staleness_threshold_secs")]
    pub staleness_threshold_secs: u64,
    #[serde(default = "default_reconnect_initial_delay_secs")]
    pub reconnect_initial_delay_secs: u64,
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
}

impl Default for PolicyFileConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            liveness_poll_ms: default_liveness_poll_ms(),
            probe_interval_secs: default_probe_interval_secs(),
            staleness_threshold_secs: default_staleness_threshold_secs(),
            reconnect_initial_delay_secs: default_reconnect_initial_delay_secs(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            debounce_window_ms: default_debounce_window_ms(),
        }
    }
}

impl PolicyFileConfig {
    pub fn to_policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            liveness_poll: Duration::from_millis(self.liveness_poll_ms),
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            staleness_threshold: Duration::from_secs(self.staleness_threshold_secs),
            reconnect_initial_delay: Duration::from_secs(self.reconnect_initial_delay_secs),
            reconnect_max_delay: Duration::from_secs(self.reconnect_max_delay_secs),
            debounce_window: Duration::from_millis(self.debounce_window_ms),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_liveness_poll_ms() -> u64 {
    500
}
fn default_probe_interval_secs() -> u64 {
    5
}
fn default_staleness_threshold_secs() -> u64 {
    30
}
fn default_reconnect_initial_delay_secs() -> u64 {
    1
}
fn default_reconnect_max_delay_secs() -> u64 {
    30
}
fn default_debounce_window_ms() -> u64 {
    100
}

/// Build a figment that layers: struct defaults → config.toml → HELM_* env.
///
/// Env vars use double-underscore for nesting into sections:
///   `HELM_SESSION__ID=showroom-7`          → `session.id = "showroom-7"`
///   `HELM_POLICY__PROBE_INTERVAL_SECS=10`  → `policy.probe_interval_secs = 10`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("HELM_").split("__"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_into_a_valid_policy() {
        let config = FileConfig::default();
        let policy = config.policy.to_policy();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.probe_interval, Duration::from_secs(5));
        assert_eq!(policy.debounce_window, Duration::from_millis(100));
    }

    #[test]
    fn config_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[session]\nid = \"showroom-7\"\n\n[policy]\nstaleness_threshold_secs = 60\n",
        )
        .unwrap();

        let config: FileConfig = load_config(dir.path()).extract().unwrap();
        assert_eq!(config.session.id.as_deref(), Some("showroom-7"));
        assert_eq!(config.policy.staleness_threshold_secs, 60);
        // Untouched fields keep their defaults.
        assert_eq!(config.policy.probe_interval_secs, 5);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: FileConfig = load_config(dir.path()).extract().unwrap();
        assert!(config.session.id.is_none());
        assert_eq!(config.policy.connect_timeout_secs, 10);
    }
}
