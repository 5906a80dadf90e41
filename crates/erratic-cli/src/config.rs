//! Process configuration – reads `~/.erratic/config.toml`.
//!
//! Every field has a default, so a missing file (or a file that only sets a
//! few keys) is fine.  `ERRATIC_CONFIG` points at another file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use erratic_bridge::BridgeConfig;
use erratic_types::BridgeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial port of the Erratic controller.
    #[serde(default = "default_port_name")]
    pub port_name: String,

    #[serde(default = "default_odometry_topic")]
    pub odometry_topic: String,

    #[serde(default = "default_battery_topic")]
    pub battery_topic: String,

    #[serde(default = "default_cmd_vel_topic")]
    pub cmd_vel_topic: String,

    /// Parent frame of the published odometry.
    #[serde(default = "default_odometry_frame_id")]
    pub odometry_frame_id: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_geom_retry_ms")]
    pub geom_retry_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Battery voltage reported by the simulated controller.
    #[serde(default = "default_sim_voltage")]
    pub sim_voltage: f32,
}

fn default_port_name() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_odometry_topic() -> String {
    "odom".to_string()
}
fn default_battery_topic() -> String {
    "battery_state".to_string()
}
fn default_cmd_vel_topic() -> String {
    "cmd_vel".to_string()
}
fn default_odometry_frame_id() -> String {
    "odom".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_geom_retry_ms() -> u64 {
    1_000
}
fn default_shutdown_grace_ms() -> u64 {
    1_000
}
fn default_sim_voltage() -> f32 {
    12.6
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            odometry_topic: default_odometry_topic(),
            battery_topic: default_battery_topic(),
            cmd_vel_topic: default_cmd_vel_topic(),
            odometry_frame_id: default_odometry_frame_id(),
            request_timeout_ms: default_request_timeout_ms(),
            geom_retry_ms: default_geom_retry_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            sim_voltage: default_sim_voltage(),
        }
    }
}

impl Config {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            port_name: self.port_name.clone(),
            odometry_topic: self.odometry_topic.clone(),
            battery_topic: self.battery_topic.clone(),
            cmd_vel_topic: self.cmd_vel_topic.clone(),
            odometry_frame_id: self.odometry_frame_id.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            geom_retry_interval: Duration::from_millis(self.geom_retry_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

/// `$ERRATIC_CONFIG`, or `~/.erratic/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ERRATIC_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".erratic").join("config.toml")
}

/// Load the config, falling back to defaults when the file is absent, then
/// apply environment overrides.
pub fn load() -> Result<Config, BridgeError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  `Ok(None)` when it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `ERRATIC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ERRATIC_PORT` | `port_name` |
/// | `ERRATIC_ODOM_TOPIC` | `odometry_topic` |
/// | `ERRATIC_BATTERY_TOPIC` | `battery_topic` |
/// | `ERRATIC_CMD_VEL_TOPIC` | `cmd_vel_topic` |
/// | `ERRATIC_ODOM_FRAME` | `odometry_frame_id` |
/// | `ERRATIC_SIM_VOLTAGE` | `sim_voltage` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    let strings = [
        ("ERRATIC_PORT", &mut cfg.port_name),
        ("ERRATIC_ODOM_TOPIC", &mut cfg.odometry_topic),
        ("ERRATIC_BATTERY_TOPIC", &mut cfg.battery_topic),
        ("ERRATIC_CMD_VEL_TOPIC", &mut cfg.cmd_vel_topic),
        ("ERRATIC_ODOM_FRAME", &mut cfg.odometry_frame_id),
    ];
    for (var, field) in strings {
        if let Ok(v) = std::env::var(var) {
            *field = v;
        }
    }
    if let Ok(v) = std::env::var("ERRATIC_SIM_VOLTAGE") {
        if let Ok(volts) = v.parse::<f32>() {
            cfg.sim_voltage = volts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_defaults() {
        assert_eq!(Config::default().bridge_config(), BridgeConfig::default());
    }

    #[test]
    fn config_path_points_to_erratic_dir() {
        let p = config_path_for_home("/home/robot");
        assert_eq!(p, PathBuf::from("/home/robot/.erratic/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "port_name = \"/dev/ttyS1\"\nodometry_frame_id = \"map\"\nshutdown_grace_ms = 250\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.port_name, "/dev/ttyS1");
        assert_eq!(cfg.odometry_frame_id, "map");
        assert_eq!(cfg.cmd_vel_topic, "cmd_vel");
        assert_eq!(
            cfg.bridge_config().shutdown_grace,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_ms = \"soon\"\n").expect("write");
        assert!(matches!(load_from(&path), Err(BridgeError::Config(_))));
    }

    // Environment variables are process-wide, so every override is checked
    // in one test.
    #[test]
    fn env_overrides() {
        // SAFETY: no other test in this crate reads these variables.
        unsafe {
            std::env::set_var("ERRATIC_PORT", "/dev/ttyACM0");
            std::env::set_var("ERRATIC_CMD_VEL_TOPIC", "teleop/cmd_vel");
            std::env::set_var("ERRATIC_SIM_VOLTAGE", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port_name, "/dev/ttyACM0");
        assert_eq!(cfg.cmd_vel_topic, "teleop/cmd_vel");
        assert_eq!(cfg.sim_voltage, default_sim_voltage());

        unsafe { std::env::set_var("ERRATIC_SIM_VOLTAGE", "11.2") };
        apply_env_overrides(&mut cfg);
        assert!((cfg.sim_voltage - 11.2).abs() < 1e-6);

        unsafe {
            std::env::remove_var("ERRATIC_PORT");
            std::env::remove_var("ERRATIC_CMD_VEL_TOPIC");
            std::env::remove_var("ERRATIC_SIM_VOLTAGE");
        }
    }
}
