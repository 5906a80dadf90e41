use std::time::Duration;

/// Everything an [`ErraticBridge`][crate::ErraticBridge] needs to know
/// besides its devices.  Fixed once the bridge is built.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Serial port the controller hangs off.
    pub port_name: String,
    pub odometry_topic: String,
    pub battery_topic: String,
    pub cmd_vel_topic: String,
    /// Parent frame of odometry and its transform.
    pub odometry_frame_id: String,
    /// Bound on each synchronous device request.
    pub request_timeout: Duration,
    /// Period of geometry attempts, also the wait bound of each one.
    pub geom_retry_interval: Duration,
    /// Wait after unsubscribing so the driver can quiesce.
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyUSB0".to_string(),
            odometry_topic: "odom".to_string(),
            battery_topic: "battery_state".to_string(),
            cmd_vel_topic: "cmd_vel".to_string(),
            odometry_frame_id: "odom".to_string(),
            request_timeout: Duration::from_secs(5),
            geom_retry_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}
