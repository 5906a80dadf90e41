//! Pure conversions between controller payloads and bus messages.

use std::time::Duration;

use erratic_types::payload::{Pose2d, Position2dCmdVel, Position2dData, PowerData};
use erratic_types::{
    Header, Odometry, Pose, PowerState, Quaternion, Time, TransformStamped, Twist, Vector3,
};

/// Child frame of both the odometry message and the odometry transform.
pub const BASE_FRAME: &str = "base_footprint";

/// Device timestamps are float seconds.
pub fn stamp_from_device_time(t: f64) -> Time {
    Time::from_secs_f64(t)
}

pub fn odometry_from_data(data: &Position2dData, stamp: Time, frame_id: &str) -> Odometry {
    Odometry {
        header: Header {
            stamp,
            frame_id: frame_id.to_string(),
        },
        child_frame_id: BASE_FRAME.to_string(),
        pose: Pose {
            position: Vector3::new(data.pos.px, data.pos.py, 0.0),
            orientation: Quaternion::from_yaw(data.pos.pa),
        },
        twist: Twist {
            linear: Vector3::new(data.vel.px, data.vel.py, 0.0),
            angular: Vector3::new(0.0, 0.0, data.vel.pa),
        },
    }
}

/// The `frame_id → base_footprint` transform matching an odometry sample.
pub fn transform_from_data(data: &Position2dData, stamp: Time, frame_id: &str) -> TransformStamped {
    TransformStamped {
        header: Header {
            stamp,
            frame_id: frame_id.to_string(),
        },
        child_frame_id: BASE_FRAME.to_string(),
        translation: Vector3::new(data.pos.px, data.pos.py, 0.0),
        rotation: Quaternion::from_yaw(data.pos.pa),
    }
}

/// Voltage-threshold battery heuristic.
///
/// The wattages are placeholders, not measurements: the controller reports
/// voltage only, so charging is inferred from the voltage sitting above the
/// float level.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerPolicy {
    /// Reported while charging.
    pub watts_charging: f64,
    /// Reported while on battery.
    pub watts_unplugged: f64,
    /// Volts above which the charger is assumed connected.
    pub charging_threshold: f32,
    /// Volts below which no runtime is left.
    pub runtime_cutoff: f32,
    /// Runtime reported above the cutoff.
    pub full_runtime: Duration,
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self {
            watts_charging: 10.0,
            watts_unplugged: -10.0,
            charging_threshold: 12.98,
            runtime_cutoff: 11.5,
            full_runtime: Duration::from_secs(3600),
        }
    }
}

impl PowerPolicy {
    pub fn power_state(&self, data: &PowerData, stamp: Time) -> PowerState {
        let charging = data.volts > self.charging_threshold;
        PowerState {
            header: Header {
                stamp,
                frame_id: String::new(),
            },
            time_remaining: if data.volts < self.runtime_cutoff {
                Duration::ZERO
            } else {
                self.full_runtime
            },
            power_consumption: if charging {
                self.watts_charging
            } else {
                self.watts_unplugged
            },
            ac_present: charging,
        }
    }
}

/// Differential drive: lateral velocity is always zero and the command is
/// always sent with the motors enabled.
pub fn cmd_from_twist(twist: &Twist) -> Position2dCmdVel {
    Position2dCmdVel {
        vel: Pose2d::new(twist.linear.x, 0.0, twist.angular.z),
        state: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sample(px: f64, py: f64, pa: f64) -> Position2dData {
        Position2dData {
            pos: Pose2d::new(px, py, pa),
            vel: Pose2d::new(0.3, 0.01, -0.2),
            stall: false,
        }
    }

    #[test]
    fn odometry_position_is_planar_and_yaw_round_trips() {
        for &(x, y, yaw) in &[
            (0.0, 0.0, 0.0),
            (1.5, -2.25, 0.7),
            (-3.0, 4.0, -2.9),
            (10.0, 0.5, PI - 1e-6),
        ] {
            let odom = odometry_from_data(&sample(x, y, yaw), Time::new(5, 0), "odom");
            assert_eq!(odom.pose.position, Vector3::new(x, y, 0.0));
            assert!((odom.pose.orientation.yaw() - yaw).abs() < 1e-9, "yaw {yaw}");
            assert_eq!(odom.child_frame_id, "base_footprint");
            assert_eq!(odom.header.frame_id, "odom");
        }
    }

    #[test]
    fn odometry_velocity_is_copied_through() {
        let odom = odometry_from_data(&sample(0.0, 0.0, 0.0), Time::default(), "odom");
        assert_eq!(odom.twist.linear, Vector3::new(0.3, 0.01, 0.0));
        assert_eq!(odom.twist.angular, Vector3::new(0.0, 0.0, -0.2));
    }

    #[test]
    fn transform_shares_pose_and_stamp() {
        let data = sample(1.0, 2.0, 0.4);
        let stamp = stamp_from_device_time(17.25);
        let odom = odometry_from_data(&data, stamp, "map");
        let tf = transform_from_data(&data, stamp, "map");
        assert_eq!(tf.header, odom.header);
        assert_eq!(tf.child_frame_id, BASE_FRAME);
        assert_eq!(tf.translation, odom.pose.position);
        assert_eq!(tf.rotation, odom.pose.orientation);
    }

    #[test]
    fn charging_voltage() {
        let state = PowerPolicy::default().power_state(&PowerData { volts: 13.0 }, Time::default());
        assert!(state.ac_present);
        assert_eq!(state.power_consumption, 10.0);
        assert_eq!(state.time_remaining, Duration::from_secs(3600));
    }

    #[test]
    fn depleted_voltage() {
        let state = PowerPolicy::default().power_state(&PowerData { volts: 10.0 }, Time::default());
        assert!(!state.ac_present);
        assert_eq!(state.power_consumption, -10.0);
        assert_eq!(state.time_remaining, Duration::ZERO);
    }

    #[test]
    fn voltage_between_cutoff_and_threshold() {
        let policy = PowerPolicy::default();
        let state = policy.power_state(&PowerData { volts: 12.5 }, Time::default());
        assert!(!state.ac_present);
        assert_eq!(state.time_remaining, policy.full_runtime);
        // The threshold itself is not charging.
        let at = policy.power_state(&PowerData { volts: 12.98 }, Time::default());
        assert!(!at.ac_present);
    }

    #[test]
    fn twist_maps_to_enabled_planar_command() {
        let cmd = cmd_from_twist(&Twist {
            linear: Vector3::new(0.4, 9.0, 1.0),
            angular: Vector3::new(2.0, 3.0, -0.5),
        });
        assert_eq!(cmd.vel, Pose2d::new(0.4, 0.0, -0.5));
        assert!(cmd.state);
    }
}
