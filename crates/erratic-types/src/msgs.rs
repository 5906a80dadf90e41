//! Bus-side message types.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A point in time split into whole seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

impl Time {
    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Split a floating-point seconds value.
    ///
    /// `nsec = floor((t - floor(t)) * 1e9)`; negative inputs clamp to zero.
    pub fn from_secs_f64(t: f64) -> Self {
        if t.is_nan() || t <= 0.0 {
            return Self::default();
        }
        let whole = t.floor();
        Self {
            sec: whole as u32,
            nsec: ((t - whole) * 1e9) as u32,
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            sec: now.timestamp().max(0) as u32,
            nsec: now.timestamp_subsec_nanos(),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.sec) + f64::from(self.nsec) / 1e9
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A unit quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading about +Z, in `(-π, π]`.
    pub fn yaw(&self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

/// Linear and angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Pose and twist of `child_frame_id` expressed in `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: Pose,
    pub twist: Twist,
}

/// Battery summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerState {
    pub header: Header,
    /// Estimated runtime left on the battery.
    pub time_remaining: Duration,
    /// Watts; positive while charging.
    pub power_consumption: f64,
    pub ac_present: bool,
}

/// Rigid transform from `header.frame_id` to `child_frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub translation: Vector3,
    pub rotation: Quaternion,
}
