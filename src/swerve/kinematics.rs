// Inverse kinematics for a four-wheel swerve base.
//
// Converts a chassis-frame velocity command into the (speed, angle) state
// each wheel module must take, then rescales speeds against the physical
// wheel-speed limit. Both operations are pure: same input, same bits out.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use super::angle::wrap_to_pi;

/// Number of wheel modules on the base.
pub const MODULE_COUNT: usize = 4;

/// Fixed module order used everywhere: front-left, front-right, back-left,
/// back-right. Geometry arrays and module-state arrays must agree on this.
pub const MODULE_NAMES: [&str; MODULE_COUNT] = ["FL", "FR", "BL", "BR"];

/// Chassis-frame velocity command for one control tick.
///
/// +x is robot forward, +y is robot left, omega is counter-clockwise positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisSpeeds {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_radps: f64,
}

impl ChassisSpeeds {
    pub fn new(vx_mps: f64, vy_mps: f64, omega_radps: f64) -> Self {
        Self {
            vx_mps,
            vy_mps,
            omega_radps,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Target state for one wheel module. Speed is signed wheel travel in m/s
/// (negative means the wheel rolls backwards); angle is in (-PI, PI].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed_mps: f64,
    pub angle_rad: f64,
}

impl ModuleState {
    pub fn new(speed_mps: f64, angle_rad: f64) -> Self {
        Self {
            speed_mps,
            angle_rad,
        }
    }
}

/// 2D offset of a module's contact point from the robot's rotation center,
/// in meters. +x forward, +y left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleTranslation {
    pub x_m: f64,
    pub y_m: f64,
}

impl ModuleTranslation {
    pub const fn new(x_m: f64, y_m: f64) -> Self {
        Self { x_m, y_m }
    }
}

/// Stateless chassis-to-module transform for a fixed module geometry.
pub struct SwerveKinematics {
    translations: [ModuleTranslation; MODULE_COUNT],
}

impl SwerveKinematics {
    /// Build kinematics for the given module offsets (FL, FR, BL, BR order).
    ///
    /// Rejects non-finite offsets and duplicate module positions: two modules
    /// at the same offset make the geometry degenerate.
    pub fn new(translations: [ModuleTranslation; MODULE_COUNT]) -> Result<Self, ConfigError> {
        for (i, t) in translations.iter().enumerate() {
            if !t.x_m.is_finite() || !t.y_m.is_finite() {
                return Err(ConfigError::NonFiniteTranslation {
                    module: MODULE_NAMES[i],
                });
            }
        }
        for i in 0..MODULE_COUNT {
            for j in (i + 1)..MODULE_COUNT {
                if translations[i] == translations[j] {
                    return Err(ConfigError::DuplicateTranslation {
                        first: MODULE_NAMES[i],
                        second: MODULE_NAMES[j],
                    });
                }
            }
        }
        Ok(Self { translations })
    }

    /// Chassis velocity -> per-module target states, in FL, FR, BL, BR order.
    ///
    /// Each module's velocity vector is the chassis linear velocity plus the
    /// tangential velocity from chassis rotation about that module's offset:
    /// v_i = (vx - omega * y_i, vy + omega * x_i). With omega = 0 all four
    /// modules come out identical.
    pub fn to_module_states(&self, chassis: &ChassisSpeeds) -> [ModuleState; MODULE_COUNT] {
        self.translations.map(|t| {
            let vx = chassis.vx_mps - chassis.omega_radps * t.y_m;
            let vy = chassis.vy_mps + chassis.omega_radps * t.x_m;
            ModuleState::new(vx.hypot(vy), wrap_to_pi(vy.atan2(vx)))
        })
    }
}

/// Proportionally rescale module speeds so none exceeds `max_speed_mps`.
///
/// Scaling every module by the same factor preserves the speed ratios across
/// modules and therefore the commanded path curvature; clamping each module
/// independently would distort the turn radius.
pub fn desaturate(states: &mut [ModuleState; MODULE_COUNT], max_speed_mps: f64) {
    let max_achieved = states
        .iter()
        .map(|s| s.speed_mps.abs())
        .fold(0.0f64, f64::max);

    if max_achieved > max_speed_mps {
        let scale = max_speed_mps / max_achieved;
        for state in states.iter_mut() {
            state.speed_mps *= scale;
        }
    }
}
