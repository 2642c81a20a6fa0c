// Message types crossing the zenoh boundary

use serde::{Deserialize, Serialize};

// Command from teleop/scripts -> runtime. Velocities are field-frame when
// field_relative is set, chassis-frame otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCommand {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_radps: f64,
    #[serde(default)]
    pub field_relative: bool,
}

impl DriveCommand {
    pub fn stop() -> Self {
        Self {
            vx_mps: 0.0,
            vy_mps: 0.0,
            omega_radps: 0.0,
            field_relative: false,
        }
    }
}

/// Health status published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_command_round_trips_as_json() {
        let cmd = DriveCommand {
            vx_mps: 1.5,
            vy_mps: -0.5,
            omega_radps: 0.25,
            field_relative: true,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: DriveCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vx_mps, 1.5);
        assert_eq!(back.vy_mps, -0.5);
        assert_eq!(back.omega_radps, 0.25);
        assert!(back.field_relative);
    }

    #[test]
    fn field_relative_defaults_to_false() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"vx_mps":0.1,"vy_mps":0.0,"omega_radps":0.0}"#).unwrap();
        assert!(!cmd.field_relative);
    }
}
