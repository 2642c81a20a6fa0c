// Angle helpers shared by the kinematics and module control code.
//
// Everything here is a pure function over finite f64 radians. Non-finite
// inputs are a caller precondition, not a runtime check: the control loop
// runs these every tick and wants deterministic, branch-light math.

use std::f64::consts::{PI, TAU};

/// Reduce any finite angle to its canonical representative in (-PI, PI].
///
/// Canonical to the +PI side: both `wrap_to_pi(PI)` and `wrap_to_pi(-PI)`
/// return exactly `PI`.
pub fn wrap_to_pi(angle: f64) -> f64 {
    // rem_euclid lands in [0, TAU), so the result lands in (-PI, PI].
    PI - (PI - angle).rem_euclid(TAU)
}

/// Signed minimal rotation that takes `current` onto `target`, in (-PI, PI].
pub fn shortest_delta(target: f64, current: f64) -> f64 {
    wrap_to_pi(target - current)
}

/// Fractional rotations (1.0 = one full turn) to radians.
pub fn rotations_to_radians(rotations: f64) -> f64 {
    rotations * TAU
}

/// Radians to fractional rotations.
pub fn radians_to_rotations(radians: f64) -> f64 {
    radians / TAU
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn wrap_is_exact_at_the_boundaries() {
        assert_eq!(wrap_to_pi(PI), PI);
        assert_eq!(wrap_to_pi(-PI), PI);
        assert_eq!(wrap_to_pi(0.0), 0.0);
        assert_eq!(wrap_to_pi(TAU), 0.0);
        assert_eq!(wrap_to_pi(-TAU), 0.0);
    }

    #[test]
    fn wrap_reduces_large_angles() {
        assert!((wrap_to_pi(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_to_pi(-3.0 * FRAC_PI_2) - FRAC_PI_2).abs() < 1e-12);
        assert!((wrap_to_pi(5.0 * TAU + 0.25) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn wrap_is_idempotent() {
        // Once an angle is in (-PI, PI], wrapping again must not move it at all.
        let samples = [
            -10.0, -TAU, -PI, -1.0, -1e-9, 0.0, 1e-9, 1.0, PI, TAU, 10.0, 123.456,
        ];
        for &x in &samples {
            let once = wrap_to_pi(x);
            assert!(once > -PI && once <= PI, "wrap({x}) = {once} out of range");
            assert_eq!(wrap_to_pi(once), once, "wrap not idempotent for {x}");
        }
    }

    #[test]
    fn shortest_delta_is_bounded_and_consistent() {
        let angles = [-3.0, -PI, -1.0, 0.0, 0.5, FRAC_PI_2, PI, 2.9, 6.0];
        for &target in &angles {
            for &current in &angles {
                let d = shortest_delta(target, current);
                assert!(d.abs() <= PI, "delta {d} exceeds PI");
                // Applying the delta must land on the target (mod TAU).
                let reached = wrap_to_pi(current + d);
                assert!(
                    (reached - wrap_to_pi(target)).abs() < 1e-9,
                    "current {current} + delta {d} missed target {target}"
                );
            }
        }
    }

    #[test]
    fn shortest_delta_takes_the_short_way_around() {
        // 170 deg -> -170 deg is 20 deg through the seam, not 340 deg back.
        let d = shortest_delta((-170.0f64).to_radians(), 170.0f64.to_radians());
        assert!((d - 20.0f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn rotation_conversions_round_trip() {
        assert_eq!(rotations_to_radians(0.5), PI);
        assert_eq!(radians_to_rotations(PI), 0.5);
        assert!((radians_to_rotations(rotations_to_radians(0.37)) - 0.37).abs() < 1e-15);
    }
}
