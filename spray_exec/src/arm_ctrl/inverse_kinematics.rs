//! Arm inverse kinematics calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};

use super::{ArmCtrlError, ArmPose, Params, SERVO_CENTER_DEG, SERVO_MAX_DEG, SERVO_MIN_DEG};
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint angles for a target, along with which joints had to be limited to the servo range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSolution {
    pub pose: ArmPose,

    pub shoulder_limited: bool,

    pub elbow_limited: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Perform the inverse kinematics calculations for the 2-link arm.
///
/// The elbow angle `q2` comes from the law of cosines, the shoulder angle `q1` is the bearing of
/// the target less the angle the second link adds:
///
/// ```text
/// cos(q2) = (x^2 + y^2 - L1^2 - L2^2) / (2 L1 L2)
/// q1      = atan2(y, x) - atan2(L2 sin(q2), L1 + L2 cos(q2))
/// ```
///
/// Angles are then moved into servo space, where the shoulder's zero is at 90 degrees and the
/// elbow angle is used directly, and limited to the servo range.
///
/// ## Arguments
/// - `x_mm`, `y_mm` - Target position relative to the shoulder joint, in millimeters
pub fn calc_inverse_kinematics(
    params: &Params,
    x_mm: f64,
    y_mm: f64,
) -> Result<IkSolution, ArmCtrlError> {
    if !x_mm.is_finite() || !y_mm.is_finite() {
        return Err(ArmCtrlError::InvalidTarget(x_mm, y_mm));
    }

    let l1 = params.link_1_length_mm;
    let l2 = params.link_2_length_mm;
    let r = x_mm.hypot(y_mm);

    if r > l1 + l2 || r < (l1 - l2).abs() {
        return Err(ArmCtrlError::Unreachable(x_mm, y_mm, r));
    }

    // Clamped as rounding can push targets on the edge of the workspace just outside [-1, 1]
    let cos_q2 = ((x_mm.powi(2) + y_mm.powi(2) - l1.powi(2) - l2.powi(2)) / (2.0 * l1 * l2))
        .max(-1.0)
        .min(1.0);
    let q2_rad = cos_q2.acos();
    let q1_rad = y_mm.atan2(x_mm) - (l2 * q2_rad.sin()).atan2(l1 + l2 * q2_rad.cos());

    let (shoulder_deg, shoulder_limited) = clamp(
        SERVO_CENTER_DEG + q1_rad.to_degrees(),
        SERVO_MIN_DEG,
        SERVO_MAX_DEG,
    );
    let (elbow_deg, elbow_limited) = clamp(q2_rad.to_degrees(), SERVO_MIN_DEG, SERVO_MAX_DEG);

    if shoulder_limited || elbow_limited {
        warn!(
            "Arm target ({:.1}, {:.1}) mm outside the servo range, joints limited",
            x_mm, y_mm
        );
    }

    debug!(
        "IK ({:.1}, {:.1}) mm -> shoulder {:.2} deg, elbow {:.2} deg",
        x_mm, y_mm, shoulder_deg, elbow_deg
    );

    Ok(IkSolution {
        pose: ArmPose {
            shoulder_deg,
            elbow_deg,
        },
        shoulder_limited,
        elbow_limited,
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Position of the nozzle for a pose, used to check solutions.
    fn forward(params: &Params, pose: &ArmPose) -> (f64, f64) {
        let q1 = (pose.shoulder_deg - SERVO_CENTER_DEG).to_radians();
        let q2 = pose.elbow_deg.to_radians();
        let l1 = params.link_1_length_mm;
        let l2 = params.link_2_length_mm;

        (
            l1 * q1.cos() + l2 * (q1 + q2).cos(),
            l1 * q1.sin() + l2 * (q1 + q2).sin(),
        )
    }

    #[test]
    fn test_reachable_targets_in_servo_range() {
        let params = Params {
            link_1_length_mm: 150.0,
            link_2_length_mm: 100.0,
            ..Params::default()
        };

        // Stay just inside the workspace edges, where rounding could go either way
        let mut r = 55.0;
        while r <= 245.0 {
            let mut theta = -180.0f64;
            while theta <= 180.0 {
                let (x, y) = (r * theta.to_radians().cos(), r * theta.to_radians().sin());
                let sol = calc_inverse_kinematics(&params, x, y).unwrap();

                assert!((0.0..=180.0).contains(&sol.pose.shoulder_deg));
                assert!((0.0..=180.0).contains(&sol.pose.elbow_deg));
                theta += 15.0;
            }
            r += 10.0;
        }
    }

    #[test]
    fn test_solution_reaches_target() {
        let params = Params::default();

        for (x, y) in [(150.0, 60.0), (100.0, -40.0), (60.0, 120.0), (200.0, 0.0)] {
            let sol = calc_inverse_kinematics(&params, x, y).unwrap();
            assert!(!sol.shoulder_limited && !sol.elbow_limited);

            let (fx, fy) = forward(&params, &sol.pose);
            assert!((fx - x).abs() < 1e-6, "x: {} vs {}", fx, x);
            assert!((fy - y).abs() < 1e-6, "y: {} vs {}", fy, y);
        }
    }

    #[test]
    fn test_full_reach_is_straight() {
        let params = Params::default();
        let sol = calc_inverse_kinematics(&params, 240.0, 0.0).unwrap();

        assert!((sol.pose.shoulder_deg - 90.0).abs() < 1e-6);
        assert!(sol.pose.elbow_deg.abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_targets() {
        let params = Params {
            link_1_length_mm: 150.0,
            link_2_length_mm: 100.0,
            ..Params::default()
        };

        assert!(matches!(
            calc_inverse_kinematics(&params, 300.0, 0.0),
            Err(ArmCtrlError::Unreachable(..))
        ));
        assert!(matches!(
            calc_inverse_kinematics(&params, 10.0, 10.0),
            Err(ArmCtrlError::Unreachable(..))
        ));
        assert!(matches!(
            calc_inverse_kinematics(&params, f64::NAN, 10.0),
            Err(ArmCtrlError::InvalidTarget(..))
        ));
    }
}
