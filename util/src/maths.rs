//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Limit a value to the range `[min, max]`.
///
/// Returns the clamped value and whether clamping occured.
pub fn clamp<T>(value: T, min: T, max: T) -> (T, bool)
where
    T: Float,
{
    if value > max {
        (max, true)
    } else if value < min {
        (min, true)
    } else {
        (value, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        // Servo angle to duty cycle
        assert_eq!(lin_map((0f64, 180f64), (2f64, 12f64), 0f64), 2f64);
        assert_eq!(lin_map((0f64, 180f64), (2f64, 12f64), 90f64), 7f64);
        assert_eq!(lin_map((0f64, 180f64), (2f64, 12f64), 180f64), 12f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(31f64, 0f64, 30f64), (30f64, true));
        assert_eq!(clamp(-1f64, 0f64, 30f64), (0f64, true));
        assert_eq!(clamp(12.5f64, 0f64, 30f64), (12.5f64, false));
    }
}
