//! Circle arithmetic in degrees.

use crate::constants::{EPSILON, FULL_CIRCLE, HALF_CIRCLE};

/// Wrap any angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(FULL_CIRCLE);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= FULL_CIRCLE { 0.0 } else { wrapped }
}

/// Map an angle into the separation comparison space [0, 180].
pub fn reduce_to_half_circle(angle: f64) -> f64 {
    let d = normalize_degrees(angle);
    d.min(FULL_CIRCLE - d)
}

/// Minimal unsigned angular distance between two longitudes, in [0, 180].
pub fn separation(a: f64, b: f64) -> f64 {
    reduce_to_half_circle((a - b).abs())
}

/// Distinct reduced target angles of harmonic `n`, ascending.
///
/// The n even divisions `k·360/n` are folded into [0, 180], so n = 4 yields
/// {0, 90, 180} and n = 8 yields {0, 45, 90, 135, 180}.
pub fn harmonic_targets(n: u32) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut targets: Vec<f64> = (0..n)
        .map(|k| reduce_to_half_circle(k as f64 * FULL_CIRCLE / n as f64))
        .collect();
    targets.sort_by(f64::total_cmp);
    targets.dedup_by(|x, y| (*x - *y).abs() < EPSILON);
    targets
}

/// Signed difference `separation − target`.
pub fn signed_distance(separation: f64, target: f64) -> f64 {
    separation - target
}

/// Whether `value` lies in [0, HALF_CIRCLE].
pub fn in_half_circle(value: f64) -> bool {
    (0.0..=HALF_CIRCLE).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_negative() {
        assert_abs_diff_eq!(normalize_degrees(-30.0), 330.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_degrees(720.5), 0.5, epsilon = 1e-12);
        assert!(normalize_degrees(-1e-18) < FULL_CIRCLE);
    }

    #[test]
    fn test_separation_wraps_short_way() {
        assert_abs_diff_eq!(separation(350.0, 10.0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(separation(10.0, 350.0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(separation(0.0, 180.0), 180.0, epsilon = 1e-12);
        assert_abs_diff_eq!(separation(90.0, 90.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_harmonic_targets_fold() {
        assert_eq!(harmonic_targets(1), vec![0.0]);
        assert_eq!(harmonic_targets(2), vec![0.0, 180.0]);
        assert_eq!(harmonic_targets(4), vec![0.0, 90.0, 180.0]);
        assert_eq!(harmonic_targets(8), vec![0.0, 45.0, 90.0, 135.0, 180.0]);
        assert!(harmonic_targets(0).is_empty());
    }

    #[test]
    fn test_harmonic_targets_odd() {
        let t = harmonic_targets(3);
        assert_eq!(t.len(), 2);
        assert_abs_diff_eq!(t[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t[1], 120.0, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_separation_in_half_circle(a in -1.0e4f64..1.0e4, b in -1.0e4f64..1.0e4) {
            let s = separation(a, b);
            prop_assert!(in_half_circle(s), "separation {s} out of range for {a}, {b}");
        }

        #[test]
        fn prop_separation_symmetric(a in 0.0f64..360.0, b in 0.0f64..360.0) {
            prop_assert!((separation(a, b) - separation(b, a)).abs() < 1e-9);
        }

        #[test]
        fn prop_targets_in_half_circle(n in 1u32..64) {
            for t in harmonic_targets(n) {
                prop_assert!(in_half_circle(t));
            }
        }
    }
}
