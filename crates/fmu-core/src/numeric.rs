use crate::{CoreError, CoreResult};

/// Reject NaN and infinities, naming the offending quantity.
pub fn ensure_finite(v: f64, what: &'static str) -> CoreResult<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Epsilon used when comparing simulation times.
///
/// Scales with the magnitude of `t` and with the configured relative
/// tolerance, but never drops below a few ULPs of `t`.
pub fn time_epsilon(t: f64, rel_tol: f64) -> f64 {
    let scale = 1.0 + t.abs();
    let floor = scale * 4.0 * f64::EPSILON;
    (scale * rel_tol.abs() * 1e-3).max(floor)
}

/// Number of whole `interval`s that fit in `[t0, t1]`, tolerating round-off.
pub fn boundary_count(t0: f64, t1: f64, interval: f64, eps: f64) -> u64 {
    if interval <= 0.0 || t1 < t0 {
        return 0;
    }
    ((t1 - t0 + eps) / interval).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(f64::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn time_epsilon_tracks_tolerance() {
        assert!(time_epsilon(0.0, 1e-4) > time_epsilon(0.0, 1e-8));
        assert!(time_epsilon(100.0, 1e-4) > time_epsilon(1.0, 1e-4));
        assert!(time_epsilon(1.0, 0.0) > 0.0);
    }

    #[test]
    fn boundary_count_absorbs_round_off() {
        let eps = time_epsilon(1.0, 1e-4);
        assert_eq!(boundary_count(0.0, 1.0, 0.01, eps), 100);
        assert_eq!(boundary_count(0.0, 0.3, 0.1, eps), 3);
        assert_eq!(boundary_count(0.0, 1.05, 0.1, eps), 10);
        assert_eq!(boundary_count(1.0, 0.0, 0.1, eps), 0);
    }

    proptest! {
        #[test]
        fn whole_intervals_are_always_counted(
            t0 in -100.0f64..100.0,
            interval in 1e-3f64..10.0,
            n in 1u64..200,
        ) {
            let t1 = t0 + n as f64 * interval;
            let eps = time_epsilon(t1, 1e-4);
            prop_assert_eq!(boundary_count(t0, t1, interval, eps), n);
        }
    }
}
