//! State-event detection and location.

use crate::error::SimResult;
use crate::integrator::State;

/// Upper bound on `newDiscreteStates` passes per event.
pub const MAX_EVENT_ITERATIONS: usize = 100;

/// Whether an indicator changed sign between two samples.
///
/// An indicator resting at zero does not count, so a value left at zero by
/// the previous event does not fire again.
pub fn crossed(prev: f64, next: f64) -> bool {
    (prev < 0.0 && next >= 0.0) || (prev > 0.0 && next <= 0.0)
}

pub fn any_crossing(z0: &[f64], z1: &[f64]) -> bool {
    z0.iter().zip(z1).any(|(a, b)| crossed(*a, *b))
}

/// Cubic Hermite interpolant of the state across one solver step.
#[derive(Clone, Debug)]
pub struct Hermite {
    pub t0: f64,
    pub t1: f64,
    pub x0: State,
    pub x1: State,
    pub d0: State,
    pub d1: State,
}

impl Hermite {
    pub fn eval(&self, t: f64) -> State {
        let h = self.t1 - self.t0;
        if h <= 0.0 {
            return self.x1.clone();
        }
        let s = ((t - self.t0) / h).clamp(0.0, 1.0);
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        &self.x0 * h00 + &self.d0 * (h10 * h) + &self.x1 * h01 + &self.d1 * (h11 * h)
    }
}

/// Bracket the first crossing in `(t0, t1]` by bisection.
///
/// `z0` holds the indicators at `t0`; `eval_z` evaluates them at any time in
/// the step. Returns `(lo, hi)` with no crossing at `lo` and a crossing at
/// `hi`, narrowed until `hi - lo <= width`.
pub fn locate<F>(t0: f64, t1: f64, z0: &[f64], width: f64, mut eval_z: F) -> SimResult<(f64, f64)>
where
    F: FnMut(f64) -> SimResult<Vec<f64>>,
{
    let mut lo = t0;
    let mut hi = t1;
    let width = width.max(f64::EPSILON * (1.0 + t1.abs()));
    while hi - lo > width {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let z = eval_z(mid)?;
        if any_crossing(z0, &z) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok((lo, hi))
}

/// Bisection width for an event near `t`.
pub fn location_width(t: f64, tolerance: f64) -> f64 {
    tolerance * t.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_after_event_does_not_retrigger() {
        assert!(crossed(-1.0, 0.0));
        assert!(crossed(1.0, 0.0));
        assert!(crossed(1.0, -1.0));
        assert!(!crossed(0.0, 1.0));
        assert!(!crossed(0.0, -1.0));
        assert!(!crossed(1.0, 2.0));
    }

    #[test]
    fn hermite_is_exact_for_cubics() {
        // x(t) = t^3, x'(t) = 3 t^2 on [0, 2]
        let herm = Hermite {
            t0: 0.0,
            t1: 2.0,
            x0: State::from_vec(vec![0.0]),
            x1: State::from_vec(vec![8.0]),
            d0: State::from_vec(vec![0.0]),
            d1: State::from_vec(vec![12.0]),
        };
        for t in [0.0, 0.5, 1.0, 1.5, 2.0] {
            assert!((herm.eval(t)[0] - t * t * t).abs() < 1e-12);
        }
    }

    #[test]
    fn bisection_brackets_root() {
        let root = 0.3;
        let (lo, hi) = locate(0.0, 1.0, &[-root], 1e-6, |t| Ok(vec![t - root])).unwrap();
        assert!(hi - lo <= 1e-6);
        assert!(lo < root && root <= hi);
    }
}
