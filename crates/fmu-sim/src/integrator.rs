//! One-step ODE integrators.

use crate::error::{SimError, SimResult};
use nalgebra::DVector;
use std::str::FromStr;

pub type State = DVector<f64>;

/// Right-hand side `dx/dt = f(t, x)` of an ODE.
pub trait OdeSystem {
    fn rhs(&mut self, t: f64, x: &State) -> SimResult<State>;
}

/// Result of a single integrator step.
#[derive(Clone, Debug)]
pub struct StepResult {
    pub x: State,
    /// Embedded error estimate, for integrators that provide one.
    pub error: Option<State>,
}

/// Trait for time integrators.
pub trait Integrator {
    /// Advance state by one time step.
    fn step<S: OdeSystem>(&self, sys: &mut S, t: f64, x: &State, dt: f64)
    -> SimResult<StepResult>;
}

/// Forward Euler (explicit, 1st order).
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &State,
        dt: f64,
    ) -> SimResult<StepResult> {
        let xdot = sys.rhs(t, x)?;
        Ok(StepResult {
            x: x + xdot * dt,
            error: None,
        })
    }
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &State,
        dt: f64,
    ) -> SimResult<StepResult> {
        let k1 = sys.rhs(t, x)?;
        let k2 = sys.rhs(t + 0.5 * dt, &(x + &k1 * (0.5 * dt)))?;
        let k3 = sys.rhs(t + 0.5 * dt, &(x + &k2 * (0.5 * dt)))?;
        let k4 = sys.rhs(t + dt, &(x + &k3 * dt))?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        let k_sum = k1 + k2 * 2.0 + k3 * 2.0 + k4;
        Ok(StepResult {
            x: x + k_sum * (dt / 6.0),
            error: None,
        })
    }
}

/// Dormand-Prince 5(4) with an embedded 4th-order error estimate.
#[derive(Clone, Debug)]
pub struct Dopri45;

const C: [f64; 6] = [1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A2: [f64; 1] = [1.0 / 5.0];
const A3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
const A4: [f64; 3] = [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0];
const A5: [f64; 4] = [
    19372.0 / 6561.0,
    -25360.0 / 2187.0,
    64448.0 / 6561.0,
    -212.0 / 729.0,
];
const A6: [f64; 5] = [
    9017.0 / 3168.0,
    -355.0 / 33.0,
    46732.0 / 5247.0,
    49.0 / 176.0,
    -5103.0 / 18656.0,
];
const B5: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];
// b5 - b4, including the FSAL stage.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

fn combine(x: &State, ks: &[State], coeffs: &[f64], dt: f64) -> State {
    let mut out = x.clone();
    for (k, c) in ks.iter().zip(coeffs) {
        if *c != 0.0 {
            out.axpy(dt * c, k, 1.0);
        }
    }
    out
}

impl Integrator for Dopri45 {
    fn step<S: OdeSystem>(
        &self,
        sys: &mut S,
        t: f64,
        x: &State,
        dt: f64,
    ) -> SimResult<StepResult> {
        let mut ks: Vec<State> = Vec::with_capacity(7);
        ks.push(sys.rhs(t, x)?);
        for (i, a) in [&A2[..], &A3[..], &A4[..], &A5[..], &A6[..]]
            .into_iter()
            .enumerate()
        {
            let xi = combine(x, &ks, a, dt);
            ks.push(sys.rhs(t + C[i] * dt, &xi)?);
        }
        let x_new = combine(x, &ks, &B5, dt);
        ks.push(sys.rhs(t + dt, &x_new)?);

        let zero = State::zeros(x.len());
        let error = combine(&zero, &ks, &E, dt);
        Ok(StepResult {
            x: x_new,
            error: Some(error),
        })
    }
}

/// Integrator selection for model-exchange runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntegratorType {
    /// Forward Euler (1st-order, 1 rhs call per step).
    ForwardEuler,
    /// 4th-order Runge-Kutta (default, 4 rhs calls per step).
    #[default]
    RK4,
    /// Dormand-Prince 5(4), variable step.
    Dopri45,
}

impl IntegratorType {
    pub fn name(self) -> &'static str {
        match self {
            IntegratorType::ForwardEuler => "euler",
            IntegratorType::RK4 => "rk4",
            IntegratorType::Dopri45 => "dopri45",
        }
    }

    pub fn is_adaptive(self) -> bool {
        matches!(self, IntegratorType::Dopri45)
    }

    /// Advance one step with the selected integrator.
    pub fn step<S: OdeSystem>(
        self,
        sys: &mut S,
        t: f64,
        x: &State,
        dt: f64,
    ) -> SimResult<StepResult> {
        match self {
            IntegratorType::ForwardEuler => ForwardEuler.step(sys, t, x, dt),
            IntegratorType::RK4 => RK4.step(sys, t, x, dt),
            IntegratorType::Dopri45 => Dopri45.step(sys, t, x, dt),
        }
    }
}

impl FromStr for IntegratorType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" | "forward_euler" => Ok(IntegratorType::ForwardEuler),
            "rk4" => Ok(IntegratorType::RK4),
            "dopri45" | "rk45" => Ok(IntegratorType::Dopri45),
            _ => Err(SimError::UnknownSolver {
                name: s.to_string(),
            }),
        }
    }
}

/// Scaled error norm; a step is acceptable when this is at most 1.
pub fn error_norm(error: &State, x0: &State, x1: &State, rel_tol: f64) -> f64 {
    let abs_tol = rel_tol;
    error
        .iter()
        .zip(x0.iter().zip(x1.iter()))
        .map(|(e, (a, b))| e.abs() / (abs_tol + rel_tol * a.abs().max(b.abs())))
        .fold(0.0, f64::max)
}

/// Step size factor after a step with the given error norm.
pub fn step_factor(norm: f64) -> f64 {
    if norm <= 0.0 {
        return 5.0;
    }
    (0.9 * norm.powf(-0.2)).clamp(0.2, 5.0)
}
