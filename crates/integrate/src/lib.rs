//! Numerical integrators: advance a state vector by one timestep given its
//! derivative.
//!
//! # Invariants
//! - `state` and the derivative buffer always have equal length.
//! - Integrators are stateless; no buffer outlives a single `solve` call.
//! - Non-finite input is not trapped; it propagates arithmetically.

mod solvers;

pub use solvers::{Euler, Midpoint, Rk4};

use serde::{Deserialize, Serialize};

/// Derivative function: reads `state`, writes its time derivative into `out`.
///
/// `out` has the same length as `state` and is zeroed before each call.
pub type Derivative<'a> = dyn FnMut(&[f64], &mut [f64]) + 'a;

/// A strategy for advancing `state` in place by `dt`.
pub trait Integrator {
    /// Advance `state` by `dt`, sampling `derivative` as often as the method needs.
    fn solve(&self, state: &mut [f64], dt: f64, derivative: &mut Derivative<'_>);

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Selects an integrator by name, e.g. from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,
    Midpoint,
    #[default]
    Rk4,
}

impl IntegratorKind {
    pub fn build(self) -> Box<dyn Integrator> {
        match self {
            Self::Euler => Box::new(Euler),
            Self::Midpoint => Box::new(Midpoint),
            Self::Rk4 => Box::new(Rk4),
        }
    }
}
