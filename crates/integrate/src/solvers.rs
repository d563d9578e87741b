use crate::{Derivative, Integrator};

fn sample(derivative: &mut Derivative<'_>, state: &[f64], out: &mut [f64]) {
    out.fill(0.0);
    derivative(state, out);
}

/// Explicit (forward) Euler: `x += dt * f(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Integrator for Euler {
    fn solve(&self, state: &mut [f64], dt: f64, derivative: &mut Derivative<'_>) {
        let mut k = vec![0.0; state.len()];
        sample(derivative, state, &mut k);
        for (x, dx) in state.iter_mut().zip(&k) {
            *x += dt * dx;
        }
    }

    fn name(&self) -> &'static str {
        "euler"
    }
}

/// Explicit midpoint method (second-order Runge-Kutta).
#[derive(Debug, Clone, Copy, Default)]
pub struct Midpoint;

impl Integrator for Midpoint {
    fn solve(&self, state: &mut [f64], dt: f64, derivative: &mut Derivative<'_>) {
        let n = state.len();
        let mut k1 = vec![0.0; n];
        sample(derivative, state, &mut k1);

        let mid: Vec<f64> = state
            .iter()
            .zip(&k1)
            .map(|(x, k)| x + 0.5 * dt * k)
            .collect();
        let mut k2 = vec![0.0; n];
        sample(derivative, &mid, &mut k2);

        for (x, k) in state.iter_mut().zip(&k2) {
            *x += dt * k;
        }
    }

    fn name(&self) -> &'static str {
        "midpoint"
    }
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Integrator for Rk4 {
    fn solve(&self, state: &mut [f64], dt: f64, derivative: &mut Derivative<'_>) {
        let n = state.len();
        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];
        let mut stage = vec![0.0; n];

        sample(derivative, state, &mut k1);

        offset(&mut stage, state, &k1, 0.5 * dt);
        sample(derivative, &stage, &mut k2);

        offset(&mut stage, state, &k2, 0.5 * dt);
        sample(derivative, &stage, &mut k3);

        offset(&mut stage, state, &k3, dt);
        sample(derivative, &stage, &mut k4);

        for (i, x) in state.iter_mut().enumerate() {
            *x += dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
    }

    fn name(&self) -> &'static str {
        "rk4"
    }
}

/// `out = base + scale * k`
fn offset(out: &mut [f64], base: &[f64], k: &[f64], scale: f64) {
    for ((o, b), k) in out.iter_mut().zip(base).zip(k) {
        *o = b + scale * k;
    }
}
