//! Average Information REML (AI-REML) over a list of variance components.
//!
//! Model: y = X*beta + e, Var(e) = Sigma = sum_k sigma_k * V_k.
//!
//! Components are updated by
//!   sigma_new = sigma_old + AI^{-1} * score
//! with score_k = 0.5 * (y'P V_k P y - tr(P V_k)) and
//! AI_kl = 0.5 * (V_k P y)' P (V_l P y), where
//! P = Sigma^{-1} - Sigma^{-1} X (X'Sigma^{-1}X)^{-1} X'Sigma^{-1}.
//! The first iteration is an EM step. All products are exact and dense.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use phenoharm_linalg::decomposition::inverse_spd;
use phenoharm_linalg::{CholeskyDecomp, DenseMatrix};

use crate::error::FitError;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Configuration for AI-REML iterations.
#[derive(Debug, Clone)]
pub struct RemlConfig {
    /// Maximum outer iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the relative change of the components.
    pub tol: f64,
    /// Components below `zero_tol * var(y)` are fixed at zero.
    pub zero_tol: f64,
}

impl Default for RemlConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-4,
            zero_tol: 1e-8,
        }
    }
}

/// Structure of one variance component.
#[derive(Debug, Clone)]
pub enum ComponentMatrix {
    /// A full symmetric matrix such as a relatedness matrix.
    Dense(DenseMatrix),
    /// A diagonal matrix, e.g. the indicator of one residual group.
    Diagonal(Vec<f64>),
}

impl ComponentMatrix {
    pub fn dim(&self) -> usize {
        match self {
            ComponentMatrix::Dense(m) => m.nrows(),
            ComponentMatrix::Diagonal(d) => d.len(),
        }
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        match self {
            ComponentMatrix::Dense(m) => m.mat_vec(v),
            ComponentMatrix::Diagonal(d) => d.iter().zip(v).map(|(a, b)| a * b).collect(),
        }
    }

    fn add_scaled_to(&self, sigma: &mut DenseMatrix, s: f64) {
        match self {
            ComponentMatrix::Dense(m) => sigma.add_scaled_assign(m, s),
            ComponentMatrix::Diagonal(d) => sigma.add_diag_assign(d, s),
        }
    }

    /// tr(P * V)
    fn trace_with(&self, p: &DenseMatrix) -> f64 {
        match self {
            ComponentMatrix::Dense(m) => p.trace_of_product(m),
            ComponentMatrix::Diagonal(d) => d.iter().enumerate().map(|(i, di)| p.get(i, i) * di).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarianceComponent {
    pub name: String,
    pub matrix: ComponentMatrix,
}

/// Result of AI-REML estimation.
#[derive(Debug, Clone)]
pub struct RemlFit {
    /// Component estimates, in input order.
    pub sigma: Vec<f64>,
    /// Components fixed at zero during estimation.
    pub at_boundary: Vec<bool>,
    /// AI^{-1} over the free components; zero rows/columns for fixed ones.
    pub sigma_cov: DenseMatrix,
    /// GLS fixed effects.
    pub beta: Vec<f64>,
    /// (X'Sigma^{-1}X)^{-1}
    pub beta_cov: DenseMatrix,
    /// P*y, which equals Sigma^{-1}(y - X*beta).
    pub py: Vec<f64>,
    pub reml_loglik: f64,
    pub ml_loglik: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Quantities that depend only on the current components.
struct Evaluation {
    p: DenseMatrix,
    py: Vec<f64>,
    beta: Vec<f64>,
    xtvx: CholeskyDecomp,
    log_det_sigma: f64,
}

impl Evaluation {
    fn new(
        y: &[f64],
        x: &DenseMatrix,
        components: &[VarianceComponent],
        sigma: &[f64],
    ) -> Result<Self, FitError> {
        let n = y.len();
        let mut sig = DenseMatrix::zeros(n, n);
        for (comp, &s) in components.iter().zip(sigma) {
            if s != 0.0 {
                comp.matrix.add_scaled_to(&mut sig, s);
            }
        }
        let chol = CholeskyDecomp::new(&sig)?;
        let sigma_inv = chol.inverse();
        let sigma_inv_x = sigma_inv.mat_mul(x);

        let xtvx = CholeskyDecomp::new(&x.t_mat_mul(&sigma_inv_x))?;
        let beta = xtvx.solve(&sigma_inv_x.t_mat_vec(y));

        // P = Sigma^{-1} - Sigma^{-1}X (X'Sigma^{-1}X)^{-1} X'Sigma^{-1}
        let correction = xtvx.solve_mat(&sigma_inv_x.transpose());
        let p = sigma_inv.sub(&sigma_inv_x.mat_mul(&correction));
        let py = p.mat_vec(y);

        Ok(Self {
            p,
            py,
            beta,
            xtvx,
            log_det_sigma: chol.log_det(),
        })
    }

    fn reml_loglik(&self, y: &[f64], n_params: usize) -> f64 {
        let n = y.len();
        let ypy = DenseMatrix::dot(y, &self.py);
        -0.5 * ((n - n_params) as f64 * LN_2PI + self.log_det_sigma + self.xtvx.log_det() + ypy)
    }

    fn ml_loglik(&self, y: &[f64], x: &DenseMatrix) -> f64 {
        let fitted = x.mat_vec(&self.beta);
        let r: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
        // Sigma^{-1} r = P y
        let quad = DenseMatrix::dot(&r, &self.py);
        -0.5 * (y.len() as f64 * LN_2PI + self.log_det_sigma + quad)
    }
}

/// Score pieces for the free components.
struct Scores {
    /// y'P V_k P y - tr(P V_k)
    raw: Vec<f64>,
    /// V_k P y
    vpy: Vec<Vec<f64>>,
}

fn scores(eval: &Evaluation, components: &[VarianceComponent], free: &[usize]) -> Scores {
    let pieces: Vec<(f64, Vec<f64>)> = free
        .par_iter()
        .map(|&k| {
            let comp = &components[k].matrix;
            let vpy = comp.mul_vec(&eval.py);
            let ypvpy = DenseMatrix::dot(&eval.py, &vpy);
            (ypvpy - comp.trace_with(&eval.p), vpy)
        })
        .collect();
    let (raw, vpy) = pieces.into_iter().unzip();
    Scores { raw, vpy }
}

fn average_information(eval: &Evaluation, vpy: &[Vec<f64>]) -> DenseMatrix {
    let pvpy: Vec<Vec<f64>> = vpy.par_iter().map(|v| eval.p.mat_vec(v)).collect();
    let m = vpy.len();
    DenseMatrix::from_fn(m, m, |k, l| 0.5 * DenseMatrix::dot(&vpy[k], &pvpy[l]))
}

/// Estimate variance components by AI-REML.
///
/// Every component starts at var(y) / m.
pub fn fit_reml(
    y: &[f64],
    x: &DenseMatrix,
    components: &[VarianceComponent],
    config: &RemlConfig,
) -> Result<RemlFit, FitError> {
    let n = y.len();
    let p = x.ncols();
    let m = components.len();
    for comp in components {
        if comp.matrix.dim() != n {
            return Err(phenoharm_linalg::LinalgError::DimensionMismatch {
                expected: n,
                got: comp.matrix.dim(),
            }
            .into());
        }
    }

    let var_y = crate::util::math::sample_variance(y);
    let floor = config.zero_tol * var_y;
    let mut sigma = vec![var_y / m as f64; m];
    let mut at_boundary = vec![false; m];

    info!("Starting AI-REML with n={}, p={}, {} variance components", n, p, m);

    let mut converged = false;
    let mut n_iterations = 0;

    for iter in 0..config.max_iter {
        n_iterations = iter + 1;
        let free: Vec<usize> = (0..m).filter(|&k| !at_boundary[k]).collect();
        if free.is_empty() {
            warn!("All variance components are fixed at zero");
            break;
        }

        let eval = Evaluation::new(y, x, components, &sigma)?;
        let sc = scores(&eval, components, &free);
        let old = sigma.clone();

        let em_step = |sigma: &mut [f64]| {
            for (i, &k) in free.iter().enumerate() {
                sigma[k] = (old[k] + old[k] * old[k] * sc.raw[i] / n as f64).max(0.0);
            }
        };

        if iter == 0 {
            em_step(&mut sigma);
        } else {
            let ai = average_information(&eval, &sc.vpy);
            let score: Vec<f64> = sc.raw.iter().map(|s| 0.5 * s).collect();
            match CholeskyDecomp::new(&ai) {
                Ok(chol) => {
                    let delta = chol.solve(&score);
                    // Step halving: shrink until no component goes negative.
                    let mut step = 1.0;
                    loop {
                        for (i, &k) in free.iter().enumerate() {
                            sigma[k] = old[k] + step * delta[i];
                        }
                        if free.iter().all(|&k| sigma[k] >= 0.0) || step < 1e-10 {
                            break;
                        }
                        step *= 0.5;
                    }
                    for &k in &free {
                        sigma[k] = sigma[k].max(0.0);
                    }
                }
                Err(_) => {
                    warn!("AI matrix is not positive definite at iteration {}; taking an EM step", iter);
                    em_step(&mut sigma);
                }
            }
        }

        for &k in &free {
            if sigma[k] < floor {
                debug!("Component {} fixed at zero", components[k].name);
                sigma[k] = 0.0;
                at_boundary[k] = true;
            }
        }

        let max_change = free
            .iter()
            .map(|&k| (sigma[k] - old[k]).abs() / (sigma[k].abs() + old[k].abs() + config.tol))
            .fold(0.0, f64::max);

        debug!(
            "AI-REML iter {}: sigma={:?}, change={:.2e}{}",
            iter,
            sigma,
            max_change,
            if iter == 0 { " (EM)" } else { "" }
        );

        if iter > 0 && max_change < config.tol {
            info!("AI-REML converged after {} iterations", iter + 1);
            converged = true;
            break;
        }
    }

    if !converged {
        warn!("AI-REML did not converge after {} iterations", n_iterations);
    }

    let eval = Evaluation::new(y, x, components, &sigma)?;
    let free: Vec<usize> = (0..m).filter(|&k| !at_boundary[k]).collect();
    let sc = scores(&eval, components, &free);
    let ai = average_information(&eval, &sc.vpy);
    let mut sigma_cov = DenseMatrix::zeros(m, m);
    match inverse_spd(&ai) {
        Ok(inv) => {
            for (i, &k) in free.iter().enumerate() {
                for (j, &l) in free.iter().enumerate() {
                    sigma_cov.set(k, l, inv.get(i, j));
                }
            }
        }
        Err(_) => {
            warn!("Variance-component covariance unavailable: AI matrix is singular");
            for &k in &free {
                sigma_cov.set(k, k, f64::NAN);
            }
        }
    }

    Ok(RemlFit {
        reml_loglik: eval.reml_loglik(y, p),
        ml_loglik: eval.ml_loglik(y, x),
        beta_cov: eval.xtvx.inverse(),
        beta: eval.beta,
        py: eval.py,
        sigma,
        at_boundary,
        sigma_cov,
        iterations: n_iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    /// Standard normal draw (Box-Muller).
    fn normal<R: Rng>(rng: &mut R) -> f64 {
        let u1: f64 = rng.gen::<f64>().max(1e-300);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn residual(n: usize) -> VarianceComponent {
        VarianceComponent {
            name: "V_resid".into(),
            matrix: ComponentMatrix::Diagonal(vec![1.0; n]),
        }
    }

    #[test]
    fn test_single_residual_component_matches_ols() {
        // With only a residual component REML gives the OLS variance estimate.
        let n = 50;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let xs: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let y: Vec<f64> = xs.iter().map(|x| 1.0 + 2.0 * x + normal(&mut rng)).collect();
        let mut data = vec![1.0; n];
        data.extend_from_slice(&xs);
        let x = DenseMatrix::from_col_major(n, 2, data);

        let fit = fit_reml(&y, &x, &[residual(n)], &RemlConfig::default()).unwrap();
        assert!(fit.converged);

        // OLS residual variance with n - p denominator
        let fitted = x.mat_vec(&fit.beta);
        let rss: f64 = y.iter().zip(&fitted).map(|(a, b)| (a - b).powi(2)).sum();
        let s2 = rss / (n - 2) as f64;
        assert!((fit.sigma[0] - s2).abs() / s2 < 1e-3, "{} vs {}", fit.sigma[0], s2);
        assert!(fit.reml_loglik.is_finite());
        assert!(fit.ml_loglik.is_finite());
    }

    #[test]
    fn test_recovers_block_random_effect() {
        // Families of size 4 sharing a random intercept: K is block-diagonal ones.
        let n_fam = 60;
        let size = 4;
        let n = n_fam * size;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n_fam {
            let u = 2.0 * normal(&mut rng);
            for _ in 0..size {
                y.push(10.0 + u + normal(&mut rng));
            }
        }
        let k = DenseMatrix::from_fn(n, n, |i, j| if i / size == j / size { 1.0 } else { 0.0 });
        let x = DenseMatrix::from_col_major(n, 1, vec![1.0; n]);
        let comps = vec![
            VarianceComponent {
                name: "V_fam".into(),
                matrix: ComponentMatrix::Dense(k),
            },
            residual(n),
        ];

        let fit = fit_reml(&y, &x, &comps, &RemlConfig::default()).unwrap();
        assert!(fit.converged, "iterations={}", fit.iterations);
        assert!(fit.sigma[0] > 1.5 && fit.sigma[0] < 7.0, "sigma_fam={}", fit.sigma[0]);
        assert!(fit.sigma[1] > 0.6 && fit.sigma[1] < 1.5, "sigma_e={}", fit.sigma[1]);
        assert!((fit.beta[0] - 10.0).abs() < 1.0);
        assert!(fit.sigma_cov.get(0, 0) > 0.0);
    }

    #[test]
    fn test_absent_random_effect_goes_to_boundary() {
        let n = 80;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let y: Vec<f64> = (0..n).map(|_| normal(&mut rng)).collect();
        let size = 2;
        let k = DenseMatrix::from_fn(n, n, |i, j| if i / size == j / size { 1.0 } else { 0.0 });
        let x = DenseMatrix::from_col_major(n, 1, vec![1.0; n]);
        let comps = vec![
            VarianceComponent {
                name: "V_pair".into(),
                matrix: ComponentMatrix::Dense(k),
            },
            residual(n),
        ];
        let fit = fit_reml(&y, &x, &comps, &RemlConfig::default()).unwrap();
        assert!(fit.sigma.iter().all(|s| *s >= 0.0));
        assert!(fit.sigma[1] > 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = DenseMatrix::from_col_major(3, 1, vec![1.0; 3]);
        assert!(fit_reml(&[1.0, 2.0, 3.0], &x, &[residual(2)], &RemlConfig::default()).is_err());
    }
}
