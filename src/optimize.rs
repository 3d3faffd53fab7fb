//! Derivative-free minimization of the flat-field weight objective

use std::cell::Cell;

use nalgebra::DVector;

/// Result of a minimization
#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    /// Whether the tolerances were met before the evaluation budget ran out
    pub converged: bool,
}

pub trait Minimizer {
    /// Locally minimize `objective`, starting from `initial`. With no
    /// parameters at all, nothing is evaluated and the empty vector returned.
    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, initial: &[f64]) -> Minimum;
}

/// Downhill simplex with the classic reflection (1), expansion (2),
/// contraction (½) and shrink (½) coefficients.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NelderMead {
    /// Stop when every vertex lies within `x_tol` of the best, per coordinate ...
    pub x_tol: f64,
    /// ... and every vertex value within `f_tol` of the best value
    pub f_tol: f64,
    /// Budgets per parameter, for both iterations and objective evaluations
    pub iterations_per_parameter: usize,
    /// Relative step used to build the initial simplex around non-zero coordinates
    pub nonzero_step: f64,
    /// Absolute step used around zero coordinates
    pub zero_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            x_tol: 1e-4,
            f_tol: 1e-4,
            iterations_per_parameter: 200,
            nonzero_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

const RHO  : f64 = 1.0;
const CHI  : f64 = 2.0;
const PSI  : f64 = 0.5;
const SIGMA: f64 = 0.5;

struct Simplex {
    vertices: Vec<DVector<f64>>,
    values: Vec<f64>,
}

impl Simplex {
    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        self.vertices = order.iter().map(|&i| self.vertices[i].clone()).collect();
        self.values   = order.iter().map(|&i| self.values  [i]        ).collect();
    }

    fn best (&self) -> &DVector<f64> { &self.vertices[0] }
    fn worst(&self) -> &DVector<f64> { &self.vertices[self.vertices.len() - 1] }

    fn replace_worst(&mut self, vertex: DVector<f64>, value: f64) {
        let last = self.vertices.len() - 1;
        self.vertices[last] = vertex;
        self.values  [last] = value;
    }

    fn converged(&self, x_tol: f64, f_tol: f64) -> bool {
        let best = self.best();
        let x_spread = self.vertices[1..].iter()
            .map(|v| (v - best).amax())
            .fold(0.0, f64::max);
        let f_spread = self.values[1..].iter()
            .map(|f| (f - self.values[0]).abs())
            .fold(0.0, f64::max);
        x_spread <= x_tol && f_spread <= f_tol
    }

    /// Centroid of all vertices but the worst
    fn centroid(&self) -> DVector<f64> {
        let n = self.vertices.len() - 1;
        self.vertices[..n].iter().fold(DVector::zeros(n), |acc, v| acc + v) / n as f64
    }
}

impl Minimizer for NelderMead {

    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, initial: &[f64]) -> Minimum {
        let n = initial.len();
        if n == 0 {
            return Minimum { x: vec![], value: f64::NAN, evaluations: 0, converged: true }
        }
        let budget = self.iterations_per_parameter * n;
        let evaluations = Cell::new(0);
        let f = |x: &DVector<f64>| { evaluations.set(evaluations.get() + 1); objective(x.as_slice()) };

        let x0 = DVector::from_column_slice(initial);
        let mut vertices = vec![x0.clone()];
        for k in 0..n {
            let mut y = x0.clone();
            y[k] = if y[k] != 0.0 { (1.0 + self.nonzero_step) * y[k] } else { self.zero_step };
            vertices.push(y);
        }
        let values = vertices.iter().map(&f).collect();
        let mut simplex = Simplex { vertices, values };
        simplex.sort();

        let mut iterations = 1;
        let mut converged = false;
        while evaluations.get() < budget && iterations < budget {
            if simplex.converged(self.x_tol, self.f_tol) { converged = true; break }

            let centroid = simplex.centroid();
            let worst = simplex.worst().clone();
            let f_best       = simplex.values[0];
            let f_worst      = simplex.values[n];
            let f_next_worst = simplex.values[n - 1];

            let xr = &centroid * (1.0 + RHO) - &worst * RHO;
            let fr = f(&xr);

            let mut shrink = false;
            if fr < f_best {
                let xe = &centroid * (1.0 + RHO * CHI) - &worst * (RHO * CHI);
                let fe = f(&xe);
                if fe < fr { simplex.replace_worst(xe, fe) }
                else       { simplex.replace_worst(xr, fr) }
            } else if fr < f_next_worst {
                simplex.replace_worst(xr, fr);
            } else if fr < f_worst {
                // Outside contraction
                let xc = &centroid * (1.0 + PSI * RHO) - &worst * (PSI * RHO);
                let fc = f(&xc);
                if fc <= fr { simplex.replace_worst(xc, fc) }
                else        { shrink = true }
            } else {
                // Inside contraction
                let xcc = &centroid * (1.0 - PSI) + &worst * PSI;
                let fcc = f(&xcc);
                if fcc < f_worst { simplex.replace_worst(xcc, fcc) }
                else             { shrink = true }
            }

            if shrink {
                let best = simplex.best().clone();
                for j in 1..=n {
                    let v = &best + (&simplex.vertices[j] - &best) * SIGMA;
                    simplex.values[j] = f(&v);
                    simplex.vertices[j] = v;
                }
            }
            simplex.sort();
            iterations += 1;
        }
        let evaluations = evaluations.get();
        if !converged {
            log::debug!("Nelder-Mead stopped after {evaluations} evaluations without converging");
        }
        Minimum {
            x: simplex.best().as_slice().to_vec(),
            value: simplex.values[0],
            evaluations,
            converged,
        }
    }
}
