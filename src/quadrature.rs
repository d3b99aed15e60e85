//! One-dimensional quadrature rules and Lagrange interpolation on `[-1, 1]`.

use std::f64::consts::PI;

use crate::error::{FemError, Result};
use crate::memory::Scalar;

const NEWTON_TOL: Scalar = 1e-15;
const NEWTON_MAX_ITERS: usize = 100;

/// Quadrature point family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuadMode {
    /// Gauss-Legendre points (interior, exact to degree `2q - 1`).
    #[default]
    Gauss,
    /// Gauss-Lobatto-Legendre points (including the end points, exact to degree `2q - 3`).
    GaussLobatto,
}

/// Points and weights of a 1-D rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrature {
    /// Points in ascending order.
    pub points: Vec<Scalar>,
    /// Matching weights; they sum to 2.
    pub weights: Vec<Scalar>,
}

impl Quadrature {
    /// Builds a `q`-point rule of the given family.
    pub fn new(mode: QuadMode, q: usize) -> Result<Self> {
        match mode {
            QuadMode::Gauss => gauss(q),
            QuadMode::GaussLobatto => gauss_lobatto(q),
        }
    }
}

/// Returns `(P_n(x), P_{n-1}(x))`.
fn legendre(n: usize, x: Scalar) -> (Scalar, Scalar) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let (mut prev, mut cur) = (1.0, x);
    for k in 2..=n {
        let k = k as Scalar;
        let next = ((2.0 * k - 1.0) * x * cur - (k - 1.0) * prev) / k;
        prev = cur;
        cur = next;
    }
    (cur, prev)
}

/// Gauss-Legendre rule with `q` points.
pub fn gauss(q: usize) -> Result<Quadrature> {
    if q == 0 {
        return Err(FemError::invalid("Gauss quadrature needs at least one point"));
    }
    let n = q as Scalar;
    let mut points = vec![0.0; q];
    let mut weights = vec![0.0; q];
    for i in 0..q.div_ceil(2) {
        let mut x = (PI * (2 * i + 1) as Scalar / (2.0 * n)).cos();
        for _ in 0..NEWTON_MAX_ITERS {
            let (p, pm) = legendre(q, x);
            let dp = n * (x * p - pm) / (x * x - 1.0);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < NEWTON_TOL {
                break;
            }
        }
        let (p, pm) = legendre(q, x);
        let dp = n * (x * p - pm) / (x * x - 1.0);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = -x;
        points[q - 1 - i] = x;
        weights[i] = w;
        weights[q - 1 - i] = w;
    }
    Ok(Quadrature { points, weights })
}

/// Gauss-Lobatto-Legendre rule with `q >= 2` points.
pub fn gauss_lobatto(q: usize) -> Result<Quadrature> {
    if q < 2 {
        return Err(FemError::invalid("Gauss-Lobatto quadrature needs at least two points"));
    }
    let n = q - 1;
    let nf = n as Scalar;
    let mut points = vec![0.0; q];
    let mut weights = vec![0.0; q];
    let end_weight = 2.0 / (nf * (nf + 1.0));
    points[0] = -1.0;
    points[n] = 1.0;
    weights[0] = end_weight;
    weights[n] = end_weight;
    // interior nodes are the roots of (1 - x^2) P'_n, i.e. of P_{n-1} - x P_n
    for i in 1..=n / 2 {
        let mut x = (PI * i as Scalar / nf).cos();
        for _ in 0..NEWTON_MAX_ITERS {
            let (p, pm) = legendre(n, x);
            let dx = (pm - x * p) / ((nf + 1.0) * p);
            x += dx;
            if dx.abs() < NEWTON_TOL {
                break;
            }
        }
        let (p, _) = legendre(n, x);
        let w = end_weight / (p * p);
        points[i] = -x;
        points[n - i] = x;
        weights[i] = w;
        weights[n - i] = w;
    }
    Ok(Quadrature { points, weights })
}

/// Interpolation and derivative matrices (`points.len() x nodes.len()`,
/// row-major) of the Lagrange polynomials on `nodes`, evaluated at `points`.
pub fn lagrange_matrices(nodes: &[Scalar], points: &[Scalar]) -> Result<(Vec<Scalar>, Vec<Scalar>)> {
    let p = nodes.len();
    for (i, a) in nodes.iter().enumerate() {
        if nodes[i + 1..].iter().any(|b| (a - b).abs() <= Scalar::EPSILON) {
            return Err(FemError::invalid("Lagrange nodes must be distinct"));
        }
    }
    let mut interp = vec![0.0; points.len() * p];
    let mut grad = vec![0.0; points.len() * p];
    for (qi, &x) in points.iter().enumerate() {
        for j in 0..p {
            let mut value = 1.0;
            let mut slope = 0.0;
            for k in (0..p).filter(|&k| k != j) {
                let denom = nodes[j] - nodes[k];
                slope = slope * (x - nodes[k]) / denom + value / denom;
                value *= (x - nodes[k]) / denom;
            }
            interp[qi * p + j] = value;
            grad[qi * p + j] = slope;
        }
    }
    Ok((interp, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Scalar, b: Scalar) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn gauss_two_points() {
        let rule = gauss(2).unwrap();
        let x = 1.0 / 3.0_f64.sqrt();
        assert!(close(rule.points[0], -x) && close(rule.points[1], x));
        assert!(close(rule.weights[0], 1.0) && close(rule.weights[1], 1.0));
    }

    #[test]
    fn gauss_integrates_polynomials_exactly() {
        let rule = gauss(4).unwrap();
        // int_{-1}^{1} x^6 = 2/7
        let integral: Scalar = rule.points.iter().zip(&rule.weights).map(|(x, w)| w * x.powi(6)).sum();
        assert!(close(integral, 2.0 / 7.0));
        assert!(close(rule.weights.iter().sum(), 2.0));
    }

    #[test]
    fn lobatto_three_points() {
        let rule = gauss_lobatto(3).unwrap();
        assert_eq!(rule.points[0], -1.0);
        assert!(close(rule.points[1], 0.0));
        assert_eq!(rule.points[2], 1.0);
        assert!(close(rule.weights[0], 1.0 / 3.0));
        assert!(close(rule.weights[1], 4.0 / 3.0));
    }

    #[test]
    fn lobatto_five_points_sum_and_symmetry() {
        let rule = gauss_lobatto(5).unwrap();
        assert!(close(rule.weights.iter().sum(), 2.0));
        assert!(close(rule.points[1], -(3.0_f64 / 7.0).sqrt()));
        assert!(close(rule.points[1], -rule.points[3]));
    }

    #[test]
    fn lagrange_reproduces_linear_functions() {
        let nodes = [-1.0, 0.0, 1.0];
        let points = [-0.5, 0.25];
        let (interp, grad) = lagrange_matrices(&nodes, &points).unwrap();
        for (qi, &x) in points.iter().enumerate() {
            let row = &interp[qi * 3..qi * 3 + 3];
            let value: Scalar = row.iter().zip(&nodes).map(|(l, n)| l * (2.0 * n + 1.0)).sum();
            assert!(close(value, 2.0 * x + 1.0));
            let drow = &grad[qi * 3..qi * 3 + 3];
            let slope: Scalar = drow.iter().zip(&nodes).map(|(l, n)| l * (2.0 * n + 1.0)).sum();
            assert!(close(slope, 2.0));
        }
    }

    #[test]
    fn invalid_rules_are_rejected() {
        assert!(gauss(0).is_err());
        assert!(gauss_lobatto(1).is_err());
        assert!(lagrange_matrices(&[0.0, 0.0], &[0.5]).is_err());
    }
}
