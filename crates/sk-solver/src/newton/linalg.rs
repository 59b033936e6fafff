//! Dense linear algebra for the Newton solver

/// Relative length below which an orthogonalized row counts as dependent
const RANK_TOLERANCE: f64 = 1e-6;

pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row space factorization of a Jacobian by modified Gram-Schmidt.
///
/// Rows are visited in order. Each independent row `r` satisfies
/// `r = sum(coeffs[i][k] * basis[k])` over the basis built so far, so the
/// coefficients form a lower triangular matrix. A row that is a combination
/// of earlier rows is recorded as dependent and contributes nothing.
#[derive(Debug, Default)]
pub struct RowBasis {
    /// Orthonormal rows spanning the row space
    basis: Vec<Vec<f64>>,
    /// Coefficients of each independent row against `basis`
    coeffs: Vec<Vec<f64>>,
    /// Index into the Jacobian of each independent row
    independent: Vec<usize>,
    dependent: Vec<usize>,
}

impl RowBasis {
    pub fn new(j: &[Vec<f64>]) -> Self {
        let mut factor = RowBasis::default();
        for (index, row) in j.iter().enumerate() {
            let scale = norm(row).max(1.0);
            let mut v = row.clone();
            let mut coeffs = Vec::with_capacity(factor.basis.len() + 1);
            for q in &factor.basis {
                let c = dot(&v, q);
                for (vi, qi) in v.iter_mut().zip(q) {
                    *vi -= c * qi;
                }
                coeffs.push(c);
            }

            let length = norm(&v);
            if length <= RANK_TOLERANCE * scale {
                factor.dependent.push(index);
                continue;
            }
            coeffs.push(length);
            factor.basis.push(v.into_iter().map(|x| x / length).collect());
            factor.coeffs.push(coeffs);
            factor.independent.push(index);
        }
        factor
    }

    pub fn rank(&self) -> usize {
        self.basis.len()
    }

    /// Rows that were combinations of earlier rows, in ascending order
    pub fn dependent(&self) -> &[usize] {
        &self.dependent
    }

    /// Minimum norm step `dx` with `J * dx = -f` on every independent row.
    ///
    /// Dependent rows are left out; if they contradict the others the
    /// residual stays and the caller sees it.
    pub fn step(&self, f: &[f64], n_vars: usize) -> Vec<f64> {
        // Forward substitution through the triangular coefficients
        let mut y: Vec<f64> = Vec::with_capacity(self.rank());
        for (coeffs, &row) in self.coeffs.iter().zip(&self.independent) {
            let known = dot(&coeffs[..y.len()], &y);
            let diagonal = coeffs[y.len()];
            y.push((-f[row] - known) / diagonal);
        }

        let mut dx = vec![0.0; n_vars];
        for (q, yk) in self.basis.iter().zip(&y) {
            for (d, qi) in dx.iter_mut().zip(q) {
                *d += yk * qi;
            }
        }
        dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_step() {
        // 2y = 4, x + y = 3 from the origin
        let j = vec![vec![0.0, 2.0], vec![1.0, 1.0]];
        let f = vec![-4.0, -3.0];
        let factor = RowBasis::new(&j);
        assert_eq!(factor.rank(), 2);
        let dx = factor.step(&f, 2);
        assert_relative_eq!(dx[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dx[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_underdetermined_step() {
        // One equation, two unknowns: x + y = 2 from (0, 0)
        let j = vec![vec![1.0, 1.0]];
        let f = vec![-2.0];
        let dx = RowBasis::new(&j).step(&f, 2);
        assert_relative_eq!(dx[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dx[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dependent_rows() {
        let j = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![2.0, -3.0, 0.0],
            vec![0.0, 0.0, 0.0],
        ];
        let factor = RowBasis::new(&j);
        assert_eq!(factor.rank(), 2);
        assert_eq!(factor.dependent(), &[2, 3]);
    }

    #[test]
    fn test_contradicting_row_is_skipped() {
        // x = 1 and 2x = 6 cannot both hold; the first one wins
        let j = vec![vec![1.0, 0.0], vec![2.0, 0.0]];
        let f = vec![-1.0, -6.0];
        let factor = RowBasis::new(&j);
        assert_eq!(factor.dependent(), &[1]);
        let dx = factor.step(&f, 2);
        assert_relative_eq!(dx[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dx[1], 0.0);
    }

    #[test]
    fn test_empty_system() {
        let factor = RowBasis::new(&[]);
        assert_eq!(factor.rank(), 0);
        assert_eq!(factor.step(&[], 3), vec![0.0; 3]);
    }
}
