//! Square row-major matrices and operand population.

use std::fmt;

use rand::Rng;

use crate::Error;

/// A `size`×`size` matrix of `f64`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    size: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size);
        for i in 0..size {
            m.data[i * size + i] = 1.0;
        }
        m
    }

    pub fn from_vec(size: usize, data: Vec<f64>) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidSize);
        }
        let expected = size * size;
        if data.len() != expected {
            return Err(Error::Shape {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.size..(row + 1) * self.size]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Largest element-wise relative error against `other`.
    ///
    /// Cells where both values are zero count as exact. Matrices of
    /// different sizes compare as infinitely far apart.
    pub fn max_relative_error(&self, other: &Matrix) -> f64 {
        if self.size != other.size {
            return f64::INFINITY;
        }
        self.data
            .iter()
            .zip(&other.data)
            .map(|(&x, &y)| {
                let scale = x.abs().max(y.abs());
                if scale == 0.0 { 0.0 } else { (x - y).abs() / scale }
            })
            .fold(0.0, f64::max)
    }
}

/// Prints one row per line, each cell as `%f` followed by a space.
impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.chunks(self.size.max(1)) {
            for value in row {
                write!(f, "{value:.6} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The two inputs of one product.
#[derive(Debug, Clone, PartialEq)]
pub struct Operands {
    pub a: Matrix,
    pub b: Matrix,
}

impl Operands {
    pub fn new(a: Matrix, b: Matrix) -> Result<Self, Error> {
        if a.size() != b.size() {
            return Err(Error::OperandMismatch(a.size(), b.size()));
        }
        Ok(Self { a, b })
    }

    /// Fresh operands with every value drawn uniformly from `[0, 1)`.
    pub fn random<R: Rng>(size: usize, rng: &mut R) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidSize);
        }
        let mut a = Matrix::zeros(size);
        let mut b = Matrix::zeros(size);
        populate(a.as_mut_slice(), b.as_mut_slice(), rng);
        Ok(Self { a, b })
    }

    pub fn size(&self) -> usize {
        self.a.size()
    }
}

/// Fills `a` and `b` from `rng`, alternating between them element by
/// element, so a given seed always yields the same pair.
pub fn populate<R: Rng>(a: &mut [f64], b: &mut [f64], rng: &mut R) {
    for (x, y) in a.iter_mut().zip(b.iter_mut()) {
        *x = rng.gen_range(0.0..1.0);
        *y = rng.gen_range(0.0..1.0);
    }
}

/// C[row][col] = Σ_k A[row][k]·B[k][col], accumulated in k order.
///
/// Every strategy computes cells through this function, so their results
/// are bit-identical for the same operands.
#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64], size: usize, row: usize, col: usize) -> f64 {
    let mut sum = 0.0;
    for k in 0..size {
        sum += a[row * size + k] * b[k * size + col];
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_identity() {
        let m = Matrix::identity(3);
        assert_eq!(m.row(0), &[1.0, 0.0, 0.0]);
        assert_eq!(m.row(2), &[0.0, 0.0, 1.0]);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_from_vec_checks_shape() {
        assert!(matches!(
            Matrix::from_vec(2, vec![1.0; 3]),
            Err(Error::Shape { expected: 4, got: 3 })
        ));
        assert!(matches!(Matrix::from_vec(0, vec![]), Err(Error::InvalidSize)));
        assert_eq!(Matrix::from_vec(1, vec![2.0]).unwrap().get(0, 0), 2.0);
    }

    #[test]
    fn test_operand_mismatch() {
        let err = Operands::new(Matrix::zeros(2), Matrix::zeros(3)).unwrap_err();
        assert!(matches!(err, Error::OperandMismatch(2, 3)));
    }

    #[test]
    fn test_seeded_population_is_reproducible() {
        let first = Operands::random(8, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = Operands::random(8, &mut StdRng::seed_from_u64(42)).unwrap();
        let other = Operands::random(8, &mut StdRng::seed_from_u64(43)).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(
            first
                .a
                .as_slice()
                .iter()
                .chain(first.b.as_slice())
                .all(|v| (0.0..1.0).contains(v))
        );
    }

    #[test]
    fn test_random_rejects_zero_size() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(Operands::random(0, &mut rng), Err(Error::InvalidSize)));
    }

    #[test]
    fn test_dot() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        assert_eq!(dot(&a, &b, 2, 0, 0), 19.0);
        assert_eq!(dot(&a, &b, 2, 0, 1), 22.0);
        assert_eq!(dot(&a, &b, 2, 1, 0), 43.0);
        assert_eq!(dot(&a, &b, 2, 1, 1), 50.0);
    }

    #[test]
    fn test_display() {
        let m = Matrix::from_vec(2, vec![1.0, 0.5, 0.25, 2.0]).unwrap();
        assert_eq!(
            m.to_string(),
            "1.000000 0.500000 \n0.250000 2.000000 \n"
        );
    }

    #[test]
    fn test_max_relative_error() {
        let a = Matrix::from_vec(2, vec![1.0, 0.0, 2.0, 4.0]).unwrap();
        let mut b = a.clone();
        assert_eq!(a.max_relative_error(&b), 0.0);

        b.as_mut_slice()[3] = 5.0;
        assert!((a.max_relative_error(&b) - 0.2).abs() < 1e-12);
        assert_eq!(a.max_relative_error(&Matrix::zeros(3)), f64::INFINITY);
    }
}
