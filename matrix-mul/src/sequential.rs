//! Single-threaded reference multiplier.

use std::time::Instant;

use crate::Product;
use crate::matrix::{Matrix, Operands, dot};

/// Computes A·B with the textbook i-j-k triple loop.
pub fn multiply(operands: Operands) -> Product {
    let size = operands.size();
    let mut result = Matrix::zeros(size);

    let start = Instant::now();
    {
        let (a, b) = (operands.a.as_slice(), operands.b.as_slice());
        let c = result.as_mut_slice();
        for i in 0..size {
            for j in 0..size {
                c[i * size + j] = dot(a, b, size, i, j);
            }
        }
    }
    let elapsed = start.elapsed();

    Product {
        operands,
        result,
        elapsed,
        tallies: Vec::new(),
    }
}
