//! Timing comparison across strategies and worker counts.

use tracing::info;

use crate::{Error, MatrixMul, Product, Strategy};

/// Parallel timings for one worker count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub workers: usize,
    pub row_micros: f64,
    pub element_micros: f64,
}

/// Every timing gathered for one matrix size.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub size: usize,
    pub sequential_micros: f64,
    pub parallel: Vec<Timing>,
}

/// Runs the sequential baseline once, then both parallel modes for each
/// entry of `worker_counts`.
///
/// `observe` sees every product as it is produced, in run order.
pub fn compare<F>(
    mm: &mut MatrixMul,
    size: usize,
    worker_counts: &[usize],
    mut observe: F,
) -> Result<Comparison, Error>
where
    F: FnMut(Strategy, usize, &Product),
{
    let sequential = mm.run(Strategy::Sequential, size, 1)?;
    observe(Strategy::Sequential, 1, &sequential);
    let sequential_micros = sequential.elapsed_micros();
    info!(size, micros = sequential_micros, "sequential baseline");

    let mut parallel = Vec::with_capacity(worker_counts.len());
    for &workers in worker_counts {
        let mut micros = [0.0; 2];
        for (slot, strategy) in micros.iter_mut().zip(&Strategy::ALL[1..]) {
            let product = mm.run(*strategy, size, workers)?;
            observe(*strategy, workers, &product);
            *slot = product.elapsed_micros();
            info!(size, workers, strategy = %strategy, micros = *slot, "parallel timing");
        }
        parallel.push(Timing {
            workers,
            row_micros: micros[0],
            element_micros: micros[1],
        });
    }

    Ok(Comparison {
        size,
        sequential_micros,
        parallel,
    })
}
