//! The benchmark facade: three multiply operations over fresh operands.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use shm_workspace::{Granularity, WorkerTally};
use tracing::info;

use crate::matrix::{Matrix, Operands};
use crate::pool::Pool;
use crate::{Config, Error, sequential};

/// Outcome of one multiply call.
#[derive(Debug, Clone)]
pub struct Product {
    pub operands: Operands,
    pub result: Matrix,
    /// Wall-clock time of the multiplication itself.
    pub elapsed: Duration,
    /// Per-worker unit counts; empty for the sequential baseline.
    pub tallies: Vec<WorkerTally>,
}

impl Product {
    pub fn elapsed_micros(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / 1e3
    }

    /// Workers that got at least one unit.
    pub fn busy_workers(&self) -> usize {
        self.tallies.iter().filter(|t| t.claimed > 0).count()
    }
}

/// One of the three execution strategies being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Sequential,
    Parallel(Granularity),
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Sequential,
        Strategy::Parallel(Granularity::Row),
        Strategy::Parallel(Granularity::Element),
    ];

    /// Column label used in result tables.
    pub fn label(self) -> &'static str {
        match self {
            Strategy::Sequential => "Sequential",
            Strategy::Parallel(Granularity::Row) => "Parallel Row",
            Strategy::Parallel(Granularity::Element) => "Parallel Element",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" | "seq" => Ok(Strategy::Sequential),
            "row" => Ok(Strategy::Parallel(Granularity::Row)),
            "element" | "cell" => Ok(Strategy::Parallel(Granularity::Element)),
            other => Err(Error::Usage(format!(
                "unknown strategy '{other}' (expected sequential, row or element)"
            ))),
        }
    }
}

/// Runs the three strategies on operands drawn from one seedable generator.
///
/// Every call allocates fresh operands, computes, and releases everything it
/// acquired before returning; nothing carries over between calls except the
/// generator state.
pub struct MatrixMul {
    pool: Pool,
    rng: StdRng,
}

impl MatrixMul {
    pub fn new(config: &Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(Pool::from_config(config), rng)
    }

    pub fn with_rng(pool: Pool, rng: StdRng) -> Self {
        Self { pool, rng }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Draws the next pair of operands from the generator.
    pub fn operands(&mut self, size: usize) -> Result<Operands, Error> {
        Operands::random(size, &mut self.rng)
    }

    pub fn run_sequential(&mut self, size: usize) -> Result<Product, Error> {
        let product = sequential::multiply(self.operands(size)?);
        info!(
            size,
            elapsed_us = product.elapsed.as_micros() as u64,
            "sequential multiply finished"
        );
        Ok(product)
    }

    pub fn run_parallel_by_row(&mut self, size: usize, workers: usize) -> Result<Product, Error> {
        let operands = self.operands(size)?;
        self.pool.multiply(Granularity::Row, operands, workers)
    }

    pub fn run_parallel_by_element(
        &mut self,
        size: usize,
        workers: usize,
    ) -> Result<Product, Error> {
        let operands = self.operands(size)?;
        self.pool.multiply(Granularity::Element, operands, workers)
    }

    /// Dispatches to one of the three operations; `workers` is ignored for
    /// the sequential baseline.
    pub fn run(
        &mut self,
        strategy: Strategy,
        size: usize,
        workers: usize,
    ) -> Result<Product, Error> {
        match strategy {
            Strategy::Sequential => self.run_sequential(size),
            Strategy::Parallel(Granularity::Row) => self.run_parallel_by_row(size, workers),
            Strategy::Parallel(Granularity::Element) => self.run_parallel_by_element(size, workers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Launcher;

    fn matrix_mul(dir: &std::path::Path, seed: u64) -> MatrixMul {
        let config = Config::default()
            .with_shm_dir(dir)
            .with_launcher(Launcher::Threads)
            .with_seed(seed);
        MatrixMul::new(&config)
    }

    #[test]
    fn test_same_seed_same_operands_across_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let seq = matrix_mul(dir.path(), 11).run_sequential(6).unwrap();
        let row = matrix_mul(dir.path(), 11).run_parallel_by_row(6, 3).unwrap();
        let element = matrix_mul(dir.path(), 11)
            .run_parallel_by_element(6, 4)
            .unwrap();

        assert_eq!(seq.operands, row.operands);
        assert_eq!(seq.operands, element.operands);
        assert_eq!(seq.result, row.result);
        assert_eq!(seq.result, element.result);
    }

    #[test]
    fn test_calls_draw_fresh_operands() {
        let dir = tempfile::tempdir().unwrap();
        let mut mm = matrix_mul(dir.path(), 5);
        let first = mm.run_sequential(3).unwrap();
        let second = mm.run_sequential(3).unwrap();
        assert_ne!(first.operands, second.operands);
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut mm = matrix_mul(dir.path(), 0);
        for strategy in Strategy::ALL {
            assert!(matches!(mm.run(strategy, 0, 2), Err(Error::InvalidSize)));
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("seq".parse::<Strategy>().unwrap(), Strategy::Sequential);
        assert_eq!(
            "row".parse::<Strategy>().unwrap(),
            Strategy::Parallel(Granularity::Row)
        );
        assert_eq!(
            "element".parse::<Strategy>().unwrap(),
            Strategy::Parallel(Granularity::Element)
        );
        assert!("diagonal".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Parallel(Granularity::Row).to_string(), "Parallel Row");
    }

    #[test]
    fn test_elapsed_micros() {
        let dir = tempfile::tempdir().unwrap();
        let mut product = matrix_mul(dir.path(), 1).run_sequential(2).unwrap();
        product.elapsed = Duration::from_micros(1500);
        assert_eq!(product.elapsed_micros(), 1500.0);
        assert_eq!(product.busy_workers(), 0);
    }
}
