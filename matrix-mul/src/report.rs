//! Plain-text result table and gnuplot script for one comparison.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Error;
use crate::bench::Comparison;

pub const DATA_HEADER: &str = "Processes Sequential ParallelRow ParallelElement";

pub fn data_file_name(size: usize) -> String {
    format!("matrix_mult_data_{size}.txt")
}

pub fn script_file_name(size: usize) -> String {
    format!("plot_script_{size}.gp")
}

/// One header line, a single-process row carrying the sequential time in
/// every column, then one row per worker count.
pub fn render_data(comparison: &Comparison) -> String {
    let seq = comparison.sequential_micros;
    let mut out = String::new();
    let _ = writeln!(out, "{DATA_HEADER}");
    let _ = writeln!(out, "1 {seq:.6} {seq:.6} {seq:.6}");
    for timing in &comparison.parallel {
        let _ = writeln!(
            out,
            "{} {seq:.6} {:.6} {:.6}",
            timing.workers, timing.row_micros, timing.element_micros
        );
    }
    out
}

pub fn render_script(size: usize) -> String {
    let data = data_file_name(size);
    format!(
        "set title 'Matrix Multiplication Comparison (Size {size}x{size})'\n\
         set xlabel 'Number of Processes'\n\
         set ylabel 'Execution Time (microseconds)'\n\
         set key right bottom\n\
         set logscale y\n\
         plot '{data}' using 1:2 with linespoints title 'Sequential', \\\n\
         \x20    '' using 1:3 with linespoints title 'Parallel Row', \\\n\
         \x20    '' using 1:4 with linespoints title 'Parallel Element'\n\
         pause -1 'Press any key to continue'\n"
    )
}

pub fn write_data_file(dir: &Path, comparison: &Comparison) -> Result<PathBuf, Error> {
    let path = dir.join(data_file_name(comparison.size));
    fs::write(&path, render_data(comparison))?;
    debug!(path = %path.display(), "wrote data file");
    Ok(path)
}

pub fn write_gnuplot_script(dir: &Path, size: usize) -> Result<PathBuf, Error> {
    let path = dir.join(script_file_name(size));
    fs::write(&path, render_script(size))?;
    debug!(path = %path.display(), "wrote gnuplot script");
    Ok(path)
}
