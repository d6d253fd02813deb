//! The worker loop: claim a unit under the lock, compute it outside.

use std::path::Path;

use shm_workspace::SharedWorkspace;
use tracing::debug;

use crate::Error;
use crate::matrix::dot;

/// First CLI argument that turns the binary into a worker process.
pub const WORKER_COMMAND: &str = "worker";

/// Claims and computes units until the cursor is exhausted.
///
/// Returns the number of units this worker completed. The granularity is a
/// property of the workspace, so the same loop serves row and element mode:
/// a row claim fills a whole row of C, a cell claim a single cell.
pub fn run(ws: &SharedWorkspace, worker: usize) -> Result<u64, shm_workspace::Error> {
    let size = ws.size();
    let (a, b) = ws.operands();
    debug!(worker, granularity = %ws.granularity(), "worker started");

    let mut completed = 0;
    while let Some(claim) = ws.claim(worker)? {
        claim.fill(|row, col| dot(a, b, size, row, col));
        completed += 1;
    }

    debug!(worker, completed, "worker finished");
    Ok(completed)
}

/// Body of a worker process: attach to `region` and run the loop as
/// `worker`.
pub fn run_process(region: &Path, worker: usize) -> Result<u64, Error> {
    let ws = SharedWorkspace::open(region)?;
    Ok(run(&ws, worker)?)
}

/// Parses `<region-path> <worker-id>` following [`WORKER_COMMAND`].
pub fn parse_args(args: &[String]) -> Result<(&Path, usize), Error> {
    let usage = || Error::Usage(format!("usage: {WORKER_COMMAND} <region-path> <worker-id>"));
    let region = args.first().ok_or_else(usage)?;
    let worker = args
        .get(1)
        .ok_or_else(usage)?
        .parse::<usize>()
        .map_err(|_| usage())?;
    Ok((Path::new(region), worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_workspace::{Granularity, RegionName};

    fn workspace(dir: &Path, granularity: Granularity) -> SharedWorkspace {
        let mut ws =
            SharedWorkspace::create(dir, &RegionName::unique(), 2, granularity, 1).unwrap();
        let (a, b) = ws.operands_mut();
        a.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        b.copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
        ws.mutex().init().unwrap();
        ws
    }

    #[test]
    fn test_single_worker_row_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path(), Granularity::Row);
        assert_eq!(run(&ws, 0).unwrap(), 2);
        assert_eq!(ws.result(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_single_worker_element_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path(), Granularity::Element);
        assert_eq!(run(&ws, 0).unwrap(), 4);
        // A second pass finds nothing left.
        assert_eq!(run(&ws, 0).unwrap(), 0);
        assert_eq!(ws.result(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_run_process_attaches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path(), Granularity::Row);
        let path = ws.path().to_path_buf();
        assert_eq!(run_process(&path, 0).unwrap(), 2);
        assert_eq!(ws.result(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_run_process_missing_region() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_process(&dir.path().join("gone"), 0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Allocation);
    }

    #[test]
    fn test_parse_args() {
        let args = vec!["/dev/shm/matmul-1-0".to_string(), "7".to_string()];
        let (path, worker) = parse_args(&args).unwrap();
        assert_eq!(path, Path::new("/dev/shm/matmul-1-0"));
        assert_eq!(worker, 7);

        assert!(parse_args(&args[..1]).is_err());
        let bad = vec!["x".to_string(), "seven".to_string()];
        assert!(matches!(parse_args(&bad), Err(Error::Usage(_))));
    }
}
