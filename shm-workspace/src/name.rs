//! Per-call region naming.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const NAME_PREFIX: &str = "matmul";
const DEV_SHM: &str = "/dev/shm";

static NEXT_REGION: AtomicU64 = AtomicU64::new(0);

/// Name of one shared region.
///
/// Names are derived from the creating process id and a monotonic counter,
/// so two multiply calls never share a backing file, whether they run
/// back to back or concurrently in different processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionName(String);

impl RegionName {
    /// Generates a name no earlier call in this process has used.
    pub fn unique() -> Self {
        let seq = NEXT_REGION.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}-{}", NAME_PREFIX, std::process::id(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full path of the backing file inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.0)
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory backing shared regions: `/dev/shm` when the host has it
/// (tmpfs, never touches disk), the system temp dir otherwise.
pub fn default_shm_dir() -> PathBuf {
    let dev_shm = Path::new(DEV_SHM);
    if dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let a = RegionName::unique();
        let b = RegionName::unique();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("matmul-"));
        assert!(a.as_str().contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_path_in() {
        let name = RegionName::unique();
        let path = name.path_in(Path::new("/tmp"));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), name.as_str());
    }
}
