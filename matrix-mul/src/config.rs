//! Runtime configuration.

use std::path::PathBuf;

use shm_workspace::default_shm_dir;

use crate::{Error, Launcher};

const SHM_DIR_VAR: &str = "MATMUL_SHM_DIR";
const SEED_VAR: &str = "MATMUL_SEED";
const OUTPUT_DIR_VAR: &str = "MATMUL_OUTPUT_DIR";
const LAUNCHER_VAR: &str = "MATMUL_LAUNCHER";
const WORKER_PROGRAM_VAR: &str = "MATMUL_WORKER_PROGRAM";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the per-call shared regions.
    pub shm_dir: PathBuf,
    pub launcher: Launcher,
    /// Seed for operand population; entropy when unset.
    pub seed: Option<u64>,
    /// Where result tables and gnuplot scripts are written.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shm_dir: default_shm_dir(),
            launcher: Launcher::default(),
            seed: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Reads overrides from the process environment.
    ///
    /// - `MATMUL_SHM_DIR`: region directory
    /// - `MATMUL_SEED`: `u64` seed
    /// - `MATMUL_OUTPUT_DIR`: report directory
    /// - `MATMUL_LAUNCHER`: `threads` (default) or `process`
    /// - `MATMUL_WORKER_PROGRAM`: worker executable for the process launcher,
    ///   required when `MATMUL_LAUNCHER=process`
    pub fn from_env() -> Result<Self, Error> {
        Self::from_env_or(Launcher::Threads)
    }

    /// Like [`Config::from_env`], with `launcher` used when the environment
    /// names none. A binary that handles the `worker` command itself passes
    /// [`Launcher::CurrentExe`], which also becomes the worker program for a
    /// bare `MATMUL_LAUNCHER=process`.
    pub fn from_env_or(launcher: Launcher) -> Result<Self, Error> {
        Self::from_lookup(launcher, |key| std::env::var(key).ok())
    }

    fn from_lookup(
        default_launcher: Launcher,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let mut config = Config::default();

        if let Some(dir) = lookup(SHM_DIR_VAR) {
            config.shm_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(OUTPUT_DIR_VAR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(SEED_VAR) {
            let seed = seed
                .parse()
                .map_err(|_| Error::Config(format!("{SEED_VAR}: '{seed}' is not a u64")))?;
            config.seed = Some(seed);
        }

        let program = lookup(WORKER_PROGRAM_VAR).map(PathBuf::from);
        config.launcher = match (lookup(LAUNCHER_VAR).as_deref(), program) {
            (None | Some("process"), Some(program)) => Launcher::Process { program },
            (None, None) => default_launcher,
            (Some("process"), None) if default_launcher == Launcher::CurrentExe => {
                Launcher::CurrentExe
            }
            (Some("process"), None) => {
                return Err(Error::Config(format!(
                    "{LAUNCHER_VAR}=process requires {WORKER_PROGRAM_VAR}"
                )));
            }
            (Some("threads"), None) => Launcher::Threads,
            (Some("threads"), Some(_)) => {
                return Err(Error::Config(format!(
                    "{WORKER_PROGRAM_VAR} requires the process launcher"
                )));
            }
            (Some(other), _) => {
                return Err(Error::Config(format!(
                    "{LAUNCHER_VAR}: unknown launcher '{other}' (expected process or threads)"
                )));
            }
        };

        Ok(config)
    }

    pub fn with_shm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shm_dir = dir.into();
        self
    }

    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(Launcher::Threads, |key| vars.get(key).cloned())
    }

    fn binary_config(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(Launcher::CurrentExe, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.launcher, Launcher::Threads);
        assert_eq!(Config::default().launcher, Launcher::Threads);
        assert_eq!(config.seed, None);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.shm_dir, default_shm_dir());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("MATMUL_SHM_DIR", "/tmp/regions"),
            ("MATMUL_SEED", "1234"),
            ("MATMUL_OUTPUT_DIR", "out"),
            ("MATMUL_LAUNCHER", "threads"),
        ])
        .unwrap();
        assert_eq!(config.shm_dir, PathBuf::from("/tmp/regions"));
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.launcher, Launcher::Threads);
    }

    #[test]
    fn test_worker_program() {
        let config = config(&[("MATMUL_WORKER_PROGRAM", "/usr/local/bin/matrix-mul")]).unwrap();
        assert_eq!(
            config.launcher,
            Launcher::Process {
                program: PathBuf::from("/usr/local/bin/matrix-mul")
            }
        );
    }

    #[test]
    fn test_library_never_reexecutes_its_host() {
        assert!(matches!(
            config(&[("MATMUL_LAUNCHER", "process")]),
            Err(Error::Config(_))
        ));
        assert_eq!(binary_config(&[]).unwrap().launcher, Launcher::CurrentExe);
        assert_eq!(
            binary_config(&[("MATMUL_LAUNCHER", "process")]).unwrap().launcher,
            Launcher::CurrentExe
        );
        assert_eq!(
            binary_config(&[("MATMUL_LAUNCHER", "threads")]).unwrap().launcher,
            Launcher::Threads
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("MATMUL_SEED", "-1")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config(&[("MATMUL_LAUNCHER", "fibers")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config(&[
                ("MATMUL_LAUNCHER", "threads"),
                ("MATMUL_WORKER_PROGRAM", "/bin/true")
            ]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_seed(3)
            .with_launcher(Launcher::Threads)
            .with_shm_dir("/tmp")
            .with_output_dir("/var/tmp");
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.launcher, Launcher::Threads);
        assert_eq!(config.shm_dir, PathBuf::from("/tmp"));
        assert_eq!(config.output_dir, PathBuf::from("/var/tmp"));
    }
}
