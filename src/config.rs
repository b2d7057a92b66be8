//! On-disk configuration.
//!
//! Read a TOML file if one exists, otherwise fall back to built-in
//! defaults (and, when the caller names an explicit path, write those
//! defaults there so the next run has something to edit). There is no
//! per-user state directory here — a run of this tool is a single
//! stateless file-in, file-out pass, so there's nothing for
//! `directories`/`ProjectDirs` to locate (see `DESIGN.md`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AnalyzerResult;

const DEFAULT_CONFIG_TOML: &str = include_str!("../assets/default_config.toml");
const DEFAULT_LOCAL_CONFIG: &str = "dvfs-analyzer.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Cross-compiler binary invoked to produce annotated assembly.
    pub cross_compiler: String,
    /// Extra arguments passed before `-g -S -o /dev/stdout <file>`.
    pub cross_compiler_args: Vec<String>,
    /// Overrides the bundled ARMv4T-flavored instruction cost table.
    pub instr_cycle_table_path: Option<PathBuf>,
    /// `{stem}` is replaced with the input file's stem; defaults to
    /// `{stem}_dvfs.c` next to the input when unset.
    pub output_path_template: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("bundled default_config.toml must parse")
    }
}

impl AnalyzerConfig {
    /// `path` is an explicit `--config` override. If `None`, look for
    /// `./dvfs-analyzer.toml` in the current directory; if that's absent
    /// too, use built-in defaults without writing anything (no path was
    /// ever named, so there's nowhere sanctioned to put a file).
    pub fn load(path: Option<&Path>) -> AnalyzerResult<Self> {
        match path {
            Some(path) => Self::load_or_write_defaults(path),
            None => {
                let local = Path::new(DEFAULT_LOCAL_CONFIG);
                if local.exists() {
                    Self::read(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_or_write_defaults(path: &Path) -> AnalyzerResult<Self> {
        if path.exists() {
            Self::read(path)
        } else {
            fs::write(path, DEFAULT_CONFIG_TOML)?;
            Ok(Self::default())
        }
    }

    fn read(path: &Path) -> AnalyzerResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_toml_round_trips() {
        let cfg = AnalyzerConfig::default();
        assert!(!cfg.cross_compiler.is_empty());
    }

    #[test]
    fn missing_explicit_path_writes_defaults_then_loads_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let cfg = AnalyzerConfig::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.cross_compiler, AnalyzerConfig::default().cross_compiler);
    }

    #[test]
    fn no_path_and_no_local_file_falls_back_to_defaults_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let cfg = AnalyzerConfig::load(None);
        std::env::set_current_dir(prev).unwrap();
        assert!(cfg.is_ok());
        assert!(!dir.path().join(DEFAULT_LOCAL_CONFIG).exists());
    }
}
