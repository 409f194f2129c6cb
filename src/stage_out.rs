//! Relocation of scratch artifacts to final storage.
//!
//! Every artifact under the scratch directory is copied to the same relative
//! path under the output directory (`<scratch>/train/x.npy` becomes
//! `<output>/train/x.npy`). Copies are independent: a failed copy is
//! recorded and the remaining ones are still attempted. The run's status is
//! the worst (largest) status observed.

use crate::config::{PathConfig, StageOutConfig};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Copies one file and reports a process-style status (0 = success).
pub trait ArtifactCopier {
    fn copy(&self, source: &Path, destination: &Path) -> i32;
}

/// In-process copy with `std::fs::copy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCopier;

impl ArtifactCopier for LocalCopier {
    fn copy(&self, source: &Path, destination: &Path) -> i32 {
        match fs::copy(source, destination) {
            Ok(bytes) => {
                log::debug!("'{}' -> '{}' ({bytes} bytes)", source.display(), destination.display());
                0
            }
            Err(e) => {
                log::warn!("copy {} failed: {e}", source.display());
                1
            }
        }
    }
}

/// External copy tool: `argv[0] argv[1..] <source> <destination>`.
#[derive(Debug, Clone)]
pub struct CommandCopier {
    argv: Vec<String>,
}

/// Status reported when the copy tool cannot be started.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

impl CommandCopier {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl ArtifactCopier for CommandCopier {
    fn copy(&self, source: &Path, destination: &Path) -> i32 {
        let Some((program, args)) = self.argv.split_first() else {
            log::warn!("empty copy command");
            return SPAWN_FAILURE_STATUS;
        };

        log::info!(
            "{} {} {} {}",
            program,
            args.join(" "),
            source.display(),
            destination.display()
        );
        match Command::new(program).args(args).arg(source).arg(destination).status() {
            // Killed by a signal: no code.
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                log::warn!("cannot run '{program}': {e}");
                SPAWN_FAILURE_STATUS
            }
        }
    }
}

/// One attempted relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: i32,
}

/// Manifest of a stage-out run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutReport {
    pub records: Vec<RelocationRecord>,
    /// Largest status observed, 0 when nothing was relocated
    pub worst_status: i32,
    pub timestamp: String,
}

impl StageOutReport {
    pub fn new(records: Vec<RelocationRecord>) -> Self {
        let worst_status = records.iter().map(|r| r.status).max().unwrap_or(0);
        Self {
            records,
            worst_status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.worst_status == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &RelocationRecord> {
        self.records.iter().filter(|r| r.status != 0)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Relocates scratch artifacts and cleans up the scratch directory.
pub struct StageOut {
    scratch_dir: PathBuf,
    output_dir: PathBuf,
    copier: Box<dyn ArtifactCopier>,
    cleanup: bool,
}

impl StageOut {
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(
        scratch_dir: P1,
        output_dir: P2,
        copier: Box<dyn ArtifactCopier>,
    ) -> Self {
        Self {
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            copier,
            cleanup: false,
        }
    }

    /// `CommandCopier` when a command is configured, `LocalCopier` otherwise.
    pub fn from_config(paths: &PathConfig, config: &StageOutConfig) -> Self {
        let copier: Box<dyn ArtifactCopier> = match &config.command {
            Some(argv) => Box::new(CommandCopier::new(argv.clone())),
            None => Box::new(LocalCopier),
        };
        Self::new(&paths.scratch_dir, &paths.output_dir, copier).with_cleanup(config.cleanup)
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Destination mirroring the artifact's path relative to scratch.
    pub fn destination(&self, source: &Path) -> PathBuf {
        match source.strip_prefix(&self.scratch_dir) {
            Ok(relative) => self.output_dir.join(relative),
            Err(_) => self
                .output_dir
                .join(source.file_name().unwrap_or(source.as_os_str())),
        }
    }

    /// Copy every artifact, then clear them from scratch if configured.
    pub fn run(&self, artifacts: &[PathBuf]) -> StageOutReport {
        let report = self.relocate(artifacts);
        if self.cleanup {
            self.cleanup_scratch(artifacts);
        }
        report
    }

    pub fn relocate(&self, artifacts: &[PathBuf]) -> StageOutReport {
        let records: Vec<RelocationRecord> = artifacts
            .iter()
            .map(|source| {
                let destination = self.destination(source);
                let status = match destination.parent().map(fs::create_dir_all) {
                    Some(Err(e)) => {
                        log::warn!("cannot create {}: {e}", destination.display());
                        1
                    }
                    _ => self.copier.copy(source, &destination),
                };
                RelocationRecord {
                    source: source.clone(),
                    destination,
                    status,
                }
            })
            .collect();

        let report = StageOutReport::new(records);
        for failed in report.failures() {
            log::warn!(
                "Relocation of {} failed with status {}",
                failed.source.display(),
                failed.status
            );
        }
        log::info!(
            "Staged out {}/{} artifacts to {} (status {})",
            report.records.len() - report.failures().count(),
            report.records.len(),
            self.output_dir.display(),
            report.worst_status
        );
        report
    }

    /// Remove `artifacts`, then each directory between them and the scratch
    /// root that is left empty, the root included. Anything else in scratch
    /// is kept. Failures are logged, not fatal.
    pub fn cleanup_scratch(&self, artifacts: &[PathBuf]) {
        let mut dirs = BTreeSet::new();
        for artifact in artifacts {
            if !artifact.starts_with(&self.scratch_dir) {
                log::warn!(
                    "not removing {}: outside scratch {}",
                    artifact.display(),
                    self.scratch_dir.display()
                );
                continue;
            }
            match fs::remove_file(artifact) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("cannot remove {}: {e}", artifact.display()),
            }
            dirs.extend(
                artifact
                    .ancestors()
                    .skip(1)
                    .take_while(|d| d.starts_with(&self.scratch_dir))
                    .map(Path::to_path_buf),
            );
        }
        dirs.insert(self.scratch_dir.clone());

        // Deepest first, so parents see their children gone.
        let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
        dirs.sort_by_key(|d| Reverse(d.components().count()));
        for dir in &dirs {
            match fs::remove_dir(dir) {
                Ok(()) => log::debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::debug!("Keeping {}: {e}", dir.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Fails for sources whose name contains `bad`.
    struct ScriptedCopier {
        calls: RefCell<Vec<PathBuf>>,
    }

    impl ArtifactCopier for ScriptedCopier {
        fn copy(&self, source: &Path, _destination: &Path) -> i32 {
            self.calls.borrow_mut().push(source.to_path_buf());
            if source.to_string_lossy().contains("bad") {
                2
            } else {
                0
            }
        }
    }

    fn scratch_with(dir: &TempDir, files: &[&str]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|f| {
                let path = dir.path().join("tmp").join(f);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, f.as_bytes()).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_local_copy_mirrors_split_dirs() {
        let dir = TempDir::new().unwrap();
        let artifacts = scratch_with(&dir, &["train/J_pf.npy", "validate/J_sv.npy"]);
        let out = dir.path().join("out");

        let stage = StageOut::new(dir.path().join("tmp"), &out, Box::new(LocalCopier));
        let report = stage.run(&artifacts);

        assert!(report.is_success());
        assert_eq!(report.records[0].destination, out.join("train/J_pf.npy"));
        assert_eq!(fs::read(out.join("validate/J_sv.npy")).unwrap(), b"validate/J_sv.npy");
        // Cleanup is off by default.
        assert!(artifacts[0].exists());
    }

    #[test]
    fn test_failures_do_not_stop_remaining_copies() {
        let dir = TempDir::new().unwrap();
        let artifacts = scratch_with(&dir, &["train/a.npy", "train/bad.npy", "test/c.npy"]);
        let copier = ScriptedCopier {
            calls: RefCell::new(Vec::new()),
        };

        let stage = StageOut::new(dir.path().join("tmp"), dir.path().join("out"), Box::new(copier));
        let report = stage.relocate(&artifacts);

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.worst_status, 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.records[2].status, 0);
    }

    #[test]
    fn test_nothing_to_relocate_is_success() {
        let report = StageOutReport::new(Vec::new());
        assert_eq!(report.worst_status, 0);
    }

    #[test]
    fn test_cleanup_removes_scratch() {
        let dir = TempDir::new().unwrap();
        let artifacts = scratch_with(&dir, &["train/a.npy"]);
        let stage = StageOut::new(dir.path().join("tmp"), dir.path().join("out"), Box::new(LocalCopier))
            .with_cleanup(true);
        stage.run(&artifacts);
        assert!(!dir.path().join("tmp").exists());
        assert!(dir.path().join("out/train/a.npy").exists());
    }

    #[test]
    fn test_cleanup_keeps_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let artifacts = scratch_with(&dir, &["train/a.npy", "raw/J.npz"]);
        let scratch = dir.path().join("tmp");
        fs::write(scratch.join("inputs.txt"), "a.npz\n").unwrap();
        fs::write(scratch.join("train").join("notes.txt"), "keep").unwrap();

        StageOut::new(&scratch, dir.path().join("out"), Box::new(LocalCopier))
            .with_cleanup(true)
            .run(&artifacts);

        assert!(!artifacts[0].exists());
        assert!(!scratch.join("raw").exists());
        assert!(scratch.join("train").join("notes.txt").exists());
        assert!(scratch.join("inputs.txt").exists());
        assert!(dir.path().join("out/raw/J.npz").exists());
    }

    #[test]
    fn test_cleanup_ignores_paths_outside_scratch() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("unit.npz");
        fs::write(&outside, b"unit").unwrap();

        let stage = StageOut::new(dir.path().join("tmp"), dir.path().join("out"), Box::new(LocalCopier));
        stage.cleanup_scratch(&[outside.clone()]);
        assert!(outside.exists());
    }

    #[test]
    fn test_missing_source_is_recorded() {
        let dir = TempDir::new().unwrap();
        let stage = StageOut::new(dir.path(), dir.path().join("out"), Box::new(LocalCopier));
        let report = stage.relocate(&[dir.path().join("train/gone.npy")]);
        assert_eq!(report.worst_status, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_copier_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let artifacts = scratch_with(&dir, &["train/a.npy"]);
        let out = dir.path().join("out");

        let cp = StageOut::new(
            dir.path().join("tmp"),
            &out,
            Box::new(CommandCopier::new(vec!["cp".to_string()])),
        );
        assert_eq!(cp.relocate(&artifacts).worst_status, 0);
        assert!(out.join("train/a.npy").exists());

        let missing = CommandCopier::new(vec!["no-such-copy-tool-xyz".to_string()]);
        assert_eq!(missing.copy(&artifacts[0], &out.join("x")), SPAWN_FAILURE_STATUS);
    }

    #[test]
    fn test_report_manifest_json() {
        let dir = TempDir::new().unwrap();
        let report = StageOutReport::new(vec![RelocationRecord {
            source: PathBuf::from("tmp/train/a.npy"),
            destination: PathBuf::from("out/train/a.npy"),
            status: 3,
        }]);
        let path = dir.path().join("J_stageout.json");
        report.save_json(&path).unwrap();

        let loaded: StageOutReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.worst_status, 3);
    }
}
