//! End-to-end conversion tests.
//!
//! Each test builds a small data directory (normalization profiles and
//! reference histograms) and a set of `.npz` feature store units, runs the
//! pipeline, and inspects what arrived in the output directory.

use jet_dataset::config::{AttributeConfig, ConvertConfig, PathConfig};
use jet_dataset::{
    AcceptanceWindow, AttributeCollection, ConversionPipeline, DatasetError, Result,
};
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::{read_npy, NpzWriter};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const JOB: &str = "ZpTT_med-2000_3";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();

        // pf: x -> (x - 1) / 2 on every channel; sv: zero spread keeps scale 1.
        fs::write(
            data.join("normalization_pf.json"),
            r#"[{"mean": 1.0, "stdev": 2.0}, {"mean": 1.0, "stdev": 2.0}, {"mean": 1.0, "stdev": 2.0}]"#,
        )
        .unwrap();
        fs::write(
            data.join("normalization_sv.json"),
            r#"[{"mean": 0.0, "stdev": 0.0}, {"mean": 0.0, "stdev": 0.0}]"#,
        )
        .unwrap();
        fs::write(
            data.join("flatten.json"),
            r#"{"h_ZpTT": {"edges": [0, 800, 5000], "contents": [1.0, 2.0]},
                "h_QCD":  {"edges": [0, 5000], "contents": [9.0]}}"#,
        )
        .unwrap();
        fs::write(
            data.join("flatten_scaled.json"),
            r#"{"h_ZpTT": {"edges": [0, 5000], "contents": [0.25]},
                "h_QCD":  {"edges": [0, 5000], "contents": [9.0]}}"#,
        )
        .unwrap();

        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    fn scratch(&self) -> PathBuf {
        self.root().join("tmp")
    }

    fn config(&self) -> ConvertConfig {
        let attributes = AttributeConfig {
            singletons: vec![
                "pt".to_string(),
                "rawpt".to_string(),
                "msd".to_string(),
                "eventNumber".to_string(),
            ],
            events: vec!["eventNumber".to_string()],
            truth: vec!["nPartons".to_string()],
            ..Default::default()
        };
        ConvertConfig::new(
            PathConfig::new(self.root().join("data"), self.out()).with_scratch_dir(self.scratch()),
        )
        .with_attributes(attributes)
        .with_seed(42)
    }

    /// Unit with `n` events; event `i` has number `offset + i`, parton
    /// count `partons(i)` and raw pT `460 + 7 i`.
    fn write_unit(&self, name: &str, n: usize, offset: usize, partons: impl Fn(usize) -> i32) -> PathBuf {
        self.write_unit_with_pf(name, n, offset, partons, 4)
    }

    fn write_unit_with_pf(
        &self,
        name: &str,
        n: usize,
        offset: usize,
        partons: impl Fn(usize) -> i32,
        pf_slots: usize,
    ) -> PathBuf {
        let path = self.root().join(format!("{name}.npz"));
        let number = Array1::from_iter((0..n).map(|i| (offset + i) as f64));
        let rawpt = Array1::from_iter((0..n).map(|i| 460.0 + 7.0 * i as f64));
        let pt = rawpt.mapv(|x| 1.05 * x);
        let msd = Array1::from_elem(n, 80.0f32);
        let n_partons = Array1::from_iter((0..n).map(&partons));
        let pf = Array3::from_shape_fn((n, pf_slots, 3), |(i, _, _)| (offset + i) as f32);
        let sv = Array3::from_shape_fn((n, 2, 2), |(i, s, _)| (s * 1000 + offset + i) as f32);

        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("eventNumber", &number).unwrap();
        npz.add_array("rawpt", &rawpt).unwrap();
        npz.add_array("pt", &pt).unwrap();
        npz.add_array("msd", &msd).unwrap();
        npz.add_array("nPartons", &n_partons).unwrap();
        npz.add_array("pf", &pf).unwrap();
        npz.add_array("sv", &sv).unwrap();
        npz.finish().unwrap();
        path
    }

    fn input_list(&self, units: &[PathBuf]) -> PathBuf {
        let path = self.root().join("inputs.txt");
        let body: Vec<String> = units.iter().map(|p| p.display().to_string()).collect();
        fs::write(&path, body.join("\n") + "\n").unwrap();
        path
    }

    fn output(&self, split: &str, group: &str) -> PathBuf {
        self.out().join(split).join(format!("{JOB}_{group}.npy"))
    }
}

/// Three of every five events have three partons.
fn three_of_five(i: usize) -> i32 {
    if i % 5 < 3 {
        3
    } else {
        1
    }
}

#[test]
fn test_full_conversion() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 100, 0, three_of_five);
    let b = fx.write_unit("b", 40, 1000, |_| 1);
    let list = fx.input_list(&[a, b]);

    let outcome = ConversionPipeline::new(fx.config(), JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.n_partons, 3);
    assert_eq!(summary.assembly.events_read, 140);
    assert_eq!(summary.assembly.events_kept, 60);
    assert_eq!(summary.assembly.units_contributing, 1);
    assert_eq!(summary.events_accepted, 60);
    assert_eq!((summary.train, summary.test, summary.validate), (42, 9, 9));
    // 3 splits x 7 groups
    assert_eq!(summary.stage_out.records.len(), 21);

    // Every kept event lands in exactly one split.
    let mut seen = BTreeSet::new();
    for (split, expected) in [("train", 42), ("test", 9), ("validate", 9)] {
        let events: Array2<f64> = read_npy(fx.output(split, "events")).unwrap();
        assert_eq!(events.dim(), (expected, 1));
        for &e in events.column(0) {
            assert!(seen.insert(e as usize), "event {e} duplicated");
        }
    }
    let kept: BTreeSet<usize> = (0..100).filter(|&i| three_of_five(i) == 3).collect();
    assert_eq!(seen, kept);

    // Scratch removed, manifest written.
    assert!(!fx.scratch().exists());
    assert!(fx.out().join(format!("{JOB}_stageout.json")).exists());
}

#[test]
fn test_groups_stay_row_aligned() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 100, 0, three_of_five);
    let list = fx.input_list(&[a]);
    ConversionPipeline::new(fx.config(), JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    let singletons: Array2<f64> = read_npy(fx.output("train", "singletons")).unwrap();
    let truth: Array2<f64> = read_npy(fx.output("train", "truth")).unwrap();
    let pf: Array3<f32> = read_npy(fx.output("train", "pf")).unwrap();
    let sv: Array3<f32> = read_npy(fx.output("train", "sv")).unwrap();
    let weights: Array1<f64> = read_npy(fx.output("train", "ptweight")).unwrap();
    let scaled: Array1<f64> = read_npy(fx.output("train", "ptweight_scaled")).unwrap();

    assert_eq!(singletons.dim(), (42, 4));
    assert_eq!(pf.dim(), (42, 4, 3));
    assert_eq!(sv.dim(), (42, 2, 2));
    for row in 0..42 {
        let rawpt = singletons[[row, 1]];
        let number = singletons[[row, 3]];
        assert_eq!(truth[[row, 0]], 3.0);
        // pf was normalized as (x - 1) / 2.
        assert_eq!(pf[[row, 3, 2]] * 2.0 + 1.0, number as f32);
        assert_eq!(sv[[row, 1, 0]], 1000.0 + number as f32);
        assert_eq!(weights[row], if rawpt < 800.0 { 1.0 } else { 2.0 });
        assert_eq!(scaled[row], 0.25);
    }
}

#[test]
fn test_seed_makes_runs_reproducible() {
    let run = || {
        let fx = Fixture::new();
        let a = fx.write_unit("a", 50, 0, |_| 3);
        let list = fx.input_list(&[a]);
        ConversionPipeline::new(fx.config(), JOB)
            .unwrap()
            .run(&list)
            .unwrap();
        read_npy::<_, Array2<f64>>(fx.output("test", "events")).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_empty_input_list_writes_nothing() {
    let fx = Fixture::new();
    let list = fx.input_list(&[]);

    let outcome = ConversionPipeline::new(fx.config(), JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.exit_code(), 0);
    assert!(!fx.out().exists());
}

#[test]
fn test_nothing_in_acceptance_window_writes_nothing() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 20, 0, |_| 3);
    let list = fx.input_list(&[a]);
    let config = fx
        .config()
        .with_acceptance(AcceptanceWindow::new(2000.0, 3000.0));

    let outcome = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.exit_code(), 0);
    assert!(!fx.out().exists());
}

#[test]
fn test_window_edges_are_exclusive() {
    let fx = Fixture::new();
    // rawpt = 460 + 7 i: 460, 467, ..., 593
    let a = fx.write_unit("a", 20, 0, |_| 3);
    let list = fx.input_list(&[a]);
    let config = fx
        .config()
        .with_acceptance(AcceptanceWindow::new(460.0, 593.0));

    let outcome = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap();
    assert_eq!(outcome.summary().unwrap().events_accepted, 18);
}

#[test]
fn test_store_raw_snapshot_is_staged_out() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 30, 0, |_| 3);
    let list = fx.input_list(&[a]);
    let mut config = fx.config();
    config.options.store_raw = true;

    let outcome = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    let summary = outcome.summary().unwrap();
    assert!(summary.snapshot.is_some());
    assert!(fx.out().join("raw").join(format!("{JOB}.npz")).exists());
    assert_eq!(summary.stage_out.records.len(), 22);
}

#[test]
fn test_inference_adds_dnn_group() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 30, 0, |_| 3);
    let list = fx.input_list(&[a]);
    let mut config = fx.config();
    config.options.infer = true;

    let predictor = |data: &AttributeCollection| -> Result<Array2<f32>> {
        let number = data.scalar("eventNumber")?;
        Ok(Array2::from_shape_fn((number.len(), 4), |(i, j)| {
            if j == 2 {
                number[i] as f32
            } else {
                -1.0
            }
        }))
    };

    ConversionPipeline::new(config, JOB)
        .unwrap()
        .with_predictor(Box::new(predictor))
        .run(&list)
        .unwrap();

    let dnn: Array2<f64> = read_npy(fx.output("train", "dnn")).unwrap();
    let events: Array2<f64> = read_npy(fx.output("train", "events")).unwrap();
    assert_eq!(dnn.dim(), (21, 2));
    assert_eq!(dnn.column(0), events.column(0));
    assert!(dnn.column(1).iter().all(|&v| v == -1.0));
}

#[test]
fn test_unreadable_unit_aborts() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 10, 0, |_| 3);
    let list = fx.input_list(&[a, fx.root().join("missing.npz")]);

    let err = ConversionPipeline::new(fx.config(), JOB)
        .unwrap()
        .run(&list)
        .unwrap_err();
    assert!(matches!(err, DatasetError::UnitOpen { .. }));
    assert!(!fx.out().exists());
}

#[test]
fn test_capacity_mismatch_is_config_error() {
    let fx = Fixture::new();
    let a = fx.write_unit_with_pf("a", 10, 0, |_| 3, 4);
    let b = fx.write_unit_with_pf("b", 10, 100, |_| 3, 6);
    let list = fx.input_list(&[a, b]);

    let err = ConversionPipeline::new(fx.config(), JOB)
        .unwrap()
        .run(&list)
        .unwrap_err();
    assert!(matches!(err, DatasetError::Config(_)));
}

#[test]
fn test_missing_histogram_is_config_error() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 10, 0, |_| 2);
    let list = fx.input_list(&[a]);

    let mut config = fx.config();
    config.options.store_raw = true;

    let err = ConversionPipeline::new(config, "Higgs_ggH_0")
        .unwrap()
        .run(&list)
        .unwrap_err();
    assert!(matches!(err, DatasetError::Config(_)));
    // Raised before the snapshot would have been taken.
    assert!(!fx.scratch().exists());
    assert!(!fx.out().exists());
}

#[test]
fn test_missing_profile_aborts_before_reading_units() {
    let fx = Fixture::new();
    fs::remove_file(fx.root().join("data").join("normalization_sv.json")).unwrap();
    // Unreadable unit: a load attempt would surface as UnitOpen instead.
    let list = fx.input_list(&[fx.root().join("missing.npz")]);
    let mut config = fx.config();
    config.options.store_raw = true;

    let err = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap_err();
    assert!(matches!(err, DatasetError::Config(_)));
    assert!(!fx.scratch().exists());
}

#[test]
fn test_cleanup_keeps_other_files_in_scratch() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 20, 0, |_| 3);
    let list = fx.input_list(&[a.clone()]);
    let mut config = fx.config();
    config.paths.scratch_dir = fx.root().to_path_buf();
    config.options.store_raw = true;

    let outcome = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert!(fx.output("train", "pf").exists());
    assert!(a.exists());
    assert!(list.exists());
    assert!(fx.root().join("data").join("flatten.json").exists());
    for dir in ["train", "test", "validate", "raw"] {
        assert!(!fx.root().join(dir).exists(), "{dir} left in scratch");
    }
}

#[cfg(unix)]
#[test]
fn test_failed_relocations_set_exit_code() {
    let fx = Fixture::new();
    let a = fx.write_unit("a", 20, 0, |_| 3);
    let list = fx.input_list(&[a]);
    let mut config = fx.config();
    config.stage_out.command = Some(vec!["false".to_string()]);

    let outcome = ConversionPipeline::new(config, JOB)
        .unwrap()
        .run(&list)
        .unwrap();

    let report = &outcome.summary().unwrap().stage_out;
    assert_eq!(report.records.len(), 21);
    assert_eq!(report.failures().count(), 21);
    assert_eq!(outcome.exit_code(), 1);
}
