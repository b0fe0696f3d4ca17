//! End-to-end runs of the analysis stages on a synthetic file.

mod common;

use hlm_rs::pipeline::{self, PipelineConfig, PipelineError, MODEL_LADDER};
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn setup(plots: bool) -> (TempDir, PipelineConfig) {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("tobacco.dta");
    common::write_dta_114(&data_path, &common::tobacco_frame(10, 13, true)).unwrap();
    let config = PipelineConfig {
        data_path,
        output_dir: dir.path().join("plots"),
        plots,
        ..Default::default()
    };
    (dir, config)
}

fn is_svg(path: &Path) -> bool {
    std::fs::read_to_string(path).is_ok_and(|s| s.contains("<svg"))
}

#[test]
fn test_full_run_writes_report_and_plots() {
    let (_dir, config) = setup(true);
    let mut out = Vec::new();

    let dataset = pipeline::load(&config).unwrap();
    pipeline::summarize(&dataset, &config, &mut out).unwrap();
    let raw_plots = pipeline::visualize(&dataset, &config).unwrap();
    let fits = pipeline::fit_models(&dataset, &config, &mut out).unwrap();
    let comparison = pipeline::compare_engines(&fits, config.diagnose, &config, &mut out).unwrap();
    let report = pipeline::diagnose(&fits, &config, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("dropped for missing values"));
    for (name, _) in MODEL_LADDER {
        assert!(text.contains(&format!("==== {name} ====")), "missing {name}");
    }
    assert!(text.contains("Fixed effects"));
    assert!(text.contains("adding random slopes"));
    assert!(text.contains("Intraclass correlation"));
    let flagged = report.influence.influential_dfbetas(None);
    assert_eq!(text.contains("influential by DFBETAS"), !flagged.is_empty());
    for (g, j) in flagged {
        let pair = format!("{}/{}", report.influence.groups[g], report.influence.fixed_names[j]);
        assert!(text.contains(&pair), "{pair} not reported");
    }

    assert_eq!(fits.len(), MODEL_LADDER.len());
    assert!((comparison.profiled_log_likelihood - comparison.em_log_likelihood).abs() < 1e-2);

    let icc = report.icc.expect("the null model has a random intercept");
    assert!((0.0..=1.0).contains(&icc.icc));
    assert_eq!(report.influence.n_groups(), 10);
    assert_eq!(report.random_effects.terms.len(), 1);

    assert_eq!(raw_plots.len(), 3);
    assert_eq!(report.plots.len(), 3);
    for path in raw_plots.iter().chain(&report.plots) {
        assert!(is_svg(path), "{} is not an SVG", path.display());
    }
}

#[test]
fn test_plots_can_be_skipped() {
    let (_dir, config) = setup(false);
    let dataset = pipeline::load(&config).unwrap();
    assert!(pipeline::visualize(&dataset, &config).unwrap().is_empty());
    assert!(!config.output_dir.exists());
}

#[test]
fn test_diagnose_index_rejected_before_loading() {
    let (_dir, mut config) = setup(true);
    config.diagnose = MODEL_LADDER.len();
    assert!(matches!(
        pipeline::load(&config),
        Err(PipelineError::NoSuchModel { index: 6, len: 6 })
    ));
}

#[test]
fn test_invalid_confidence_level_rejected_before_loading() {
    let (_dir, mut config) = setup(true);
    config.confidence_level = 1.5;
    assert!(matches!(pipeline::load(&config), Err(PipelineError::Options(_))));
    assert!(!config.output_dir.exists());
}

#[test]
fn test_diagnose_index_out_of_range() {
    let (_dir, mut config) = setup(false);
    let dataset = pipeline::load(&config).unwrap();
    let fits = pipeline::fit_models(&dataset, &config, &mut std::io::sink()).unwrap();

    config.diagnose = MODEL_LADDER.len();
    let err = pipeline::diagnose(&fits, &config, &mut std::io::sink());
    assert!(matches!(err, Err(PipelineError::NoSuchModel { .. })));
    let err = pipeline::compare_engines(&fits, config.diagnose, &config, &mut std::io::sink());
    assert!(matches!(err, Err(PipelineError::NoSuchModel { .. })));
}

#[test]
fn test_missing_data_file() {
    let config = PipelineConfig {
        data_path: "does/not/exist.dta".into(),
        ..Default::default()
    };
    assert!(matches!(pipeline::load(&config), Err(PipelineError::Data(_))));
}
