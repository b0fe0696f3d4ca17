//! The tobacco-vote analysis as a sequence of stages.
//!
//! Each stage takes the output of the previous one and writes its report to
//! the given writer; plots go to the configured output directory.

use crate::core::{Formula, FormulaError, MixedDesign, MixedOptions, OptionsError};
use crate::data::{load_dataset, DataError, Dataset, LoadOptions};
use crate::descriptive::describe;
use crate::diagnostics::{intraclass_correlation, GroupInfluence, IccSummary, RandomEffects};
use crate::inference::{AnovaTable, InferenceError};
use crate::plot::{self, PlotError};
use crate::solvers::{
    EmRegressor, FittedLmm, FittedMixed, LmmRegressor, MixedEstimator, RegressionError,
};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// The nested models fitted by the analysis, smallest first.
pub const MODEL_LADDER: [(&str, &str); 6] = [
    ("m0", "votepct ~ 1 + (1 | state)"),
    ("m1", "votepct ~ party + (1 | state)"),
    ("m2", "votepct ~ party + money + (1 | state)"),
    ("m3", "votepct ~ party + money + acres + (1 | state)"),
    ("m4", "votepct ~ party + money + acres + (1 + money | state)"),
    ("m5", "votepct ~ party + money + acres + (1 + party + money | state)"),
];

/// Models that add fixed effects to the null model.
const FIXED_STEPS: std::ops::RangeInclusive<usize> = 0..=3;
/// Models that add random slopes to the last fixed-effects model.
const RANDOM_STEPS: std::ops::RangeInclusive<usize> = 3..=5;

/// Errors from any stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),

    #[error("model index {index} is out of range (ladder has {len} models)")]
    NoSuchModel { index: usize, len: usize },
}

/// Settings for a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub output_dir: PathBuf,
    pub plots: bool,
    /// Index into [`MODEL_LADDER`] of the model used for diagnostics.
    pub diagnose: usize,
    /// Number of rows shown in the preview.
    pub head: usize,
    pub confidence_level: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("tobacco.dta"),
            output_dir: PathBuf::from("plots"),
            plots: true,
            diagnose: 3,
            head: 6,
            confidence_level: 0.95,
        }
    }
}

impl PipelineConfig {
    /// Check the settings before any work is done.
    pub fn validate(&self) -> Result<(), PipelineError> {
        MixedOptions::builder()
            .confidence_level(self.confidence_level)
            .build()?;
        if self.diagnose >= MODEL_LADDER.len() {
            return Err(PipelineError::NoSuchModel {
                index: self.diagnose,
                len: MODEL_LADDER.len(),
            });
        }
        Ok(())
    }

    fn options(&self) -> MixedOptions {
        MixedOptions::builder()
            .confidence_level(self.confidence_level)
            .build_unchecked()
    }
}

/// Stage 1: validate the settings, then read the file, drop incomplete rows
/// and derive the state factor.
pub fn load(config: &PipelineConfig) -> Result<Dataset, PipelineError> {
    config.validate()?;
    Ok(load_dataset(&config.data_path, &LoadOptions::default())?)
}

/// Stage 2: summary statistics and a preview of the first rows.
pub fn summarize(
    dataset: &Dataset,
    config: &PipelineConfig,
    out: &mut dyn Write,
) -> Result<(), PipelineError> {
    let info = &dataset.na_info;
    writeln!(
        out,
        "Loaded {} rows ({} dropped for missing values), {} groups by `{}`\n",
        info.n_clean,
        info.n_removed,
        dataset.n_groups(),
        dataset.group.name()
    )?;
    writeln!(out, "{}", describe(&dataset.frame)?)?;
    writeln!(out, "{}", dataset.frame.head(config.head))?;
    Ok(())
}

/// Stage 3: plots of the raw data. Returns the files written.
pub fn visualize(
    dataset: &Dataset,
    config: &PipelineConfig,
) -> Result<Vec<PathBuf>, PipelineError> {
    if !config.plots {
        return Ok(Vec::new());
    }
    let dir = &config.output_dir;
    let files = [
        dir.join("votepct_money_by_party.svg"),
        dir.join("votepct_money_lines_by_state.svg"),
        dir.join("votepct_money_facets_by_state.svg"),
    ];
    plot::scatter(&files[0], dataset, "money", "votepct", Some("party"))?;
    plot::group_lines(&files[1], dataset, "money", "votepct")?;
    plot::facet_grid(&files[2], dataset, "money", "votepct")?;
    Ok(files.to_vec())
}

/// All models of the ladder, fitted by maximum likelihood.
#[derive(Debug, Clone)]
pub struct LadderFits {
    pub names: Vec<&'static str>,
    pub designs: Vec<MixedDesign>,
    pub fits: Vec<FittedLmm>,
}

impl LadderFits {
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    fn table(&self, steps: std::ops::RangeInclusive<usize>) -> Result<AnovaTable, InferenceError> {
        let models: Vec<(&str, &crate::core::MixedResult)> = steps
            .filter(|&k| k < self.len())
            .map(|k| (self.names[k], self.fits[k].result()))
            .collect();
        AnovaTable::compare(&models)
    }
}

/// Stage 4: fit every model of the ladder and compare neighbours.
pub fn fit_models(
    dataset: &Dataset,
    config: &PipelineConfig,
    out: &mut dyn Write,
) -> Result<LadderFits, PipelineError> {
    let estimator = LmmRegressor::new(config.options());
    let mut fits = LadderFits {
        names: Vec::with_capacity(MODEL_LADDER.len()),
        designs: Vec::with_capacity(MODEL_LADDER.len()),
        fits: Vec::with_capacity(MODEL_LADDER.len()),
    };

    for (name, text) in MODEL_LADDER {
        let formula = Formula::parse(text)?;
        let design = MixedDesign::from_dataset(dataset, &formula).map_err(RegressionError::from)?;
        let fitted = estimator.fit(&design)?;
        writeln!(out, "==== {name} ====")?;
        writeln!(out, "{}", fitted.result())?;
        fits.names.push(name);
        fits.designs.push(design);
        fits.fits.push(fitted);
    }

    writeln!(out, "==== adding fixed effects ====")?;
    writeln!(out, "{}", fits.table(FIXED_STEPS)?)?;
    writeln!(out, "==== adding random slopes ====")?;
    writeln!(out, "{}", fits.table(RANDOM_STEPS)?)?;
    info!(models = fits.len(), "model ladder fitted");
    Ok(fits)
}

/// Estimates of the same model from the two engines.
#[derive(Debug, Clone)]
pub struct EngineComparison {
    pub fixed_names: Vec<String>,
    pub profiled: Vec<f64>,
    pub em: Vec<f64>,
    pub profiled_log_likelihood: f64,
    pub em_log_likelihood: f64,
    pub profiled_sigma: f64,
    pub em_sigma: f64,
}

impl fmt::Display for EngineComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.fixed_names.iter().map(String::len).max().unwrap_or(0).max(11);
        let (a, b) = (LmmRegressor::ENGINE, EmRegressor::ENGINE);
        writeln!(f, "{:<w$} {:>12} {:>12}", "", a, b, w = width)?;
        for (j, name) in self.fixed_names.iter().enumerate() {
            let (a, b) = (self.profiled[j], self.em[j]);
            writeln!(f, "{:<w$} {:>12.5} {:>12.5}", name, a, b, w = width)?;
        }
        let (a, b) = (self.profiled_sigma, self.em_sigma);
        writeln!(f, "{:<w$} {:>12.5} {:>12.5}", "sigma", a, b, w = width)?;
        write!(
            f,
            "{:<w$} {:>12.3} {:>12.3}",
            "logLik", self.profiled_log_likelihood, self.em_log_likelihood,
            w = width
        )
    }
}

/// Refit ladder model `index` with the EM engine.
pub fn compare_engines(
    fits: &LadderFits,
    index: usize,
    config: &PipelineConfig,
    out: &mut dyn Write,
) -> Result<EngineComparison, PipelineError> {
    let design = fits.designs.get(index).ok_or(PipelineError::NoSuchModel {
        index,
        len: fits.len(),
    })?;
    let profiled = fits.fits[index].result();
    let em = EmRegressor::new(config.options()).fit(design)?;
    let em = em.result();

    let comparison = EngineComparison {
        fixed_names: profiled.fixed_names.clone(),
        profiled: profiled.fixed_effects.iter().copied().collect(),
        em: em.fixed_effects.iter().copied().collect(),
        profiled_log_likelihood: profiled.log_likelihood,
        em_log_likelihood: em.log_likelihood,
        profiled_sigma: profiled.sigma,
        em_sigma: em.sigma,
    };
    writeln!(out, "==== {} by two engines ====", fits.names[index])?;
    writeln!(out, "{comparison}\n")?;
    Ok(comparison)
}

/// What the diagnostics stage produced.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub icc: Option<IccSummary>,
    pub random_effects: RandomEffects,
    pub influence: GroupInfluence,
    pub plots: Vec<PathBuf>,
}

/// Stage 5: ICC of the null model, BLUPs, residuals and group influence for
/// ladder model `config.diagnose`.
pub fn diagnose(
    fits: &LadderFits,
    config: &PipelineConfig,
    out: &mut dyn Write,
) -> Result<DiagnosticsReport, PipelineError> {
    let index = config.diagnose;
    let (design, fitted) = match (fits.designs.get(index), fits.fits.get(index)) {
        (Some(d), Some(f)) => (d, f),
        _ => {
            return Err(PipelineError::NoSuchModel {
                index,
                len: fits.len(),
            })
        }
    };
    let result = fitted.result();

    let icc = fits.fits.first().and_then(|null| intraclass_correlation(null.result()));
    if let Some(icc) = &icc {
        writeln!(out, "Intraclass correlation of {}: {icc}\n", fits.names[0])?;
    }

    let random_effects = RandomEffects::from_fit(result, config.confidence_level);
    writeln!(out, "==== random effects of {} ====", fits.names[index])?;
    writeln!(out, "{random_effects}")?;

    let estimator = LmmRegressor::new(MixedOptions {
        compute_inference: false,
        ..config.options()
    });
    let influence = GroupInfluence::compute(&estimator, design, result)?;
    writeln!(
        out,
        "==== influence of each {} on {} ====",
        design.formula.random.group, fits.names[index]
    )?;
    writeln!(out, "{influence}")?;
    write_flagged(&influence, out)?;

    let mut plots = Vec::new();
    if config.plots {
        let dir = &config.output_dir;
        let files = [
            dir.join("ranef_dotplot.svg"),
            dir.join("residuals.svg"),
            dir.join("influence.svg"),
        ];
        plot::dotplot(&files[0], &random_effects)?;
        plot::residual_plots(&files[1], result)?;
        plot::influence_plot(&files[2], &influence)?;
        plots.extend(files);
    }

    Ok(DiagnosticsReport {
        icc,
        random_effects,
        influence,
        plots,
    })
}

/// List the groups past the Cook's distance cut-off and the
/// `group/coefficient` pairs past the DFBETAS cut-off.
fn write_flagged(influence: &GroupInfluence, out: &mut dyn Write) -> io::Result<()> {
    let cooks = influence.influential_cooks(None);
    if !cooks.is_empty() {
        let labels: Vec<&str> = cooks.iter().map(|&g| influence.groups[g].as_str()).collect();
        writeln!(out, "influential by Cook's distance: {}", labels.join(", "))?;
    }
    let dfbetas = influence.influential_dfbetas(None);
    if !dfbetas.is_empty() {
        let pairs: Vec<String> = dfbetas
            .iter()
            .map(|&(g, j)| format!("{}/{}", influence.groups[g], influence.fixed_names[j]))
            .collect();
        writeln!(out, "influential by DFBETAS: {}", pairs.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::{Col, Mat};

    fn influence(dfbetas: f64) -> GroupInfluence {
        GroupInfluence {
            groups: vec!["NC".into(), "KY".into(), "VA".into(), "TN".into()],
            fixed_names: vec!["(Intercept)".into(), "money".into()],
            deleted_estimates: Mat::zeros(4, 2),
            cooks_distance: Col::from_fn(4, |g| [0.2, 1.5, 0.9, 0.1][g]),
            dfbetas: Mat::from_fn(4, 2, |g, j| if g == 2 && j == 1 { dfbetas } else { 0.1 }),
        }
    }

    fn flagged(influence: &GroupInfluence) -> String {
        let mut out = Vec::new();
        write_flagged(influence, &mut out).expect("write to memory");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn test_flagged_groups_and_coefficients() {
        let text = flagged(&influence(-1.2));
        assert!(text.contains("influential by Cook's distance: KY\n"));
        assert!(text.contains("influential by DFBETAS: VA/money\n"));
    }

    #[test]
    fn test_nothing_flagged_below_cutoff() {
        let text = flagged(&influence(0.5));
        assert!(!text.contains("DFBETAS"));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = PipelineConfig {
            confidence_level: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Options(OptionsError::InvalidConfidenceLevel(_)))
        ));

        let config = PipelineConfig {
            diagnose: MODEL_LADDER.len(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::NoSuchModel { index: 6, len: 6 })
        ));
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
