//! Hierarchical linear models for the congressional tobacco-vote data.
//!
//! The library reads Stata files, summarises variables, fits linear mixed
//! models with a single grouping factor by (restricted) maximum likelihood,
//! compares nested fits by likelihood-ratio tests and diagnoses them through
//! BLUPs, intraclass correlation and group-deletion influence. The `hlm-rs`
//! binary runs the whole analysis as a fixed sequence of [`pipeline`] stages.
//!
//! # Example
//!
//! ```rust,ignore
//! use hlm_rs::prelude::*;
//!
//! let dataset = load_dataset("tobacco.dta", &LoadOptions::default())?;
//!
//! let null = Formula::parse("votepct ~ 1 + (1 | state)")?;
//! let full = Formula::parse("votepct ~ party + money + (1 | state)")?;
//!
//! let estimator = LmmRegressor::builder().build();
//! let m0 = estimator.fit_formula(&dataset, &null)?;
//! let m1 = estimator.fit_formula(&dataset, &full)?;
//!
//! println!("{}", m1.result());
//! println!("{:?}", likelihood_ratio_test(m0.result(), m1.result())?);
//! ```

pub mod core;
pub mod data;
pub mod descriptive;
pub mod diagnostics;
pub mod inference;
pub mod pipeline;
pub mod plot;
pub mod solvers;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        Criterion, Formula, MixedDesign, MixedOptions, MixedResult, NaAction, VarCorr,
    };
    pub use crate::data::{load_dataset, read_dta, Column, Dataset, Factor, Frame, LoadOptions};
    pub use crate::descriptive::{describe, Description};
    pub use crate::diagnostics::{intraclass_correlation, GroupInfluence, RandomEffects};
    pub use crate::inference::{likelihood_ratio_test, AnovaTable};
    pub use crate::solvers::{
        EmRegressor, FittedMixed, LmmRegressor, MixedEstimator, PredictionLevel,
    };
}

pub use crate::core::{Formula, MixedOptions, MixedResult};
pub use crate::solvers::{EmRegressor, FittedMixed, LmmRegressor, MixedEstimator};
