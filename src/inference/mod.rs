//! Statistical inference (Wald statistics, likelihood-ratio tests).

mod coefficient;
mod lrt;

pub use coefficient::{normal_quantile, CoefficientInference, WaldSummary};
pub use lrt::{likelihood_ratio_test, AnovaRow, AnovaTable, InferenceError, LikelihoodRatioTest};
