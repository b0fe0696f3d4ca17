//! Core types for mixed-model analysis.

mod design;
mod formula;
mod na_action;
mod options;
mod result;

pub use design::{DesignError, MixedDesign};
pub use formula::{Formula, FormulaError, RandomTerm, Term, INTERCEPT};
pub use na_action::{NaAction, NaError, NaHandler, NaInfo, NaResult};
pub use options::{Criterion, MixedOptions, MixedOptionsBuilder, OptionsError};
pub use result::{MixedResult, VarCorr};
pub(crate) use result::format_p;
