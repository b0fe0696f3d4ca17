//! Mixed-model diagnostics (ICC, BLUPs, residuals, group influence).
//!
//! - **ICC**: share of the variance that lies between groups
//! - **Random effects**: BLUPs with conditional-variance intervals
//! - **Residuals**: standardized conditional residuals and normal QQ coordinates
//! - **Influence**: Cook's distance and DFBETAS from group-deletion refits
//!
//! # Example
//!
//! ```rust,ignore
//! use hlm_rs::diagnostics::{intraclass_correlation, GroupInfluence, RandomEffects};
//!
//! let icc = intraclass_correlation(fitted.result());
//! let ranef = RandomEffects::from_fit(fitted.result(), 0.95);
//! let influence = GroupInfluence::compute(&estimator, &design, fitted.result())?;
//! let flagged = influence.influential_cooks(None);
//! ```

mod icc;
mod influence;
mod ranef;
mod residuals;

pub use icc::{intraclass_correlation, IccSummary};
pub use influence::GroupInfluence;
pub use ranef::{GroupEffect, RandomEffects, TermEffects};
pub use residuals::{normal_qq, ppoints, standardized_residuals};
