//! Conditional modes of the random effects with their intervals.

use crate::core::MixedResult;
use crate::inference::normal_quantile;
use std::fmt;

/// One group's prediction for one random term.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEffect {
    pub group: String,
    pub estimate: f64,
    /// Conditional standard deviation.
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

/// BLUPs of one random term across all groups, sorted by estimate.
#[derive(Debug, Clone)]
pub struct TermEffects {
    pub term: String,
    pub effects: Vec<GroupEffect>,
}

/// Random-effect predictions of a fit, ready for a caterpillar plot.
#[derive(Debug, Clone)]
pub struct RandomEffects {
    pub group_name: String,
    pub confidence_level: f64,
    pub terms: Vec<TermEffects>,
}

impl RandomEffects {
    /// Collect the BLUPs of `result` with conditional-variance intervals at
    /// `confidence_level`.
    pub fn from_fit(result: &MixedResult, confidence_level: f64) -> Self {
        let z = normal_quantile(1.0 - (1.0 - confidence_level) / 2.0);
        let terms = result
            .var_corr
            .terms
            .iter()
            .enumerate()
            .map(|(k, term)| {
                let mut effects: Vec<GroupEffect> = result
                    .group_labels
                    .iter()
                    .enumerate()
                    .map(|(g, label)| {
                        let estimate = result.random_effects[(g, k)];
                        let std_dev = result
                            .conditional_variances
                            .get(g)
                            .map_or(f64::NAN, |v| v[(k, k)].max(0.0).sqrt());
                        GroupEffect {
                            group: label.clone(),
                            estimate,
                            std_dev,
                            lower: estimate - z * std_dev,
                            upper: estimate + z * std_dev,
                        }
                    })
                    .collect();
                effects.sort_by(|a, b| a.estimate.total_cmp(&b.estimate));
                TermEffects {
                    term: term.clone(),
                    effects,
                }
            })
            .collect();

        Self {
            group_name: result.var_corr.group.clone(),
            confidence_level,
            terms,
        }
    }

    pub fn term(&self, name: &str) -> Option<&TermEffects> {
        self.terms.iter().find(|t| t.term == name)
    }
}

impl fmt::Display for RandomEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .terms
            .iter()
            .flat_map(|t| t.effects.iter().map(|e| e.group.len()))
            .max()
            .unwrap_or(0)
            .max(self.group_name.len());
        for term in &self.terms {
            writeln!(f, "${} :: {}", self.group_name, term.term)?;
            writeln!(
                f,
                "{:<w$} {:>10} {:>10} {:>10} {:>10}",
                self.group_name,
                "estimate",
                "cond.sd",
                "lower",
                "upper",
                w = width
            )?;
            for e in &term.effects {
                writeln!(
                    f,
                    "{:<w$} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                    e.group,
                    e.estimate,
                    e.std_dev,
                    e.lower,
                    e.upper,
                    w = width
                )?;
            }
        }
        Ok(())
    }
}
