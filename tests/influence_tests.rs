//! Group-deletion influence tests.

mod common;

use approx::assert_relative_eq;
use hlm_rs::core::{Formula, MixedDesign, MixedOptions};
use hlm_rs::data::{Column, Dataset, Frame, LoadOptions};
use hlm_rs::diagnostics::GroupInfluence;
use hlm_rs::pipeline::MODEL_LADDER;
use hlm_rs::solvers::{FittedMixed, LmmRegressor, MixedEstimator};

fn estimator() -> LmmRegressor {
    LmmRegressor::new(MixedOptions {
        compute_inference: false,
        ..MixedOptions::ml()
    })
}

/// The synthetic data with the party gap reversed in the first state.
fn with_rogue_state() -> Dataset {
    let frame = common::tobacco_frame(12, 5, false);
    let state = frame.numeric("state").unwrap().to_vec();
    let party = frame.numeric("party").unwrap().to_vec();
    let votes: Vec<f64> = frame
        .numeric("votepct")
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if state[i] == state[0] {
                if party[i] == 1.0 { 0.0 } else { 100.0 }
            } else {
                v
            }
        })
        .collect();

    let mut columns: Vec<(String, Column)> = frame
        .columns()
        .filter(|(name, _)| *name != "votepct")
        .map(|(name, c)| (name.to_string(), c.clone()))
        .collect();
    columns.push(("votepct".to_string(), Column::Numeric(votes)));
    Dataset::from_frame(&Frame::from_columns(columns).unwrap(), &LoadOptions::default()).unwrap()
}

#[test]
fn test_every_deleted_fit_is_finite() {
    let dataset = common::tobacco_dataset(10, 9);
    let design = MixedDesign::from_dataset(&dataset, &Formula::parse(MODEL_LADDER[3].1).unwrap()).unwrap();
    let full = LmmRegressor::builder().build().fit(&design).unwrap();
    let influence = GroupInfluence::compute(&estimator(), &design, full.result()).unwrap();

    assert_eq!(influence.n_groups(), design.n_groups());
    assert_eq!(influence.deleted_estimates.nrows(), design.n_groups());
    assert_eq!(influence.deleted_estimates.ncols(), 4);
    assert_eq!(influence.dfbetas.ncols(), 4);
    for g in 0..influence.n_groups() {
        assert!(influence.cooks_distance[g].is_finite() && influence.cooks_distance[g] >= 0.0);
        for j in 0..4 {
            assert!(influence.deleted_estimates[(g, j)].is_finite());
            assert!(influence.dfbetas[(g, j)].is_finite());
        }
    }
}

#[test]
fn test_deleted_estimates_match_direct_refit() {
    let dataset = common::tobacco_dataset(8, 2);
    let design = MixedDesign::from_dataset(&dataset, &Formula::parse(MODEL_LADDER[1].1).unwrap()).unwrap();
    let full = LmmRegressor::builder().build().fit(&design).unwrap();
    let influence = GroupInfluence::compute(&estimator(), &design, full.result()).unwrap();

    let direct = estimator().fit(&design.without_group(3)).unwrap();
    for j in 0..2 {
        assert_relative_eq!(
            influence.deleted_estimates[(3, j)],
            direct.result().fixed_effects[j],
            epsilon = 1e-10
        );
    }
}

#[test]
fn test_rogue_state_is_most_influential() {
    let dataset = with_rogue_state();
    let design = MixedDesign::from_dataset(&dataset, &Formula::parse(MODEL_LADDER[1].1).unwrap()).unwrap();
    let full = LmmRegressor::builder().build().fit(&design).unwrap();
    let influence = GroupInfluence::compute(&estimator(), &design, full.result()).unwrap();

    let top = (0..influence.n_groups())
        .max_by(|&a, &b| influence.cooks_distance[a].total_cmp(&influence.cooks_distance[b]))
        .unwrap();
    assert_eq!(influence.groups[top], "1");
    assert!(influence.influential_cooks(None).contains(&top));
    assert!(influence.influential_dfbetas(None).contains(&(top, 1)));
    assert!(influence.to_string().contains('*'));
}

#[test]
fn test_cutoffs() {
    let dataset = common::tobacco_dataset(16, 4);
    let design = MixedDesign::from_dataset(&dataset, &Formula::parse(MODEL_LADDER[0].1).unwrap()).unwrap();
    let full = LmmRegressor::builder().build().fit(&design).unwrap();
    let influence = GroupInfluence::compute(&estimator(), &design, full.result()).unwrap();

    assert_relative_eq!(influence.cooks_cutoff(), 0.25, epsilon = 1e-12);
    assert_relative_eq!(influence.dfbetas_cutoff(), 0.5, epsilon = 1e-12);
    assert!(influence.influential_cooks(Some(f64::INFINITY)).is_empty());
    assert_eq!(influence.influential_cooks(Some(-1.0)).len(), 16);
}
