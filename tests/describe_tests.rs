//! Descriptive statistics of the tobacco-vote columns.

mod common;

use approx::assert_relative_eq;
use hlm_rs::descriptive::describe;

#[test]
fn test_every_column_described() {
    let dataset = common::tobacco_dataset(10, 8);
    let description = describe(&dataset.frame).unwrap();

    let names: Vec<&str> = description.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["state", "lastname", "votepct", "party", "money", "acres"]);
    assert!(description.rows.iter().all(|r| r.n == dataset.nrows()));
}

#[test]
fn test_numeric_column_matches_direct_computation() {
    let dataset = common::tobacco_dataset(10, 8);
    let description = describe(&dataset.frame).unwrap();
    let money = dataset.frame.numeric("money").unwrap();
    let n = money.len() as f64;
    let mean = money.iter().sum::<f64>() / n;
    let sd = (money.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

    let row = description.variable("money").unwrap();
    assert_relative_eq!(row.mean, mean, epsilon = 1e-10);
    assert_relative_eq!(row.sd, sd, epsilon = 1e-10);
    assert!(row.min <= row.trimmed && row.trimmed <= row.max);
    assert_relative_eq!(row.range, row.max - row.min, epsilon = 1e-12);
}

#[test]
fn test_binary_party_summary() {
    let dataset = common::tobacco_dataset(10, 8);
    let description = describe(&dataset.frame).unwrap();
    let party = description.variable("party").unwrap();
    assert_eq!(party.min, 0.0);
    assert_eq!(party.max, 1.0);
    assert!(party.mean > 0.0 && party.mean < 1.0);
}

#[test]
fn test_text_column_described_by_codes() {
    let dataset = common::tobacco_dataset(10, 8);
    let description = describe(&dataset.frame).unwrap();
    let lastname = description.variable("lastname").unwrap();

    assert!(lastname.is_text);
    // every name is distinct, so the codes are 1..=n
    assert_eq!(lastname.min, 1.0);
    assert_eq!(lastname.max, dataset.nrows() as f64);
    assert!(description.to_string().contains("lastname*"));
}
