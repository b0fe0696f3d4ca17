//! Plots of fitted models: caterpillar dot plots, residual diagnostics,
//! group influence.

use super::{padded_range, prepare, written, PlotError};
use crate::core::MixedResult;
use crate::diagnostics::{normal_qq, standardized_residuals, GroupInfluence, RandomEffects};
use plotters::prelude::*;
use std::path::Path;

/// Dot plot of the BLUPs with their intervals, one panel per random term.
pub fn dotplot(path: &Path, effects: &RandomEffects) -> Result<(), PlotError> {
    let m = effects.terms.first().map_or(0, |t| t.effects.len());
    if m == 0 {
        return Err(PlotError::Empty("no random effects".to_string()));
    }
    prepare(path)?;

    let panels_n = effects.terms.len();
    let height = (14 * m as u32 + 120).max(300);
    let root = SVGBackend::new(path, (360 * panels_n as u32, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, panels_n));

    for (term, area) in effects.terms.iter().zip(panels.iter()) {
        let x_range = padded_range(
            term.effects
                .iter()
                .flat_map(|e| [e.lower, e.upper, e.estimate])
                .chain([0.0]),
        );
        let labels: Vec<&str> = term.effects.iter().map(|e| e.group.as_str()).collect();
        let label_of = |y: &f64| {
            let k = y.round();
            if (y - k).abs() < 1e-6 && k >= 0.0 {
                labels.get(k as usize).map_or_else(String::new, |s| s.to_string())
            } else {
                String::new()
            }
        };

        let mut chart = ChartBuilder::on(area)
            .caption(&term.term, ("sans-serif", 18))
            .margin(8)
            .x_label_area_size(35)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, -1.0..m as f64)?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(m + 1)
            .y_label_formatter(&label_of)
            .x_desc(effects.group_name.as_str())
            .draw()?;

        chart.draw_series(std::iter::once(PathElement::new(
            vec![(0.0, -1.0), (0.0, m as f64)],
            BLACK.mix(0.5),
        )))?;
        chart.draw_series(term.effects.iter().enumerate().map(|(k, e)| {
            PathElement::new(vec![(e.lower, k as f64), (e.upper, k as f64)], BLUE.mix(0.7))
        }))?;
        chart.draw_series(
            term.effects
                .iter()
                .enumerate()
                .map(|(k, e)| Circle::new((e.estimate, k as f64), 3, BLUE.filled())),
        )?;
    }

    root.present()?;
    written(path);
    Ok(())
}

/// Residuals against fitted values, and a normal QQ plot of the
/// standardized residuals.
pub fn residual_plots(path: &Path, result: &MixedResult) -> Result<(), PlotError> {
    let n = result.residuals.nrows();
    if n == 0 {
        return Err(PlotError::Empty("fit has no residuals".to_string()));
    }
    prepare(path)?;

    let root = SVGBackend::new(path, (1200, 550)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    let fitted = &result.fitted_values;
    let residuals = &result.residuals;
    let x_range = padded_range(fitted.iter().copied());
    let mut chart = ChartBuilder::on(&panels[0])
        .caption("Residuals vs fitted", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range.clone(), padded_range(residuals.iter().copied()))?;
    chart
        .configure_mesh()
        .x_desc("fitted values")
        .y_desc("residuals")
        .draw()?;
    chart.draw_series(std::iter::once(PathElement::new(
        vec![(x_range.start, 0.0), (x_range.end, 0.0)],
        RED.mix(0.7),
    )))?;
    chart.draw_series(
        (0..n).map(|i| Circle::new((fitted[i], residuals[i]), 2, BLUE.mix(0.6).filled())),
    )?;

    let qq = normal_qq(&standardized_residuals(result));
    let span = padded_range(qq.iter().flat_map(|&(t, s)| [t, s]));
    let mut chart = ChartBuilder::on(&panels[1])
        .caption("Normal Q-Q", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(span.clone(), span.clone())?;
    chart
        .configure_mesh()
        .x_desc("theoretical quantiles")
        .y_desc("standardized residuals")
        .draw()?;
    chart.draw_series(std::iter::once(PathElement::new(
        vec![(span.start, span.start), (span.end, span.end)],
        RED.mix(0.7),
    )))?;
    chart.draw_series(
        qq.iter()
            .map(|&p| Circle::new(p, 2, BLUE.mix(0.6).filled())),
    )?;

    root.present()?;
    written(path);
    Ok(())
}

/// Cook's distance and DFBETAS per group, with the conventional cut-offs.
pub fn influence_plot(path: &Path, influence: &GroupInfluence) -> Result<(), PlotError> {
    let m = influence.n_groups();
    if m == 0 {
        return Err(PlotError::Empty("no groups".to_string()));
    }
    prepare(path)?;

    let p = influence.fixed_names.len();
    let panels_n = p + 1;
    let root = SVGBackend::new(path, (300 * panels_n as u32, (14 * m as u32 + 120).max(300)))
        .into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, panels_n));

    let label_of = |y: &f64| {
        let k = y.round();
        if (y - k).abs() < 1e-6 && k >= 0.0 {
            influence.groups.get(k as usize).cloned().unwrap_or_default()
        } else {
            String::new()
        }
    };

    // panel 0: Cook's distance; panels 1..=p: DFBETAS per coefficient
    for (panel, area) in panels.iter().enumerate() {
        let (title, values, cutoffs): (String, Vec<f64>, Vec<f64>) = if panel == 0 {
            (
                "Cook's distance".to_string(),
                influence.cooks_distance.iter().copied().collect(),
                vec![influence.cooks_cutoff()],
            )
        } else {
            let j = panel - 1;
            let c = influence.dfbetas_cutoff();
            (
                format!("DFBETAS {}", influence.fixed_names[j]),
                (0..m).map(|g| influence.dfbetas[(g, j)]).collect(),
                vec![-c, c],
            )
        };
        let x_range =
            padded_range(values.iter().copied().chain(cutoffs.iter().copied()).chain([0.0]));

        let mut chart = ChartBuilder::on(area)
            .caption(title, ("sans-serif", 16))
            .margin(8)
            .x_label_area_size(35)
            .y_label_area_size(if panel == 0 { 60 } else { 10 })
            .build_cartesian_2d(x_range, -1.0..m as f64)?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(m + 1)
            .y_label_formatter(&label_of)
            .draw()?;

        for &cut in &cutoffs {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(cut, -1.0), (cut, m as f64)],
                RED.mix(0.6),
            )))?;
        }
        chart.draw_series(values.iter().enumerate().filter(|(_, v)| v.is_finite()).map(|(g, &v)| {
            let style = if cutoffs.iter().any(|&c| if c > 0.0 { v > c } else { v < c }) {
                RED.filled()
            } else {
                BLUE.filled()
            };
            Circle::new((v, g as f64), 3, style)
        }))?;
    }

    root.present()?;
    written(path);
    Ok(())
}
