//! Plots of the raw data: pooled scatter, per-group lines, faceted panels.

use super::{ols_line, padded_range, prepare, written, PlotError};
use crate::data::Dataset;
use plotters::prelude::*;
use std::path::Path;

/// Points of `y` against `x` with the pooled least-squares line. With
/// `color_by`, points are coloured by that column's value (0 blue, other red).
pub fn scatter(
    path: &Path,
    dataset: &Dataset,
    x: &str,
    y: &str,
    color_by: Option<&str>,
) -> Result<(), PlotError> {
    let xs = dataset.frame.numeric(x)?;
    let ys = dataset.frame.numeric(y)?;
    let colors = color_by.map(|c| dataset.frame.numeric(c)).transpose()?;
    if xs.is_empty() {
        return Err(PlotError::Empty(format!("`{x}` has no rows")));
    }
    prepare(path)?;

    let x_range = padded_range(xs.iter().copied());
    let root = SVGBackend::new(path, (900, 650)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{y} by {x}"), ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), padded_range(ys.iter().copied()))?;
    chart.configure_mesh().x_desc(x).y_desc(y).draw()?;

    for (level, color) in [(false, BLUE), (true, RED)] {
        let points: Vec<(f64, f64)> = (0..xs.len())
            .filter(|&i| match &colors {
                Some(c) => (c[i] != 0.0) == level,
                None => !level,
            })
            .map(|i| (xs[i], ys[i]))
            .collect();
        if points.is_empty() {
            continue;
        }
        let series = chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, 3, color.mix(0.6).filled())),
        )?;
        if let Some(name) = color_by {
            series
                .label(format!("{name} = {}", u8::from(level)))
                .legend(move |(lx, ly)| Circle::new((lx + 8, ly), 4, color.filled()));
        }
    }

    if let Some((a, b)) = ols_line(xs, ys) {
        chart.draw_series(LineSeries::new(
            [x_range.start, x_range.end].map(|v| (v, a + b * v)),
            BLACK.stroke_width(2),
        ))?;
    }
    if color_by.is_some() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    written(path);
    Ok(())
}

/// One least-squares line of `y` on `x` per group, all on one panel.
pub fn group_lines(path: &Path, dataset: &Dataset, x: &str, y: &str) -> Result<(), PlotError> {
    let xs = dataset.frame.numeric(x)?;
    let ys = dataset.frame.numeric(y)?;
    if xs.is_empty() {
        return Err(PlotError::Empty(format!("`{x}` has no rows")));
    }
    prepare(path)?;

    let root = SVGBackend::new(path, (900, 650)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{y} by {x}, one line per {}", dataset.group.name()),
            ("sans-serif", 22),
        )
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(padded_range(xs.iter().copied()), padded_range(ys.iter().copied()))?;
    chart.configure_mesh().x_desc(x).y_desc(y).draw()?;

    for code in 0..dataset.group.n_levels() {
        let rows = dataset.group.rows_of(code);
        let gx: Vec<f64> = rows.iter().map(|&i| xs[i]).collect();
        let gy: Vec<f64> = rows.iter().map(|&i| ys[i]).collect();
        let Some((a, b)) = ols_line(&gx, &gy) else {
            continue;
        };
        let lo = gx.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = gx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        chart.draw_series(LineSeries::new(
            [lo, hi].map(|v| (v, a + b * v)),
            Palette99::pick(code).mix(0.8).stroke_width(1),
        ))?;
    }

    root.present()?;
    written(path);
    Ok(())
}

/// One panel per group with its points and least-squares line, sharing axes.
pub fn facet_grid(path: &Path, dataset: &Dataset, x: &str, y: &str) -> Result<(), PlotError> {
    let xs = dataset.frame.numeric(x)?;
    let ys = dataset.frame.numeric(y)?;
    let m = dataset.group.n_levels();
    if m == 0 {
        return Err(PlotError::Empty("dataset has no groups".to_string()));
    }
    prepare(path)?;

    let cols = (m as f64).sqrt().ceil() as usize;
    let rows_n = m.div_ceil(cols);
    let x_range = padded_range(xs.iter().copied());
    let y_range = padded_range(ys.iter().copied());

    let root = SVGBackend::new(path, (220 * cols as u32, 200 * rows_n as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((rows_n, cols));

    for (code, area) in panels.iter().enumerate().take(m) {
        let rows = dataset.group.rows_of(code);
        let mut chart = ChartBuilder::on(area)
            .caption(dataset.group.level(code), ("sans-serif", 14))
            .margin(4)
            .x_label_area_size(20)
            .y_label_area_size(28)
            .build_cartesian_2d(x_range.clone(), y_range.clone())?;
        chart.configure_mesh().x_labels(3).y_labels(3).draw()?;

        chart.draw_series(
            rows.iter()
                .map(|&i| Circle::new((xs[i], ys[i]), 2, BLUE.mix(0.7).filled())),
        )?;
        let gx: Vec<f64> = rows.iter().map(|&i| xs[i]).collect();
        let gy: Vec<f64> = rows.iter().map(|&i| ys[i]).collect();
        if let Some((a, b)) = ols_line(&gx, &gy) {
            chart.draw_series(LineSeries::new(
                [x_range.start, x_range.end].map(|v| (v, a + b * v)),
                RED.stroke_width(1),
            ))?;
        }
    }

    root.present()?;
    written(path);
    Ok(())
}
