//! PNG rendering of training curves and forecasts.

use std::fs;
use std::path::Path;

use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{ForecastError, Result};
use crate::training::TrainingHistory;

fn plot_err<E: std::fmt::Display>(error: E) -> ForecastError {
    ForecastError::Plot(error.to_string())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// (min, max) over all series, padded so flat curves still get a range
fn value_range<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    (lo - pad, hi + pad)
}

fn draw_pair(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    title: &str,
    y_label: &str,
    x_label: Option<&str>,
    series: [(&str, &[f64], RGBColor); 2],
) -> Result<()> {
    let epochs = series.iter().map(|(_, s, _)| s.len()).max().unwrap_or(0).max(2);
    let (y_min, y_max) = value_range(series.iter().flat_map(|(_, s, _)| s.iter()));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(0usize..epochs - 1, y_min..y_max)
        .map_err(plot_err)?;

    let mut mesh = chart.configure_mesh();
    mesh.y_desc(y_label);
    if let Some(x_label) = x_label {
        mesh.x_desc(x_label);
    }
    mesh.draw().map_err(plot_err)?;

    for (label, values, color) in series {
        if values.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &v)| (i, v)),
                ShapeStyle::from(&color).stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

/// Two stacked panels: train/validation loss and train/validation MSE.
pub fn plot_training_curves<P: AsRef<Path>>(history: &TrainingHistory, path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let root = BitMapBackend::new(path, (1000, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly((2, 1));

    let (loss, val_loss) = (history.loss(), history.val_loss());
    let (mse, val_mse) = (history.mse(), history.val_mse());

    draw_pair(
        &panels[0],
        "Train and Validation Loss",
        "Loss",
        None,
        [("train_loss", loss.as_slice(), BLUE), ("val_loss", val_loss.as_slice(), RGBColor(255, 165, 0))],
    )?;
    draw_pair(
        &panels[1],
        "Train and Validation MSE",
        "MSE",
        Some("Epochs"),
        [("train_mse", mse.as_slice(), GREEN), ("val_mse", val_mse.as_slice(), RED)],
    )?;

    root.present().map_err(plot_err)?;
    info!("training curves written to {}", path.display());
    Ok(())
}

/// Line chart of predicted weight per future day.
pub fn plot_forecast<P: AsRef<Path>>(predictions: &[f64], path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let root = BitMapBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let days = predictions.len().max(2);
    let (y_min, y_max) = value_range(predictions.iter());
    let mut chart = ChartBuilder::on(&root)
        .caption("Future Weight Predictions", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0usize..days - 1, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Days")
        .y_desc("Weight (kg)")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            predictions.iter().enumerate().map(|(i, &w)| (i, w)),
            ShapeStyle::from(&BLUE).stroke_width(2),
        ))
        .map_err(plot_err)?
        .label("Predicted Weight")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("forecast plot written to {}", path.display());
    Ok(())
}
