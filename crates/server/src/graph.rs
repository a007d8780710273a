//! Report charts rendered to inline SVG with plotters

use csvision_pipeline::ConfusionMatrix;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::Result;

const SCATTER_SIZE: (u32, u32) = (600, 400);
const CELL: u32 = 60;
const AXIS_AREA: u32 = 60;
const FONT: &str = "sans-serif";

/// Least-squares line of predicted on actual
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedLine {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl FittedLine {
    /// `None` when fewer than two distinct actual values are available
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for (x, y) in points {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
            syy += (y - mean_y) * (y - mean_y);
        }
        if points.len() < 2 || sxx <= f64::EPSILON {
            return None;
        }

        let slope = sxy / sxx;
        let r_squared = if syy > 0.0 { sxy * sxy / (sxx * syy) } else { 1.0 };
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
            r_squared,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn formula(&self) -> String {
        format!(
            "Y = {:.4}x + {:.4} (R\u{b2} = {:.4})",
            self.slope, self.intercept, self.r_squared
        )
    }
}

/// Finite bounds of both series, widened when degenerate
fn bounds(points: &[(f64, f64)]) -> (f64, f64) {
    let (lo, hi) = points
        .iter()
        .flat_map(|(a, p)| [*a, *p])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !lo.is_finite() {
        (0.0, 1.0)
    } else if hi - lo < f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Actual (x) against predicted (y) with the identity line and the fitted
/// regression line; the fitted formula with its R² is the caption.
/// Pairs with a non-finite value are not drawn.
pub fn scatter_svg(actual: &[f64], predicted: &[f64]) -> Result<String> {
    let points: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a.is_finite() && p.is_finite())
        .map(|(a, p)| (*a, *p))
        .collect();
    let (lo, hi) = bounds(&points);
    let fitted = FittedLine::fit(&points);
    let caption = fitted.map_or_else(|| "Actual vs Predicted".to_string(), |line| line.formula());

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SCATTER_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(caption, (FONT, 16))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(AXIS_AREA)
            .build_cartesian_2d(lo..hi, lo..hi)?;
        chart
            .configure_mesh()
            .x_desc("Actual")
            .y_desc("Predicted")
            .draw()?;

        chart.draw_series(LineSeries::new([(lo, lo), (hi, hi)], BLACK.mix(0.3)))?;
        if let Some(line) = fitted {
            chart.draw_series(LineSeries::new(
                [(lo, line.at(lo)), (hi, line.at(hi))],
                RED.stroke_width(2),
            ))?;
        }
        chart.draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 3, GREEN.mix(0.7).filled())),
        )?;

        root.present()?;
    }
    Ok(svg)
}

/// Heatmap of a confusion matrix; rows are actual classes, top to bottom
pub fn confusion_svg(matrix: &ConfusionMatrix) -> Result<String> {
    let k = matrix.class_names.len();
    if k == 0 {
        return Ok(String::new());
    }
    let side = AXIS_AREA + 30 + CELL * k as u32;
    let max = matrix.counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    let names = &matrix.class_names;
    let last = k as i32 - 1;

    let x_label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    let y_label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) => names.get((last - *i) as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    };

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (side, side)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Confusion Matrix", (FONT, 16))
            .margin(10)
            .x_label_area_size(AXIS_AREA / 2)
            .y_label_area_size(AXIS_AREA)
            .build_cartesian_2d(
                (0..k as i32).into_segmented(),
                (0..k as i32).into_segmented(),
            )?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(k)
            .y_labels(k)
            .x_label_formatter(&x_label)
            .y_label_formatter(&y_label)
            .x_desc("Predicted")
            .y_desc("Actual")
            .draw()?;

        let cells: Vec<(i32, i32, u64)> = matrix
            .counts
            .iter()
            .enumerate()
            .flat_map(|(row, counts)| {
                counts
                    .iter()
                    .enumerate()
                    .map(move |(col, count)| (col as i32, last - row as i32, *count))
            })
            .collect();

        chart.draw_series(cells.iter().map(|&(x, y, count)| {
            let intensity = count as f64 / max;
            Rectangle::new(
                [
                    (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
                ],
                RGBColor(46, 125, 50).mix(0.08 + 0.92 * intensity).filled(),
            )
        }))?;
        chart.draw_series(cells.iter().map(|&(x, y, count)| {
            let color = if count as f64 / max > 0.5 { WHITE } else { BLACK };
            let style = (FONT, 14)
                .into_font()
                .color(&color)
                .pos(Pos::new(HPos::Center, VPos::Center));
            Text::new(
                count.to_string(),
                (SegmentValue::CenterOf(x), SegmentValue::CenterOf(y)),
                style,
            )
        }))?;

        root.present()?;
    }
    Ok(svg)
}
