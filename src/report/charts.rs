//! SVG chart rendering.
//!
//! Charts are plain descriptions (series of points, bars, vertical markers)
//! that are handed to plotters' SVG backend. Nothing here knows about log
//! records; the command layer builds the descriptions.

use crate::error::{AnalysisError, AnalysisResult};
use anyhow::Context;
use plotters::prelude::*;
use plotters::style::FontTransform;
use std::path::Path;
use tracing::info;

/// Fallback colors for series without a configured one.
pub const PALETTE: [&str; 8] = [
    "#2E86AB", "#C73E1D", "#A23B72", "#F18F01", "#3B1F2B", "#44AF69", "#6C4E97", "#8C564B",
];

const SIZE: (u32, u32) = (1200, 700);

/// Parse `#RRGGBB` (the `#` is optional).
pub fn parse_color(hex: &str) -> AnalysisResult<RGBColor> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(AnalysisError::InvalidColor(hex.to_string()));
    }

    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| AnalysisError::InvalidColor(hex.to_string()))
    };
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

/// Palette color for the `i`-th series.
pub fn palette(i: usize) -> RGBColor {
    parse_color(PALETTE[i % PALETTE.len()]).unwrap_or(BLACK)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    Line,
    /// Line with a dot on every point.
    LinePoints,
}

/// One named series of `(x, y)` points.
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub color: RGBColor,
    pub style: SeriesStyle,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(label: impl Into<String>, color: RGBColor, style: SeriesStyle) -> Self {
        Self {
            label: label.into(),
            color,
            style,
            points: Vec::new(),
        }
    }

    pub fn with_points(mut self, points: Vec<(f64, f64)>) -> Self {
        self.points = points;
        self
    }
}

/// A labelled vertical line at `x`, e.g. a percentile.
#[derive(Debug, Clone)]
pub struct Marker {
    pub label: String,
    pub x: f64,
    pub color: RGBColor,
}

/// An x/y chart of line and point series.
#[derive(Debug, Clone, Default)]
pub struct LineChart {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub series: Vec<Series>,
    pub markers: Vec<Marker>,
    /// Fixed y range, e.g. `0..1` for a CDF.
    pub y_range: Option<(f64, f64)>,
}

impl LineChart {
    pub fn new(title: impl Into<String>, x_desc: impl Into<String>, y_desc: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_desc: x_desc.into(),
            y_desc: y_desc.into(),
            ..Self::default()
        }
    }

    fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let xs = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.0))
            .chain(self.markers.iter().map(|m| m.x));
        let (x_min, x_max) = min_max(xs)?;

        let y_range = match self.y_range {
            Some(range) => range,
            None => {
                let (lo, hi) = min_max(self.series.iter().flat_map(|s| s.points.iter().map(|p| p.1)))?;
                (lo.min(0.0), hi)
            }
        };

        Some((pad(x_min, x_max), pad(y_range.0, y_range.1)))
    }
}

/// One bar of a bar chart.
#[derive(Debug, Clone)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub color: RGBColor,
}

/// A categorical bar chart; bars are drawn in order, left to right.
#[derive(Debug, Clone, Default)]
pub struct BarChart {
    pub title: String,
    pub y_desc: String,
    pub bars: Vec<Bar>,
}

/// Render a line chart to an SVG file.
pub fn render_line_chart(chart: &LineChart, path: &Path) -> AnalysisResult<()> {
    draw_line_chart(chart, path).map_err(|e| chart_error(path, e))?;
    info!("Chart saved to {}", path.display());
    Ok(())
}

/// Render a bar chart to an SVG file.
pub fn render_bar_chart(chart: &BarChart, path: &Path) -> AnalysisResult<()> {
    draw_bar_chart(chart, path).map_err(|e| chart_error(path, e))?;
    info!("Chart saved to {}", path.display());
    Ok(())
}

fn chart_error(path: &Path, e: anyhow::Error) -> AnalysisError {
    AnalysisError::Chart {
        path: path.display().to_string(),
        message: format!("{:#}", e),
    }
}

fn draw_line_chart(chart: &LineChart, path: &Path) -> anyhow::Result<()> {
    let ((x_min, x_max), (y_min, y_max)) = chart.bounds().context("nothing to plot")?;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(&chart.title, ("sans-serif", 22).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    ctx.configure_mesh()
        .x_desc(chart.x_desc.as_str())
        .y_desc(chart.y_desc.as_str())
        .draw()?;

    for series in &chart.series {
        let color = series.color;
        ctx.draw_series(LineSeries::new(series.points.iter().copied(), color.stroke_width(2)))?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

        if series.style == SeriesStyle::LinePoints {
            ctx.draw_series(
                series
                    .points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
            )?;
        }
    }

    for marker in &chart.markers {
        let color = marker.color;
        ctx.draw_series(std::iter::once(PathElement::new(
            vec![(marker.x, y_min), (marker.x, y_max)],
            color.mix(0.7).stroke_width(1),
        )))?
        .label(marker.label.as_str())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.mix(0.7).stroke_width(1)));
    }

    ctx.configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_bar_chart(chart: &BarChart, path: &Path) -> anyhow::Result<()> {
    if chart.bars.is_empty() {
        anyhow::bail!("nothing to plot");
    }
    let (lo, hi) = min_max(chart.bars.iter().map(|b| b.value)).context("nothing to plot")?;
    let (y_min, y_max) = pad(lo.min(0.0), hi.max(0.0));
    let n = chart.bars.len();

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(&chart.title, ("sans-serif", 22).into_font())
        .margin(20)
        .x_label_area_size(120)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)?;

    let labels: Vec<String> = chart.bars.iter().map(|b| b.label.clone()).collect();
    ctx.configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| {
            let idx = x.round();
            if (x - idx).abs() > 1e-6 || idx < 0.0 {
                return String::new();
            }
            labels.get(idx as usize).cloned().unwrap_or_default()
        })
        .x_label_style(("sans-serif", 11).into_font().transform(FontTransform::Rotate90))
        .y_desc(chart.y_desc.as_str())
        .draw()?;

    ctx.draw_series(chart.bars.iter().enumerate().map(|(i, bar)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, bar.value)], bar.color.filled())
    }))?;

    root.present()?;
    Ok(())
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Widen a range by 5% on each side, or by 1 when it is a single point.
fn pad(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span <= f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo - span * 0.05, hi + span * 0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#2E86AB").unwrap(), RGBColor(0x2E, 0x86, 0xAB));
        assert_eq!(parse_color("ff0000").unwrap(), RGBColor(255, 0, 0));
        assert!(matches!(parse_color("#12345"), Err(AnalysisError::InvalidColor(_))));
        assert!(parse_color("#GGGGGG").is_err());
    }

    #[test]
    fn test_pad_single_point() {
        assert_eq!(pad(3.0, 3.0), (2.0, 4.0));
        let (lo, hi) = pad(0.0, 10.0);
        assert!(lo < 0.0 && hi > 10.0);
    }

    #[test]
    fn test_render_line_chart_writes_svg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cdf.svg");

        let mut chart = LineChart::new("CDF", "Duration (s)", "Probability");
        chart.y_range = Some((0.0, 1.0));
        chart.series.push(
            Series::new("request", palette(0), SeriesStyle::Line)
                .with_points(vec![(1.0, 0.25), (2.0, 0.5), (3.0, 0.75), (4.0, 1.0)]),
        );
        chart.markers.push(Marker {
            label: "P50: 2.50s".to_string(),
            x: 2.5,
            color: palette(1),
        });

        render_line_chart(&chart, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"));
    }

    #[test]
    fn test_render_bar_chart_writes_svg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.svg");

        let chart = BarChart {
            title: "worker_0".to_string(),
            y_desc: "Duration (s)".to_string(),
            bars: vec![
                Bar {
                    label: "preprocessing_duration".to_string(),
                    value: 1.5,
                    color: palette(0),
                },
                Bar {
                    label: "total_step_duration".to_string(),
                    value: 9.0,
                    color: palette(1),
                },
            ],
        };

        render_bar_chart(&chart, &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("<svg"));
    }

    #[test]
    fn test_empty_chart_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.svg");
        let chart = LineChart::new("empty", "x", "y");
        assert!(matches!(
            render_line_chart(&chart, &path),
            Err(AnalysisError::Chart { .. })
        ));
    }
}
