//! Plotters-powered forecast chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.
//! The x axis is the position on the series timeline; tick labels map positions
//! back to timestamps.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::domain::SeriesData;

/// Chart-ready series for one forecast view entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub timeline: Vec<String>,
    pub history: Vec<(f64, f64)>,
    pub forecast: Vec<(f64, f64)>,
    /// `(x, low, high)` per forecast step with a numeric band.
    pub band: Vec<(f64, f64, f64)>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl ChartData {
    pub fn from_series(series: &SeriesData) -> Self {
        let timeline = series.timeline();
        let x_of = |ts: &str| timeline.binary_search_by(|t| t.as_str().cmp(ts)).ok().map(|i| i as f64);

        let history: Vec<(f64, f64)> = series
            .history
            .iter()
            .filter_map(|h| Some((x_of(&h.timestamp)?, h.target)))
            .collect();
        let forecast: Vec<(f64, f64)> = series
            .p50_line()
            .into_iter()
            .filter_map(|(ts, y)| Some((x_of(&ts)?, y?)))
            .collect();
        let band: Vec<(f64, f64, f64)> = series
            .band_points()
            .into_iter()
            .filter_map(|(ts, lo, hi)| Some((x_of(&ts)?, lo, hi)))
            .collect();

        let x_max = timeline.len().saturating_sub(1).max(1) as f64;

        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let ys = history
            .iter()
            .chain(&forecast)
            .map(|&(_, y)| y)
            .chain(band.iter().flat_map(|&(_, lo, hi)| [lo, hi]));
        for y in ys {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        if !y_min.is_finite() || !y_max.is_finite() {
            y_min = 0.0;
            y_max = 1.0;
        } else if y_max <= y_min {
            y_min -= 1.0;
            y_max += 1.0;
        }
        let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

        Self {
            timeline,
            history,
            forecast,
            band,
            x_bounds: [0.0, x_max],
            y_bounds: [y_min - pad, y_max + pad],
        }
    }

    /// Timestamp nearest to an x position, for tick labels.
    pub fn label_at(&self, x: f64) -> &str {
        if self.timeline.is_empty() || !x.is_finite() {
            return "";
        }
        let idx = (x.round().max(0.0) as usize).min(self.timeline.len() - 1);
        &self.timeline[idx]
    }
}

/// A lightweight, render-only chart description.
///
/// All series and bounds are computed outside the render call.
pub struct ForecastChart<'a> {
    pub data: &'a ChartData,
    pub y_label: &'a str,
}

impl<'a> Widget for ForecastChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // When the available area is too small, Plotters may fail to build a chart.
        // In that case, we render a small hint rather than panicking.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.data.x_bounds;
        let [y0, y1] = self.data.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let data = self.data;
        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc("timestamp")
                .y_desc(self.y_label)
                .x_labels(4)
                .y_labels(5)
                .x_label_formatter(&|v| data.label_at(*v).to_string())
                .y_label_formatter(&|v| format!("{v:.1}"))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let history_color = WHITE;
            let forecast_color = RGBColor(0, 255, 255); // cyan
            let band_color = RGBColor(70, 110, 160);

            // Band first so both lines stay visible on top of it.
            chart.draw_series(
                data.band
                    .iter()
                    .map(|&(x, lo, hi)| PathElement::new(vec![(x, lo), (x, hi)], band_color)),
            )?;

            chart.draw_series(LineSeries::new(data.history.iter().copied(), &history_color))?;

            // Join the forecast to the last observation so the two read as one line.
            let joined = data
                .history
                .last()
                .copied()
                .into_iter()
                .chain(data.forecast.iter().copied());
            chart.draw_series(LineSeries::new(joined, &forecast_color))?;

            // Circle markers render oversized through this backend; pixels stay crisp.
            chart.draw_series(
                data.forecast
                    .iter()
                    .map(|&(x, y)| Pixel::new((x, y), forecast_color)),
            )?;

            Ok(())
        });

        widget.render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Band, HistoryPoint, PredictionRow, QuantileValue};
    use serde_json::Map;

    fn row(ts: &str, mean: Option<f64>, quantiles: &[(&str, f64, Option<f64>)]) -> PredictionRow {
        PredictionRow {
            item_id: Some("A".into()),
            timestamp: Some(ts.into()),
            mean,
            quantiles: quantiles
                .iter()
                .map(|&(label, level, value)| QuantileValue {
                    label: label.into(),
                    level,
                    value,
                })
                .collect(),
            extra: Map::new(),
        }
    }

    #[test]
    fn positions_follow_the_shared_timeline() {
        let series = SeriesData {
            history: vec![
                HistoryPoint { timestamp: "2024-01-01".into(), target: 1.0 },
                HistoryPoint { timestamp: "2024-01-02".into(), target: 3.0 },
            ],
            predictions: vec![
                row("2024-01-03", Some(9.0), &[("0.1", 0.1, Some(2.0)), ("0.5", 0.5, Some(4.0)), ("0.9", 0.9, Some(6.0))]),
                row("2024-01-04", Some(5.0), &[("0.1", 0.1, None), ("0.5", 0.5, None), ("0.9", 0.9, Some(7.0))]),
            ],
            band: Some(Band {
                low_key: "0.1".into(),
                high_key: "0.9".into(),
            }),
        };

        let data = ChartData::from_series(&series);
        assert_eq!(data.history, vec![(0.0, 1.0), (1.0, 3.0)]);
        // Median first, mean when the median is null.
        assert_eq!(data.forecast, vec![(2.0, 4.0), (3.0, 5.0)]);
        assert_eq!(data.band, vec![(2.0, 2.0, 6.0)]);
        assert_eq!(data.x_bounds, [0.0, 3.0]);
        assert!(data.y_bounds[0] < 1.0 && data.y_bounds[1] > 6.0);
        assert_eq!(data.label_at(2.4), "2024-01-03");
        assert_eq!(data.label_at(99.0), "2024-01-04");
    }

    #[test]
    fn empty_series_gets_usable_bounds() {
        let data = ChartData::from_series(&SeriesData::default());
        assert!(data.y_bounds[1] > data.y_bounds[0]);
        assert!(data.x_bounds[1] > data.x_bounds[0]);
        assert_eq!(data.label_at(0.0), "");
    }
}
