//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! The x axis is the series timeline (history and forecast timestamps in
//! order, evenly spaced). Plot elements:
//! - history: `o` points joined by `.`
//! - forecast (median, else mean): `x` points joined by `-`
//! - confidence band: `:` between the band bounds

use crate::domain::SeriesData;

/// Render one series of a forecast view.
pub fn render_series_plot(item_id: &str, series: &SeriesData, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let timeline = series.timeline();
    let x_max = timeline.len().saturating_sub(1).max(1) as f64;
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

    let mut out = String::new();
    let band_label = series
        .band
        .as_ref()
        .map(|b| b.label())
        .unwrap_or_else(|| "none".to_string());
    out.push_str(&format!(
        "Series {item_id}: history={} forecast={} | band {band_label}",
        series.history.len(),
        series.predictions.len(),
    ));

    let Some((y_min, y_max)) = y_range(&history, &forecast, &band) else {
        out.push_str("\n(no numeric points to plot)\n");
        return out;
    };
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    out.push_str(&format!(" | y=[{y_min:.2}, {y_max:.2}]\n"));

    let mut grid = vec![vec![' '; width]; height];

    // Band first so lines and points overlay it.
    for &(x, lo, hi) in &band {
        let col = map_x(x, 0.0, x_max, width);
        let top = map_y(hi.max(lo), y_min, y_max, height);
        let bottom = map_y(hi.min(lo), y_min, y_max, height);
        for row in grid.iter_mut().take(bottom + 1).skip(top) {
            row[col] = ':';
        }
    }

    draw_polyline(&mut grid, &history, x_max, y_min, y_max, '.', 'o');
    draw_polyline(&mut grid, &forecast, x_max, y_min, y_max, '-', 'x');

    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }

    if let (Some(first), Some(last)) = (timeline.first(), timeline.last()) {
        let gap = width.saturating_sub(first.chars().count() + last.chars().count()).max(1);
        if timeline.len() > 1 {
            out.push_str(&format!("{first}{}{last}\n", " ".repeat(gap)));
        } else {
            out.push_str(&format!("{first}\n"));
        }
    }

    out
}

fn draw_polyline(
    grid: &mut [Vec<char>],
    points: &[(f64, f64)],
    x_max: f64,
    y_min: f64,
    y_max: f64,
    line: char,
    mark: char,
) {
    let height = grid.len();
    let width = grid[0].len();

    let cells: Vec<(usize, usize)> = points
        .iter()
        .map(|&(x, y)| (map_x(x, 0.0, x_max, width), map_y(y, y_min, y_max, height)))
        .collect();

    for pair in cells.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        draw_line(grid, x0, y0, x1, y1, line);
    }
    for (x, y) in cells {
        grid[y][x] = mark;
    }
}

fn y_range(history: &[(f64, f64)], forecast: &[(f64, f64)], band: &[(f64, f64, f64)]) -> Option<(f64, f64)> {
    let ys = history
        .iter()
        .chain(forecast)
        .map(|&(_, y)| y)
        .chain(band.iter().flat_map(|&(_, lo, hi)| [lo, hi]));

    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in ys {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if !(min_y.is_finite() && max_y.is_finite()) {
        None
    } else if max_y > min_y {
        Some((min_y, max_y))
    } else {
        // Flat series: give it some room.
        Some((min_y - 1.0, max_y + 1.0))
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham-ish). Only fills blank or band cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            let cell = &mut grid[y0 as usize][x0 as usize];
            if *cell == ' ' || *cell == ':' {
                *cell = ch;
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Band, HistoryPoint, PredictionRow, QuantileValue};
    use serde_json::Map;

    fn prediction(ts: &str, lo: f64, mid: f64, hi: f64) -> PredictionRow {
        let q = |label: &str, level: f64, value: f64| QuantileValue {
            label: label.to_string(),
            level,
            value: Some(value),
        };
        PredictionRow {
            item_id: Some("A".into()),
            timestamp: Some(ts.into()),
            mean: None,
            quantiles: vec![q("0.1", 0.1, lo), q("0.5", 0.5, mid), q("0.9", 0.9, hi)],
            extra: Map::new(),
        }
    }

    fn series() -> SeriesData {
        SeriesData {
            history: vec![
                HistoryPoint { timestamp: "t1".into(), target: 0.0 },
                HistoryPoint { timestamp: "t2".into(), target: 4.0 },
            ],
            predictions: vec![prediction("t3", 2.0, 4.0, 8.0)],
            band: Some(Band {
                low_key: "0.1".into(),
                high_key: "0.9".into(),
            }),
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let txt = render_series_plot("A", &series(), 10, 5);
        let expected = concat!(
            "Series A: history=2 forecast=1 | band 0.1-0.9 | y=[-0.40, 8.40]\n",
            "         :\n",
            "         :\n",
            "    .o   x\n",
            "  ..     :\n",
            "o.\n",
            "t1      t3\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn series_without_numbers_says_so() {
        let empty = SeriesData::default();
        let txt = render_series_plot("B", &empty, 20, 5);
        assert!(txt.starts_with("Series B: history=0 forecast=0 | band none"));
        assert!(txt.contains("(no numeric points to plot)"));
    }

    #[test]
    fn flat_series_still_renders() {
        let flat = SeriesData {
            history: vec![
                HistoryPoint { timestamp: "a".into(), target: 3.0 },
                HistoryPoint { timestamp: "b".into(), target: 3.0 },
            ],
            ..SeriesData::default()
        };
        let txt = render_series_plot("F", &flat, 12, 5);
        assert_eq!(txt.lines().skip(1).filter(|l| l.contains('o')).count(), 1);
    }
}
