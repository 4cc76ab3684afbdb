//! PNG charts of a search table.

use std::{fmt::Display, ops::Range, path::Path};

use log::info;
use plotters::{
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};

use crate::{
    AnalyzerErr, Result,
    table::{Column, SearchTable},
};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;
const FONT: &str = "sans-serif";
const COLOR_TEXT: RGBColor = RGBColor(44, 62, 80);
const COLOR_POINT: RGBColor = RGBColor(52, 152, 219);
const COLOR_MISSING: RGBColor = RGBColor(200, 200, 200);

fn plot_err(path: &Path, e: impl Display) -> AnalyzerErr {
    AnalyzerErr::Plot {
        path: path.to_path_buf(),
        msg: e.to_string(),
    }
}

/// A range covering every value with a 5% margin on each side.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    let margin = if hi > lo { (hi - lo) * 0.05 } else { 0.5 };
    (lo - margin)..(hi + margin)
}

/// Scatter plot of one column against another, using the rows where both have a value.
///
/// # Errors
/// Returns `AnalyzerErr::Plot` if the chart can't be drawn or saved.
pub fn plot_columns(table: &SearchTable, x: Column, y: Column, path: &Path) -> Result<()> {
    let points = table.points(x, y);
    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} vs {}", y.header(), x.header()), (FONT, 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| plot_err(path, e))?;

    chart
        .configure_mesh()
        .x_desc(x.header())
        .y_desc(y.header())
        .label_style((FONT, 13).into_font().color(&COLOR_TEXT))
        .draw()
        .map_err(|e| plot_err(path, e))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 4, COLOR_POINT.filled())),
        )
        .map_err(|e| plot_err(path, e))?;

    root.present().map_err(|e| plot_err(path, e))?;
    info!("{} points plotted to {}", points.len(), path.display());
    Ok(())
}

/// Maps a correlation in `[-1, 1]` from blue to red; NaN is grey.
fn correlation_color(value: f64) -> RGBColor {
    if value.is_nan() {
        return COLOR_MISSING;
    }

    let t = (value.clamp(-1., 1.) + 1.) / 2.;
    let channel = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    RGBColor(channel(59., 180.), channel(76., 4.), channel(192., 38.))
}

/// Heat map of the Pearson correlation between every pair of numeric columns.
///
/// # Errors
/// Returns `AnalyzerErr::Plot` if the chart can't be drawn or saved.
pub fn plot_correlation(table: &SearchTable, path: &Path) -> Result<()> {
    const CELL: i32 = 60;
    const LABELS: i32 = 190;
    const TOP: i32 = 60;

    let corr = table.correlation();
    let n = Column::ALL.len() as i32;
    let (width, height) = (LABELS + n * CELL + 40, TOP + n * CELL + LABELS);

    let root = BitMapBackend::new(path, (width as u32, height as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(path, e))?;

    let centered = Pos::new(HPos::Center, VPos::Center);
    root.draw(&Text::new(
        "Correlation matrix",
        (width / 2, TOP / 2),
        (FONT, 22).into_font().color(&COLOR_TEXT).pos(centered),
    ))
    .map_err(|e| plot_err(path, e))?;

    for (i, column) in (0..n).zip(Column::ALL) {
        let offset = i * CELL + CELL / 2;
        let row_label = (FONT, 13)
            .into_font()
            .color(&COLOR_TEXT)
            .pos(Pos::new(HPos::Right, VPos::Center));
        root.draw(&Text::new(column.header(), (LABELS - 10, TOP + offset), row_label))
            .map_err(|e| plot_err(path, e))?;

        let column_label = (FONT, 13)
            .into_font()
            .transform(FontTransform::Rotate90)
            .color(&COLOR_TEXT)
            .pos(Pos::new(HPos::Left, VPos::Center));
        root.draw(&Text::new(
            column.header(),
            (LABELS + offset, TOP + n * CELL + 10),
            column_label,
        ))
        .map_err(|e| plot_err(path, e))?;
    }

    for ((i, j), &value) in corr.indexed_iter() {
        let (x, y) = (LABELS + j as i32 * CELL, TOP + i as i32 * CELL);
        root.draw(&Rectangle::new(
            [(x, y), (x + CELL, y + CELL)],
            correlation_color(value).filled(),
        ))
        .map_err(|e| plot_err(path, e))?;
        root.draw(&Text::new(
            format!("{value:.2}"),
            (x + CELL / 2, y + CELL / 2),
            (FONT, 12).into_font().color(&WHITE).pos(centered),
        ))
        .map_err(|e| plot_err(path, e))?;
    }

    root.present().map_err(|e| plot_err(path, e))?;
    info!("correlation matrix plotted to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SearchRow;

    /// Reads the width and height out of a PNG header.
    fn png_size(path: &Path) -> (u32, u32) {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n", "{} is not a png", path.display());
        let be = |at: usize| u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap());
        (be(16), be(20))
    }

    fn row(name: &str, weight: f64, valid_acc: Option<f64>) -> SearchRow {
        SearchRow {
            name: name.to_string(),
            weight,
            params: None,
            train_acc: None,
            valid_acc,
            criterion_loss: None,
            reg_loss: None,
            parameters: None,
            flops: None,
            latency_gpu: None,
            latency_cpu: None,
        }
    }

    #[test]
    fn ranges_cover_the_values() {
        let range = padded_range([1., 3., 2.].into_iter());
        assert!(range.start < 1. && range.end > 3.);

        let single = padded_range([5.].into_iter());
        assert_eq!(single, 4.5..5.5);

        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);
    }

    #[test]
    fn colors_span_blue_to_red() {
        assert_eq!(correlation_color(-1.), RGBColor(59, 76, 192));
        assert_eq!(correlation_color(1.), RGBColor(180, 4, 38));
        assert_eq!(correlation_color(f64::NAN), COLOR_MISSING);
    }

    #[test]
    fn scatter_is_written_as_png() {
        let table = SearchTable::new(vec![
            row("a", 0.1, Some(80.)),
            row("b", 0.5, None),
            row("c", 0.9, Some(90.)),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.png");
        plot_columns(&table, Column::Weight, Column::ValidAcc, &path).unwrap();

        assert_eq!(png_size(&path), (WIDTH, HEIGHT));
    }

    #[test]
    fn correlation_matrix_is_sized_by_column_count() {
        let table = SearchTable::new(vec![row("a", 0.1, Some(80.)), row("c", 0.9, Some(90.))]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corr.png");
        plot_correlation(&table, &path).unwrap();

        let n = Column::ALL.len() as u32;
        assert_eq!(png_size(&path), (190 + n * 60 + 40, 60 + n * 60 + 190));
    }
}
