//! Confusion-matrix heat maps, one titled panel per model, saved as PNG.

use super::evaluation::ConfusionMatrix;
use image::RgbImage;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

pub const PANEL_WIDTH: u32 = 420;
pub const HEIGHT: u32 = 400;

const LIGHT: RGBColor = RGBColor(247, 251, 255);
const DARK: RGBColor = RGBColor(8, 48, 107);

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("nothing to plot")]
    Empty,
    #[error("failed to draw confusion matrix: {0}")]
    Draw(String),
    #[error("image buffer does not match {width}x{height}")]
    Buffer { width: u32, height: u32 },
    #[error(transparent)]
    Encode(#[from] image::ImageError),
}

fn drawing<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> PlotError {
    PlotError::Draw(err.to_string())
}

/// Lays the panels out side by side. Rows are the actual class (0 on top),
/// columns the predicted class; each cell is shaded by its count and
/// annotated with it.
pub fn render_confusion_matrices(
    panels: &[(String, ConfusionMatrix)],
) -> Result<RgbImage, PlotError> {
    if panels.is_empty() {
        return Err(PlotError::Empty);
    }
    let width = PANEL_WIDTH * panels.len() as u32;
    let mut buffer = vec![0u8; (width * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;
        let areas = root.split_evenly((1, panels.len()));
        for (area, (title, matrix)) in areas.iter().zip(panels) {
            draw_panel(area, title, matrix)?;
        }
        root.present().map_err(drawing)?;
    }
    RgbImage::from_raw(width, HEIGHT, buffer).ok_or(PlotError::Buffer {
        width,
        height: HEIGHT,
    })
}

pub fn save_confusion_matrices(
    panels: &[(String, ConfusionMatrix)],
    path: &Path,
) -> Result<(), PlotError> {
    render_confusion_matrices(panels)?.save(path)?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    matrix: &ConfusionMatrix,
) -> Result<(), PlotError> {
    // Cell (actual, predicted) spans x in [predicted, predicted + 1] and
    // y in [1 - actual, 2 - actual], so class 0 sits on the top row.
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22).into_font())
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(55)
        .build_cartesian_2d(0f64..2f64, 0f64..2f64)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(5)
        .y_labels(5)
        .x_label_formatter(&|v| tick_label(*v, false))
        .y_label_formatter(&|v| tick_label(*v, true))
        .x_desc("Predicted")
        .y_desc("Actual")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(drawing)?;

    let max = matrix.max_count().max(1) as f64;
    let cells: Vec<(f64, f64, u64)> = matrix
        .0
        .iter()
        .enumerate()
        .flat_map(|(actual, row)| {
            row.iter()
                .enumerate()
                .map(move |(predicted, &count)| (predicted as f64, 1.0 - actual as f64, count))
        })
        .collect();

    chart
        .draw_series(cells.iter().map(|&(x, y, count)| {
            Rectangle::new(
                [(x, y), (x + 1.0, y + 1.0)],
                blues(count as f64 / max).filled(),
            )
        }))
        .map_err(drawing)?;
    chart
        .draw_series(cells.iter().map(|&(x, y, count)| {
            let ink = if count as f64 / max > 0.5 { WHITE } else { BLACK };
            let style = ("sans-serif", 28)
                .into_font()
                .color(&ink)
                .pos(Pos::new(HPos::Center, VPos::Center));
            Text::new(count.to_string(), (x + 0.5, y + 0.5), style)
        }))
        .map_err(drawing)?;
    Ok(())
}

/// Class labels sit at the cell centers; every other key point stays blank.
fn tick_label(value: f64, flipped: bool) -> String {
    let class = if (value - 0.5).abs() < 1e-6 {
        0
    } else if (value - 1.5).abs() < 1e-6 {
        1
    } else {
        return String::new();
    };
    let class = if flipped { 1 - class } else { class };
    class.to_string()
}

fn blues(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        mix(LIGHT.0, DARK.0),
        mix(LIGHT.1, DARK.1),
        mix(LIGHT.2, DARK.2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn panels(matrix: ConfusionMatrix, n: usize) -> Vec<(String, ConfusionMatrix)> {
        ["RF", "SVM", "LogReg"]
            .iter()
            .take(n)
            .map(|name| (format!("Confusion Matrix {name}"), matrix))
            .collect()
    }

    fn count_pixels(img: &RgbImage, x_range: std::ops::Range<u32>, color: Rgb<u8>) -> usize {
        img.enumerate_pixels()
            .filter(|(x, _, p)| x_range.contains(x) && **p == color)
            .count()
    }

    #[test]
    fn one_panel_per_matrix() {
        let matrix = ConfusionMatrix([[70, 1], [2, 41]]);
        let img = render_confusion_matrices(&panels(matrix, 3)).unwrap();
        assert_eq!(img.dimensions(), (3 * PANEL_WIDTH, HEIGHT));
    }

    #[test]
    fn shades_cells_by_count() {
        let matrix = ConfusionMatrix([[9, 0], [0, 1]]);
        let img = render_confusion_matrices(&panels(matrix, 1)).unwrap();
        let dark = Rgb([DARK.0, DARK.1, DARK.2]);
        let light = Rgb([LIGHT.0, LIGHT.1, LIGHT.2]);
        assert!(count_pixels(&img, 0..PANEL_WIDTH, dark) > 1000);
        assert!(count_pixels(&img, 0..PANEL_WIDTH, light) > 1000);
    }

    #[test]
    fn every_panel_has_a_title() {
        let img = render_confusion_matrices(&panels(ConfusionMatrix::default(), 3)).unwrap();
        let white = Rgb([255, 255, 255]);
        for panel in 0..3 {
            let columns = panel * PANEL_WIDTH..(panel + 1) * PANEL_WIDTH;
            let inked = img
                .enumerate_pixels()
                .filter(|(x, y, p)| *y < 40 && columns.contains(x) && **p != white)
                .count();
            assert!(inked > 0, "panel {panel}");
        }
    }

    #[test]
    fn tick_labels_mark_cell_centers() {
        assert_eq!(tick_label(0.5, false), "0");
        assert_eq!(tick_label(1.5, false), "1");
        assert_eq!(tick_label(1.5, true), "0");
        assert_eq!(tick_label(1.0, false), "");
    }

    #[test]
    fn nothing_to_plot_is_an_error() {
        assert!(matches!(render_confusion_matrices(&[]), Err(PlotError::Empty)));
    }

    #[test]
    fn writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confusion_matrices.png");
        save_confusion_matrices(&panels(ConfusionMatrix::default(), 1), &path).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), PANEL_WIDTH);
    }
}
