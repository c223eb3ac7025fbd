use plotters::prelude::*;
use std::path::Path;

use crate::ReportError;
use crate::chart::ChartSpec;

const CHART_DIMENSIONS: (u32, u32) = (1024, 768);

fn draw_error<E: std::fmt::Display>(path: &Path, e: E) -> ReportError {
    ReportError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Draw `spec` as an SVG line chart with a legend.
pub fn render_svg(spec: &ChartSpec, path: &Path) -> Result<(), ReportError> {
    let (x_range, y_range) = spec.bounds();
    let root = SVGBackend::new(path, CHART_DIMENSIONS).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_error(path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&spec.title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| draw_error(path, e))?;

    chart
        .configure_mesh()
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(("sans-serif", 16))
        .draw()
        .map_err(|e| draw_error(path, e))?;

    for series in &spec.series {
        let [r, g, b] = series.color;
        let color = RGBColor(r, g, b);
        chart
            .draw_series(LineSeries::new(series.points.iter().copied(), color.stroke_width(2)))
            .map_err(|e| draw_error(path, e))?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if !spec.series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| draw_error(path, e))?;
    }

    root.present().map_err(|e| draw_error(path, e))?;
    Ok(())
}
