#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use crate::error::{ArgusError, Result};
use log::warn;
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::full_palette::{
    AMBER_600, BLUE_600, BROWN_400, GREEN_600, GREY_600, INDIGO_400, ORANGE_600, TEAL_600,
};
use std::error::Error;

/// Accent colour shared with the page buttons
pub const CRIMSON: RGBColor = RGBColor(220, 20, 60);

/// Colours used for series and slices, in order
const PALETTE: [RGBColor; 9] = [
    CRIMSON, BLUE_600, GREEN_600, ORANGE_600, INDIGO_400, TEAL_600, AMBER_600, BROWN_400,
    GREY_600,
];

fn color(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            width: 640,
            height: 420,
        }
    }
}

impl GraphOptions {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            ..Self::default()
        }
    }

    /// Same options with a different canvas size
    pub fn sized(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

fn chart_error(e: Box<dyn Error>) -> ArgusError {
    ArgusError::Chart(e.to_string())
}

/// Largest value, at least 0; infinite or NaN input is an error
fn finite_max(values: impl IntoIterator<Item = f64>) -> std::result::Result<f64, Box<dyn Error>> {
    let mut max = 0.0f64;
    for v in values {
        if !v.is_finite() {
            return Err(format!("cannot plot value {}", v).into());
        }
        max = max.max(v);
    }
    Ok(max)
}

/// Upper bound of a value axis with some headroom; never zero
fn axis_max(max: f64) -> std::result::Result<f64, Box<dyn Error>> {
    let top = if max > 0.0 { max * 1.15 } else { 1.0 };
    if top.is_finite() {
        Ok(top)
    } else {
        Err(format!("axis bound for {} is not finite", max).into())
    }
}

fn segment_label(labels: &[String], value: &SegmentValue<u32>) -> String {
    match value {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
            labels.get(*i as usize).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    }
}

/// Draw a centred "No data" notice under the chart title
fn draw_no_data(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let area = root.titled(&options.title, ("sans-serif", 22))?;
    let (w, h) = area.dim_in_pixel();
    area.draw(&Text::new(
        "No data",
        ((w / 2) as i32 - 30, (h / 2) as i32),
        ("sans-serif", 18).into_font().color(&GREY_600),
    ))?;
    Ok(())
}

/// Bar chart of one value per category
///
/// # Returns
/// * The chart as an SVG document
///
/// # Examples
/// ```
/// use argus::graph::{GraphOptions, bar_chart};
///
/// let bars = vec![("Phishing".to_string(), 4.0), ("Malware".to_string(), 2.0)];
/// let svg = bar_chart(&bars, &GraphOptions::new("Incidents by Category", "Category", "Count")).unwrap();
/// assert!(svg.contains("<svg"));
/// ```
pub fn bar_chart(bars: &[(String, f64)], options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    draw_bar_chart(&mut svg, bars, options).map_err(chart_error)?;
    Ok(svg)
}

fn draw_bar_chart(
    svg: &mut String,
    bars: &[(String, f64)],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if bars.is_empty() {
        draw_no_data(&root, options)?;
        root.present()?;
        return Ok(());
    }

    let labels: Vec<String> = bars.iter().map(|(label, _)| label.clone()).collect();
    let top = axis_max(finite_max(bars.iter().map(|(_, v)| *v))?)?;
    let n = bars.len() as u32;

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 22).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..n).into_segmented(), 0f64..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&|v| segment_label(&labels, v))
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(CRIMSON.filled())
            .margin(12)
            .data(bars.iter().enumerate().map(|(i, (_, v))| (i as u32, *v))),
    )?;

    root.present()?;
    Ok(())
}

/// Pie chart of labelled slices
///
/// Slices with a non-positive size are left out.
pub fn pie_chart(slices: &[(String, f64)], options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    draw_pie_chart(&mut svg, slices, options).map_err(chart_error)?;
    Ok(svg)
}

fn draw_pie_chart(
    svg: &mut String,
    slices: &[(String, f64)],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    finite_max(slices.iter().map(|(_, v)| *v))?;
    let slices: Vec<&(String, f64)> = slices.iter().filter(|(_, v)| *v > 0.0).collect();
    if slices.is_empty() {
        draw_no_data(&root, options)?;
        root.present()?;
        return Ok(());
    }

    let area = root.titled(&options.title, ("sans-serif", 22))?;
    let (w, h) = area.dim_in_pixel();
    let center = ((w / 2) as i32, (h / 2) as i32);
    let radius = f64::from(w.min(h)) * 0.33;

    let sizes: Vec<f64> = slices.iter().map(|(_, v)| *v).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(color).collect();
    let labels: Vec<String> = slices.iter().map(|(label, _)| label.clone()).collect();

    let mut pie = Pie::new(&center, &radius, sizes.as_slice(), colors.as_slice(), labels.as_slice());
    pie.label_style(("sans-serif", 14).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 12).into_font().color(&WHITE));
    area.draw(&pie)?;

    root.present()?;
    Ok(())
}

/// Bars of several series side by side within each group
///
/// `series` holds one `(name, values)` pair per series, with one value per
/// group.
pub fn grouped_bar_chart(
    groups: &[String],
    series: &[(String, Vec<f64>)],
    options: &GraphOptions,
) -> Result<String> {
    let mut svg = String::new();
    draw_grouped_bar_chart(&mut svg, groups, series, options).map_err(chart_error)?;
    Ok(svg)
}

fn draw_grouped_bar_chart(
    svg: &mut String,
    groups: &[String],
    series: &[(String, Vec<f64>)],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if groups.is_empty() || series.is_empty() {
        draw_no_data(&root, options)?;
        root.present()?;
        return Ok(());
    }

    let top = axis_max(finite_max(
        series.iter().flat_map(|(_, values)| values.iter().copied()),
    )?)?;

    // one slot per series plus a gap after each group
    let slots = series.len() + 1;
    let total = groups.len() * slots;
    let label_slot = series.len() / 2;

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 22).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..total as u32).into_segmented(), 0f64..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(total + 1)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i)
                if *i as usize % slots == label_slot =>
            {
                groups.get(*i as usize / slots).cloned().unwrap_or_default()
            }
            _ => String::new(),
        })
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    for (s, (name, values)) in series.iter().enumerate() {
        let fill = color(s);
        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(fill.filled())
                    .margin(2)
                    .data(
                        values
                            .iter()
                            .take(groups.len())
                            .enumerate()
                            .map(|(g, v)| ((g * slots + s) as u32, *v)),
                    ),
            )?
            .label(name.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Vertical box plot of one sample set per category
///
/// Categories without samples keep their slot on the axis but draw no box.
pub fn box_plot(groups: &[(String, Vec<f64>)], options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    draw_box_plot(&mut svg, groups, options).map_err(chart_error)?;
    Ok(svg)
}

fn draw_box_plot(
    svg: &mut String,
    groups: &[(String, Vec<f64>)],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let samples = || groups.iter().flat_map(|(_, samples)| samples.iter().copied());
    if let Some(v) = samples().find(|v| !v.is_finite()) {
        return Err(format!("cannot plot value {}", v).into());
    }
    let max = samples().fold(f64::NEG_INFINITY, f64::max);
    if groups.is_empty() || !max.is_finite() {
        draw_no_data(&root, options)?;
        root.present()?;
        return Ok(());
    }
    let min = samples().fold(f64::INFINITY, f64::min);

    let labels: Vec<String> = groups.iter().map(|(label, _)| label.clone()).collect();
    let pad = ((max - min) * 0.1).max(1.0);
    let y_range = (min - pad) as f32..(max + pad) as f32;
    if !y_range.start.is_finite() || !y_range.end.is_finite() {
        return Err(format!("samples between {} and {} do not fit the axis", min, max).into());
    }

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 22).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..groups.len() as u32).into_segmented(), y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len())
        .x_label_formatter(&|v| segment_label(&labels, v))
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(
        groups
            .iter()
            .enumerate()
            .filter(|(_, (_, samples))| !samples.is_empty())
            .map(|(i, (_, samples))| {
                let quartiles = Quartiles::new(samples.as_slice());
                Boxplot::new_vertical(SegmentValue::CenterOf(i as u32), &quartiles)
                    .width(30)
                    .whisker_width(0.6)
                    .style(&color(i))
            }),
    )?;

    root.present()?;
    Ok(())
}

/// Scatter chart of `(x, y, size)` points
///
/// Marker radius grows with the square root of `size`.
pub fn scatter_chart(points: &[(f64, f64, f64)], options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    draw_scatter_chart(&mut svg, points, options).map_err(chart_error)?;
    Ok(svg)
}

fn draw_scatter_chart(
    svg: &mut String,
    points: &[(f64, f64, f64)],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn Error>> {
    let root = SVGBackend::with_string(svg, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if points.is_empty() {
        draw_no_data(&root, options)?;
        root.present()?;
        return Ok(());
    }

    let max_x = axis_max(finite_max(points.iter().map(|p| p.0))?)?;
    let max_y = axis_max(finite_max(points.iter().map(|p| p.1))?)?;
    let max_size = finite_max(points.iter().map(|p| p.2))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 22).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..max_x, 0f64..max_y)?;

    chart
        .configure_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(points.iter().map(|&(x, y, size)| {
        let scale = if max_size > 0.0 { (size.max(0.0) / max_size).sqrt() } else { 0.0 };
        let radius = 4 + (scale * 16.0) as u32;
        Circle::new((x, y), radius, CRIMSON.mix(0.6).filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Pass a rendered chart through, or log the failure and return a small
/// placeholder so the page still renders
pub fn or_placeholder(chart: Result<String>, title: &str) -> String {
    match chart {
        Ok(svg) => svg,
        Err(e) => {
            warn!("chart '{}' could not be rendered: {}", title, e);
            format!(
                "<div class=\"chart-placeholder\">Chart \"{}\" unavailable</div>",
                handlebars::html_escape(title)
            )
        }
    }
}
