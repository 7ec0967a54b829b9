//! Dashboard rendering: three stacked panels drawn into an in-memory figure.

use crate::error::{EnergyError, Result};
use crate::export::save_figure;
use crate::peak::get_peak_hour_data;
use crate::table::{Reading, Table, BUILDING, KWH, READING_COLUMNS, TIMESTAMP};
use chrono::{DateTime, NaiveDateTime};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;
use resvg::{tiny_skia, usvg};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DASHBOARD_TITLE: &str = "Campus Energy Usage Dashboard";

/// Raster resolution of the saved dashboard
pub const DASHBOARD_DPI: u32 = 300;

/// Figure size in inches (width, height)
pub const FIGURE_SIZE_IN: (f64, f64) = (12.0, 15.0);

/// SVG user units per inch. Rasterizing at another DPI scales from this.
pub const BASE_DPI: u32 = 100;

const SERIES_COLORS: [RGBColor; 6] = [
    BLUE,
    RED,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),
];

const SECONDS_PER_DAY: f64 = 86_400.0;

type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// A rendered dashboard, independent of any output file.
///
/// Holds the vector drawing plus its physical size, so the writer can choose
/// the output resolution. Dropping the figure releases everything it owns.
#[derive(Debug, Clone)]
pub struct Figure {
    svg: String,
    width_in: f64,
    height_in: f64,
}

impl Figure {
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Pixel dimensions at `dpi`
    pub fn pixel_size(&self, dpi: u32) -> (u32, u32) {
        pixel_size((self.width_in, self.height_in), dpi)
    }

    /// Rasterize to PNG bytes, recording `dpi` in the image header.
    pub fn to_png(&self, dpi: u32) -> Result<Vec<u8>> {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();

        let tree = usvg::Tree::from_str(&self.svg, &options)
            .map_err(|e| EnergyError::Encode(format!("SVG parse failed: {e}")))?;

        let (width, height) = self.pixel_size(dpi);
        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| EnergyError::Encode(format!("cannot allocate {width}x{height} canvas")))?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let scale = dpi as f32 / BASE_DPI as f32;
        resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        encode_png(pixmap.data(), width, height, dpi)
    }
}

fn pixel_size((width_in, height_in): (f64, f64), dpi: u32) -> (u32, u32) {
    (
        (width_in * dpi as f64).round() as u32,
        (height_in * dpi as f64).round() as u32,
    )
}

fn encode_png(rgba: &[u8], width: u32, height: u32, dpi: u32) -> Result<Vec<u8>> {
    let pixels_per_meter = (dpi as f64 / 0.0254).round() as u32;
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: pixels_per_meter,
            yppu: pixels_per_meter,
            unit: png::Unit::Meter,
        }));
        let mut writer = encoder
            .write_header()
            .map_err(|e| EnergyError::Encode(e.to_string()))?;
        writer
            .write_image_data(rgba)
            .map_err(|e| EnergyError::Encode(e.to_string()))?;
        writer.finish().map_err(|e| EnergyError::Encode(e.to_string()))?;
    }
    Ok(out)
}

/// Render, then save the dashboard for the given tables.
///
/// `combined` holds the raw readings; the peak table is derived from it.
/// All tables are checked before anything is drawn or written.
pub fn create_dashboard<P: AsRef<Path>>(
    combined: &Table,
    daily: &Table,
    weekly: &Table,
    output_path: P,
) -> Result<PathBuf> {
    let peaks = get_peak_hour_data(combined)?;
    let figure = render_dashboard(daily, weekly, combined, &peaks)?;
    save_figure(figure, output_path.as_ref(), DASHBOARD_DPI)
}

/// Draw the three dashboard panels into a new [`Figure`].
pub fn render_dashboard(daily: &Table, weekly: &Table, combined: &Table, peaks: &Table) -> Result<Figure> {
    daily.require(&READING_COLUMNS)?;
    weekly.require(&[BUILDING, KWH])?;
    combined.require(&READING_COLUMNS)?;
    peaks.require(&READING_COLUMNS)?;

    let trend = trend_series(daily)?;
    let bars = weekly_means(weekly)?;
    let peak_rows = peaks.readings()?;
    let span = time_span(combined.timestamps(TIMESTAMP)?.iter().copied());
    if combined.is_empty() {
        warn!(table = combined.name(), "no readings, dashboard panels will be empty");
    }

    debug!(
        trend_buildings = trend.len(),
        bars = bars.len(),
        peaks = peak_rows.len(),
        "rendering dashboard"
    );

    let (width, height) = pixel_size(FIGURE_SIZE_IN, BASE_DPI);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_error("figure", e))?;

        // The title band sits above the panels.
        let body = root
            .titled(
                DASHBOARD_TITLE,
                ("sans-serif", 36).into_font().style(FontStyle::Bold),
            )
            .map_err(|e| render_error("title", e))?;
        let panels = body.split_evenly((3, 1));

        draw_trend_panel(&panels[0], &trend)?;
        draw_weekly_panel(&panels[1], &bars)?;
        draw_peak_panel(&panels[2], &peak_rows, span)?;

        root.present().map_err(|e| render_error("figure", e))?;
    }

    info!(bytes = svg.len(), "dashboard rendered");
    Ok(Figure {
        svg,
        width_in: FIGURE_SIZE_IN.0,
        height_in: FIGURE_SIZE_IN.1,
    })
}

/// Daily rows grouped per building, each ordered by timestamp
pub fn trend_series(daily: &Table) -> Result<BTreeMap<String, Vec<(NaiveDateTime, f64)>>> {
    let mut series: BTreeMap<String, Vec<(NaiveDateTime, f64)>> = BTreeMap::new();
    for Reading { building, timestamp, kwh } in daily.readings()? {
        series.entry(building).or_default().push((timestamp, kwh));
    }
    for points in series.values_mut() {
        points.sort_by_key(|(t, _)| *t);
    }
    Ok(series)
}

/// Mean weekly kWh per building, ordered by building
pub fn weekly_means(weekly: &Table) -> Result<Vec<(String, f64)>> {
    let buildings = weekly.text(BUILDING)?;
    let kwh = weekly.floats(KWH)?;

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (b, k) in buildings.iter().zip(kwh) {
        let slot = sums.entry(b.as_str()).or_default();
        slot.0 += k;
        slot.1 += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(b, (sum, count))| (b.to_string(), sum / count as f64))
        .collect())
}

fn draw_trend_panel(area: &Panel<'_>, series: &BTreeMap<String, Vec<(NaiveDateTime, f64)>>) -> Result<()> {
    let panel = "daily trend panel";
    let (x_min, x_max) = time_span(series.values().flatten().map(|(t, _)| *t));
    let (y_min, y_max) = padded_range(series.values().flatten().map(|(_, k)| *k));

    let mut chart = ChartBuilder::on(area)
        .caption("Daily Electricity Consumption", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| render_error(panel, e))?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("kWh")
        .x_labels(8)
        .x_label_formatter(&|x| format_epoch(*x, "%Y-%m-%d"))
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.2))
        .draw()
        .map_err(|e| render_error(panel, e))?;

    for (idx, (building, points)) in series.iter().enumerate() {
        let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(
                points.iter().map(|(t, k)| (epoch_secs(*t), *k)),
                &color,
            ))
            .map_err(|e| render_error(panel, e))?
            .label(building.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if !series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(|e| render_error(panel, e))?;
    }

    Ok(())
}

fn draw_weekly_panel(area: &Panel<'_>, bars: &[(String, f64)]) -> Result<()> {
    let panel = "weekly bar panel";
    let slots = bars.len().max(1);
    let (y_min, y_max) = padded_range(bars.iter().map(|(_, mean)| *mean));

    let mut chart = ChartBuilder::on(area)
        .caption("Average Weekly Usage by Building", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0usize..slots).into_segmented(), y_min..y_max)
        .map_err(|e| render_error(panel, e))?;

    let label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) => bars.get(*i).map(|(b, _)| b.clone()).unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc("Average kWh")
        .x_labels(slots)
        .x_label_formatter(&label)
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.2))
        .draw()
        .map_err(|e| render_error(panel, e))?;

    chart
        .draw_series(bars.iter().enumerate().map(|(i, (_, mean))| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *mean)],
                BLUE.mix(0.7).filled(),
            );
            bar.set_margin(0, 0, 10, 10);
            bar
        }))
        .map_err(|e| render_error(panel, e))?;

    Ok(())
}

fn draw_peak_panel(area: &Panel<'_>, peaks: &[Reading], span: (f64, f64)) -> Result<()> {
    let panel = "peak scatter panel";
    let (x_min, x_max) = if peaks.is_empty() {
        span
    } else {
        let own = time_span(peaks.iter().map(|p| p.timestamp));
        (own.0.min(span.0), own.1.max(span.1))
    };
    let (y_min, y_max) = padded_range(peaks.iter().map(|p| p.kwh));

    let mut chart = ChartBuilder::on(area)
        .caption("Peak-Hour Electricity Consumption", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| render_error(panel, e))?;

    chart
        .configure_mesh()
        .x_desc("Timestamp")
        .y_desc("kWh")
        .x_labels(6)
        .x_label_formatter(&|x| format_epoch(*x, "%Y-%m-%d %H:%M"))
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.2))
        .draw()
        .map_err(|e| render_error(panel, e))?;

    // Building name to the right of each marker
    chart
        .draw_series(peaks.iter().map(|p| {
            EmptyElement::at((epoch_secs(p.timestamp), p.kwh))
                + Circle::new((0, 0), 5, BLUE.filled())
                + Text::new(p.building.clone(), (9, -6), ("sans-serif", 14).into_font())
        }))
        .map_err(|e| render_error(panel, e))?;

    Ok(())
}

fn render_error<E: std::fmt::Display>(panel: &'static str, e: E) -> EnergyError {
    EnergyError::Render {
        panel,
        message: e.to_string(),
    }
}

fn epoch_secs(ts: NaiveDateTime) -> f64 {
    ts.and_utc().timestamp() as f64
}

fn format_epoch(secs: f64, fmt: &str) -> String {
    DateTime::from_timestamp(secs.round() as i64, 0)
        .map(|dt| dt.format(fmt).to_string())
        .unwrap_or_default()
}

/// Axis range covering `times`, at least one day wide
fn time_span<I: Iterator<Item = NaiveDateTime>>(times: I) -> (f64, f64) {
    let (min, max) = times
        .map(epoch_secs)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));
    if !min.is_finite() {
        return (0.0, SECONDS_PER_DAY);
    }
    if max - min < SECONDS_PER_DAY {
        let pad = (SECONDS_PER_DAY - (max - min)) / 2.0;
        return (min - pad, max + pad);
    }
    (min, max)
}

/// Y range with headroom that always includes zero. Negative readings
/// (net export) extend the range below the axis.
fn padded_range<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (min * 1.1, max.max(1.0) * 1.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{readings_table, ts};
    use crate::table::Column;

    fn weekly() -> Table {
        readings_table(
            "weekly",
            &[
                ("B1", ts("2024-01-07", 0), 10.0),
                ("B1", ts("2024-01-14", 0), 20.0),
                ("B2", ts("2024-01-07", 0), 4.0),
            ],
        )
    }

    fn combined() -> Table {
        readings_table(
            "combined",
            &[
                ("Lib", ts("2024-01-01", 8), 5.0),
                ("Lib", ts("2024-01-01", 9), 9.0),
                ("Gym", ts("2024-01-01", 8), 3.0),
            ],
        )
    }

    #[test]
    fn test_weekly_bar_height_is_mean() {
        let means = weekly_means(&weekly()).unwrap();
        assert_eq!(means, vec![("B1".to_string(), 15.0), ("B2".to_string(), 4.0)]);
    }

    #[test]
    fn test_trend_series_sorted_by_time() {
        let daily = readings_table(
            "daily",
            &[
                ("Lib", ts("2024-01-03", 0), 3.0),
                ("Lib", ts("2024-01-01", 0), 1.0),
                ("Gym", ts("2024-01-02", 0), 2.0),
            ],
        );
        let series = trend_series(&daily).unwrap();
        assert_eq!(series.keys().collect::<Vec<_>>(), vec!["Gym", "Lib"]);
        assert_eq!(series["Lib"][0], (ts("2024-01-01", 0), 1.0));
        assert_eq!(series["Lib"][1], (ts("2024-01-03", 0), 3.0));
    }

    #[test]
    fn test_render_contains_title_and_labels() {
        let combined = combined();
        let daily = readings_table("daily", &[("Lib", ts("2024-01-01", 0), 14.0)]);
        let peaks = get_peak_hour_data(&combined).unwrap();
        let figure = render_dashboard(&daily, &weekly(), &combined, &peaks).unwrap();

        let svg = figure.svg();
        assert!(svg.contains(DASHBOARD_TITLE));
        assert!(svg.contains("Daily Electricity Consumption"));
        assert!(svg.contains("Average Weekly Usage by Building"));
        assert!(svg.contains("Peak-Hour Electricity Consumption"));
        assert!(svg.contains("Gym"));
        assert_eq!(figure.pixel_size(DASHBOARD_DPI), (3600, 4500));
    }

    #[test]
    fn test_trend_legend_lists_daily_buildings() {
        let daily = readings_table(
            "daily",
            &[
                ("Dorm", ts("2024-01-01", 0), 14.0),
                ("Dorm", ts("2024-01-02", 0), 12.0),
                ("Hall", ts("2024-01-01", 0), 6.0),
            ],
        );
        // Neither building appears in the weekly or peak panels
        let combined = combined();
        let peaks = get_peak_hour_data(&combined).unwrap();
        let figure = render_dashboard(&daily, &weekly(), &combined, &peaks).unwrap();

        let svg = figure.svg();
        assert!(svg.contains("\nDorm\n"), "legend entry for Dorm missing");
        assert!(svg.contains("\nHall\n"), "legend entry for Hall missing");
    }

    #[test]
    fn test_negative_peak_is_drawn_below_zero() {
        let combined = readings_table(
            "combined",
            &[
                ("Solar", ts("2024-01-01", 8), -50.0),
                ("Lib", ts("2024-01-01", 9), 9.0),
            ],
        );
        let daily = readings_table("daily", &[]);
        let weekly = readings_table("weekly", &[]);
        let peaks = get_peak_hour_data(&combined).unwrap();
        let figure = render_dashboard(&daily, &weekly, &combined, &peaks).unwrap();

        let cys: Vec<f64> = figure
            .svg()
            .split("<circle")
            .skip(1)
            .filter_map(|c| {
                let start = c.find("cy=\"")? + 4;
                let end = start + c[start..].find('"')?;
                c[start..end].parse().ok()
            })
            .collect();
        assert_eq!(cys.len(), 2);
        // Peaks are ordered Lib, Solar; Solar sits lower on the page
        assert!(cys[1] > cys[0]);
        // and inside the plot area instead of clamped to its bottom edge
        let plot_bottom = 1500.0 - 10.0 - 40.0;
        assert!(cys[1] < plot_bottom, "cy {} at plot bottom", cys[1]);
    }

    #[test]
    fn test_padded_range_covers_negative_values() {
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.1));
        let (lo, hi) = padded_range([-50.0, 9.0].into_iter());
        assert!(lo < -50.0);
        assert!(hi > 9.0);
        let (lo, _) = padded_range([3.0, f64::NAN].into_iter());
        assert_eq!(lo, 0.0);
    }

    #[test]
    fn test_render_with_empty_tables() {
        let empty = readings_table("daily", &[]);
        let peaks = readings_table("peaks", &[]);
        let figure = render_dashboard(&empty, &empty.clone().renamed("weekly"), &empty, &peaks);
        assert!(figure.is_ok());
    }

    #[test]
    fn test_render_rejects_weekly_without_kwh() {
        let weekly = Table::new("weekly")
            .with_column(BUILDING, Column::Text(vec!["B1".into()]))
            .unwrap();
        let combined = combined();
        let peaks = get_peak_hour_data(&combined).unwrap();
        let err = render_dashboard(&combined, &weekly, &combined, &peaks).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("kwh"));
        assert!(msg.contains("weekly"));
    }

    #[test]
    fn test_time_span_is_at_least_a_day() {
        let (lo, hi) = time_span(std::iter::once(ts("2024-01-01", 12)));
        assert_eq!(hi - lo, SECONDS_PER_DAY);
        let (lo, hi) = time_span(std::iter::empty());
        assert!(hi > lo);
    }

    #[test]
    fn test_png_records_dpi() {
        let figure = Figure {
            svg: r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10" fill="red"/></svg>"#.to_string(),
            width_in: 0.2,
            height_in: 0.1,
        };
        let bytes = figure.to_png(300).unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (60, 30));
        let dims = info.pixel_dims.unwrap();
        assert_eq!(dims.xppu, 11811);
        assert_eq!(dims.unit, png::Unit::Meter);
    }
}
