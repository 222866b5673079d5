use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

use super::{Observability, ASTRONOMICAL_TWILIGHT, SUNSET};
use crate::astro_math;
use crate::config::PlotFormat;
use crate::util::*;

const SIZE: (u32, u32) = (1200, 745);

const X_MIN: Hours = -6.;
const X_MAX: Hours = 8.;
const Y_MIN: Degrees = 10.;
const Y_MAX: Degrees = 90.;

const MAX_AIRMASS: f64 = 5.;

const NAVY: RGBColor = RGBColor(0, 0, 128);

pub(super) fn render(obs: &Observability, path: &Path, format: PlotFormat) -> Result<()> {
    let caption = caption(obs);
    match format {
        PlotFormat::Png => draw(obs, &caption, BitMapBackend::new(path, SIZE).into_drawing_area()),
        PlotFormat::Svg => draw(obs, &caption, SVGBackend::new(path, SIZE).into_drawing_area()),
    }
}

fn caption(obs: &Observability) -> String {
    let date = obs.date();
    format!(
        "{} → {} at {}, moon {:.0}% illuminated",
        date.format("%Y-%m-%d"),
        (date + chrono::Duration::days(1)).format("%Y-%m-%d"),
        obs.site.name,
        obs.moon().illumination * 100.
    )
}

/// Hours after midnight as a clock hour, e.g. -6 is "18 h"
fn hour_label(offset: Hours) -> String {
    let hour = offset.round() as i64;
    format!("{} h", if hour < 0 { hour + 24 } else { hour })
}

fn airmass_label(alt: Degrees) -> String {
    astro_math::airmass(alt)
        .map(|airmass| format!("{:.2}", airmass))
        .unwrap_or_default()
}

/// Splits a sampled curve into the runs of points that satisfy `keep`,
/// which is given the sample index
fn segments(
    offsets: &[Hours],
    values: &[f64],
    keep: impl Fn(usize, Hours, f64) -> bool,
) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (i, (&x, &y)) in offsets.iter().zip(values).enumerate() {
        if keep(i, x, y) {
            current.push((x, y));
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn in_window(x: Hours, y: Degrees) -> bool {
    (X_MIN..=X_MAX).contains(&x) && (Y_MIN..=Y_MAX).contains(&y)
}

fn observable(x: Hours, alt: Degrees, airmass: Option<f64>) -> bool {
    in_window(x, alt) && airmass.map_or(false, |airmass| airmass < MAX_AIRMASS)
}

fn draw<DB: DrawingBackend>(
    obs: &Observability,
    caption: &str,
    root: DrawingArea<DB, Shift>,
) -> Result<()> {
    root.fill(&WHITE).map_err(Error::plot)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(X_MIN..X_MAX, Y_MIN..Y_MAX)
        .map_err(Error::plot)?
        .set_secondary_coord(X_MIN..X_MAX, Y_MIN..Y_MAX);

    chart
        .configure_mesh()
        .x_labels((X_MAX - X_MIN) as usize + 1)
        .x_label_formatter(&|h| hour_label(*h))
        .x_desc("Time (UTC)")
        .y_desc("Altitude (deg)")
        .bold_line_style(BLACK.mix(0.15))
        .light_line_style(TRANSPARENT)
        .draw()
        .map_err(Error::plot)?;

    chart
        .configure_secondary_axes()
        .y_desc("Airmass")
        .y_label_formatter(&|alt| airmass_label(*alt))
        .draw()
        .map_err(Error::plot)?;

    // Sky darkens in two steps: after sunset and after astronomical twilight
    for threshold in [SUNSET, ASTRONOMICAL_TWILIGHT] {
        let bands = obs
            .darkness_bands(threshold)
            .into_iter()
            .filter(|(start, end)| *end > X_MIN && *start < X_MAX);
        chart
            .draw_series(bands.map(|(start, end)| {
                Rectangle::new(
                    [(start.max(X_MIN), Y_MIN), (end.min(X_MAX), Y_MAX)],
                    NAVY.mix(0.25).filled(),
                )
            }))
            .map_err(Error::plot)?;
    }

    chart
        .draw_series(LineSeries::new(
            vec![(0., Y_MIN), (0., Y_MAX)],
            WHITE.stroke_width(2),
        ))
        .map_err(Error::plot)?;

    let offsets = obs.night.offsets();

    let moon_style = BLACK.mix(0.4).stroke_width(1);
    for segment in segments(offsets, &obs.moon_altitudes(), |_, x, y| in_window(x, y)) {
        chart
            .draw_series(LineSeries::new(segment, moon_style))
            .map_err(Error::plot)?;
    }

    for (idx, target) in obs.targets.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let style = color.stroke_width(2);
        let label = format!("{} (moon: {:.0}°)", target.name, obs.moon_distance(target));

        let airmasses = obs.airmass_curve(target);
        let mut runs = segments(offsets, &obs.altitude_curve(target), |i, x, alt| {
            observable(x, alt, airmasses[i])
        })
        .into_iter();

        // The first run carries the legend entry, even when empty
        chart
            .draw_series(LineSeries::new(runs.next().unwrap_or_default(), style))
            .map_err(Error::plot)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        for run in runs {
            chart
                .draw_series(LineSeries::new(run, style))
                .map_err(Error::plot)?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(Error::plot)?;

    root.present().map_err(Error::plot)?;
    Ok(())
}
