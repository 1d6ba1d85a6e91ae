use std::io::Cursor;
use std::ops::Range;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::coord::ranged1d::{AsRangedCoord, Ranged, ValueFormatter};
use plotters::coord::Shift;
use plotters::prelude::*;
use thiserror::Error;

use crate::config::{FreqScale, SpectrumConfig, SweepConfig};
use crate::spectrum::SpectrumResult;
use crate::sweep::SweepResult;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot: {0}")]
    Empty(&'static str),
    #[error("failed to render plot: {0}")]
    Render(String),
}

impl<E: std::error::Error + Send + Sync> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PlotError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(format!("{value:?}"))
    }
}

impl From<image::ImageError> for PlotError {
    fn from(value: image::ImageError) -> Self {
        PlotError::Render(value.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub magnitude_color: RGBColor,
    pub phase_color: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            background: RGBColor(10, 10, 10),
            magnitude_color: BLUE,
            phase_color: RED,
        }
    }
}

/// Bode pair: magnitude over phase, sharing the frequency axis.
pub fn render_bode_png(
    result: &SweepResult,
    config: &SweepConfig,
    style: &PlotStyle,
) -> Result<Vec<u8>, PlotError> {
    if result.points.is_empty() {
        return Err(PlotError::Empty("sweep produced no points"));
    }
    let mag: Vec<(f64, f64)> = result
        .points
        .iter()
        .map(|p| (p.frequency_hz, p.magnitude_db))
        .collect();
    let phase: Vec<(f64, f64)> = result
        .points
        .iter()
        .map(|p| (p.frequency_hz, p.phase_deg))
        .collect();
    let mag_range = config.y_mag_min_db..config.y_mag_max_db;
    let phase_range = -200.0..200.0;

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (top, bottom) = root.split_vertically((style.height / 2) as i32);
        let freq_span = config.f_start_hz..config.f_stop_hz;
        match config.scale {
            FreqScale::Log => {
                draw_line_chart(
                    &top,
                    "Magnitude (dB)",
                    freq_span.clone().log_scale(),
                    mag_range,
                    &mag,
                    style.magnitude_color,
                )?;
                draw_line_chart(
                    &bottom,
                    "Phase (deg)",
                    freq_span.log_scale(),
                    phase_range,
                    &phase,
                    style.phase_color,
                )?;
            }
            FreqScale::Lin => {
                draw_line_chart(
                    &top,
                    "Magnitude (dB)",
                    freq_span.clone(),
                    mag_range,
                    &mag,
                    style.magnitude_color,
                )?;
                draw_line_chart(
                    &bottom,
                    "Phase (deg)",
                    freq_span,
                    phase_range,
                    &phase,
                    style.phase_color,
                )?;
            }
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// Spectrum pair: dB over Vrms, clipped to the configured display range.
pub fn render_spectrum_png(
    result: &SpectrumResult,
    config: &SpectrumConfig,
    style: &PlotStyle,
) -> Result<Vec<u8>, PlotError> {
    if result.frequencies_hz.is_empty() {
        return Err(PlotError::Empty("spectrum has no bins"));
    }
    let db: Vec<(f64, f64)> = result
        .frequencies_hz
        .iter()
        .copied()
        .zip(result.v_db.iter().copied())
        .collect();
    let rms: Vec<(f64, f64)> = result
        .frequencies_hz
        .iter()
        .copied()
        .zip(result.v_rms.iter().copied())
        .collect();

    let freq_span = if config.f_stop_hz > config.f_start_hz {
        config.f_start_hz..config.f_stop_hz
    } else {
        0.0..result.frequencies_hz.last().copied().unwrap_or(1.0)
    };
    let db_max = result.v_db.iter().fold(f64::MIN, |a, &b| a.max(b));
    let db_min = result.v_db.iter().fold(f64::MAX, |a, &b| a.min(b));
    let rms_max = result
        .v_rms
        .iter()
        .fold(0.0f64, |a, &b| a.max(b))
        .max(1e-3);

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (top, bottom) = root.split_vertically((style.height / 2) as i32);
        draw_line_chart(
            &top,
            "Amplitude (dB)",
            freq_span.clone(),
            (db_min - 5.0)..(db_max + 5.0),
            &db,
            style.magnitude_color,
        )?;
        draw_line_chart(
            &bottom,
            "Amplitude (Vrms)",
            freq_span,
            0.0..(rms_max * 1.1),
            &rms,
            style.phase_color,
        )?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn draw_line_chart<DB, X>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    x_range: X,
    y_range: Range<f64>,
    points: &[(f64, f64)],
    color: RGBColor,
) -> Result<(), PlotError>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
    X: AsRangedCoord<Value = f64>,
    X::CoordDescType: Ranged<ValueType = f64> + ValueFormatter<f64>,
{
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(caption, ("sans-serif", 20).into_font().color(&WHITE))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("Frequency (Hz)")
        .label_style(("sans-serif", 12).into_font().color(&WHITE))
        .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
        .light_line_style(WHITE.mix(0.1))
        .draw()?;
    chart.draw_series(LineSeries::new(points.iter().copied(), &color))?;
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PlotError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PlotError::Render("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
