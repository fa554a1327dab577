//! Figure layout and drawing.

use std::sync::OnceLock;

use image::RgbImage;
use ndarray::ArrayView2;
use plotters::{coord::Shift, prelude::*, style::register_font};
use serde::Deserialize;

use super::RenderError;
use crate::{
    bounds::CubicBounds,
    report::format_accuracy,
    sample::PointCloudSample,
    taxonomy::AttentionClass,
};

const POINTS_PER_INCH: f64 = 72.0;
const TITLE_PT: f64 = 12.0;
const CAPTION_PT: f64 = 12.0;
const AXIS_NAME_PT: f64 = 10.0;
const TICK_PT: f64 = 8.0;
const LEGEND_PT: f64 = 10.0;
const MARGIN_PT: f64 = 8.0;
const PROJECTION_SCALE: f64 = 0.8;
const FONT: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Make the bundled DejaVu Sans face available as [`FONT`].
fn register_bundled_font() -> Result<(), RenderError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered =
        *REGISTERED.get_or_init(|| register_font(FONT, FontStyle::Normal, FONT_BYTES).is_ok());
    if registered {
        Ok(())
    } else {
        Err(RenderError::Font(FONT))
    }
}

/// Physical size, resolution and camera of a comparison figure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FigureStyle {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
    /// Camera elevation above the x-y plane.
    pub elevation_deg: f64,
    /// Camera rotation about the vertical axis.
    pub azimuth_deg: f64,
    /// Scatter marker area in square points.
    pub marker_area_pt2: f64,
    /// Padding kept around the drawn content when cropping.
    pub tight_pad_in: f64,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            width_in: 15.0,
            height_in: 7.0,
            dpi: 300,
            elevation_deg: 30.0,
            azimuth_deg: 45.0,
            marker_area_pt2: 2.0,
            tight_pad_in: 0.1,
        }
    }
}

impl FigureStyle {
    /// Check that every length is positive and finite.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Style`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RenderError> {
        let positive = [
            ("width_in", self.width_in),
            ("height_in", self.height_in),
            ("dpi", f64::from(self.dpi)),
            ("marker_area_pt2", self.marker_area_pt2),
        ];
        if let Some((name, value)) = positive
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value > 0.0))
        {
            return Err(RenderError::Style(format!("{name} must be positive, got {value}")));
        }
        if !(self.tight_pad_in.is_finite() && self.tight_pad_in >= 0.0) {
            return Err(RenderError::Style(format!(
                "tight_pad_in must not be negative, got {}",
                self.tight_pad_in
            )));
        }
        if !(self.elevation_deg.is_finite() && self.azimuth_deg.is_finite()) {
            return Err(RenderError::Style("camera angles must be finite".into()));
        }
        Ok(())
    }

    /// Canvas size in pixels before cropping.
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.inches_to_px(self.width_in), self.inches_to_px(self.height_in))
    }

    /// Convert typographic points to pixels at this resolution.
    #[expect(clippy::float_arithmetic, reason = "unit conversion")]
    #[must_use]
    pub fn points_to_px(&self, points: f64) -> f64 {
        points * f64::from(self.dpi) / POINTS_PER_INCH
    }

    /// Radius of a circular marker whose area is `marker_area_pt2`.
    #[expect(clippy::float_arithmetic, reason = "unit conversion")]
    #[expect(clippy::cast_possible_truncation, reason = "marker radius is small")]
    #[must_use]
    pub fn marker_radius_px(&self) -> i32 {
        let diameter = self.points_to_px(self.marker_area_pt2.sqrt());
        (diameter / 2.0).round().max(1.0) as i32
    }

    /// Crop padding in pixels.
    #[must_use]
    pub fn tight_pad_px(&self) -> u32 {
        self.inches_to_px(self.tight_pad_in)
    }

    #[expect(clippy::float_arithmetic, reason = "unit conversion")]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "validated styles give small positive sizes"
    )]
    fn inches_to_px(&self, inches: f64) -> u32 {
        (inches * f64::from(self.dpi)).round().max(0.0) as u32
    }

    fn font_px(&self, points: f64) -> FontDesc<'static> {
        (FONT, self.points_to_px(points)).into_font()
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "margins are small")]
    fn margin_px(&self) -> u32 {
        self.points_to_px(MARGIN_PT).round().max(0.0) as u32
    }
}

/// Draw the ground-truth panel (left) and the prediction panel (right) of
/// `sample` under an accuracy title.
///
/// Both panels share the camera and the cubic bounds of the cloud. The
/// sample's z coordinate is drawn on the vertical axis.
///
/// # Errors
///
/// Returns [`RenderError`] for an invalid style, a prediction count that
/// differs from the point count, or a drawing failure such as a missing
/// font.
pub fn render_comparison(
    sample: &PointCloudSample,
    predicted: &[AttentionClass],
    accuracy: f64,
    style: &FigureStyle,
) -> Result<RgbImage, RenderError> {
    style.validate()?;
    register_bundled_font()?;
    if predicted.len() != sample.len() {
        return Err(RenderError::PredictionCount {
            points: sample.len(),
            predicted: predicted.len(),
        });
    }
    let bounds = CubicBounds::from_points(sample.points())?;
    let (width, height) = style.pixel_size();
    let pixels = usize::try_from(u64::from(width) * u64::from(height) * 3)
        .map_err(|_| RenderError::Style(format!("canvas {width}x{height} is too large")))?;
    let mut buffer = vec![0_u8; pixels];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw_figure(&root, sample, predicted, accuracy, &bounds, style)?;
        root.present().map_err(RenderError::draw)?;
    }
    log::debug!("rendered {width}x{height} comparison figure");
    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| RenderError::Draw("bitmap does not match the canvas size".into()))
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn draw_figure(
    root: &Area<'_>,
    sample: &PointCloudSample,
    predicted: &[AttentionClass],
    accuracy: f64,
    bounds: &CubicBounds,
    style: &FigureStyle,
) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(RenderError::draw)?;
    let body = root
        .titled(&format_accuracy(accuracy), style.font_px(TITLE_PT))
        .map_err(RenderError::draw)?;
    let panels = body.split_evenly((1, 2));
    let [left, right] = panels.as_slice() else {
        return Err(RenderError::Draw("expected two panels".into()));
    };
    let meta = sample.metadata();
    let heading = format!("{} Model {}", meta.display_form_type(), meta.form_number);
    let panel = Panel {
        points: sample.points(),
        bounds,
        style,
    };
    panel.draw(left, &format!("{heading} - Ground Truth"), sample.labels())?;
    panel.draw(right, &format!("{heading} - Predicted"), predicted)
}

struct Panel<'a> {
    points: ArrayView2<'a, f32>,
    bounds: &'a CubicBounds,
    style: &'a FigureStyle,
}

impl Panel<'_> {
    fn draw(
        &self,
        area: &Area<'_>,
        caption: &str,
        classes: &[AttentionClass],
    ) -> Result<(), RenderError> {
        let style = self.style;
        let [x, y, z] = [0, 1, 2].map(|axis| {
            let limits = self.bounds.limits(axis);
            f64::from(limits.start)..f64::from(limits.end)
        });
        // Plotters' frame is (across, up, depth). Feeding it (y, z, x) is a
        // rotation of the data frame, so handedness survives and the yaw is
        // the azimuth measured from +x towards +y.
        let mut chart = ChartBuilder::on(area)
            .caption(caption, style.font_px(CAPTION_PT))
            .margin(style.margin_px())
            .build_cartesian_3d(y.clone(), z.clone(), x.clone())
            .map_err(RenderError::draw)?;
        let (pitch, yaw) = (style.elevation_deg.to_radians(), style.azimuth_deg.to_radians());
        chart.with_projection(|mut pb| {
            pb.pitch = pitch;
            pb.yaw = yaw;
            pb.scale = PROJECTION_SCALE;
            pb.into_matrix()
        });
        chart
            .configure_axes()
            .label_style(style.font_px(TICK_PT))
            .light_grid_style(BLACK.mix(0.1))
            .max_light_lines(3)
            .draw()
            .map_err(RenderError::draw)?;

        let radius = style.marker_radius_px();
        for class in AttentionClass::ALL {
            let [r, g, b] = class.colour().rgb;
            let colour = RGBColor(r, g, b);
            let members = self
                .points
                .rows()
                .into_iter()
                .zip(classes)
                .filter(|(_, label)| **label == class)
                .filter_map(|(row, _)| {
                    let mut coords = row.iter().copied().map(f64::from);
                    match (coords.next(), coords.next(), coords.next()) {
                        (Some(px), Some(py), Some(pz)) => Some((py, pz, px)),
                        _ => None,
                    }
                });
            chart
                .draw_series(members.map(|point| Circle::new(point, radius, colour.filled())))
                .map_err(RenderError::draw)?
                .label(class.name())
                .legend(move |(lx, ly)| Circle::new((lx, ly), radius, colour.filled()));
        }

        let axis_font = style.font_px(AXIS_NAME_PT);
        chart
            .draw_series([
                Text::new("X", (y.start, z.start, x.end), axis_font.clone()),
                Text::new("Y", (y.end, z.start, x.start), axis_font.clone()),
                Text::new("Z", (y.start, z.end, x.start), axis_font),
            ])
            .map_err(RenderError::draw)?;

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font(style.font_px(LEGEND_PT))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(RenderError::draw)
    }
}
