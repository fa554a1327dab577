//! Classify one sample, draw it next to its ground truth and report the
//! per-class counts.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    inference::{Prediction, predict},
    providers::{Device, PointClassifier},
    render::{FigureStyle, Presenter, RenderError, render_comparison, save_png, tight_crop},
    report::{ClassDistribution, ReportError, accuracy},
    sample::PointCloudSample,
};

#[derive(Debug, Error)]
pub enum VisualizeError {
    #[error("inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write class report: {0}")]
    Output(#[from] std::io::Error),
}

/// Outcome of [`visualize_prediction`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationSummary {
    /// Fraction of points classified correctly.
    pub accuracy: f64,
    pub distribution: ClassDistribution,
    /// Where the figure was written, if anywhere.
    pub saved_to: Option<PathBuf>,
}

/// Run `model` on `sample`, render the comparison figure and write the class
/// report to `out`.
///
/// The figure is cropped and saved when `save_path` is given, then handed
/// to `presenter`.
///
/// # Errors
///
/// Returns [`VisualizeError`] when inference, rendering, saving or writing
/// the report fails.
pub fn visualize_prediction<M>(
    model: &M,
    device: Device,
    sample: &PointCloudSample,
    save_path: Option<&Path>,
    style: &FigureStyle,
    presenter: &dyn Presenter,
    out: &mut dyn Write,
) -> Result<VisualizationSummary, VisualizeError>
where
    M: PointClassifier + ?Sized,
{
    let Prediction { classes, .. } = predict(model, device, sample)
        .map_err(|err| VisualizeError::Inference(Box::new(err)))?;
    let accuracy = accuracy(sample.labels(), &classes)?;
    let distribution = ClassDistribution::tally(sample.labels(), &classes)?;

    let mut image = render_comparison(sample, &classes, accuracy, style)?;
    if let Some(path) = save_path {
        image = tight_crop(&image, style.tight_pad_px());
        save_png(&image, path)?;
    }
    presenter.present(&image, save_path)?;

    writeln!(out)?;
    write!(out, "{distribution}")?;
    out.flush()?;
    Ok(VisualizationSummary {
        accuracy,
        distribution,
        saved_to: save_path.map(Path::to_path_buf),
    })
}
