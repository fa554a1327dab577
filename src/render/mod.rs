//! Side-by-side 3D scatter figures of ground-truth and predicted classes.

mod crop;
mod figure;
mod present;

use std::path::PathBuf;

use thiserror::Error;

pub use crop::{save_png, tight_crop};
pub use figure::{FigureStyle, render_comparison};
pub use present::{Headless, Presenter, SystemViewer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid figure style: {0}")]
    Style(String),
    #[error("sample has {points} points but {predicted} predictions")]
    PredictionCount { points: usize, predicted: usize },
    #[error(transparent)]
    Bounds(#[from] crate::bounds::BoundsError),
    #[error("bundled font could not be registered as \"{0}\"")]
    Font(&'static str),
    #[error("failed to draw figure: {0}")]
    Draw(String),
    #[error("failed to write image {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to launch image viewer {program}: {source}")]
    Present {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn draw(err: impl std::fmt::Display) -> Self {
        Self::Draw(err.to_string())
    }
}
