//! Core library entry point.
//! Re-exports public types and traits.

pub mod artefact;
pub mod bounds;
pub mod checkpoint;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod providers;
pub mod render;
pub mod report;
pub mod run;
pub mod sample;
pub mod taxonomy;
pub mod visualize;

pub use bounds::CubicBounds;
pub use checkpoint::{Checkpoint, CheckpointSelection};
#[cfg(feature = "cli")]
pub use cli::AttnvizArgs;
pub use config::AppConfig;
pub use dataset::{DataLoader, PointCloudDataset, train_test_split};
pub use inference::{Prediction, predict};
pub use providers::{Device, Dgcnn, PointClassifier, StateDict};
pub use render::{FigureStyle, Headless, Presenter, SystemViewer};
pub use report::ClassDistribution;
pub use sample::{PointCloudSample, SampleMetadata};
pub use taxonomy::{AttentionClass, CLASS_COUNT};
pub use visualize::{VisualizationSummary, visualize_prediction};

pub mod tests;
