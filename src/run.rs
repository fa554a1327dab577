//! End-to-end driver: restore the latest checkpoint and visualise every
//! held-out sample.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    checkpoint::{Checkpoint, CheckpointError, latest_checkpoint_dir},
    config::{AppConfig, ConfigError},
    dataset::{DatasetError, PointCloudDataset, train_test_split},
    providers::{Device, Dgcnn, DgcnnError},
    render::Presenter,
    sample::SampleMetadata,
    visualize::{VisualizationSummary, VisualizeError, visualize_prediction},
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Model(#[from] DgcnnError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Visualize(#[from] VisualizeError),
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write progress: {0}")]
    Output(#[from] std::io::Error),
}

/// File name of the figure for one sample.
///
/// ```
/// use attention_viz::{SampleMetadata, run::figure_file_name};
///
/// let meta = SampleMetadata { form_type: "chair".into(), form_number: 15 };
/// assert_eq!(figure_file_name(&meta), "visualization_chair_model_15.png");
/// ```
#[must_use]
pub fn figure_file_name(metadata: &SampleMetadata) -> String {
    format!(
        "visualization_{}_model_{}.png",
        metadata.form_type, metadata.form_number
    )
}

/// Load the configuration at `config_path` and [`run`] it.
///
/// # Errors
///
/// Returns [`RunError`] from loading the configuration or from [`run`].
pub fn run_from_path(
    config_path: &Path,
    output_dir: Option<&Path>,
    presenter: &dyn Presenter,
    out: &mut dyn Write,
) -> Result<Vec<VisualizationSummary>, RunError> {
    let config = AppConfig::load(config_path)?;
    run(&config, output_dir, presenter, out)
}

/// Restore the classifier from the latest checkpoint and write one figure
/// per test sample.
///
/// Computation always runs on the CPU. Figures go to `output_dir` when
/// given, else to `visualization.output_dir`. Progress and the class
/// reports are written to `out`.
///
/// # Errors
///
/// Returns [`RunError`] when no checkpoint exists, the checkpoint does not
/// fit the model, the dataset lacks a requested sample, or a figure cannot
/// be produced.
pub fn run(
    config: &AppConfig,
    output_dir: Option<&Path>,
    presenter: &dyn Presenter,
    out: &mut dyn Write,
) -> Result<Vec<VisualizationSummary>, RunError> {
    let device = Device::Cpu;
    let mut model = Dgcnn::new(config.model.k, config.model.dropout)?;

    let run_dir = latest_checkpoint_dir(
        &config.training.checkpoint_dir,
        &config.checkpoint.selection,
    )?;
    let checkpoint_path = config.checkpoint_file(&run_dir);
    writeln!(out, "Loading checkpoint from: {}", checkpoint_path.display())?;
    let checkpoint = Checkpoint::load(
        &checkpoint_path,
        &config.checkpoint.state_key,
        config.checkpoint.sha256.as_deref(),
    )?;
    model.load_state_dict(checkpoint.into_state_dict())?;

    let evaluation = &config.evaluation;
    let dataset = PointCloudDataset::new(&config.data.path, &evaluation.demographic)?;
    let (_, test) = train_test_split(&dataset, &evaluation.test_models, evaluation.batch_size)?;

    let output_dir = output_dir.unwrap_or(config.visualization.output_dir.as_path());
    fs::create_dir_all(output_dir).map_err(|source| RunError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut summaries = Vec::with_capacity(test.len());
    for batch in test.batches() {
        for sample in batch {
            let save_path = output_dir.join(figure_file_name(sample.metadata()));
            let summary = visualize_prediction(
                &model,
                device,
                sample,
                Some(&save_path),
                &config.visualization.style,
                presenter,
                out,
            )?;
            log::info!(
                "{} model {}: accuracy {:.4}",
                sample.metadata().form_type,
                sample.metadata().form_number,
                summary.accuracy
            );
            summaries.push(summary);
        }
    }
    Ok(summaries)
}
