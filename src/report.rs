//! Accuracy and class-distribution reporting.

use std::fmt;

use thiserror::Error;

use crate::taxonomy::{AttentionClass, CLASS_COUNT, ClassColour};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("cannot score an empty prediction")]
    Empty,
    #[error("{ground_truth} ground-truth labels but {predicted} predictions")]
    LengthMismatch { ground_truth: usize, predicted: usize },
}

fn check_lengths(
    ground_truth: &[AttentionClass],
    predicted: &[AttentionClass],
) -> Result<(), ReportError> {
    if ground_truth.len() != predicted.len() {
        return Err(ReportError::LengthMismatch {
            ground_truth: ground_truth.len(),
            predicted: predicted.len(),
        });
    }
    if ground_truth.is_empty() {
        return Err(ReportError::Empty);
    }
    Ok(())
}

/// Fraction of points whose predicted class matches the ground truth.
///
/// # Errors
///
/// Returns [`ReportError`] when the inputs are empty or differ in length.
///
/// # Examples
///
/// ```
/// use attention_viz::{AttentionClass, report::accuracy};
///
/// let truth = [AttentionClass::Low, AttentionClass::High];
/// let pred = [AttentionClass::Low, AttentionClass::None];
/// assert_eq!(accuracy(&truth, &pred), Ok(0.5));
/// ```
#[expect(clippy::float_arithmetic, reason = "ratio of counts")]
#[expect(clippy::cast_precision_loss, reason = "point counts fit in f64")]
pub fn accuracy(
    ground_truth: &[AttentionClass],
    predicted: &[AttentionClass],
) -> Result<f64, ReportError> {
    check_lengths(ground_truth, predicted)?;
    let matches = ground_truth
        .iter()
        .zip(predicted)
        .filter(|(truth, pred)| truth == pred)
        .count();
    Ok(matches as f64 / ground_truth.len() as f64)
}

/// Figure title for an accuracy in `[0, 1]`, e.g. `"Accuracy: 87.50%"`.
#[expect(clippy::float_arithmetic, reason = "percentage")]
#[must_use]
pub fn format_accuracy(accuracy: f64) -> String {
    format!("Accuracy: {:.2}%", accuracy * 100.0)
}

/// Colour of each label, in point order.
#[must_use]
pub fn class_colours(labels: &[AttentionClass]) -> Vec<ClassColour> {
    labels.iter().map(|class| class.colour()).collect()
}

/// Ground-truth and predicted point counts per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassDistribution {
    pub ground_truth: [usize; CLASS_COUNT],
    pub predicted: [usize; CLASS_COUNT],
}

impl ClassDistribution {
    /// Count classes on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when the inputs are empty or differ in length.
    pub fn tally(
        ground_truth: &[AttentionClass],
        predicted: &[AttentionClass],
    ) -> Result<Self, ReportError> {
        check_lengths(ground_truth, predicted)?;
        let mut distribution = Self::default();
        for (truth, pred) in ground_truth.iter().zip(predicted) {
            if let Some(count) = distribution.ground_truth.get_mut(truth.index()) {
                *count += 1;
            }
            if let Some(count) = distribution.predicted.get_mut(pred.index()) {
                *count += 1;
            }
        }
        Ok(distribution)
    }

    /// Number of points counted on each side.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ground_truth.iter().sum()
    }
}

impl fmt::Display for ClassDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Class Distribution:")?;
        for ((class, truth), pred) in AttentionClass::ALL
            .iter()
            .zip(self.ground_truth)
            .zip(self.predicted)
        {
            writeln!(f, "Class {} ({}):", class.index(), class.name())?;
            writeln!(f, "  Ground Truth: {truth}")?;
            writeln!(f, "  Predicted: {pred}")?;
        }
        Ok(())
    }
}
