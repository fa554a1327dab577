//! BDD tests for scoring a prediction against ground truth.

use attention_viz::{
    ClassDistribution, Device, PointCloudSample,
    inference::predict,
    report::{accuracy, format_accuracy},
    tests::support::{FixedLogits, labelled_sample},
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

#[derive(Default)]
struct EvaluationContext {
    sample: RefCell<Option<PointCloudSample>>,
    model: RefCell<Option<FixedLogits>>,
    title: RefCell<Option<String>>,
    distribution: RefCell<Option<ClassDistribution>>,
}

#[fixture]
fn evaluation_context() -> EvaluationContext {
    EvaluationContext::default()
}

fn parse_numbers<T: std::str::FromStr>(raw: &str) -> Vec<T> {
    raw.split_whitespace()
        .map(|s| s.parse().unwrap_or_else(|_| panic!("bad number {s}")))
        .collect()
}

#[given("a sample labelled \"{labels}\"")]
#[expect(clippy::needless_pass_by_value, reason = "BDD macro injects owned value")]
fn given_sample(labels: String, #[from(evaluation_context)] ctx: &EvaluationContext) {
    let labels: Vec<u8> = parse_numbers(&labels);
    ctx.sample.replace(Some(labelled_sample("vase", 1, &labels)));
}

#[given("a classifier predicting \"{classes}\"")]
#[expect(clippy::needless_pass_by_value, reason = "BDD macro injects owned value")]
fn given_classifier(classes: String, #[from(evaluation_context)] ctx: &EvaluationContext) {
    let classes: Vec<usize> = parse_numbers(&classes);
    ctx.model.replace(Some(FixedLogits::one_hot(&classes)));
}

#[when("the prediction is evaluated")]
fn when_evaluated(#[from(evaluation_context)] ctx: &EvaluationContext) {
    let sample = ctx.sample.borrow();
    let sample = sample.as_ref().unwrap_or_else(|| panic!("sample to be set"));
    let model = ctx.model.borrow();
    let model = model.as_ref().unwrap_or_else(|| panic!("model to be set"));
    let prediction = predict(model, Device::Cpu, sample).unwrap_or_else(|e| panic!("{e}"));
    let score = accuracy(sample.labels(), &prediction.classes).unwrap_or_else(|e| panic!("{e}"));
    let distribution = ClassDistribution::tally(sample.labels(), &prediction.classes)
        .unwrap_or_else(|e| panic!("{e}"));
    ctx.title.replace(Some(format_accuracy(score)));
    ctx.distribution.replace(Some(distribution));
}

#[then("the accuracy title is \"{title}\"")]
#[expect(clippy::needless_pass_by_value, reason = "BDD macro injects owned value")]
fn then_title(title: String, #[from(evaluation_context)] ctx: &EvaluationContext) {
    assert_eq!(ctx.title.borrow().as_deref(), Some(title.as_str()));
}

#[then("the ground truth counts are \"{counts}\"")]
#[expect(clippy::needless_pass_by_value, reason = "BDD macro injects owned value")]
fn then_truth_counts(counts: String, #[from(evaluation_context)] ctx: &EvaluationContext) {
    let expected: Vec<usize> = parse_numbers(&counts);
    let distribution = ctx
        .distribution
        .borrow()
        .as_ref()
        .copied()
        .unwrap_or_else(|| panic!("distribution to be set"));
    assert_eq!(distribution.ground_truth.to_vec(), expected);
}

#[then("the predicted counts are \"{counts}\"")]
#[expect(clippy::needless_pass_by_value, reason = "BDD macro injects owned value")]
fn then_predicted_counts(counts: String, #[from(evaluation_context)] ctx: &EvaluationContext) {
    let expected: Vec<usize> = parse_numbers(&counts);
    let distribution = ctx
        .distribution
        .borrow()
        .as_ref()
        .copied()
        .unwrap_or_else(|| panic!("distribution to be set"));
    assert_eq!(distribution.predicted.to_vec(), expected);
}

#[scenario(path = "tests/features/evaluation.feature", index = 0)]
fn every_class_correct(evaluation_context: EvaluationContext) {
    let _ = evaluation_context;
}

#[scenario(path = "tests/features/evaluation.feature", index = 1)]
fn half_correct(evaluation_context: EvaluationContext) {
    let _ = evaluation_context;
}
