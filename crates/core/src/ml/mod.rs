//! Regional profitability model
//!
//! Deterministic L2-regularized logistic regression over per-region mean
//! sales, quantity and profit. Features are standardized with population
//! statistics. By default the scaler and the model are fit on the same
//! regions they predict, so reported metrics describe in-sample fit; holdout
//! mode reserves a seeded, label-stratified share of regions for evaluation.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::artifacts::RegionalProbability;
use crate::features::GroupMeans;
use crate::scoring::profit_flag;
use crate::stats::{Deviation, NormalizeError, StandardScaler};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Fit on a training split and report metrics on the held-out regions.
    pub evaluate_on_holdout: bool,
    pub holdout_fraction: f64,
    /// Inverse regularization strength; smaller is stronger.
    pub regularization: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            evaluate_on_holdout: false,
            holdout_fraction: 0.3,
            regularization: 1.0,
            max_iterations: 500,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClassifierError {
    #[error("cannot fit the profitability model on an empty region set")]
    EmptyTrainingSet,
    #[error("all {samples} training regions share label {label}; the model cannot separate profit from loss")]
    SingleClass { label: u8, samples: usize },
    #[error("holdout evaluation needs at least {required} regions, got {actual}")]
    TooFewSamples { required: usize, actual: usize },
    #[error("region `{region}` has a non-finite feature value")]
    NonFiniteFeature { region: String },
    #[error("newton system became singular at iteration {iteration}")]
    SingularSystem { iteration: usize },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    InSample,
    Holdout,
}

/// Model performance metrics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub sample_count: usize,
}

impl ModelMetrics {
    pub fn from_predictions(predicted: &[u8], actual: &[u8]) -> Self {
        let mut correct = 0;
        let mut true_positives = 0;
        let mut false_positives = 0;
        let mut false_negatives = 0;

        for (pred, actual) in predicted.iter().zip(actual.iter()) {
            match (*pred == 1, *actual == 1) {
                (true, true) => {
                    correct += 1;
                    true_positives += 1;
                }
                (false, false) => correct += 1,
                (true, false) => false_positives += 1,
                (false, true) => false_negatives += 1,
            }
        }

        let sample_count = predicted.len().min(actual.len());
        let accuracy = if sample_count > 0 { correct as f64 / sample_count as f64 } else { 0.0 };
        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };
        let recall = if true_positives + false_negatives > 0 {
            true_positives as f64 / (true_positives + false_negatives) as f64
        } else {
            0.0
        };
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self { accuracy, precision, recall, f1_score, sample_count }
    }
}

/// Fitted logistic regression. `weights[0]` is the intercept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticModel {
    /// Gradient norm at which Newton iterations stop.
    pub const TOLERANCE: f64 = 1e-8;
    const MAX_STEP_HALVINGS: usize = 40;
    /// Rounding allowance when comparing objectives near the optimum.
    const OBJECTIVE_SLACK: f64 = 1e-12;

    /// Sigmoid activation function: 1 / (1 + e^(-z))
    fn sigmoid(z: f64) -> f64 {
        // Clamp to avoid overflow
        let z = z.clamp(-500.0, 500.0);
        1.0 / (1.0 + (-z).exp())
    }

    fn linear(weights: &[f64], row: &[f64]) -> f64 {
        weights[0] + weights[1..].iter().zip(row.iter()).map(|(w, xi)| w * xi).sum::<f64>()
    }

    /// Penalized negative log-likelihood; the intercept is not penalized.
    fn objective(weights: &[f64], x: &[Vec<f64>], y: &[f64], c: f64) -> f64 {
        let penalty: f64 = weights[1..].iter().map(|w| w * w).sum::<f64>() * 0.5;
        let loss: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(row, target)| {
                let z = Self::linear(weights, row);
                // log(1 + e^z) - y*z, computed without overflow
                let softplus = if z > 0.0 { z + (-z).exp().ln_1p() } else { z.exp().ln_1p() };
                softplus - target * z
            })
            .sum();
        penalty + c * loss
    }

    /// Fits with damped Newton iterations on the penalized log-likelihood.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        regularization: f64,
        max_iterations: usize,
    ) -> Result<Self, ClassifierError> {
        let width = x.first().map(Vec::len).ok_or(ClassifierError::EmptyTrainingSet)? + 1;
        let mut weights = vec![0.0; width];
        let mut objective = Self::objective(&weights, x, y, regularization);

        for iteration in 0..max_iterations {
            let mut gradient = vec![0.0; width];
            let mut hessian = vec![vec![0.0; width]; width];

            for (row, target) in x.iter().zip(y.iter()) {
                let pred = Self::sigmoid(Self::linear(&weights, row));
                let error = pred - target;
                let curvature = pred * (1.0 - pred);
                let augmented: Vec<f64> = std::iter::once(1.0).chain(row.iter().copied()).collect();

                for j in 0..width {
                    gradient[j] += regularization * error * augmented[j];
                    for k in 0..width {
                        hessian[j][k] += regularization * curvature * augmented[j] * augmented[k];
                    }
                }
            }
            for j in 1..width {
                gradient[j] += weights[j];
                hessian[j][j] += 1.0;
            }

            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gradient_norm <= Self::TOLERANCE {
                return Ok(Self { weights, iterations: iteration, converged: true });
            }

            let step = solve_linear_system(hessian, gradient)
                .ok_or(ClassifierError::SingularSystem { iteration })?;

            let mut scale = 1.0;
            let mut accepted = false;
            for _ in 0..Self::MAX_STEP_HALVINGS {
                let candidate: Vec<f64> =
                    weights.iter().zip(step.iter()).map(|(w, s)| w - scale * s).collect();
                let candidate_objective = Self::objective(&candidate, x, y, regularization);
                if candidate_objective <= objective + Self::OBJECTIVE_SLACK * objective.abs().max(1.0)
                {
                    weights = candidate;
                    objective = candidate_objective;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }

            if !accepted {
                warn!(
                    event_name = "ml.classifier.stalled",
                    iteration,
                    gradient_norm,
                    "line search found no descent before the gradient tolerance was met"
                );
                return Ok(Self {
                    weights,
                    iterations: iteration + 1,
                    converged: gradient_norm <= Self::TOLERANCE,
                });
            }
        }

        warn!(
            event_name = "ml.classifier.not_converged",
            max_iterations,
            "logistic regression reached the iteration limit before converging"
        );
        Ok(Self { weights, iterations: max_iterations, converged: false })
    }

    pub fn predict_probability(&self, row: &[f64]) -> f64 {
        Self::sigmoid(Self::linear(&self.weights, row))
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for column in 0..n {
        let pivot_row = (column..n).max_by(|a, b| {
            matrix[*a][column].abs().total_cmp(&matrix[*b][column].abs())
        })?;
        if matrix[pivot_row][column].abs() < 1e-14 {
            return None;
        }
        matrix.swap(column, pivot_row);
        rhs.swap(column, pivot_row);

        for row in column + 1..n {
            let factor = matrix[row][column] / matrix[column][column];
            for k in column..n {
                matrix[row][k] -= factor * matrix[column][k];
            }
            rhs[row] -= factor * rhs[column];
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    solution.iter().all(|value| value.is_finite()).then_some(solution)
}

/// Output of one classifier run: one row per region plus fit diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfitabilityReport {
    pub rows: Vec<RegionalProbability>,
    pub model: LogisticModel,
    pub metrics: ModelMetrics,
    pub evaluation: EvaluationMode,
    pub training_samples: usize,
}

pub fn predict_profitability(
    regions: &[GroupMeans],
    settings: &ClassifierSettings,
) -> Result<ProfitabilityReport, ClassifierError> {
    if regions.is_empty() {
        return Err(ClassifierError::EmptyTrainingSet);
    }
    if let Some(region) = regions
        .iter()
        .find(|region| ![region.sales, region.quantity, region.profit].iter().all(|v| v.is_finite()))
    {
        return Err(ClassifierError::NonFiniteFeature { region: region.key.clone() });
    }

    let features: Vec<Vec<f64>> =
        regions.iter().map(|region| vec![region.sales, region.quantity, region.profit]).collect();
    let labels: Vec<u8> = regions.iter().map(|region| profit_flag(region.profit)).collect();

    let (train, evaluate, evaluation) = if settings.evaluate_on_holdout {
        let (train, holdout) = stratified_split(&labels, settings.holdout_fraction, settings.seed)?;
        (train, holdout, EvaluationMode::Holdout)
    } else {
        let all: Vec<usize> = (0..regions.len()).collect();
        (all.clone(), all, EvaluationMode::InSample)
    };

    let train_labels: Vec<u8> = train.iter().map(|index| labels[*index]).collect();
    ensure_two_classes(&train_labels)?;

    let train_features: Vec<Vec<f64>> = train.iter().map(|index| features[*index].clone()).collect();
    let scaler = StandardScaler::fit(&train_features, Deviation::Population)?;
    let train_x = scaler.transform(&train_features);
    let train_y: Vec<f64> = train_labels.iter().map(|label| f64::from(*label)).collect();

    let model = LogisticModel::fit(&train_x, &train_y, settings.regularization, settings.max_iterations)?;
    debug!(
        event_name = "ml.classifier.fitted",
        iterations = model.iterations,
        converged = model.converged,
        training_samples = train.len(),
        "profitability model fitted"
    );

    let rows: Vec<RegionalProbability> = regions
        .iter()
        .zip(features.iter())
        .zip(labels.iter())
        .map(|((region, row), label)| {
            let prob_lucro = model.predict_probability(&scaler.transform_row(row));
            RegionalProbability {
                state: region.key.clone(),
                sales: region.sales,
                quantity: region.quantity,
                profit: region.profit,
                lucro: *label,
                previsao: u8::from(prob_lucro > 0.5),
                prob_prejuizo: 1.0 - prob_lucro,
                prob_lucro,
            }
        })
        .collect();

    let predicted: Vec<u8> = evaluate.iter().map(|index| rows[*index].previsao).collect();
    let actual: Vec<u8> = evaluate.iter().map(|index| labels[*index]).collect();
    let metrics = ModelMetrics::from_predictions(&predicted, &actual);

    Ok(ProfitabilityReport { rows, model, metrics, evaluation, training_samples: train.len() })
}

fn ensure_two_classes(labels: &[u8]) -> Result<(), ClassifierError> {
    let first = *labels.first().ok_or(ClassifierError::EmptyTrainingSet)?;
    if labels.iter().all(|label| *label == first) {
        return Err(ClassifierError::SingleClass { label: first, samples: labels.len() });
    }
    Ok(())
}

/// Splits indices per label so both classes keep at least one training row.
fn stratified_split(
    labels: &[u8],
    holdout_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), ClassifierError> {
    const MIN_REGIONS: usize = 3;
    if labels.len() < MIN_REGIONS {
        return Err(ClassifierError::TooFewSamples { required: MIN_REGIONS, actual: labels.len() });
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut holdout = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> =
            (0..labels.len()).filter(|index| labels[*index] == class).collect();
        members.shuffle(&mut rng);
        let wanted = (members.len() as f64 * holdout_fraction).round() as usize;
        let held = wanted.min(members.len().saturating_sub(1));
        holdout.extend_from_slice(&members[..held]);
        train.extend_from_slice(&members[held..]);
    }

    if holdout.is_empty() {
        return Err(ClassifierError::TooFewSamples {
            required: MIN_REGIONS,
            actual: labels.len(),
        });
    }
    train.sort_unstable();
    holdout.sort_unstable();
    Ok((train, holdout))
}

#[cfg(test)]
mod tests {
    use crate::features::GroupMeans;

    use super::{
        predict_profitability, solve_linear_system, ClassifierError, ClassifierSettings,
        EvaluationMode, LogisticModel, ModelMetrics,
    };

    fn region(key: &str, sales: f64, quantity: f64, profit: f64) -> GroupMeans {
        GroupMeans { key: key.to_owned(), sales, quantity, profit }
    }

    fn mixed_regions() -> Vec<GroupMeans> {
        vec![
            region("California", 228.7, 3.8, 38.2),
            region("New York", 275.8, 3.8, 65.2),
            region("Washington", 274.5, 3.9, 67.6),
            region("Michigan", 299.1, 3.9, 30.5),
            region("Indiana", 359.4, 3.8, 82.9),
            region("Texas", 172.8, 3.8, -26.1),
            region("Ohio", 166.9, 3.7, -36.2),
            region("Illinois", 162.9, 3.8, -25.6),
            region("Pennsylvania", 198.5, 3.9, -26.5),
            region("Colorado", 176.4, 3.8, -35.9),
        ]
    }

    #[test]
    fn sigmoid_computes_correctly() {
        assert!((LogisticModel::sigmoid(0.0) - 0.5).abs() < 0.001);
        assert!(LogisticModel::sigmoid(5.0) > 0.99);
        assert!(LogisticModel::sigmoid(-5.0) < 0.01);
        assert!(LogisticModel::sigmoid(1_000.0).is_finite());
    }

    #[test]
    fn probabilities_are_complementary_for_every_region() {
        let report =
            predict_profitability(&mixed_regions(), &ClassifierSettings::default()).expect("fit");

        assert_eq!(report.rows.len(), 10);
        assert_eq!(report.evaluation, EvaluationMode::InSample);
        for row in &report.rows {
            assert!((row.prob_prejuizo + row.prob_lucro - 1.0).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&row.prob_lucro));
            assert_eq!(row.previsao, u8::from(row.prob_lucro > 0.5));
        }
    }

    #[test]
    fn separable_regions_are_predicted_in_sample() {
        let report =
            predict_profitability(&mixed_regions(), &ClassifierSettings::default()).expect("fit");

        assert!(report.model.converged);
        assert!(report.metrics.accuracy >= 0.9, "accuracy was {}", report.metrics.accuracy);
        let texas = report.rows.iter().find(|row| row.state == "Texas").expect("texas");
        assert_eq!(texas.lucro, 0);
        assert!(texas.prob_prejuizo > 0.5);
    }

    fn gradient_norm(model: &LogisticModel, x: &[Vec<f64>], y: &[f64], c: f64) -> f64 {
        let mut gradient = vec![0.0; model.weights.len()];
        for (row, target) in x.iter().zip(y.iter()) {
            let error = model.predict_probability(row) - target;
            gradient[0] += c * error;
            for (j, value) in row.iter().enumerate() {
                gradient[j + 1] += c * error * value;
            }
        }
        for j in 1..gradient.len() {
            gradient[j] += model.weights[j];
        }
        gradient.iter().map(|g| g * g).sum::<f64>().sqrt()
    }

    #[test]
    fn converged_flag_matches_the_gradient_tolerance() {
        let x = vec![vec![-2.0, 0.5], vec![-1.0, -0.5], vec![0.5, 1.0], vec![1.0, -1.0], vec![2.0, 0.0]];
        let y = vec![0.0, 0.0, 1.0, 0.0, 1.0];

        let fitted = LogisticModel::fit(&x, &y, 1.0, 500).expect("fit");
        assert!(fitted.converged);
        assert!(gradient_norm(&fitted, &x, &y, 1.0) <= LogisticModel::TOLERANCE);

        let truncated = LogisticModel::fit(&x, &y, 1.0, 1).expect("fit");
        assert!(!truncated.converged);
        assert!(gradient_norm(&truncated, &x, &y, 1.0) > LogisticModel::TOLERANCE);
    }

    #[test]
    fn single_class_training_data_is_a_failure() {
        let regions = vec![region("A", 10.0, 1.0, 5.0), region("B", 20.0, 2.0, 0.0)];

        let error = predict_profitability(&regions, &ClassifierSettings::default())
            .expect_err("single class must fail");

        assert_eq!(error, ClassifierError::SingleClass { label: 1, samples: 2 });
    }

    #[test]
    fn holdout_mode_keeps_artifact_shape_and_reports_holdout_metrics() {
        let settings = ClassifierSettings {
            evaluate_on_holdout: true,
            holdout_fraction: 0.4,
            ..ClassifierSettings::default()
        };

        let report = predict_profitability(&mixed_regions(), &settings).expect("fit");

        assert_eq!(report.evaluation, EvaluationMode::Holdout);
        assert_eq!(report.rows.len(), 10);
        assert_eq!(report.training_samples, 6);
        assert_eq!(report.metrics.sample_count, 4);

        let again = predict_profitability(&mixed_regions(), &settings).expect("fit");
        assert_eq!(report, again);
    }

    #[test]
    fn holdout_mode_needs_enough_regions() {
        let regions = vec![region("A", 10.0, 1.0, 5.0), region("B", 20.0, 2.0, -1.0)];
        let settings =
            ClassifierSettings { evaluate_on_holdout: true, ..ClassifierSettings::default() };

        assert_eq!(
            predict_profitability(&regions, &settings),
            Err(ClassifierError::TooFewSamples { required: 3, actual: 2 })
        );
    }

    #[test]
    fn non_finite_features_are_rejected() {
        let regions = vec![region("A", f64::NAN, 1.0, 5.0), region("B", 20.0, 2.0, -1.0)];

        assert!(matches!(
            predict_profitability(&regions, &ClassifierSettings::default()),
            Err(ClassifierError::NonFiniteFeature { ref region }) if region == "A"
        ));
    }

    #[test]
    fn metrics_count_confusion_matrix() {
        let metrics = ModelMetrics::from_predictions(&[1, 1, 0, 0], &[1, 0, 1, 0]);

        assert_eq!(metrics.sample_count, 4);
        assert!((metrics.accuracy - 0.5).abs() < 1e-12);
        assert!((metrics.precision - 0.5).abs() < 1e-12);
        assert!((metrics.recall - 0.5).abs() < 1e-12);
        assert!((metrics.f1_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn linear_solver_handles_pivoting() {
        let solution =
            solve_linear_system(vec![vec![0.0, 2.0], vec![3.0, 1.0]], vec![4.0, 5.0]).expect("solve");

        assert!((solution[0] - 1.0).abs() < 1e-12);
        assert!((solution[1] - 2.0).abs() < 1e-12);
        assert!(solve_linear_system(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }
}
