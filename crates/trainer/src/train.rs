//! Model fitting with a fixed holdout evaluation

use digest_gbdt::{ClassificationReport, Dataset, GbdtConfig, GbdtTrainer, Model, SCALE};
use tracing::{debug, info, instrument};

use crate::errors::{PipelineError, Result};
use crate::prepare::{FeatureMatrix, LabelVector};

/// Share of rows held back for evaluation
pub const HOLDOUT_FRACTION: f64 = 0.2;

/// Seed for the train/holdout shuffle
pub const SPLIT_SEED: i64 = 42;

/// Fit on 80% of the rows and report metrics on the rest.
///
/// The report is informational only; poor holdout quality never fails the
/// run.
#[instrument(skip_all, fields(rows = x.len(), features = x.columns.len()))]
pub fn train(
    x: &FeatureMatrix,
    y: &LabelVector,
    config: &GbdtConfig,
) -> Result<(Model, ClassificationReport)> {
    let dataset = Dataset::from_rows(&x.rows, &y.values, x.columns.clone())?;
    let (train_set, holdout) = dataset.train_test_split(HOLDOUT_FRACTION, SPLIT_SEED);

    if train_set.is_empty() {
        return Err(PipelineError::Training(format!(
            "{} labelled rows leave nothing to train on after the holdout split",
            dataset.len()
        )));
    }

    for (name, (min, max)) in train_set.feature_names.iter().zip(train_set.feature_stats()) {
        debug!(
            feature = %name,
            min = min as f64 / SCALE as f64,
            max = max as f64 / SCALE as f64,
            "Feature range"
        );
    }

    info!(
        train_rows = train_set.len(),
        holdout_rows = holdout.len(),
        positives = train_set.positives(),
        "Fitting classifier"
    );
    let model = GbdtTrainer::new(config.clone()).train(&train_set)?;

    let y_true: Vec<u8> = holdout.targets.iter().map(|&t| u8::from(t == 1)).collect();
    let y_pred: Vec<u8> = holdout
        .features
        .iter()
        .map(|row| model.predict_fixed(row))
        .collect();
    let report = ClassificationReport::from_predictions(&y_true, &y_pred);

    for line in report.to_string().lines() {
        info!("{}", line);
    }
    info!(accuracy = report.accuracy, support = report.support(), "Holdout evaluation");

    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (FeatureMatrix, LabelVector) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i % 10) as f64, (i % 3) as f64])
            .collect();
        let values = (0..n).map(|i| u8::from(i % 10 >= 5)).collect();
        (
            FeatureMatrix {
                columns: vec!["saves".into(), "is_feed".into()],
                rows,
            },
            LabelVector {
                name: "user_clicked".into(),
                values,
            },
        )
    }

    #[test]
    fn test_holdout_is_twenty_percent_rounded_up() {
        let (x, y) = data(101);
        let (model, report) = train(&x, &y, &GbdtConfig::default()).unwrap();

        assert_eq!(report.support(), 21);
        assert_eq!(model.metadata.training_rows, 80);
        assert_eq!(model.feature_names, x.columns);
    }

    #[test]
    fn test_separable_data_scores_perfectly() {
        let (x, y) = data(200);
        let (_, report) = train(&x, &y, &GbdtConfig::default()).unwrap();
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = data(150);
        let (a, ra) = train(&x, &y, &GbdtConfig::default()).unwrap();
        let (b, rb) = train(&x, &y, &GbdtConfig::default()).unwrap();
        assert_eq!(a.trees, b.trees);
        assert_eq!(a.metadata.model_hash, b.metadata.model_hash);
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_single_row_cannot_train() {
        let (x, y) = data(1);
        assert!(matches!(
            train(&x, &y, &GbdtConfig::default()),
            Err(PipelineError::Training(_))
        ));
    }
}
