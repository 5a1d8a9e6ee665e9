//! Mini-batch gradient descent over a fixed number of epochs.
use crate::classifier::SoftmaxRegression;
use crate::datasets::one_hot_batch;
use crate::error::{DigitError, Result};
use crate::linalg;
use crate::metrics::accuracy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Where a [`Trainer`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Initializing,
    EpochRunning { epoch: usize },
    EpochScoring { epoch: usize },
    Done,
}

/// Scores recorded after one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Append-only per-epoch log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn train_losses(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.train_loss).collect()
    }

    /// Writes `epoch,train_loss,val_loss,val_accuracy` rows with a header.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let records = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<EpochRecord>, _>>()?;
        Ok(Self { records })
    }
}

/// Runs epochs of shuffled mini-batch updates and scores each epoch.
#[derive(Debug)]
pub struct Trainer {
    epochs: usize,
    batch_size: usize,
    log_every: usize,
    rng: StdRng,
    state: TrainingState,
}

impl Trainer {
    /// `seed = None` shuffles from OS entropy.
    pub fn new(epochs: usize, batch_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            epochs,
            batch_size,
            log_every: 10,
            rng,
            state: TrainingState::Initializing,
        }
    }

    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every.max(1);
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    fn transition(&mut self, next: TrainingState) {
        debug!(from = ?self.state, to = ?next, "training state");
        self.state = next;
    }

    /// Trains `model` in place and returns the per-epoch history.
    ///
    /// Shapes are checked before the first update; a failure leaves the
    /// model untouched.
    pub fn fit(
        &mut self,
        model: &mut SoftmaxRegression,
        x_train: &[Vec<f64>],
        y_train: &[u8],
        x_val: &[Vec<f64>],
        y_val: &[u8],
    ) -> Result<TrainingHistory> {
        self.transition(TrainingState::Initializing);
        validate_inputs(model, x_train, y_train, "train features vs labels")?;
        validate_inputs(model, x_val, y_val, "validation features vs labels")?;
        if x_train.is_empty() {
            return Err(DigitError::DataFormat("training set is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(DigitError::DataFormat("batch size must be positive".to_string()));
        }

        let n_classes = model.n_classes();
        let y_train_hot = one_hot_batch(y_train, n_classes);
        let y_val_hot = one_hot_batch(y_val, n_classes);
        let mut history = TrainingHistory::default();
        let mut indices: Vec<usize> = (0..x_train.len()).collect();

        info!(
            samples = x_train.len(),
            features = model.n_features(),
            epochs = self.epochs,
            batch_size = self.batch_size,
            "starting training"
        );

        for epoch in 1..=self.epochs {
            self.transition(TrainingState::EpochRunning { epoch });
            indices.shuffle(&mut self.rng);
            for batch in indices.chunks(self.batch_size) {
                let xb: Vec<Vec<f64>> = batch.iter().map(|&i| x_train[i].clone()).collect();
                let yb: Vec<Vec<f64>> = batch.iter().map(|&i| y_train_hot[i].clone()).collect();
                model.train_batch(&xb, &yb)?;
            }

            self.transition(TrainingState::EpochScoring { epoch });
            let train_loss = model.loss(&y_train_hot, &model.predict_proba(x_train)?)?;
            let val_proba = model.predict_proba(x_val)?;
            let val_loss = model.loss(&y_val_hot, &val_proba)?;
            let val_pred: Vec<usize> = val_proba.iter().map(|p| linalg::argmax(p)).collect();
            let val_accuracy = accuracy(&val_pred, y_val);
            let record = EpochRecord {
                epoch,
                train_loss,
                val_loss,
                val_accuracy,
            };
            if epoch % self.log_every == 0 || epoch == self.epochs {
                info!(
                    "Epoch {}/{} - Train Loss: {:.4}, Val Loss: {:.4}, Val Acc: {:.4}",
                    epoch, self.epochs, train_loss, val_loss, val_accuracy
                );
            } else {
                debug!(?record, "epoch scored");
            }
            history.push(record);
        }

        self.transition(TrainingState::Done);
        Ok(history)
    }
}

fn validate_inputs(
    model: &SoftmaxRegression,
    x: &[Vec<f64>],
    y: &[u8],
    context: &'static str,
) -> Result<()> {
    if x.len() != y.len() {
        return Err(DigitError::shape(context, x.len(), y.len()));
    }
    if let Some(row) = x.iter().find(|r| r.len() != model.n_features()) {
        return Err(DigitError::shape("feature width vs classifier", model.n_features(), row.len()));
    }
    if let Some(&label) = y.iter().find(|&&l| l as usize >= model.n_classes()) {
        return Err(DigitError::DataFormat(format!(
            "label {} outside {} classes ({})",
            label,
            model.n_classes(),
            context
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_separable_data;

    fn fresh_model(n_features: usize, n_classes: usize) -> SoftmaxRegression {
        let mut rng = StdRng::seed_from_u64(5);
        SoftmaxRegression::new(n_features, n_classes, 0.5, 0.001, &mut rng)
    }

    #[test]
    fn loss_decreases_on_separable_data() {
        let (x, y) = generate_separable_data(300, 3, 0.3, 42);
        let (xv, yv) = generate_separable_data(90, 3, 0.3, 43);
        let mut model = fresh_model(2, 3);
        let mut trainer = Trainer::new(12, 32, Some(7));
        let history = trainer.fit(&mut model, &x, &y, &xv, &yv).unwrap();

        assert_eq!(history.len(), 12);
        assert_eq!(trainer.state(), TrainingState::Done);
        let losses = history.train_losses();
        let first_half: f64 = losses[..6].iter().sum::<f64>() / 6.0;
        let second_half: f64 = losses[6..].iter().sum::<f64>() / 6.0;
        assert!(second_half < first_half);
        assert!(losses[11] < losses[0]);
        assert!(history.last().unwrap().val_accuracy > 0.9);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let (x, y) = generate_separable_data(60, 2, 0.5, 1);
        let run = || {
            let mut model = fresh_model(2, 2);
            Trainer::new(3, 8, Some(99))
                .fit(&mut model, &x, &y, &x, &y)
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn mismatched_lengths_abort_before_training() {
        let (x, y) = generate_separable_data(20, 2, 0.5, 1);
        let mut model = fresh_model(2, 2);
        let before = model.weights.clone();
        let err = Trainer::new(2, 4, Some(0))
            .fit(&mut model, &x, &y[..19], &x, &y)
            .unwrap_err();
        assert!(matches!(err, DigitError::ShapeMismatch { .. }));
        assert_eq!(model.weights, before);
    }

    #[test]
    fn wrong_feature_width_and_empty_set_are_rejected() {
        let mut model = fresh_model(3, 2);
        let (x, y) = generate_separable_data(10, 2, 0.5, 1);
        assert!(Trainer::new(1, 4, Some(0)).fit(&mut model, &x, &y, &[], &[]).is_err());
        assert!(Trainer::new(1, 4, Some(0)).fit(&mut model, &[], &[], &[], &[]).is_err());
    }

    #[test]
    fn zero_batch_and_out_of_range_labels_leave_model_untouched() {
        let (x, y) = generate_separable_data(10, 2, 0.5, 2);
        let mut model = fresh_model(2, 2);
        let before = model.weights.clone();

        let mut trainer = Trainer::new(1, 0, Some(0));
        assert!(matches!(
            trainer.fit(&mut model, &x, &y, &x, &y),
            Err(DigitError::DataFormat(msg)) if msg.contains("batch size")
        ));
        assert_eq!(trainer.state(), TrainingState::Initializing);
        assert_eq!(model.weights, before);

        let mut bad_labels = y.clone();
        bad_labels[3] = 5;
        assert!(matches!(
            Trainer::new(1, 4, Some(0)).fit(&mut model, &x, &bad_labels, &x, &y),
            Err(DigitError::DataFormat(msg)) if msg.contains("label 5")
        ));
        assert!(matches!(
            Trainer::new(1, 4, Some(0)).fit(&mut model, &x, &y, &x, &bad_labels),
            Err(DigitError::DataFormat(_))
        ));
        assert_eq!(model.weights, before);
    }

    #[test]
    fn last_batch_may_be_smaller() {
        // 10 samples, batch 4 → batches of 4, 4, 2
        let (x, y) = generate_separable_data(10, 2, 0.5, 3);
        let mut model = fresh_model(2, 2);
        let history = Trainer::new(1, 4, Some(0)).fit(&mut model, &x, &y, &x, &y).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history.records()[0].train_loss.is_finite());
    }

    #[test]
    fn history_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.csv");
        let mut history = TrainingHistory::default();
        history.push(EpochRecord { epoch: 1, train_loss: 0.9, val_loss: 1.0, val_accuracy: 0.5 });
        history.push(EpochRecord { epoch: 2, train_loss: 0.4, val_loss: 0.6, val_accuracy: 0.8 });
        history.write_csv(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("epoch,train_loss,val_loss,val_accuracy"));
        assert_eq!(TrainingHistory::read_csv(&path).unwrap(), history);
    }
}
