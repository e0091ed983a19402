use serde::{Deserialize, Serialize};

/// 1エポック分の学習・検証メトリクス
///
/// 検証ステップ数が0の場合、検証側はNaNになる。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// エポックごとのメトリクス履歴（1エポックにつき1件）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// エポックの結果を追加した履歴を返す
    pub fn with_epoch(mut self, metrics: EpochMetrics) -> Self {
        self.epochs.push(metrics);
        self
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn train_loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.train_loss).collect()
    }

    pub fn train_accuracy(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.train_accuracy).collect()
    }

    pub fn val_loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.val_loss).collect()
    }

    pub fn val_accuracy(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.val_accuracy).collect()
    }
}

/// 損失と正解数の累積値。バッチごとに加算し、最後に平均を取る。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMetrics {
    loss_sum: f64,
    steps: usize,
    correct: usize,
    seen: usize,
}

impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1バッチ分の結果を加算
    pub fn add_batch(&mut self, loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += loss;
        self.steps += 1;
        self.correct += correct;
        self.seen += batch_size;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// バッチ平均損失（ステップ0ならNaN）
    pub fn mean_loss(&self) -> f64 {
        if self.steps == 0 {
            f64::NAN
        } else {
            self.loss_sum / self.steps as f64
        }
    }

    /// 正解率 0.0〜1.0（サンプル0ならNaN）
    pub fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            f64::NAN
        } else {
            self.correct as f64 / self.seen as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            train_loss: 1.0 / (epoch + 1) as f64,
            train_accuracy: 0.5,
            val_loss: 2.0,
            val_accuracy: 0.4,
        }
    }

    #[test]
    fn history_has_one_entry_per_epoch() {
        let history = (0..7).fold(TrainingHistory::new(), |h, e| h.with_epoch(metrics(e)));
        assert_eq!(history.len(), 7);
        assert_eq!(history.train_loss().len(), 7);
        assert_eq!(history.val_accuracy().len(), 7);
        assert_eq!(history.train_loss()[1], 0.5);
    }

    #[test]
    fn running_metrics_average_over_steps() {
        let mut running = RunningMetrics::new();
        running.add_batch(1.0, 30, 32);
        running.add_batch(3.0, 2, 32);
        assert_eq!(running.steps(), 2);
        assert!((running.mean_loss() - 2.0).abs() < 1e-12);
        assert!((running.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn running_metrics_without_steps_are_nan() {
        let running = RunningMetrics::new();
        assert!(running.mean_loss().is_nan());
        assert!(running.accuracy().is_nan());
    }
}
