//! モデル学習（エポック単位の明示的なループ）
//!
//! 各エポックの結果は戻り値として返し、呼び出し側で履歴に積み上げます。

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};

use crate::ml::dataset::{DirectoryLoader, ImageFolder, ImageSubset, PreprocessedBatches, RawBatch};
use crate::ml::ml_model::{ModelConfig, WasteClassifier};
use crate::ml::preprocess::Preprocessing;
use crate::model::config::{ImageSettings, TrainingSettings};
use crate::types::{EpochMetrics, RunningMetrics, TrainingHistory};

/// バッチ内の正解数
fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = output.dims();
    let correct: i64 = output
        .argmax(1)
        .reshape([batch_size])
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// 1エポック分の学習（バッチごとに1回パラメータを更新）
pub fn train_epoch<B, O, I>(
    mut model: WasteClassifier<B>,
    optimizer: &mut O,
    batches: I,
    learning_rate: f64,
    device: &B::Device,
) -> Result<(WasteClassifier<B>, RunningMetrics)>
where
    B: AutodiffBackend,
    O: Optimizer<WasteClassifier<B>, B>,
    I: Iterator<Item = Result<RawBatch>>,
{
    let mut metrics = RunningMetrics::new();

    for batch in batches {
        let batch = batch?.to_tensors::<B>(device);
        let item = model.forward_classification(batch.images, batch.targets);

        let loss_value: f64 = item.loss.clone().into_scalar().elem();
        let batch_size = item.targets.dims()[0];
        let correct = count_correct(item.output, item.targets);
        metrics.add_batch(loss_value, correct, batch_size);

        let grads = item.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(learning_rate, model, grads);
    }

    Ok((model, metrics))
}

/// 1エポック分の検証（パラメータは更新しない）
pub fn validate_epoch<B, I>(
    model: &WasteClassifier<B>,
    batches: I,
    device: &B::Device,
) -> Result<RunningMetrics>
where
    B: Backend,
    I: Iterator<Item = Result<RawBatch>>,
{
    let mut metrics = RunningMetrics::new();

    for batch in batches {
        let batch = batch?.to_tensors::<B>(device);
        let batch_size = batch.targets.dims()[0];
        let item = model.forward_classification(batch.images, batch.targets);

        let loss_value: f64 = item.loss.into_scalar().elem();
        let correct = count_correct(item.output, item.targets);
        metrics.add_batch(loss_value, correct, batch_size);
    }

    Ok(metrics)
}

/// 部分集合の全データ（最後の端数バッチを含む）で評価
pub fn evaluate<B: Backend>(
    model: &WasteClassifier<B>,
    subset: &ImageSubset,
    preprocessing: Preprocessing,
    batch_size: usize,
    image_size: usize,
    device: &B::Device,
) -> Result<RunningMetrics> {
    let loader = DirectoryLoader::new(subset.clone(), batch_size, image_size);
    validate_epoch(
        model,
        PreprocessedBatches::new(loader.epoch(0, true), preprocessing),
        device,
    )
}

/// 1つの前処理バリアントについてモデルを学習する
///
/// 戻り値の履歴はエポック数と同じ件数を持つ。
pub fn train_variant<B: AutodiffBackend>(
    folder: &ImageFolder,
    preprocessing: Preprocessing,
    image: &ImageSettings,
    training: &TrainingSettings,
    device: &B::Device,
) -> Result<(WasteClassifier<B>, TrainingHistory)> {
    let mut model = ModelConfig::new(folder.num_classes())
        .with_dropout(training.dropout)
        .with_image_size(image.image_size)
        .init::<B>(device)?;
    let mut optimizer = AdamConfig::new().init::<B, WasteClassifier<B>>();

    let train_loader = DirectoryLoader::new(folder.train().clone(), training.batch_size, image.image_size)
        .with_shuffle(training.seed)
        .with_augmentation(image.augment);
    let val_loader =
        DirectoryLoader::new(folder.validation().clone(), training.batch_size, image.image_size);

    let train_steps = train_loader.steps_per_epoch();
    let val_steps = val_loader.steps_per_epoch();
    log::info!(
        "[{}] 学習開始: {} エポック, 学習 {} ステップ/エポック, 検証 {} ステップ/エポック",
        preprocessing,
        training.num_epochs,
        train_steps,
        val_steps
    );
    if train_steps == 0 {
        log::warn!(
            "[{}] 学習データ {} 枚がバッチサイズ {} に満たないため、学習ステップが0です（損失・正解率はNaN）",
            preprocessing,
            train_loader.len(),
            training.batch_size
        );
    }
    if val_steps == 0 {
        log::warn!(
            "[{}] 検証データ {} 枚がバッチサイズ {} に満たないため、検証ステップが0です（損失・正解率はNaN）",
            preprocessing,
            val_loader.len(),
            training.batch_size
        );
    }

    let mut history = TrainingHistory::new();

    for epoch in 0..training.num_epochs {
        let (trained, train) = train_epoch(
            model,
            &mut optimizer,
            PreprocessedBatches::new(train_loader.epoch(epoch, false), preprocessing),
            training.learning_rate,
            device,
        )?;
        model = trained;

        let val = validate_epoch(
            &model.valid(),
            PreprocessedBatches::new(val_loader.epoch(epoch, false), preprocessing),
            device,
        )?;

        let metrics = EpochMetrics {
            train_loss: train.mean_loss(),
            train_accuracy: train.accuracy(),
            val_loss: val.mean_loss(),
            val_accuracy: val.accuracy(),
        };
        println!(
            "[{}] Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            preprocessing,
            epoch + 1,
            training.num_epochs,
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.val_loss,
            metrics.val_accuracy
        );
        history = history.with_epoch(metrics);
    }

    Ok((model, history))
}
