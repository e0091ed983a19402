//! 前処理バリアントの比較実験
//!
//! 適応的二値化とシャープ化の2バリアントを同じ手順で順に学習し、
//! 保存・再読み込み・最終評価・学習曲線の描画までを行います。

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    tensor::backend::{AutodiffBackend, Backend},
};
use std::path::PathBuf;

use crate::charts;
use crate::ml::dataset::ImageFolder;
use crate::ml::inference::{load_classifier, save_classifier};
use crate::ml::ml_model::WasteClassifier;
use crate::ml::preprocess::Preprocessing;
use crate::ml::training::{evaluate, train_variant};
use crate::model::config::ExperimentConfig;
use crate::model::{print_metadata_info, ModelMetadata};
use crate::types::TrainingHistory;

/// 1バリアント分の結果
#[derive(Debug, Clone)]
pub struct VariantResult {
    pub preprocessing: Preprocessing,
    pub history: TrainingHistory,
    /// 保存したモデルを読み直して検証データ全体で測った正解率
    pub final_accuracy: f64,
    pub model_path: PathBuf,
}

/// 保存済みの1バリアント（最終評価前）
#[derive(Debug, Clone)]
pub struct SavedVariant {
    pub preprocessing: Preprocessing,
    pub history: TrainingHistory,
    pub model_path: PathBuf,
}

/// 両バリアントを学習・保存・評価し、学習曲線を描く
pub fn run_comparison<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<Vec<VariantResult>> {
    let image = &config.image;
    let training = &config.training;

    let folder = ImageFolder::from_directory(&image.data_dir, image.validation_fraction)?;

    let mut trained = Vec::with_capacity(Preprocessing::ALL.len());
    for preprocessing in Preprocessing::ALL {
        println!("\n=== {} モデルの学習 ===", preprocessing);
        let (model, history) = train_variant::<B>(&folder, preprocessing, image, training, device)?;
        trained.push((preprocessing, model, history));
    }

    let saved = save_variants(trained, &folder, config)?;

    let mut results = Vec::with_capacity(saved.len());
    for variant in saved {
        results.push(evaluate_saved::<B::InnerBackend>(variant, &folder, training.batch_size, device)?);
    }

    let curves: Vec<(String, TrainingHistory)> = results
        .iter()
        .map(|r| (r.preprocessing.name().to_string(), r.history.clone()))
        .collect();
    charts::write_svg(&image.curves_path, &charts::render_training_grid(&curves))?;

    Ok(results)
}

/// 学習済みの全バリアントを `models/garbage_<name>.tar.gz` へ保存する
pub fn save_variants<B: AutodiffBackend>(
    trained: Vec<(Preprocessing, WasteClassifier<B>, TrainingHistory)>,
    folder: &ImageFolder,
    config: &ExperimentConfig,
) -> Result<Vec<SavedVariant>> {
    let mut saved = Vec::with_capacity(trained.len());
    for (preprocessing, model, history) in trained {
        let metadata = ModelMetadata::new(
            folder.class_names().to_vec(),
            preprocessing,
            config.image.image_size,
            config.training.num_epochs,
            history.last().map(|m| m.val_accuracy),
        );
        let output = config
            .image
            .model_dir
            .join(format!("garbage_{}", preprocessing.name()));
        let model_path = save_classifier(model.valid(), &metadata, &output)?;
        saved.push(SavedVariant {
            preprocessing,
            history,
            model_path,
        });
    }
    Ok(saved)
}

/// 保存したモデルを読み直し、検証データ全体で評価する
pub fn evaluate_saved<B: Backend>(
    variant: SavedVariant,
    folder: &ImageFolder,
    batch_size: usize,
    device: &B::Device,
) -> Result<VariantResult> {
    let (restored, metadata) = load_classifier::<B>(&variant.model_path, device)?;
    print_metadata_info(&metadata);

    let metrics = evaluate(
        &restored,
        folder.validation(),
        metadata.preprocessing,
        batch_size,
        metadata.image_size,
        device,
    )?;
    if metrics.steps() == 0 {
        log::warn!("[{}] 検証データが0枚のため最終評価できません", variant.preprocessing);
    }
    let final_accuracy = metrics.accuracy();
    println!(
        "[{}] Final validation accuracy: {:.4} (loss: {:.4})",
        variant.preprocessing,
        final_accuracy,
        metrics.mean_loss()
    );

    Ok(VariantResult {
        preprocessing: variant.preprocessing,
        history: variant.history,
        final_accuracy,
        model_path: variant.model_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dataset::tests::write_dataset;
    use crate::ml::ml_model::ModelConfig;
    use crate::model::config::{ImageSettings, TrainingSettings};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    #[test]
    fn both_variants_are_trained_saved_and_plotted() {
        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        write_dataset(&data_dir, &["cardboard", "glass"], 6, 12);

        let config = ExperimentConfig {
            image: ImageSettings {
                data_dir,
                image_size: 12,
                model_dir: dir.path().join("models"),
                curves_path: dir.path().join("plots").join("curves.svg"),
                ..ImageSettings::default()
            },
            training: TrainingSettings {
                num_epochs: 2,
                batch_size: 4,
                ..TrainingSettings::default()
            },
            ..ExperimentConfig::default()
        };

        let results = run_comparison::<Autodiff<NdArray>>(&config, &Default::default()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].preprocessing, Preprocessing::AdaptiveThreshold);
        assert_eq!(results[1].preprocessing, Preprocessing::Sharpen);
        for result in &results {
            assert_eq!(result.history.len(), 2);
            assert!(result.model_path.exists());
            assert!((0.0..=1.0).contains(&result.final_accuracy));
        }
        assert!(dir.path().join("models").join("garbage_binary.tar.gz").exists());
        assert!(config.image.curves_path.exists());
    }

    #[test]
    fn all_variants_are_saved_before_evaluation() {
        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        write_dataset(&data_dir, &["metal", "paper"], 5, 12);
        let folder = ImageFolder::from_directory(&data_dir, 0.2).unwrap();
        let config = ExperimentConfig {
            image: ImageSettings {
                image_size: 12,
                model_dir: dir.path().join("models"),
                ..ImageSettings::default()
            },
            ..ExperimentConfig::default()
        };
        let device = Default::default();

        let trained: Vec<_> = Preprocessing::ALL
            .into_iter()
            .map(|preprocessing| {
                let model = ModelConfig::new(2)
                    .with_image_size(12)
                    .init::<Autodiff<NdArray>>(&device)
                    .unwrap();
                (preprocessing, model, TrainingHistory::new())
            })
            .collect();

        let saved = save_variants(trained, &folder, &config).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|v| v.model_path.exists()));

        let result = evaluate_saved::<NdArray>(saved[1].clone(), &folder, 4, &device).unwrap();
        assert_eq!(result.preprocessing, Preprocessing::Sharpen);
        assert!((0.0..=1.0).contains(&result.final_accuracy));
    }
}
