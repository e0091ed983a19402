//! モデルの保存・復元と推論機能

use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use std::path::{Path, PathBuf};

use crate::ml::ml_model::{load_rgb, ModelConfig, WasteClassifier};
use crate::ml::preprocess::normalize_into;
use crate::model::{load_model_with_metadata, save_model_with_metadata, ModelMetadata};

/// モデルの重みをバイト列へ（f32精度）
pub fn classifier_to_bytes<B: Backend>(model: WasteClassifier<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// メタデータからモデルを組み立て、重みを復元する
pub fn classifier_from_bytes<B: Backend>(
    metadata: &ModelMetadata,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<WasteClassifier<B>> {
    // 推論時はドロップアウトなし
    let model = ModelConfig::new(metadata.num_classes())
        .with_dropout(0.0)
        .with_image_size(metadata.image_size)
        .init::<B>(device)?;

    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(model_binary, device)
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

    Ok(model.load_record(record))
}

/// モデルをメタデータと共にtar.gzへ保存し、書き込んだパスを返す
pub fn save_classifier<B: Backend>(
    model: WasteClassifier<B>,
    metadata: &ModelMetadata,
    output_path: &Path,
) -> Result<PathBuf> {
    let model_binary = classifier_to_bytes(model)?;
    save_model_with_metadata(output_path, metadata, &model_binary)
}

/// tar.gzからモデルとメタデータを読み込む
pub fn load_classifier<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(WasteClassifier<B>, ModelMetadata)> {
    let (metadata, model_binary) = load_model_with_metadata(path)
        .with_context(|| format!("モデルを読み込めません: {}", path.display()))?;
    let model = classifier_from_bytes(&metadata, model_binary, device)?;
    Ok((model, metadata))
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: WasteClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (model, metadata) = load_classifier::<B>(model_path.as_ref(), &device)?;
        log::info!(
            "推論モデルを読み込みました: {} ({} クラス, 前処理: {})",
            model_path.as_ref().display(),
            metadata.num_classes(),
            metadata.preprocessing
        );
        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// 単一画像を分類し、クラス名と確率を返す
    ///
    /// 学習時と同じ前処理を掛けてから推論する。
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<(String, f32)> {
        let size = self.metadata.image_size;
        let img = load_rgb(image_path.as_ref(), size)?;
        let img = self.metadata.preprocessing.apply(&img);

        let mut data = vec![0.0f32; 3 * size * size];
        normalize_into(&img, &mut data);

        let tensor = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([1, 3, size, size]);
        let proba: Vec<f32> = self
            .model
            .predict_proba(tensor)
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        let (class_idx, confidence) = proba
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let class_name = self
            .metadata
            .class_name(class_idx)
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", class_idx))?;

        Ok((class_name.to_string(), confidence))
    }

    /// 複数画像をまとめて分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<(String, f32)>> {
        image_paths.iter().map(|path| self.classify_image(path)).collect()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::preprocess::Preprocessing;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(
            vec!["glass".to_string(), "metal".to_string(), "paper".to_string()],
            Preprocessing::Sharpen,
            16,
            1,
            None,
        )
    }

    #[test]
    fn saved_weights_are_restored() {
        let dir = tempfile::TempDir::new().unwrap();
        let device = Default::default();
        let model = ModelConfig::new(3)
            .with_dropout(0.0)
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let expected: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();

        let path = save_classifier(model, &metadata(), &dir.path().join("garbage_sharpened")).unwrap();
        let (restored, restored_metadata) = load_classifier::<TestBackend>(&path, &device).unwrap();
        let actual: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();

        assert_eq!(restored_metadata, metadata());
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn engine_classifies_single_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let device = Default::default();
        let model = ModelConfig::new(3)
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();
        let path = save_classifier(model, &metadata(), &dir.path().join("model.tar.gz")).unwrap();

        let image_path = dir.path().join("sample.png");
        RgbImage::from_pixel(30, 30, Rgb([90, 140, 200])).save(&image_path).unwrap();

        let engine = InferenceEngine::<TestBackend>::load(&path, device).unwrap();
        let (class_name, confidence) = engine.classify_image(&image_path).unwrap();
        assert!(engine.metadata().class_names.contains(&class_name));
        assert!((0.0..=1.0).contains(&confidence));
        assert_eq!(engine.classify_batch(&[&image_path, &image_path]).unwrap().len(), 2);
    }
}
