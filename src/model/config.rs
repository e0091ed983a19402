//! 実験設定管理モジュール
//!
//! 計算デバイス、データパス、学習パラメータなどをJSON形式で保存・読み込みします。
//! 設定ファイルが無い場合は実験スクリプトと同じ固定値を使用します。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Wgpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 表形式データ（ランダムフォレスト）の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularSettings {
    /// 入力CSVのパス
    pub csv_path: PathBuf,
    /// ラベル列の名前
    pub label_column: String,
    /// テストデータの割合
    pub test_fraction: f64,
    /// 分割と森の乱数シード
    pub seed: u64,
    /// 木の本数
    pub n_trees: usize,
    /// 相関ヒートマップの出力先
    pub heatmap_path: PathBuf,
}

impl Default for TabularSettings {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/ewaste.csv"),
            label_column: "Category".to_string(),
            test_fraction: 0.2,
            seed: 42,
            n_trees: 100,
            heatmap_path: PathBuf::from("plots/correlation_heatmap.svg"),
        }
    }
}

/// 画像データセットの設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// データセットのルート（直下のサブディレクトリ名がクラス名）
    pub data_dir: PathBuf,
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// 検証データの割合
    pub validation_fraction: f32,
    /// 学習データに左右反転の拡張を掛けるか
    pub augment: bool,
    /// モデルの保存先ディレクトリ
    pub model_dir: PathBuf,
    /// 学習曲線の出力先
    pub curves_path: PathBuf,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/garbage_classification"),
            image_size: 128,
            validation_fraction: 0.2,
            augment: false,
            model_dir: PathBuf::from("models"),
            curves_path: PathBuf::from("plots/training_curves.svg"),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// ドロップアウト率
    pub dropout: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 40,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
            dropout: 0.5,
        }
    }
}

/// 実験設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExperimentConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// 表形式パイプラインの設定
    #[serde(default)]
    pub tabular: TabularSettings,
    /// 画像パイプラインの設定
    #[serde(default)]
    pub image: ImageSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
}

impl ExperimentConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("設定ファイルを読めません: {}", path.display()))?;
        let config: ExperimentConfig = serde_json::from_str(&content)
            .with_context(|| format!("設定ファイルの形式が不正です: {}", path.display()))?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_or_default_from(Self::default_path())
    }

    /// 指定パスから設定を読み込む
    ///
    /// ファイルが無ければデフォルト設定。あるのに読めない場合はエラー。
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        log::info!("設定ファイルを読み込みました: {}", path.display());
        Ok(config)
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== 実験設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("\n--- 表形式データ ---");
        println!("CSV: {}", self.tabular.csv_path.display());
        println!("ラベル列: {}", self.tabular.label_column);
        println!("テスト割合: {}", self.tabular.test_fraction);
        println!("木の本数: {}", self.tabular.n_trees);
        println!("\n--- 画像データ ---");
        println!("データセット: {}", self.image.data_dir.display());
        println!("画像サイズ: {}x{}", self.image.image_size, self.image.image_size);
        println!("検証割合: {}", self.image.validation_fraction);
        println!("\n--- トレーニング設定 ---");
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!("シード: {}", self.training.seed);
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.training.num_epochs, 40);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.image.image_size, 128);
        assert_eq!(config.tabular.seed, 42);
        assert_eq!(config.tabular.label_column, "Category");
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ExperimentConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ExperimentConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.device_type, deserialized.device_type);
        assert_eq!(config.training.num_epochs, deserialized.training.num_epochs);
        assert_eq!(config.image.data_dir, deserialized.image.data_dir);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"device_type": "Cpu"}"#).unwrap();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ExperimentConfig::default();
        config.training.num_epochs = 3;
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load_or_default_from(&path).unwrap();
        assert_eq!(loaded.training.num_epochs, 3);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"training": {"num_epochs": 5}, "image": {"augment": true}}"#)
                .unwrap();
        assert_eq!(config.training.num_epochs, 5);
        assert_eq!(config.training.learning_rate, 1e-3);
        assert!(config.image.augment);
        assert_eq!(config.image.image_size, 128);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExperimentConfig::load_or_default_from(dir.path().join("none.json")).unwrap();
        assert_eq!(config.training.num_epochs, 40);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"training": {"num_epochs": "many"}"#).unwrap();

        let err = ExperimentConfig::load_or_default_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
