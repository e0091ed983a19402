//! 機械学習モデルの共通定義
//!
//! ゴミ画像分類用のCNNモデルと関連する設定を提供します。

use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::{imageops::FilterType, RgbImage};
use std::path::Path;

/// 画像サイズの既定値
pub const IMAGE_SIZE: usize = 128;

/// 全結合層の隠れユニット数
const HIDDEN_UNITS: usize = 128;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 128)]
    pub image_size: usize,
}

impl ModelConfig {
    /// Flatten後の特徴次元
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2, stride 2): size -> size / 2 (切り捨て)
    pub fn feature_dim(&self) -> Option<usize> {
        let after_conv1 = self.image_size.checked_sub(2)?;
        let after_pool1 = after_conv1 / 2;
        let after_conv2 = after_pool1.checked_sub(2)?;
        let after_pool2 = after_conv2 / 2;
        if after_pool2 == 0 {
            return None;
        }
        Some(64 * after_pool2 * after_pool2)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<WasteClassifier<B>> {
        let d = self
            .feature_dim()
            .with_context(|| format!("入力サイズが小さすぎます: {} (最小10x10が必要)", self.image_size))?;

        log::debug!(
            "[Model] 入力 {}x{}, Flatten後 {}, FC1 {} -> {}, FC2 {} -> {}",
            self.image_size,
            self.image_size,
            d,
            d,
            HIDDEN_UNITS,
            HIDDEN_UNITS,
            self.num_classes
        );

        Ok(WasteClassifier {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// ゴミ画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x 2層 (32, 64チャネル)
/// - Flatten
/// - FC: d -> 128 + ReLU
/// - Dropout
/// - FC: 128 -> num_classes
/// - Softmax (確率が必要な場合のみ)
#[derive(Module, Debug)]
pub struct WasteClassifier<B: Backend> {
    conv1: Conv2d<B>,  // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>,  // 32 -> 64
    pool2: MaxPool2d,

    fc1: Linear<B>,    // d -> 128
    dropout: Dropout,
    fc2: Linear<B>,    // 128 -> num_classes

    activation: Relu,
}

impl<B: Backend> WasteClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// ロジットに対する交差エントロピー。
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// 画像を読み込み、RGBの `size`x`size` にリサイズする
pub fn load_rgb(path: &Path, size: usize) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("画像を読み込めません: {}", path.display()))?
        .to_rgb8();

    if img.dimensions() == (size as u32, size as u32) {
        return Ok(img);
    }
    Ok(image::imageops::resize(&img, size as u32, size as u32, FilterType::Triangle))
}

/// 画像を読み込んで [0,1] に正規化
///
/// # 戻り値
/// - RGB画像データ (C, H, W) の順で平坦化
pub fn load_image(path: &Path, size: usize) -> Result<Vec<f32>> {
    let img = load_rgb(path, size)?;
    let mut data = vec![0.0f32; 3 * size * size];
    crate::ml::preprocess::normalize_into(&img, &mut data);
    Ok(data)
}
