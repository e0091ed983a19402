//! ディレクトリ構造からの画像データセットとバッチ読み込み
//!
//! ルート直下のサブディレクトリ名をクラス名とし、その中の画像を1クラスとして扱います。

use anyhow::{Context, Result};
use burn::{
    data::dataset::Dataset,
    tensor::{backend::Backend, Int, Tensor},
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::ml::ml_model::load_rgb;
use crate::ml::preprocess::{normalize_into, preprocess_batch, Preprocessing};

/// 読み込み対象の拡張子
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageItem {
    pub path: PathBuf,
    pub label: usize,
}

/// 学習用または検証用の部分集合
#[derive(Clone, Debug, Default)]
pub struct ImageSubset {
    items: Vec<ImageItem>,
}

impl Dataset<ImageItem> for ImageSubset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// クラスごとのディレクトリから読み込んだデータセット
#[derive(Clone, Debug)]
pub struct ImageFolder {
    class_names: Vec<String>,
    train: ImageSubset,
    validation: ImageSubset,
}

impl ImageFolder {
    /// ディレクトリから読み込み、クラスごとに学習用と検証用へ分ける
    ///
    /// クラス名・ファイル名ともにソート順。各クラスの先頭
    /// `floor(n * validation_fraction)` 枚が検証用、残りが学習用。
    pub fn from_directory(data_dir: &Path, validation_fraction: f32) -> Result<Self> {
        if !data_dir.is_dir() {
            anyhow::bail!("データセットのディレクトリが存在しません: {}", data_dir.display());
        }

        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(data_dir)
            .with_context(|| format!("ディレクトリを読めません: {}", data_dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                class_dirs.push(path);
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            anyhow::bail!("クラスディレクトリがありません: {}", data_dir.display());
        }

        let mut class_names = Vec::with_capacity(class_dirs.len());
        let mut train = Vec::new();
        let mut validation = Vec::new();

        for (class_id, class_dir) in class_dirs.iter().enumerate() {
            let class_name = class_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("不正なディレクトリ名: {}", class_dir.display()))?;

            let files = list_images(class_dir)?;
            let n_val = (files.len() as f32 * validation_fraction).floor() as usize;
            log::info!(
                "  クラス {}: {} ({} 枚, 検証 {} 枚)",
                class_id,
                class_name,
                files.len(),
                n_val
            );

            for (i, path) in files.into_iter().enumerate() {
                let item = ImageItem {
                    path,
                    label: class_id,
                };
                if i < n_val {
                    validation.push(item);
                } else {
                    train.push(item);
                }
            }
            class_names.push(class_name);
        }

        if train.is_empty() && validation.is_empty() {
            anyhow::bail!("画像が1枚も見つかりません: {}", data_dir.display());
        }

        log::info!(
            "{} クラス, 学習 {} 枚, 検証 {} 枚",
            class_names.len(),
            train.len(),
            validation.len()
        );

        Ok(Self {
            class_names,
            train: ImageSubset { items: train },
            validation: ImageSubset { items: validation },
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn train(&self) -> &ImageSubset {
        &self.train
    }

    pub fn validation(&self) -> &ImageSubset {
        &self.validation
    }
}

/// ディレクトリ内の画像ファイル（ソート済み）
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("ディレクトリを読めません: {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path.is_file()
            && path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// CPU上のバッチ（CHW, [0,1]を平坦化した画素とラベル）
#[derive(Clone, Debug)]
pub struct RawBatch {
    pub pixels: Vec<f32>,
    pub labels: Vec<usize>,
    pub image_size: usize,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 1回の転送でバッチ全体をデバイスへ
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> ImageBatch<B> {
        let size = self.image_size;
        let targets: Vec<i64> = self.labels.iter().map(|&l| l as i64).collect();
        let images = Tensor::<B, 1>::from_floats(self.pixels.as_slice(), device)
            .reshape([self.len(), 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), device);
        ImageBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// バッチ単位で画像を読み込むローダー
///
/// シャッフル有効時はエポックごとに `seed + epoch` で並べ替える。
#[derive(Clone, Debug)]
pub struct DirectoryLoader<D> {
    dataset: D,
    batch_size: usize,
    image_size: usize,
    shuffle_seed: Option<u64>,
    augment: bool,
}

impl<D: Dataset<ImageItem>> DirectoryLoader<D> {
    pub fn new(dataset: D, batch_size: usize, image_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            image_size,
            shuffle_seed: None,
            augment: false,
        }
    }

    #[must_use]
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// ランダムな左右反転を掛ける
    #[must_use]
    pub fn with_augmentation(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 1エポックのステップ数（端数のバッチは含めない）
    pub fn steps_per_epoch(&self) -> usize {
        self.dataset.len() / self.batch_size
    }

    /// 1エポック分のバッチ
    ///
    /// `include_partial` が偽なら `steps_per_epoch()` 個の満杯バッチだけを返す。
    pub fn epoch(&self, epoch: usize, include_partial: bool) -> EpochBatches<'_, D> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        let seed = self.shuffle_seed.unwrap_or(0).wrapping_add(epoch as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        if self.shuffle_seed.is_some() {
            order.shuffle(&mut rng);
        }
        let n_batches = if include_partial {
            order.len().div_ceil(self.batch_size)
        } else {
            self.steps_per_epoch()
        };

        EpochBatches {
            loader: self,
            order,
            next_batch: 0,
            n_batches,
            rng: self.augment.then_some(rng),
        }
    }

    fn load_batch(&self, indices: &[usize], rng: Option<&mut StdRng>) -> Result<RawBatch> {
        let size = self.image_size;
        let per_image = 3 * size * size;
        let mut pixels = vec![0.0f32; indices.len() * per_image];
        let mut labels = Vec::with_capacity(indices.len());
        let mut rng = rng;

        for (&index, chw) in indices.iter().zip(pixels.chunks_exact_mut(per_image)) {
            let item = self
                .dataset
                .get(index)
                .with_context(|| format!("インデックス {} のデータがありません", index))?;
            let mut img = load_rgb(&item.path, size)?;
            if let Some(rng) = rng.as_deref_mut() {
                if rng.gen::<f32>() < 0.5 {
                    image::imageops::flip_horizontal_in_place(&mut img);
                }
            }
            normalize_into(&img, chw);
            labels.push(item.label);
        }

        Ok(RawBatch {
            pixels,
            labels,
            image_size: size,
        })
    }
}

/// 1エポック分のバッチを順に読み込むイテレータ
pub struct EpochBatches<'a, D> {
    loader: &'a DirectoryLoader<D>,
    order: Vec<usize>,
    next_batch: usize,
    n_batches: usize,
    rng: Option<StdRng>,
}

impl<D: Dataset<ImageItem>> Iterator for EpochBatches<'_, D> {
    type Item = Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_batch >= self.n_batches {
            return None;
        }
        let start = self.next_batch * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.order.len());
        self.next_batch += 1;
        Some(self.loader.load_batch(&self.order[start..end], self.rng.as_mut()))
    }
}

/// 読み込んだバッチに前処理を掛けて渡すラッパー
pub struct PreprocessedBatches<I> {
    inner: I,
    preprocessing: Preprocessing,
}

impl<I> PreprocessedBatches<I> {
    pub fn new(inner: I, preprocessing: Preprocessing) -> Self {
        Self {
            inner,
            preprocessing,
        }
    }
}

impl<I: Iterator<Item = Result<RawBatch>>> Iterator for PreprocessedBatches<I> {
    type Item = Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.inner.next()?;
        Some(batch.and_then(|mut batch| {
            preprocess_batch(&mut batch.pixels, batch.labels.len(), batch.image_size, self.preprocessing)?;
            Ok(batch)
        }))
    }
}
