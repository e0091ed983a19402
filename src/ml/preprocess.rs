//! 画像前処理（適応的二値化・シャープ化）
//!
//! どちらも8bit RGB画像を受け取り、同じサイズの画像を返します。
//! バッチ（CHW, [0,1]）に掛ける場合は一度 [0,255] に戻してから処理します。

use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// 適応的二値化の近傍サイズ
pub const THRESHOLD_BLOCK_SIZE: u32 = 11;
/// 近傍平均から差し引く定数
pub const THRESHOLD_OFFSET: i32 = 2;

/// シャープ化カーネル
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

/// 前処理の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preprocessing {
    /// 11x11近傍の平均による適応的二値化
    AdaptiveThreshold,
    /// 3x3カーネルによるシャープ化
    Sharpen,
}

impl Preprocessing {
    /// 実験で比較する全バリアント（実行順）
    pub const ALL: [Preprocessing; 2] = [Preprocessing::AdaptiveThreshold, Preprocessing::Sharpen];

    /// ファイル名やグラフの凡例に使う短い名前
    pub fn name(&self) -> &'static str {
        match self {
            Preprocessing::AdaptiveThreshold => "binary",
            Preprocessing::Sharpen => "sharpened",
        }
    }

    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        match self {
            Preprocessing::AdaptiveThreshold => adaptive_threshold(img),
            Preprocessing::Sharpen => sharpen(img),
        }
    }
}

impl std::fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 輝度に変換し、近傍平均 - 2 より明るい画素を255、それ以外を0にする
///
/// 境界は端の画素を複製して扱う。結果は3チャンネルに複製する。
pub fn adaptive_threshold(img: &RgbImage) -> RgbImage {
    let gray = image::DynamicImage::ImageRgb8(img.clone()).to_luma8();
    let (width, height) = gray.dimensions();
    let means = box_mean_replicated(&gray, THRESHOLD_BLOCK_SIZE / 2);

    RgbImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as i32;
        let mean = means[(y * width + x) as usize];
        let out = if v > mean - THRESHOLD_OFFSET { 255 } else { 0 };
        Rgb([out, out, out])
    })
}

/// 半径 `radius` の正方近傍の平均（四捨五入した整数）
fn box_mean_replicated(gray: &GrayImage, radius: u32) -> Vec<i32> {
    let (width, height) = gray.dimensions();
    let r = radius as i64;
    let area = ((2 * r + 1) * (2 * r + 1)) as u32;
    let mut means = Vec::with_capacity((width * height) as usize);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut sum = 0u32;
            for dy in -r..=r {
                let sy = (y + dy).clamp(0, height as i64 - 1) as u32;
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, width as i64 - 1) as u32;
                    sum += gray.get_pixel(sx, sy)[0] as u32;
                }
            }
            means.push(((sum + area / 2) / area) as i32);
        }
    }

    means
}

/// チャンネルごとに3x3シャープ化カーネルを畳み込み、[0,255]に切り詰める
///
/// 境界は端の画素を軸にした鏡像（reflect-101）。
pub fn sharpen(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0i32; 3];
        for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
            let sy = reflect101(y as i64 + ky as i64 - 1, height);
            for (kx, &k) in row.iter().enumerate() {
                if k == 0 {
                    continue;
                }
                let sx = reflect101(x as i64 + kx as i64 - 1, width);
                let p = img.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += k * p[c] as i32;
                }
            }
        }
        Rgb(acc.map(|v| v.clamp(0, 255) as u8))
    })
}

fn reflect101(i: i64, n: u32) -> u32 {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let i = if i < 0 { -i } else { i };
    let i = if i >= n { 2 * n - 2 - i } else { i };
    i as u32
}

/// [0,1] のCHW画素列から8bit画像を復元する（四捨五入）
pub fn denormalize(chw: &[f32], size: usize) -> RgbImage {
    let plane = size * size;
    RgbImage::from_fn(size as u32, size as u32, |x, y| {
        let idx = y as usize * size + x as usize;
        Rgb([0, 1, 2].map(|c| (chw[c * plane + idx] * 255.0).round().clamp(0.0, 255.0) as u8))
    })
}

/// 8bit画像を [0,1] のCHW画素列へ書き戻す
pub fn normalize_into(img: &RgbImage, chw: &mut [f32]) {
    let size = img.width() as usize;
    let plane = size * img.height() as usize;
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * size + x as usize;
        for c in 0..3 {
            chw[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }
}

/// バッチ全体に前処理を掛ける
///
/// `pixels` は `[batch, 3, size, size]` を平坦化したもの。長さが合わなければエラー。
pub fn preprocess_batch(
    pixels: &mut [f32],
    batch: usize,
    size: usize,
    preprocessing: Preprocessing,
) -> Result<()> {
    let per_image = 3 * size * size;
    if pixels.len() != batch * per_image {
        anyhow::bail!(
            "バッチの形状が一致しません: 要素数 {} (期待: {} x 3 x {} x {})",
            pixels.len(),
            batch,
            size,
            size
        );
    }

    for chw in pixels.chunks_exact_mut(per_image) {
        let img = denormalize(chw, size);
        normalize_into(&preprocessing.apply(&img), chw);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            Rgb([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8])
        })
    }

    #[test]
    fn sharpen_keeps_flat_image() {
        let img = RgbImage::from_pixel(7, 5, Rgb([120, 33, 250]));
        assert_eq!(sharpen(&img), img);
    }

    #[test]
    fn sharpen_boosts_isolated_peak() {
        let mut img = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        img.put_pixel(2, 2, Rgb([140, 140, 140]));
        let out = sharpen(&img);
        // 5*140 - 4*100
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        // 5*100 - 3*100 - 140
        assert_eq!(out.get_pixel(2, 1)[0], 60);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn threshold_output_is_binary_and_gray() {
        let out = adaptive_threshold(&gradient(12));
        assert_eq!(out.dimensions(), (12, 12));
        for pixel in out.pixels() {
            assert!(pixel[0] == 0 || pixel[0] == 255);
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn threshold_of_flat_image_is_white() {
        // v > v - 2 は常に真
        let img = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        assert!(adaptive_threshold(&img).pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn dark_spot_is_thresholded_to_black() {
        let mut img = RgbImage::from_pixel(15, 15, Rgb([200, 200, 200]));
        img.put_pixel(7, 7, Rgb([0, 0, 0]));
        let out = adaptive_threshold(&img);
        assert_eq!(out.get_pixel(7, 7)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn normalization_round_trip_is_lossless() {
        let img = gradient(6);
        let mut chw = vec![0.0f32; 3 * 36];
        normalize_into(&img, &mut chw);
        assert_eq!(denormalize(&chw, 6), img);
    }

    #[test]
    fn batch_is_processed_per_image() {
        let size = 6;
        let mut pixels = vec![0.0f32; 2 * 3 * size * size];
        normalize_into(&gradient(size as u32), &mut pixels[..3 * size * size]);
        normalize_into(
            &RgbImage::from_pixel(size as u32, size as u32, Rgb([9, 9, 9])),
            &mut pixels[3 * size * size..],
        );

        preprocess_batch(&mut pixels, 2, size, Preprocessing::AdaptiveThreshold).unwrap();
        assert!(pixels.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(pixels[3 * size * size..].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn batch_shape_mismatch_is_an_error() {
        let mut pixels = vec![0.0f32; 10];
        assert!(preprocess_batch(&mut pixels, 1, 4, Preprocessing::Sharpen).is_err());
    }

    #[test]
    fn variant_names() {
        assert_eq!(Preprocessing::AdaptiveThreshold.name(), "binary");
        assert_eq!(Preprocessing::Sharpen.to_string(), "sharpened");
        assert_eq!(Preprocessing::ALL.len(), 2);
    }
}
