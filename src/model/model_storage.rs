//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラス名、前処理、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）

#[cfg(feature = "ml")]
use anyhow::{Context, Result};
#[cfg(feature = "ml")]
use flate2::read::GzDecoder;
#[cfg(feature = "ml")]
use flate2::write::GzEncoder;
#[cfg(feature = "ml")]
use flate2::Compression;
#[cfg(feature = "ml")]
use std::fs::File;
#[cfg(feature = "ml")]
use std::io::Read;
#[cfg(feature = "ml")]
use std::path::{Path, PathBuf};
#[cfg(feature = "ml")]
use tar::{Archive, Builder};

#[cfg(feature = "ml")]
use crate::model::model_metadata::ModelMetadata;

#[cfg(feature = "ml")]
const METADATA_ENTRY: &str = "metadata.json";
#[cfg(feature = "ml")]
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパス。`.gz` で終わっていなければ `.tar.gz` を付ける。
#[cfg(feature = "ml")]
pub fn archive_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返す。
#[cfg(feature = "ml")]
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("親ディレクトリを作成できません: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("tar.gzファイルを作成できません: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // gzipの終端まで書き切る
    tar_builder
        .into_inner()
        .context("tar.gzアーカイブを完成できません")?
        .finish()
        .context("gzip圧縮を完了できません")?;

    log::info!("モデルを保存しました: {}", tar_gz_path.display());
    Ok(tar_gz_path)
}

#[cfg(feature = "ml")]
fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("{} をtarに追加できません", name))
}

/// アーカイブ内の指定エントリをすべてバイト列で読む
#[cfg(feature = "ml")]
fn read_entries(tar_gz_path: &Path) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("tar.gzファイルを開けません: {:?}", tar_gz_path))?;

    let mut archive = Archive::new(GzDecoder::new(tar_gz_file));
    let mut metadata = None;
    let mut model = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let slot = match name.as_str() {
            METADATA_ENTRY => &mut metadata,
            MODEL_ENTRY => &mut model,
            _ => continue,
        };
        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer)?;
        *slot = Some(buffer);
    }

    Ok((metadata, model))
}

#[cfg(feature = "ml")]
fn parse_metadata(bytes: Vec<u8>) -> Result<ModelMetadata> {
    let json = String::from_utf8(bytes).context("metadata.json がUTF-8ではありません")?;
    ModelMetadata::from_json_string(&json)
}

/// Tar.gzからモデルメタデータを読み込む
#[cfg(feature = "ml")]
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let (metadata, _) = read_entries(tar_gz_path)?;
    parse_metadata(metadata.context("tar.gz内に metadata.json がありません")?)
}

/// Tar.gzからモデルバイナリを読み込む
#[cfg(feature = "ml")]
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    let (_, model) = read_entries(tar_gz_path)?;
    model.context("tar.gz内に model.bin がありません")
}

/// メタデータとモデルバイナリを共に読み込む
#[cfg(feature = "ml")]
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_entries(tar_gz_path)? {
        (Some(metadata), Some(binary)) => Ok((parse_metadata(metadata)?, binary)),
        (None, _) => Err(anyhow::anyhow!("tar.gz内に metadata.json がありません")),
        (_, None) => Err(anyhow::anyhow!("tar.gz内に model.bin がありません")),
    }
}

/// メタデータをコンソールに表示
#[cfg(feature = "ml")]
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("クラス: {}", metadata.class_names.join(", "));
    println!("前処理: {}", metadata.preprocessing.name());
    println!("モデル入力サイズ: {}x{}", metadata.image_size, metadata.image_size);
    println!("学習エポック数: {}", metadata.num_epochs);
    match metadata.final_accuracy {
        Some(acc) => println!("最終検証正解率: {:.2}%", acc * 100.0),
        None => println!("最終検証正解率: -"),
    }
    println!("学習日時: {}", metadata.trained_at);
    println!("========================");
}
