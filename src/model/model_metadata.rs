//! モデルメタデータの定義と永続化
//!
//! tar.gz形式でモデルと関連するメタデータを保存・読み込みします。

#[cfg(feature = "ml")]
use anyhow::{Context, Result};
#[cfg(feature = "ml")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "ml")]
use crate::ml::Preprocessing;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[cfg(feature = "ml")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラス名（クラスID順）
    pub class_names: Vec<String>,

    /// 学習時に掛けた前処理
    pub preprocessing: Preprocessing,

    /// モデル入力サイズ（正方形）
    pub image_size: usize,

    /// 学習エポック数
    pub num_epochs: usize,

    /// 最終エポックの検証正解率（検証ステップが無い場合はNone）
    #[serde(default)]
    pub final_accuracy: Option<f64>,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

#[cfg(feature = "ml")]
impl ModelMetadata {
    /// 新しいメタデータを作成（学習時刻は現在時刻）
    pub fn new(
        class_names: Vec<String>,
        preprocessing: Preprocessing,
        image_size: usize,
        num_epochs: usize,
        final_accuracy: Option<f64>,
    ) -> Self {
        Self {
            class_names,
            preprocessing,
            image_size,
            num_epochs,
            final_accuracy: final_accuracy.filter(|a| a.is_finite()),
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスIDからクラス名
    pub fn class_name(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("メタデータをJSONに変換できません")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("メタデータのJSONを解析できません")
    }
}

#[cfg(all(test, feature = "ml"))]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let metadata = ModelMetadata::new(
            vec!["glass".to_string(), "paper".to_string()],
            Preprocessing::Sharpen,
            128,
            40,
            Some(0.75),
        );
        let json = metadata.to_json_string().unwrap();
        assert!(json.contains("Sharpen"));
        let restored = ModelMetadata::from_json_string(&json).unwrap();
        assert_eq!(restored, metadata);
        assert_eq!(restored.class_name(1), Some("paper"));
        assert_eq!(restored.class_name(2), None);
    }

    #[test]
    fn nan_accuracy_is_stored_as_none() {
        let metadata =
            ModelMetadata::new(vec!["a".to_string()], Preprocessing::AdaptiveThreshold, 8, 1, Some(f64::NAN));
        assert_eq!(metadata.final_accuracy, None);
        assert!(metadata.to_json_string().unwrap().contains("null"));
    }
}
