//! 文字列ラベルを連番のクラスIDに変換するエンコーダ

use std::collections::BTreeSet;


use super::ForestError;

/// ラベルエンコーダ
///
/// 学習時に見た値をソート順に `0..k` へ割り当てる。一度 `fit` したものを
/// 変換と逆変換の両方で使い回すこと。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// ラベル列から重複を除いたクラス一覧を作る
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self, ForestError> {
        if labels.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let classes: BTreeSet<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        Ok(Self {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 1件をIDへ変換
    pub fn encode(&self, label: &str) -> Result<usize, ForestError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| ForestError::UnknownLabel {
                label: label.to_string(),
            })
    }

    /// ラベル列をまとめてIDへ変換
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, ForestError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// IDからラベルへ戻す
    pub fn inverse_transform(&self, id: usize) -> Result<&str, ForestError> {
        self.classes
            .get(id)
            .map(String::as_str)
            .ok_or(ForestError::UnknownClassId {
                id,
                n_classes: self.classes.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_contiguous_sorted_ids() {
        let labels = ["tv", "phone", "laptop", "phone", "tv"];
        let encoder = LabelEncoder::fit(&labels).unwrap();
        assert_eq!(encoder.classes(), &["laptop", "phone", "tv"]);

        let ids = encoder.transform(&labels).unwrap();
        assert_eq!(ids, vec![2, 1, 0, 1, 2]);
        assert!(ids.iter().all(|&id| id < 3));
    }

    #[test]
    fn inverse_transform_round_trips() {
        let encoder = LabelEncoder::fit(&["b", "a"]).unwrap();
        for label in ["a", "b"] {
            let id = encoder.encode(label).unwrap();
            assert_eq!(encoder.inverse_transform(id).unwrap(), label);
        }
    }

    #[test]
    fn unseen_label_is_an_error() {
        let encoder = LabelEncoder::fit(&["a", "b"]).unwrap();
        assert!(matches!(
            encoder.encode("c"),
            Err(ForestError::UnknownLabel { .. })
        ));
        assert!(matches!(
            encoder.inverse_transform(2),
            Err(ForestError::UnknownClassId { id: 2, n_classes: 2 })
        ));
    }

    #[test]
    fn empty_labels_cannot_be_fitted() {
        let labels: [&str; 0] = [];
        assert!(matches!(
            LabelEncoder::fit(&labels),
            Err(ForestError::EmptyDataset)
        ));
    }
}
