/// 表形式パイプライン（エンコーダ・分割・ランダムフォレスト）のエラー
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// 学習データが0行
    #[error("データセットが0行です")]
    EmptyDataset,

    /// 特徴列が1つもない
    #[error("特徴列が1つもありません")]
    ZeroFeatures,

    /// 指定した列がCSVに存在しない
    #[error("列 '{column}' が見つかりません")]
    MissingColumn {
        /// 見つからなかった列名
        column: String,
    },

    /// 特徴列に数値として解釈できない値がある
    #[error("{row} 行目の列 '{column}': '{value}' は有限の数値ではありません")]
    NonNumericFeature {
        /// 0始まりのデータ行番号
        row: usize,
        /// 列名
        column: String,
        /// 元の文字列
        value: String,
    },

    /// エンコーダが学習時に見ていないラベル
    #[error("ラベル '{label}' はエンコーダの学習時に存在しませんでした")]
    UnknownLabel {
        /// 未知のラベル
        label: String,
    },

    /// エンコーダの範囲外のクラスID
    #[error("クラスID {id} は {n_classes} クラスの範囲外です")]
    UnknownClassId {
        /// 範囲外のID
        id: usize,
        /// エンコーダのクラス数
        n_classes: usize,
    },

    /// 行ごとの特徴数が揃っていない
    #[error("サンプル {sample_index} の特徴数が {got} です（期待値 {expected}）")]
    FeatureCountMismatch {
        expected: usize,
        got: usize,
        sample_index: usize,
    },

    /// 予測時の特徴数が学習時と違う
    #[error("予測入力の特徴数が {got} です（期待値 {expected}）")]
    PredictionFeatureMismatch { expected: usize, got: usize },

    /// 特徴行数とラベル数が違う
    #[error("特徴行が {features} 行に対しラベルが {labels} 件です")]
    LengthMismatch { features: usize, labels: usize },

    /// 木の本数が0
    #[error("木の本数は1以上が必要です（指定値 {n_trees}）")]
    InvalidTreeCount { n_trees: usize },

    /// テスト割合が (0, 1) の外、または分割後にどちらかが空になる
    #[error("テスト割合 {fraction} では {n_samples} サンプルの分割のどちらかが空になります")]
    InvalidTestFraction { fraction: f64, n_samples: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = ForestError::MissingColumn {
            column: "Category".to_string(),
        };
        assert_eq!(err.to_string(), "列 'Category' が見つかりません");

        let err = ForestError::NonNumericFeature {
            row: 3,
            column: "Weight".to_string(),
            value: "heavy".to_string(),
        };
        assert!(err.to_string().contains("'heavy'"));
    }
}
