//! ブートストラップ標本で学習するランダムフォレスト

use rand::{Rng, SeedableRng};

use super::tree::{argmax, DecisionTree, TreeParams};
use super::ForestError;

/// ランダムフォレストの設定
///
/// デフォルト値は一般的なライブラリの既定値に合わせている。
///
/// | パラメータ           | 既定値         |
/// |----------------------|----------------|
/// | `n_trees`            | 100            |
/// | `max_features`       | sqrt(特徴数)   |
/// | `max_depth`          | 制限なし       |
/// | `min_samples_split`  | 2              |
/// | `min_samples_leaf`   | 1              |
/// | `seed`               | 42             |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    n_trees: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: Option<usize>,
    seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

impl RandomForestConfig {
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf.max(1);
        self
    }

    /// 分割ごとの候補特徴数。`None` なら sqrt(特徴数)。
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 行優先の特徴行列とクラスIDで森を学習する
    pub fn fit(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<RandomForest, ForestError> {
        if self.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees: 0 });
        }
        if features.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        if features.len() != labels.len() {
            return Err(ForestError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(ForestError::ZeroFeatures);
        }
        for (sample_index, row) in features.iter().enumerate() {
            if row.len() != n_features {
                return Err(ForestError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                    sample_index,
                });
            }
        }

        let n_samples = features.len();
        let n_classes = labels.iter().max().copied().unwrap_or(0) + 1;
        let max_features = self
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features);

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features,
        };

        log::info!(
            "ランダムフォレスト学習: {}本, {}サンプル, {}特徴, {}クラス, max_features={}",
            self.n_trees,
            n_samples,
            n_features,
            n_classes,
            max_features
        );

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let trees: Vec<DecisionTree> = (0..self.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                DecisionTree::fit(features, labels, &bootstrap, n_classes, params, &mut rng)
            })
            .collect();

        log::debug!(
            "平均ノード数: {:.1}",
            trees.iter().map(|t| t.n_nodes()).sum::<usize>() as f64 / trees.len() as f64
        );

        Ok(RandomForest {
            trees,
            n_features,
            n_classes,
        })
    }
}

/// 学習済みのランダムフォレスト
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// 木ごとのクラス確率を平均する
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    /// 複数行を分類
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, ForestError> {
        rows.iter()
            .map(|row| self.predict_proba(row).map(|p| argmax(&p)))
            .collect()
    }

    /// 不純度減少に基づく特徴重要度（合計1）
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2つの特徴のうち1つ目だけがクラスを決める合成データ
    fn blobs(n_per_class: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for i in 0..n_per_class {
                let center = class as f64 * 10.0;
                features.push(vec![center + (i % 5) as f64 * 0.3, (i * 7 % 11) as f64]);
                labels.push(class);
            }
        }
        (features, labels)
    }

    #[test]
    fn fits_well_separated_classes() {
        let (features, labels) = blobs(20);
        let forest = RandomForestConfig::default()
            .with_n_trees(25)
            .with_max_features(Some(2))
            .fit(&features, &labels)
            .unwrap();

        assert_eq!(forest.n_trees(), 25);
        assert_eq!(forest.n_classes(), 3);
        let predicted = forest.predict(&features).unwrap();
        assert_eq!(predicted, labels);

        let proba = forest.predict_proba(&[20.0, 3.0]).unwrap();
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(argmax(&proba), 2);
    }

    #[test]
    fn informative_feature_dominates_importance() {
        let (features, labels) = blobs(20);
        let forest = RandomForestConfig::default()
            .with_n_trees(30)
            .with_max_features(Some(2))
            .fit(&features, &labels)
            .unwrap();
        let importances = forest.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let (features, labels) = blobs(10);
        let rows = vec![vec![5.0, 1.0], vec![14.0, 9.0]];
        let a = RandomForestConfig::default().with_n_trees(10).fit(&features, &labels).unwrap();
        let b = RandomForestConfig::default().with_n_trees(10).fit(&features, &labels).unwrap();
        for row in &rows {
            assert_eq!(a.predict_proba(row).unwrap(), b.predict_proba(row).unwrap());
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        let config = RandomForestConfig::default();
        assert!(matches!(config.fit(&[], &[]), Err(ForestError::EmptyDataset)));
        assert!(matches!(
            config.fit(&[vec![1.0], vec![1.0, 2.0]], &[0, 1]),
            Err(ForestError::FeatureCountMismatch { sample_index: 1, .. })
        ));
        assert!(matches!(
            config.fit(&[vec![1.0]], &[0, 1]),
            Err(ForestError::LengthMismatch { .. })
        ));
        assert!(matches!(
            config.clone().with_n_trees(0).fit(&[vec![1.0]], &[0]),
            Err(ForestError::InvalidTreeCount { .. })
        ));
    }

    #[test]
    fn prediction_width_must_match() {
        let (features, labels) = blobs(5);
        let forest = RandomForestConfig::default().with_n_trees(3).fit(&features, &labels).unwrap();
        assert!(matches!(
            forest.predict(&[vec![1.0]]),
            Err(ForestError::PredictionFeatureMismatch { expected: 2, got: 1 })
        ));
    }
}
