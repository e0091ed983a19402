//! CART決定木（ジニ不純度）

use rand::Rng;

/// 木のノード。子は `nodes` 配列内のインデックスで参照する。
#[derive(Debug, Clone)]
pub enum Node {
    Leaf {
        /// クラスごとの割合（合計1）
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// 決定木の成長条件
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// 分割ごとに候補とする特徴数
    pub max_features: usize,
}

/// 学習済みの決定木
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_classes: usize,
    /// 特徴ごとの不純度減少量（正規化前）
    importances: Vec<f64>,
}

/// ジニ不純度: 1 - Σ p_i²
pub fn gini(class_counts: &[usize], n_samples: usize) -> f64 {
    if n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    1.0 - class_counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl DecisionTree {
    /// 行優先の特徴行列 `features[sample][feature]` から木を成長させる
    ///
    /// `sample_indices` は使用する行（ブートストラップなら重複あり）。
    /// 入力の検証は呼び出し側（森）で済んでいる前提。
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        sample_indices: &[usize],
        n_classes: usize,
        params: TreeParams,
        rng: &mut impl Rng,
    ) -> Self {
        let n_features = features.first().map(|r| r.len()).unwrap_or(0);
        let mut tree = Self {
            nodes: Vec::new(),
            n_classes,
            importances: vec![0.0; n_features],
        };
        let total = sample_indices.len().max(1) as f64;
        tree.grow(features, labels, sample_indices.to_vec(), 0, total, params, rng);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        features: &[Vec<f64>],
        labels: &[usize],
        samples: Vec<usize>,
        depth: usize,
        total: f64,
        params: TreeParams,
        rng: &mut impl Rng,
    ) -> usize {
        let mut counts = vec![0usize; self.n_classes];
        for &s in &samples {
            counts[labels[s]] += 1;
        }
        let n = samples.len();
        let impurity = gini(&counts, n);

        let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
        let stop = impurity <= 0.0 || n < params.min_samples_split || depth_reached;

        let best = if stop {
            None
        } else {
            self.best_split(features, labels, &samples, &counts, impurity, params, rng)
        };

        let split = best.and_then(|best| {
            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .copied()
                .partition(|&s| features[s][best.feature] <= best.threshold);
            // 片側が空の分割は同じ集合で再帰し続けるので葉にする
            (!left.is_empty() && !right.is_empty()).then_some((best, left, right))
        });

        let Some((best, left, right)) = split else {
            let proba = counts
                .iter()
                .map(|&c| if n == 0 { 0.0 } else { c as f64 / n as f64 })
                .collect();
            self.nodes.push(Node::Leaf { proba });
            return self.nodes.len() - 1;
        };

        self.importances[best.feature] += (n as f64 / total) * best.decrease;

        // 子より先に自分の位置を確保する
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: Vec::new() });
        let left_index = self.grow(features, labels, left, depth + 1, total, params, rng);
        let right_index = self.grow(features, labels, right, depth + 1, total, params, rng);
        self.nodes[index] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_index,
            right: right_index,
        };
        index
    }

    /// ランダムに選んだ特徴の中から不純度減少が最大の分割を探す
    #[allow(clippy::too_many_arguments)]
    fn best_split(
        &self,
        features: &[Vec<f64>],
        labels: &[usize],
        samples: &[usize],
        parent_counts: &[usize],
        parent_impurity: f64,
        params: TreeParams,
        rng: &mut impl Rng,
    ) -> Option<BestSplit> {
        let n_features = self.importances.len();
        let n = samples.len();

        // 特徴を1つずつ無作為に引き、ノード内で定数でない特徴を
        // max_features 個評価するまで続ける
        let mut order: Vec<usize> = (0..n_features).collect();
        let take = params.max_features.clamp(1, n_features.max(1));
        let mut visited = 0;

        let mut best: Option<BestSplit> = None;

        for drawn in 0..n_features {
            if visited >= take && best.is_some() {
                break;
            }
            let j = rng.gen_range(drawn..n_features);
            order.swap(drawn, j);
            let feature = order[drawn];

            let mut sorted: Vec<(f64, usize)> = samples
                .iter()
                .map(|&s| (features[s][feature], labels[s]))
                .collect();
            sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

            let constant = match (sorted.first(), sorted.last()) {
                (Some(lo), Some(hi)) => lo.0 >= hi.0,
                _ => true,
            };
            if constant {
                continue;
            }
            visited += 1;

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = parent_counts.to_vec();

            for i in 0..n.saturating_sub(1) {
                let (value, class) = sorted[i];
                left_counts[class] += 1;
                right_counts[class] -= 1;

                let next = sorted[i + 1].0;
                if value == next {
                    continue;
                }

                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / n as f64;
                let decrease = parent_impurity - weighted;

                if best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    // 隣接する浮動小数点数では中点が next に丸められる
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next || !threshold.is_finite() {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        decrease,
                    });
                }
            }
        }

        best
    }

    /// 1行分のクラス確率
    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// 1行分の予測クラス
    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(self.predict_proba(row))
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// 合計1に正規化した特徴重要度
    pub fn feature_importances(&self) -> Vec<f64> {
        let sum: f64 = self.importances.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; self.importances.len()];
        }
        self.importances.iter().map(|v| v / sum).collect()
    }
}

/// 最大値のインデックス（同値なら小さい方）
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
