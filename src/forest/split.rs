//! シード固定の学習/テスト分割

use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::ForestError;

/// 行インデックスによる分割結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// 行インデックスをシャッフルして学習用とテスト用に分ける
///
/// テスト件数は `ceil(n * test_fraction)`、残りが学習用。
/// 同じ `n_samples` と `seed` なら必ず同じ分割になる。
pub fn train_test_split(
    n_samples: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, ForestError> {
    if n_samples == 0 {
        return Err(ForestError::EmptyDataset);
    }

    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if !(test_fraction > 0.0 && test_fraction < 1.0) || n_test == 0 || n_test >= n_samples {
        return Err(ForestError::InvalidTestFraction {
            fraction: test_fraction,
            n_samples,
        });
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

/// インデックスで行を選び出す
pub fn select_rows<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}
