//! 表形式データの分類（ランダムフォレスト）

mod correlation;
mod encoder;
mod error;
mod forest;
mod metrics;
mod pipeline;
mod split;
mod tree;

pub use correlation::{correlation_matrix, to_columns, CorrelationMatrix};
pub use encoder::LabelEncoder;
pub use error::ForestError;
pub use forest::{RandomForest, RandomForestConfig};
pub use metrics::{accuracy_score, ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use pipeline::{run_tabular, ForestRun};
pub use split::{select_rows, train_test_split, TrainTestSplit};
pub use tree::{argmax, gini, DecisionTree, Node, TreeParams};
