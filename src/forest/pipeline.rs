//! 表形式パイプライン: CSV → ラベル変換 → 分割 → 学習 → 評価 → 相関ヒートマップ

use anyhow::{Context, Result};

use super::{
    accuracy_score, correlation_matrix, select_rows, to_columns, train_test_split,
    ClassificationReport, ConfusionMatrix, CorrelationMatrix, ForestError, LabelEncoder,
    RandomForestConfig,
};
use crate::charts;
use crate::csv_loader::load_table;
use crate::model::config::TabularSettings;

/// 表形式パイプラインの結果
#[derive(Debug, Clone)]
pub struct ForestRun {
    pub accuracy: f64,
    pub report: ClassificationReport,
    /// 特徴名と重要度（降順）
    pub importances: Vec<(String, f64)>,
    pub correlation: CorrelationMatrix,
}

/// 設定に従って森を学習し、結果を表示してヒートマップを書き出す
pub fn run_tabular(settings: &TabularSettings) -> Result<ForestRun> {
    let table = load_table(&settings.csv_path)?;
    if table.is_empty() {
        return Err(ForestError::EmptyDataset)
            .with_context(|| format!("{} にデータ行がありません", settings.csv_path.display()));
    }

    let raw_labels = table
        .column(&settings.label_column)
        .context("ラベル列を取得できません")?;
    let encoder = LabelEncoder::fit(&raw_labels)?;
    let labels = encoder.transform(&raw_labels)?;
    log::info!("クラス: {:?}", encoder.classes());

    let feature_names = table.feature_names(&settings.label_column);
    let features = table
        .feature_matrix(&settings.label_column)
        .context("特徴量を数値に変換できません")?;

    let split = train_test_split(features.len(), settings.test_fraction, settings.seed)?;
    log::info!("学習: {}行, テスト: {}行", split.train.len(), split.test.len());

    let forest = RandomForestConfig::default()
        .with_n_trees(settings.n_trees)
        .with_seed(settings.seed)
        .fit(
            &select_rows(&features, &split.train),
            &select_rows(&labels, &split.train),
        )?;

    let test_labels = select_rows(&labels, &split.test);
    let predicted = forest.predict(&select_rows(&features, &split.test))?;

    let accuracy = accuracy_score(&test_labels, &predicted);
    let matrix = ConfusionMatrix::from_labels(&test_labels, &predicted, encoder.len())?;
    let report = ClassificationReport::new(&matrix, encoder.classes());

    println!("Accuracy: {:.4}", accuracy);
    println!("Classification Report:");
    println!("{}", report);

    let mut importances: Vec<(String, f64)> = feature_names
        .iter()
        .cloned()
        .zip(forest.feature_importances())
        .collect();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("Feature importances:");
    for (name, value) in &importances {
        println!("  {:<24} {:.4}", name, value);
    }

    // 特徴量とエンコード済みラベルの相関
    let mut columns = to_columns(&features);
    columns.push(labels.iter().map(|&l| l as f64).collect());
    let mut names = feature_names;
    names.push(settings.label_column.clone());
    let correlation = correlation_matrix(&names, &columns);

    charts::write_svg(&settings.heatmap_path, &charts::render_heatmap(&correlation))?;

    Ok(ForestRun {
        accuracy,
        report,
        importances,
        correlation,
    })
}
