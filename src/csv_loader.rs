//! 表形式データのCSV読み込み

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;

use crate::forest::ForestError;

/// ヘッダー付きCSVを行単位で保持するテーブル
#[derive(Debug, Clone)]
pub struct TabularDataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TabularDataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 列名から列インデックスを取得
    pub fn column_index(&self, name: &str) -> Result<usize, ForestError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ForestError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// 指定列の値をそのまま取り出す
    pub fn column(&self, name: &str) -> Result<Vec<String>, ForestError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// ラベル列以外の列名
    pub fn feature_names(&self, label_column: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| h.as_str() != label_column)
            .cloned()
            .collect()
    }

    /// ラベル列以外を数値の特徴行列（行優先）に変換
    pub fn feature_matrix(&self, label_column: &str) -> Result<Vec<Vec<f64>>, ForestError> {
        let label_idx = self.column_index(label_column)?;
        let mut matrix = Vec::with_capacity(self.rows.len());

        for (row_index, row) in self.rows.iter().enumerate() {
            let mut values = Vec::with_capacity(self.headers.len() - 1);
            for (col, cell) in row.iter().enumerate() {
                if col == label_idx {
                    continue;
                }
                let value = cell
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ForestError::NonNumericFeature {
                        row: row_index,
                        column: self.headers[col].clone(),
                        value: cell.clone(),
                    })?;
                values.push(value);
            }
            matrix.push(values);
        }

        Ok(matrix)
    }
}

/// CSVファイルを読み込む
pub fn load_table(path: &Path) -> Result<TabularDataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("CSVファイルを開けません: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .context("CSVヘッダーの読み込みに失敗しました")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSVの{}行目を読み込めません", i + 2))?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }

    log::info!(
        "CSVを読み込みました: {} ({}行, {}列)",
        path.display(),
        rows.len(),
        headers.len()
    );

    Ok(TabularDataset::new(headers, rows))
}
