//! 特徴量間のピアソン相関行列

/// 名前付きの相関行列
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// 列ごとの値 `columns[col][row]` から相関行列を計算する
///
/// 分散0の列は対角1、それ以外0とする。
pub fn correlation_matrix(names: &[String], columns: &[Vec<f64>]) -> CorrelationMatrix {
    let n = columns.len();
    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
        for j in (i + 1)..n {
            let r = pearson(&columns[i], &columns[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix {
        names: names.to_vec(),
        values,
    }
}

/// 行優先の行列を列ごとのベクタに並べ替える
pub fn to_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    (0..width)
        .map(|c| rows.iter().map(|row| row[c]).collect())
        .collect()
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        0.0
    } else {
        (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
    }
}
