//! SVGグラフ出力
//!
//! 学習曲線の2x2グリッドと相関ヒートマップをSVGとして書き出します。

use anyhow::{Context, Result};
use std::path::Path;

use crate::forest::CorrelationMatrix;
use crate::types::TrainingHistory;

const PANEL_WIDTH: f64 = 520.0;
const PANEL_HEIGHT: f64 = 360.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 50.0;
const MARGIN_LEFT: f64 = 60.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// 系列の色（バリアント順）
const PALETTE: [&str; 4] = ["#3498db", "#e74c3c", "#2ecc71", "#9b59b6"];

/// 折れ線1本分
#[derive(Debug, Clone)]
pub struct LineSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub color: String,
}

/// 学習履歴から2x2の学習曲線グリッドを生成
///
/// 左上: 学習損失, 右上: 検証損失, 左下: 学習正解率, 右下: 検証正解率。
/// 各パネルにバリアントごとの線を1本ずつ描く。
pub fn render_training_grid(histories: &[(String, TrainingHistory)]) -> String {
    let panels: [(&str, &str, fn(&TrainingHistory) -> Vec<f64>); 4] = [
        ("Training loss", "loss", TrainingHistory::train_loss),
        ("Validation loss", "loss", TrainingHistory::val_loss),
        ("Training accuracy", "accuracy", TrainingHistory::train_accuracy),
        ("Validation accuracy", "accuracy", TrainingHistory::val_accuracy),
    ];

    let width = PANEL_WIDTH * 2.0;
    let height = PANEL_HEIGHT * 2.0;
    let mut svg = svg_header(width, height);

    for (i, (title, y_label, values)) in panels.iter().enumerate() {
        let series: Vec<LineSeries> = histories
            .iter()
            .enumerate()
            .map(|(k, (name, history))| LineSeries {
                name: name.clone(),
                values: values(history),
                color: PALETTE[k % PALETTE.len()].to_string(),
            })
            .collect();
        let origin_x = (i % 2) as f64 * PANEL_WIDTH;
        let origin_y = (i / 2) as f64 * PANEL_HEIGHT;
        render_line_panel(&mut svg, origin_x, origin_y, title, y_label, &series);
    }

    svg.push_str("</svg>");
    svg
}

/// 1パネル分の折れ線グラフ。NaNの点は線を途切れさせる。
fn render_line_panel(
    svg: &mut String,
    origin_x: f64,
    origin_y: f64,
    title: &str,
    y_label: &str,
    series: &[LineSeries],
) {
    let plot_width = PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = PANEL_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let left = origin_x + MARGIN_LEFT;
    let top = origin_y + MARGIN_TOP;

    let n_points = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let (y_min, y_max) = value_range(series);
    let x_span = (n_points.max(2) - 1) as f64;

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="15" font-weight="bold" fill="{}">{}</text>"#,
        left + plot_width / 2.0,
        origin_y + 25.0,
        COLOR_TEXT,
        escape_xml(title)
    ));

    for i in 0..=4 {
        let frac = i as f64 / 4.0;
        let y = top + plot_height - frac * plot_height;
        let value = y_min + frac * (y_max - y_min);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{}" stroke-width="1"/><text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.2}</text>"#,
            left,
            left + plot_width,
            COLOR_GRID,
            left - 6.0,
            y + 4.0,
            COLOR_TEXT,
            value
        ));
    }

    svg.push_str(&format!(
        r#"<line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="{c}" stroke-width="2"/><line x1="{left}" y1="{top}" x2="{left}" y2="{bottom}" stroke="{c}" stroke-width="2"/>"#,
        left = left,
        right = left + plot_width,
        top = top,
        bottom = top + plot_height,
        c = COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">epoch</text><text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}" transform="rotate(-90 {} {})">{}</text>"#,
        left + plot_width / 2.0,
        origin_y + PANEL_HEIGHT - 12.0,
        COLOR_TEXT,
        origin_x + 16.0,
        top + plot_height / 2.0,
        COLOR_TEXT,
        origin_x + 16.0,
        top + plot_height / 2.0,
        escape_xml(y_label)
    ));

    for s in series {
        let mut path = String::new();
        let mut pen_down = false;
        for (i, &v) in s.values.iter().enumerate() {
            if !v.is_finite() {
                pen_down = false;
                continue;
            }
            let x = left + (i as f64 / x_span) * plot_width;
            let y = top + plot_height - ((v - y_min) / (y_max - y_min)) * plot_height;
            path.push_str(&format!("{} {:.2} {:.2} ", if pen_down { "L" } else { "M" }, x, y));
            pen_down = true;
        }
        if !path.is_empty() {
            svg.push_str(&format!(
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                path.trim_end(),
                s.color
            ));
        }
    }

    let mut legend_y = top + 8.0;
    for s in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/><text x="{}" y="{}" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            left + plot_width - 130.0,
            legend_y,
            s.color,
            left + plot_width - 112.0,
            legend_y + 10.0,
            COLOR_TEXT,
            escape_xml(&s.name)
        ));
        legend_y += 18.0;
    }
}

/// 相関行列のヒートマップ（-1: 青, 0: 白, 1: 赤）
pub fn render_heatmap(corr: &CorrelationMatrix) -> String {
    let n = corr.names.len();
    let cell = 48.0;
    let label_space = 140.0;
    let size = label_space + cell * n as f64 + 20.0;
    let mut svg = svg_header(size, size);

    for (i, row) in corr.values.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            let x = label_space + j as f64 * cell;
            let y = label_space + i as f64 * cell;
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{cell}" height="{cell}" fill="{}" stroke="white"/><text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.2}</text>"#,
                diverging_color(v),
                x + cell / 2.0,
                y + cell / 2.0 + 4.0,
                COLOR_TEXT,
                v
            ));
        }
    }

    for (i, name) in corr.names.iter().enumerate() {
        let offset = label_space + i as f64 * cell + cell / 2.0;
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text><text x="{}" y="{}" text-anchor="start" font-family="Arial, sans-serif" font-size="12" fill="{}" transform="rotate(-60 {} {})">{}</text>"#,
            label_space - 6.0,
            offset + 4.0,
            COLOR_TEXT,
            escape_xml(name),
            offset,
            label_space - 6.0,
            COLOR_TEXT,
            offset,
            label_space - 6.0,
            escape_xml(name)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// SVG文字列をファイルへ書き出す（親ディレクトリも作成）
pub fn write_svg(path: &Path, svg: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("ディレクトリを作成できません: {:?}", parent))?;
        }
    }
    std::fs::write(path, svg).with_context(|| format!("SVGを書き込めません: {:?}", path))?;
    log::info!("グラフを保存しました: {}", path.display());
    Ok(())
}

fn svg_header(width: f64, height: f64) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="white"/>"#,
        w = width,
        h = height
    )
}

/// 有限値だけから描画範囲を決める。幅0なら上下に余白を付ける。
fn value_range(series: &[LineSeries]) -> (f64, f64) {
    let finite = series.iter().flat_map(|s| s.values.iter()).filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < 1e-12 {
        return (min - 0.5, max + 0.5);
    }
    (min, max)
}

fn diverging_color(v: f64) -> String {
    let t = v.clamp(-1.0, 1.0);
    let (r, g, b) = if t >= 0.0 {
        let k = 1.0 - t;
        (255.0, 255.0 * k, 255.0 * k)
    } else {
        let k = 1.0 + t;
        (255.0 * k, 255.0 * k, 255.0)
    };
    format!("rgb({},{},{})", r.round() as u8, g.round() as u8, b.round() as u8)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EpochMetrics;

    fn history(n: usize, val: f64) -> TrainingHistory {
        (0..n).fold(TrainingHistory::new(), |h, e| {
            h.with_epoch(EpochMetrics {
                train_loss: 1.0 / (e + 1) as f64,
                train_accuracy: e as f64 / n as f64,
                val_loss: val,
                val_accuracy: val,
            })
        })
    }

    #[test]
    fn training_grid_has_four_panels_and_a_line_per_variant() {
        let svg = render_training_grid(&[
            ("binary".to_string(), history(5, 0.3)),
            ("sharpened".to_string(), history(5, 0.4)),
        ]);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<path").count(), 8);
        assert!(svg.contains("Validation accuracy"));
        assert!(svg.contains("sharpened"));
    }

    #[test]
    fn nan_values_are_not_drawn() {
        let svg = render_training_grid(&[("binary".to_string(), history(3, f64::NAN))]);
        assert!(!svg.contains("NaN"));
        // 検証側の2パネルは線なし
        assert_eq!(svg.matches("<path").count(), 2);
    }

    #[test]
    fn heatmap_has_a_cell_per_entry() {
        let corr = CorrelationMatrix {
            names: vec!["a".to_string(), "b<c".to_string()],
            values: vec![vec![1.0, -0.5], vec![-0.5, 1.0]],
        };
        let svg = render_heatmap(&corr);
        assert_eq!(svg.matches("stroke=\"white\"").count(), 4);
        assert!(svg.contains("b&lt;c"));
        assert!(svg.contains("-0.50"));
    }

    #[test]
    fn diverging_color_endpoints() {
        assert_eq!(diverging_color(1.0), "rgb(255,0,0)");
        assert_eq!(diverging_color(0.0), "rgb(255,255,255)");
        assert_eq!(diverging_color(-1.0), "rgb(0,0,255)");
    }

    #[test]
    fn write_svg_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plots").join("chart.svg");
        write_svg(&path, "<svg></svg>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<svg></svg>");
    }
}
