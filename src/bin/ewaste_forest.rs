//! 電子廃棄物のカテゴリをランダムフォレストで分類し、相関ヒートマップを出力する

use anyhow::Result;
use waste_sorter_lib::forest::run_tabular;
use waste_sorter_lib::model::ExperimentConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ExperimentConfig::load_or_default()?;
    let settings = &config.tabular;
    log::info!("入力CSV: {}", settings.csv_path.display());

    let run = run_tabular(settings)?;
    log::info!(
        "完了: 正解率 {:.4}, ヒートマップ {}",
        run.accuracy,
        settings.heatmap_path.display()
    );
    Ok(())
}
