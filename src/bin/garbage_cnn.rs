//! 適応的二値化とシャープ化の前処理でCNNを学習し、結果を比較する

use anyhow::Result;
use burn::backend::{Autodiff, Wgpu};
use burn_ndarray::NdArray;
use burn_wgpu::WgpuDevice;
use waste_sorter_lib::ml::{run_comparison, VariantResult};
use waste_sorter_lib::model::{DeviceType, ExperimentConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ExperimentConfig::load_or_default()?;
    config.display();

    let results = match config.device_type {
        DeviceType::Wgpu => {
            let device = WgpuDevice::default();
            log::info!("使用デバイス: {:?}", device);
            run_comparison::<Autodiff<Wgpu>>(&config, &device)?
        }
        DeviceType::Cpu => run_comparison::<Autodiff<NdArray>>(&config, &Default::default())?,
    };

    print_summary(&results);
    Ok(())
}

fn print_summary(results: &[VariantResult]) {
    println!("\n=== 比較結果 ===");
    for result in results {
        println!(
            "{:<10} 最終正解率: {:.4}  モデル: {}",
            result.preprocessing.name(),
            result.final_accuracy,
            result.model_path.display()
        );
    }
}
