//! 電子廃棄物の表形式分類と、ゴミ画像CNNの前処理比較実験

pub mod charts;
pub mod csv_loader;
pub mod forest;
pub mod model;
pub mod types;

#[cfg(feature = "ml")]
pub mod ml;
