pub mod config;
pub mod model_metadata;
pub mod model_storage;

pub use config::{DeviceType, ExperimentConfig, ImageSettings, TabularSettings, TrainingSettings};
#[cfg(feature = "ml")]
pub use model_metadata::ModelMetadata;
#[cfg(feature = "ml")]
pub use model_storage::{
    archive_path, load_metadata, load_model_binary, load_model_with_metadata, print_metadata_info,
    save_model_with_metadata,
};
