pub mod dataset;
pub mod experiment;
pub mod inference;
pub mod ml_model;
pub mod preprocess;
pub mod training;

pub use dataset::{DirectoryLoader, ImageBatch, ImageFolder, ImageItem, ImageSubset, PreprocessedBatches, RawBatch};
pub use experiment::{evaluate_saved, run_comparison, save_variants, SavedVariant, VariantResult};
pub use inference::{load_classifier, save_classifier, InferenceEngine};
pub use ml_model::{load_image, load_rgb, ModelConfig, WasteClassifier, IMAGE_SIZE};
pub use preprocess::{adaptive_threshold, preprocess_batch, sharpen, Preprocessing};
pub use training::{evaluate, train_epoch, train_variant, validate_epoch};
