pub mod efficientnet;
pub mod ml_model;
pub mod inference;
pub mod prediction;

pub use efficientnet::{EfficientNet, EfficientNetConfig};
pub use ml_model::{
    HeadVariant, ModelConfig, PreprocessedImage, WasteClassifierModel, IMAGE_SIZE,
    load_and_scale_image, load_and_scale_image_with_size,
};
pub use inference::{ClassProbabilities, InferenceEngine, model_to_bytes};
pub use prediction::{build_prediction, UNCERTAINTY_THRESHOLD};
