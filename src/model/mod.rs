pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{
    is_model_bundle, load_class_labels, load_metadata, load_model_binary,
    load_model_with_metadata, print_metadata_info, save_model_with_metadata,
};
pub use config::{AppConfig, DeviceType, ModelSettings, ServerSettings};
