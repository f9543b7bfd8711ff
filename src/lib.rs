//! 廃棄物画像の分類と分別ガイド

pub mod error;
pub mod guidance;
pub mod ml;
pub mod model;
pub mod server;
pub mod service;
pub mod types;

pub use error::{ClassifierError, Result};
pub use model::{AppConfig, DeviceType};
pub use service::InferenceService;
pub use types::PredictionResult;

use burn::backend::NdArray;
use tracing_subscriber::EnvFilter;

/// ログ出力を初期化（既定は info、`RUST_LOG` で上書き）
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 二重初期化は無視する
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 設定された計算デバイスで推論サービスを構築
pub fn load_service(config: &AppConfig) -> InferenceService {
    match config.device_type {
        DeviceType::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                use burn::backend::{wgpu::WgpuDevice, Wgpu};
                return InferenceService::load::<Wgpu>(&config.model, WgpuDevice::default());
            }
            #[cfg(not(feature = "wgpu"))]
            tracing::warn!("wgpu フィーチャーが無効です。CPU (NdArray) で推論します");
        }
        DeviceType::Cpu => {}
    }
    InferenceService::load::<NdArray>(&config.model, Default::default())
}

/// 設定を表示し、モデルを読み込んでサーバーを起動
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.display();

    let load_config = config.clone();
    let service = tokio::task::spawn_blocking(move || load_service(&load_config)).await?;
    if !service.is_ready() {
        tracing::warn!(
            "モデルは未準備です（重み: {}）",
            config.model.weights_path.display()
        );
    }

    server::serve(service, &config.server).await
}
