//! HTTPサーバー
//!
//! - `POST /predict` : multipartの `file` フィールドで画像を受け取り分類する
//! - `GET /health`   : モデルの準備状態
//!
//! アップロードは一時ファイルに書き出してから分類し、成否にかかわらず削除します。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::error::ClassifierError;
use crate::model::ServerSettings;
use crate::service::InferenceService;
use crate::types::PredictionResult;

/// 受け付ける拡張子
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// ハンドラ間で共有する状態
pub struct AppState {
    pub service: InferenceService,
    pub upload_dir: PathBuf,
}

/// `{"error": "..."}` を返すエラー応答
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        // サイズ超過は413になる
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(e: ClassifierError) -> Self {
        let message = format!("Prediction failed: {}", e);
        if e.is_input_error() {
            Self::bad_request(message)
        } else {
            Self::internal(message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// ルーターを組み立てる
pub fn router(state: Arc<AppState>, settings: &ServerSettings) -> Router {
    let mut router = Router::new()
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(settings.max_upload_bytes)),
        )
        .route("/health", get(health))
        .with_state(state);

    if let Some(static_dir) = settings.static_dir.as_ref().filter(|dir| dir.is_dir()) {
        tracing::info!("静的ファイル: {}", static_dir.display());
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router.layer(CorsLayer::permissive())
}

/// 設定のアドレスで待ち受けを開始
pub async fn serve(service: InferenceService, settings: &ServerSettings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.upload_dir).with_context(|| {
        format!(
            "アップロード先を作成できません: {}",
            settings.upload_dir.display()
        )
    })?;

    let state = Arc::new(AppState {
        service,
        upload_dir: settings.upload_dir.clone(),
    });
    let app = router(state, settings);

    let address = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("{} で待ち受けできません", address))?;

    tracing::info!("サーバーを起動しました: http://{}", address);
    axum::serve(listener, app).await.context("サーバーが異常終了しました")?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.service.is_ready(),
    }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let (file_name, bytes) = read_upload(&mut multipart).await?;

    if file_name.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    let extension = allowed_extension(&file_name)
        .ok_or_else(|| ApiError::bad_request("Invalid file type. Please upload JPG, JPEG, or PNG"))?;

    tracing::debug!("アップロード: {} ({} バイト)", file_name, bytes.len());

    let task_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        classify_upload(&task_state.service, &task_state.upload_dir, &extension, &bytes)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Prediction failed: {}", e)))?;

    result.map(Json)
}

/// `file` フィールドのファイル名と内容を取り出す
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(ApiError::bad_request("No file uploaded"))
}

/// 許可された拡張子なら小文字で返す
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// 一時ファイルに書き出して分類する（一時ファイルはドロップ時に削除される）
fn classify_upload(
    service: &InferenceService,
    upload_dir: &Path,
    extension: &str,
    bytes: &[u8],
) -> Result<PredictionResult, ApiError> {
    let save_error = |e: std::io::Error| ApiError::internal(format!("Failed to save upload: {}", e));

    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(upload_dir)
        .map_err(save_error)?;
    file.write_all(bytes).map_err(save_error)?;
    file.flush().map_err(save_error)?;

    service.predict(file.path()).map_err(|e| {
        tracing::warn!("推論エラー: {}", e);
        ApiError::from(e)
    })
}
