//! 分類処理のエラー定義

use std::path::PathBuf;

/// 分類器のエラー
///
/// 起動時の読み込みエラーと、リクエスト単位の推論エラーを区別します。
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// クラスラベルファイルが読めない、または不正
    #[error("クラスラベルファイルの読み込みエラー ({path}): {reason}")]
    LabelsFile { path: PathBuf, reason: String },

    /// 重みファイル（バンドル含む）が読めない、または構造が一致しない
    #[error("重みファイルの読み込みエラー ({path}): {reason}")]
    WeightsArtifact { path: PathBuf, reason: String },

    /// 重みのテンソル形状が組み立てたネットワークと一致しない
    #[error("重みの形状が一致しません: {0}")]
    ShapeMismatch(String),

    /// 画像としてデコードできない入力
    #[error("画像のデコードに失敗しました ({path}): {reason}")]
    Decode { path: PathBuf, reason: String },

    /// 重みが読み込まれていない状態での推論要求
    #[error("モデルが準備できていません")]
    ModelNotReady,

    /// 推論中のその他の失敗
    #[error("推論に失敗しました: {0}")]
    PredictionFailed(String),
}

impl ClassifierError {
    /// 入力画像起因のエラーかどうか
    pub fn is_input_error(&self) -> bool {
        matches!(self, ClassifierError::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
