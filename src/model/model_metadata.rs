//! モデルメタデータの定義
//!
//! モデルバンドル（tar.gz）内の `metadata.json` として保存され、
//! 重みがどのアーキテクチャで学習されたかを明示します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::HeadVariant;

/// 特徴抽出器の識別子
pub const EFFICIENTNET_B0: &str = "efficientnet_b0";

fn default_architecture() -> String {
    EFFICIENTNET_B0.to_string()
}

fn default_input_size() -> u32 {
    224
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 特徴抽出器（現在は "efficientnet_b0" のみ）
    #[serde(default = "default_architecture")]
    pub architecture: String,

    /// 分類ヘッドの種類
    /// 省略時はファイル名から判定する
    #[serde(default)]
    pub head: Option<HeadVariant>,

    /// 学習時のクラスラベル（順序が重要）
    /// 空の場合はラベルファイルとの照合を行わない
    #[serde(default)]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常224）
    #[serde(default = "default_input_size")]
    pub model_input_size: u32,

    /// 検証データでの正解率（%）
    #[serde(default)]
    pub accuracy: Option<f32>,

    /// モデルの学習時刻（ISO8601形式）
    #[serde(default)]
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(head: HeadVariant, class_labels: Vec<String>, model_input_size: u32) -> Self {
        Self {
            architecture: default_architecture(),
            head: Some(head),
            class_labels,
            model_input_size,
            accuracy: None,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let metadata = ModelMetadata::from_json_string("{}").unwrap();
        assert_eq!(metadata.architecture, EFFICIENTNET_B0);
        assert_eq!(metadata.head, None);
        assert!(metadata.class_labels.is_empty());
        assert_eq!(metadata.model_input_size, 224);
    }

    #[test]
    fn test_json_round_trip() {
        let metadata = ModelMetadata::new(
            HeadVariant::Improved,
            vec!["cardboard".to_string(), "glass".to_string()],
            224,
        )
        .with_accuracy(76.14);

        let json = metadata.to_json_string().unwrap();
        assert!(json.contains("\"head\": \"improved\""));
        assert_eq!(ModelMetadata::from_json_string(&json).unwrap(), metadata);
    }

    #[test]
    fn test_invalid_head_rejected() {
        assert!(ModelMetadata::from_json_string(r#"{"head": "huge"}"#).is_err());
    }
}
