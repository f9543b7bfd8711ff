//! モデルとメタデータ、クラスラベルの永続化
//!
//! モデルバンドルはTar.gz形式でモデルとメタデータを1ファイルに統合します。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（ヘッド種類、クラスラベルなど）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder};

use crate::error::ClassifierError;
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// モデルバンドル（tar.gz）かどうかをファイル名で判定
pub fn is_model_bundle(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 1つのtar.gzファイルに以下を含む：
/// - metadata.json : メタデータ
/// - model.bin : モデルの重み
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<std::path::PathBuf> {
    // output_pathがすでにバンドル名ならそのまま、そうでなければ拡張子を追加
    let tar_gz_path = if is_model_bundle(output_path) {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    };

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .context(format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    append_entry(&mut tar_builder, METADATA_ENTRY, metadata.to_json_string()?.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // tarアーカイブとgzipストリームを完成させる
    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .context(format!("Failed to add {} to tar", name))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let (metadata, _) = read_bundle(tar_gz_path, false)?;
    metadata.ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    let (_, binary) = read_bundle(tar_gz_path, true)?;
    binary.ok_or_else(|| anyhow::anyhow!("model.bin not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_bundle(tar_gz_path, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

fn read_bundle(
    tar_gz_path: &Path,
    with_binary: bool,
) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
                if !with_binary {
                    break;
                }
            }
            Some(MODEL_ENTRY) if with_binary => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata_opt, model_binary_opt))
}

/// クラスラベルファイル（JSON文字列配列）を読み込む
///
/// 配列の順序がクラスインデックスになります。空配列と重複は不正です。
pub fn load_class_labels(path: &Path) -> Result<Vec<String>, ClassifierError> {
    let labels_error = |reason: String| ClassifierError::LabelsFile {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| labels_error(e.to_string()))?;
    let labels: Vec<String> =
        serde_json::from_str(&content).map_err(|e| labels_error(e.to_string()))?;

    if labels.is_empty() {
        return Err(labels_error("ラベルが1つもありません".to_string()));
    }

    let mut seen = HashSet::new();
    for label in &labels {
        if label.trim().is_empty() {
            return Err(labels_error("空のラベルがあります".to_string()));
        }
        if !seen.insert(label.as_str()) {
            return Err(labels_error(format!("ラベル {} が重複しています", label)));
        }
    }

    Ok(labels)
}

/// メタデータをログに出力
pub fn print_metadata_info(metadata: &ModelMetadata) {
    tracing::info!("=== モデルメタデータ ===");
    tracing::info!("特徴抽出器: {}", metadata.architecture);
    match metadata.head {
        Some(head) => tracing::info!("分類ヘッド: {}", head),
        None => tracing::info!("分類ヘッド: 未指定（ファイル名から判定）"),
    }
    if !metadata.class_labels.is_empty() {
        tracing::info!("クラスラベル: {}", metadata.class_labels.join(", "));
    }
    tracing::info!(
        "モデル入力サイズ: {}x{}",
        metadata.model_input_size,
        metadata.model_input_size
    );
    if let Some(accuracy) = metadata.accuracy {
        tracing::info!("正解率: {:.2}%", accuracy);
    }
    if !metadata.trained_at.is_empty() {
        tracing::info!("学習日時: {}", metadata.trained_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::HeadVariant;
    use std::path::PathBuf;

    #[test]
    fn test_is_model_bundle() {
        assert!(is_model_bundle(&PathBuf::from("models/waste.tar.gz")));
        assert!(is_model_bundle(&PathBuf::from("WASTE.TGZ")));
        assert!(!is_model_bundle(&PathBuf::from("models/waste.bin")));
        assert!(!is_model_bundle(&PathBuf::from("models/EfficientNetB0.weights.h5")));
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ModelMetadata::new(HeadVariant::Compact, vec!["glass".to_string()], 224);
        let binary = vec![1u8, 2, 3, 4, 5];

        let path = save_model_with_metadata(&dir.path().join("model"), &metadata, &binary).unwrap();
        assert!(path.to_string_lossy().ends_with("model.tar.gz"));

        assert_eq!(load_metadata(&path).unwrap(), metadata);
        assert_eq!(load_model_binary(&path).unwrap(), binary);

        let (loaded_metadata, loaded_binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(loaded_metadata.head, Some(HeadVariant::Compact));
        assert_eq!(loaded_binary, binary);
    }

    #[test]
    fn test_bundle_missing_file() {
        let err = load_metadata(&PathBuf::from("no/such/model.tar.gz")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_labels_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_labels.json");
        std::fs::write(&path, r#"["cardboard", "glass", "metal"]"#).unwrap();

        let labels = load_class_labels(&path).unwrap();
        assert_eq!(labels, vec!["cardboard", "glass", "metal"]);
    }

    #[test]
    fn test_labels_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("empty.json", "[]"),
            ("dup.json", r#"["glass", "glass"]"#),
            ("blank.json", r#"["glass", " "]"#),
            ("object.json", r#"{"0": "glass"}"#),
        ];

        for (name, content) in cases {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            let err = load_class_labels(&path).unwrap_err();
            assert!(matches!(err, ClassifierError::LabelsFile { .. }), "{}", name);
        }

        let err = load_class_labels(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ClassifierError::LabelsFile { .. }));
    }
}
