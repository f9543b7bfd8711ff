//! モデル推論機能
//!
//! 重みの読み込みに失敗してもプロセスは止めず、「未準備」状態の推論エンジンを返します。
//! 未準備時は初期化直後の重みが入っており、推論結果はほぼランダムになります。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use burn::{
    module::{Module, ModuleVisitor, Param},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder, RecorderError},
    tensor::{backend::Backend, Tensor},
};

use crate::error::{ClassifierError, Result};
use crate::ml::efficientnet::EfficientNetConfig;
use crate::ml::ml_model::{
    HeadVariant, ModelConfig, PreprocessedImage, WasteClassifierModel, IMAGE_SIZE,
};
use crate::model::{is_model_bundle, load_model_with_metadata, print_metadata_info};
use crate::model::model_metadata::EFFICIENTNET_B0;

/// 前処理済み画像からクラス確率を求めるもの
///
/// 推論サービスはこのトレイト越しにネットワークを使うため、テストでは差し替え可能です。
pub trait ClassProbabilities: Send + Sync {
    /// 出力次元（クラス数）
    fn num_classes(&self) -> usize;

    /// 入力画像サイズ（正方形）
    fn input_size(&self) -> usize;

    /// 重みが正しく読み込まれているか
    fn is_ready(&self) -> bool;

    /// 1枚の画像のクラス確率（softmax出力）
    fn probabilities(&self, image: &PreprocessedImage) -> Result<Vec<f32>>;
}

/// 推論エンジン
///
/// 順伝播はミューテックスで直列化します（バックエンドの同時実行安全性を仮定しない）。
pub struct InferenceEngine<B: Backend> {
    model: Mutex<WasteClassifierModel<B>>,
    device: B::Device,
    num_classes: usize,
    image_size: usize,
    head: HeadVariant,
    load_error: Option<String>,
}

impl<B: Backend> InferenceEngine<B> {
    /// EfficientNet-B0 / 224x224 でモデルを組み立てて重みを読み込む
    pub fn load(weights_path: &Path, class_labels: &[String], device: B::Device) -> Self {
        Self::load_with_backbone(
            weights_path,
            class_labels,
            IMAGE_SIZE,
            EfficientNetConfig::b0(),
            device,
        )
    }

    /// 特徴抽出器の構成と入力サイズを指定して読み込む
    pub fn load_with_backbone(
        weights_path: &Path,
        class_labels: &[String],
        image_size: usize,
        backbone: EfficientNetConfig,
        device: B::Device,
    ) -> Self {
        tracing::info!("重みファイルを読み込みます: {}", weights_path.display());

        // バンドルならメタデータと重みを取得（失敗時はファイル名での判定に戻る）
        let artifact = read_artifact(weights_path);
        let declared_head = artifact
            .as_ref()
            .ok()
            .and_then(|(metadata, _)| metadata.as_ref())
            .and_then(|metadata| metadata.head);
        let head = HeadVariant::for_weights(weights_path, declared_head);

        let config = ModelConfig::new(class_labels.len(), head)
            .with_image_size(image_size)
            .with_backbone(backbone);
        let model = config.init::<B>(&device);

        tracing::info!("分類ヘッド: {} (クラス数: {})", head, class_labels.len());

        let loaded = artifact.and_then(|(metadata, bytes)| {
            if let Some(metadata) = &metadata {
                print_metadata_info(metadata);
                validate_metadata(weights_path, metadata, class_labels, image_size)?;
            }
            load_weights(weights_path, &model, bytes, &device)
        });

        let (model, load_error) = match loaded {
            Ok(model) => {
                tracing::info!("✓ モデルを読み込みました");
                (model, None)
            }
            Err(e) => {
                tracing::error!("重みの読み込みエラー: {}", e);
                tracing::warn!("初期化直後の重みのまま起動します（モデルは未準備状態）");
                (model, Some(e.to_string()))
            }
        };

        Self {
            model: Mutex::new(model),
            device,
            num_classes: class_labels.len(),
            image_size,
            head,
            load_error,
        }
    }

    /// 使用中の分類ヘッド
    pub fn head_variant(&self) -> HeadVariant {
        self.head
    }

    /// 重みの読み込みに失敗した理由
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }
}

impl<B: Backend> ClassProbabilities for InferenceEngine<B> {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_size(&self) -> usize {
        self.image_size
    }

    fn is_ready(&self) -> bool {
        self.load_error.is_none()
    }

    fn probabilities(&self, image: &PreprocessedImage) -> Result<Vec<f32>> {
        if image.size != self.image_size {
            return Err(ClassifierError::PredictionFailed(format!(
                "入力サイズ {} がモデルの入力サイズ {} と一致しません",
                image.size, self.image_size
            )));
        }

        let tensor: Tensor<B, 4> = image.to_tensor(&self.device);

        // 推論中はモデルを書き換えないので、過去の異常終了で汚染されたロックも再利用する
        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let output = model.forward(tensor);

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::PredictionFailed(format!("推論結果の取得エラー: {:?}", e)))
    }
}

type Artifact = (Option<crate::model::ModelMetadata>, Vec<u8>);

/// 重みファイルを読む。バンドルの場合はメタデータも返す
fn read_artifact(weights_path: &Path) -> Result<Artifact> {
    let artifact_error = |reason: String| ClassifierError::WeightsArtifact {
        path: weights_path.to_path_buf(),
        reason,
    };

    if is_model_bundle(weights_path) {
        let (metadata, bytes) =
            load_model_with_metadata(weights_path).map_err(|e| artifact_error(format!("{:#}", e)))?;
        Ok((Some(metadata), bytes))
    } else {
        let bytes = std::fs::read(weights_path).map_err(|e| artifact_error(e.to_string()))?;
        Ok((None, bytes))
    }
}

/// メタデータと組み立て条件の整合性を確認
fn validate_metadata(
    weights_path: &Path,
    metadata: &crate::model::ModelMetadata,
    class_labels: &[String],
    image_size: usize,
) -> Result<()> {
    let mismatch = |reason: String| ClassifierError::WeightsArtifact {
        path: weights_path.to_path_buf(),
        reason,
    };

    if metadata.architecture != EFFICIENTNET_B0 {
        return Err(mismatch(format!(
            "未対応の特徴抽出器です: {}",
            metadata.architecture
        )));
    }
    if metadata.model_input_size as usize != image_size {
        return Err(mismatch(format!(
            "入力サイズ {} がモデルの入力サイズ {} と一致しません",
            metadata.model_input_size, image_size
        )));
    }
    if !metadata.class_labels.is_empty() && metadata.class_labels != class_labels {
        return Err(mismatch(format!(
            "学習時のクラスラベル [{}] とラベルファイル [{}] が一致しません",
            metadata.class_labels.join(", "),
            class_labels.join(", ")
        )));
    }
    Ok(())
}

/// 重みを復元し、パラメータ形状が組み立てたモデルと一致するか確認
fn load_weights<B: Backend>(
    weights_path: &Path,
    model: &WasteClassifierModel<B>,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<WasteClassifierModel<B>> {
    let artifact_error = |reason: String| ClassifierError::WeightsArtifact {
        path: weights_path.to_path_buf(),
        reason,
    };

    // デコード中の異常終了も未準備扱いにする
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let loaded = catch_unwind(AssertUnwindSafe(|| {
        let record = recorder.load(bytes, device)?;
        Ok::<_, RecorderError>(model.clone().load_record(record))
    }))
    .map_err(|_| artifact_error("重みの復元中に異常終了しました".to_string()))?
    .map_err(|e| artifact_error(format!("モデル重みの読み込みエラー: {:?}", e)))?;

    check_param_shapes(model, &loaded)?;
    Ok(loaded)
}

/// パラメータ形状の収集
struct ParamShapes(Vec<Vec<usize>>);

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.0.push(param.val().dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut visitor = ParamShapes(Vec::new());
    module.visit(&mut visitor);
    visitor.0
}

/// 2つのモデルのパラメータ形状を比較
pub fn check_param_shapes<B: Backend, M: Module<B>>(expected: &M, actual: &M) -> Result<()> {
    let expected = param_shapes::<B, M>(expected);
    let actual = param_shapes::<B, M>(actual);

    if expected.len() != actual.len() {
        return Err(ClassifierError::ShapeMismatch(format!(
            "パラメータ数 {} (期待: {})",
            actual.len(),
            expected.len()
        )));
    }

    for (i, (e, a)) in expected.iter().zip(&actual).enumerate() {
        if e != a {
            return Err(ClassifierError::ShapeMismatch(format!(
                "パラメータ #{}: {:?} (期待: {:?})",
                i, a, e
            )));
        }
    }
    Ok(())
}

/// モデルの重みをバイト列に変換（バンドル作成用）
pub fn model_to_bytes<B: Backend>(model: WasteClassifierModel<B>) -> anyhow::Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}
