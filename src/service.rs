//! 推論サービス
//!
//! ラベル、ネットワーク、豆知識を束ね、画像ファイル1枚から推論結果を返します。
//! 起動時の読み込みに失敗しても構築自体は成功し、状態は `is_ready()` で確認します。

use std::path::Path;

use burn::tensor::backend::Backend;

use crate::error::{ClassifierError, Result};
use crate::guidance::{FactSource, RandomFactSource};
use crate::ml::{build_prediction, load_and_scale_image_with_size, ClassProbabilities, InferenceEngine};
use crate::model::{load_class_labels, ModelSettings};
use crate::types::PredictionResult;

pub struct InferenceService {
    labels: Vec<String>,
    network: Option<Box<dyn ClassProbabilities>>,
    facts: Box<dyn FactSource>,
    serve_uninitialized: bool,
}

impl InferenceService {
    /// 設定に従ってラベルと重みを読み込む
    pub fn load<B: Backend>(settings: &ModelSettings, device: B::Device) -> Self {
        let labels = match load_class_labels(&settings.labels_path) {
            Ok(labels) => {
                tracing::info!("クラスラベル ({}): {}", labels.len(), labels.join(", "));
                labels
            }
            Err(e) => {
                // クラス数が決まらないのでネットワークは組み立てない
                tracing::error!("{}", e);
                return Self {
                    labels: Vec::new(),
                    network: None,
                    facts: Box::new(RandomFactSource),
                    serve_uninitialized: settings.serve_uninitialized,
                };
            }
        };

        let engine = InferenceEngine::<B>::load(&settings.weights_path, &labels, device);
        Self::with_network(labels, Box::new(engine), Box::new(RandomFactSource))
            .serve_uninitialized(settings.serve_uninitialized)
    }

    /// 任意のネットワークと豆知識で構築
    pub fn with_network(
        labels: Vec<String>,
        network: Box<dyn ClassProbabilities>,
        facts: Box<dyn FactSource>,
    ) -> Self {
        if network.num_classes() != labels.len() {
            tracing::warn!(
                "ネットワークの出力次元 {} がクラス数 {} と一致しません",
                network.num_classes(),
                labels.len()
            );
        }
        Self {
            labels,
            network: Some(network),
            facts,
            serve_uninitialized: false,
        }
    }

    /// 未準備のモデルでも推論を受け付けるか
    pub fn serve_uninitialized(mut self, enabled: bool) -> Self {
        self.serve_uninitialized = enabled;
        self
    }

    /// 重みまで正しく読み込まれているか
    pub fn is_ready(&self) -> bool {
        self.network.as_ref().is_some_and(|network| network.is_ready())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 画像ファイルを分類する
    pub fn predict(&self, image_path: &Path) -> Result<PredictionResult> {
        let network = self.network.as_ref().ok_or(ClassifierError::ModelNotReady)?;
        if !network.is_ready() && !self.serve_uninitialized {
            return Err(ClassifierError::ModelNotReady);
        }

        let image = load_and_scale_image_with_size(image_path, network.input_size())?;
        let probabilities = network.probabilities(&image)?;
        let result = build_prediction(&self.labels, &probabilities, self.facts.pick())?;

        tracing::debug!(
            "推論結果: {} ({:.2}%){}",
            result.predicted_class,
            result.confidence,
            if result.is_uncertain { " [不確か]" } else { "" }
        );
        Ok(result)
    }
}
