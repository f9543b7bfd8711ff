//! ごみ分類モデルの定義
//!
//! 入力変換 → EfficientNet-B0 特徴抽出器（凍結）→ Global Average Pooling →
//! 分類ヘッド（2種類）→ 全結合 + Softmax の順に組み立てます。

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::ml::efficientnet::{EfficientNet, EfficientNetConfig};
use crate::model::is_model_bundle;

/// 入力画像サイズ（正方形）
pub const IMAGE_SIZE: usize = 224;

/// 「改良版」ヘッドで学習した重みファイル名に含まれる目印
pub const IMPROVED_MARKER: &str = "Improved";

/// ImageNetの平均と標準偏差（RGB）
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 分類ヘッドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadVariant {
    /// Dense(256) → BN → Dropout(0.3) → Dense(128) → BN → Dropout(0.2)
    Improved,
    /// Dense(128) のみ
    Compact,
}

impl HeadVariant {
    /// 重みファイルから使用するヘッドを決める
    ///
    /// バンドルのメタデータで明示されていればそれを優先し、
    /// なければファイル名（目印 `Improved`、またはバンドル形式）で判定します。
    pub fn for_weights(weights_path: &Path, declared: Option<HeadVariant>) -> Self {
        if let Some(variant) = declared {
            return variant;
        }

        let file_name = weights_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        if file_name.contains(IMPROVED_MARKER) || is_model_bundle(weights_path) {
            HeadVariant::Improved
        } else {
            HeadVariant::Compact
        }
    }
}

impl std::fmt::Display for HeadVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadVariant::Improved => write!(f, "improved"),
            HeadVariant::Compact => write!(f, "compact"),
        }
    }
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 分類ヘッドの種類
    pub head: HeadVariant,
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
    /// 特徴抽出器の構成
    #[config(default = "EfficientNetConfig::b0()")]
    pub backbone: EfficientNetConfig,
}

impl ModelConfig {
    /// モデルを初期化
    ///
    /// 特徴抽出器は凍結（勾配なし）で作成します。推論のみで使う前提です。
    pub fn init<B: Backend>(&self, device: &B::Device) -> WasteClassifierModel<B> {
        let backbone = self.backbone.init::<B>(device).no_grad();
        let features = self.backbone.top_channels;

        let bn = |size: usize| BatchNormConfig::new(size).with_epsilon(1e-3).init(device);

        let head = match self.head {
            HeadVariant::Improved => ClassifierHead::Improved(ImprovedHead {
                dense1: LinearConfig::new(features, 256).init(device),
                bn1: bn(256),
                dropout1: DropoutConfig::new(0.3).init(),
                dense2: LinearConfig::new(256, 128).init(device),
                bn2: bn(128),
                dropout2: DropoutConfig::new(0.2).init(),
                activation: Relu::new(),
            }),
            HeadVariant::Compact => ClassifierHead::Compact(CompactHead {
                dense: LinearConfig::new(features, 128).init(device),
                activation: Relu::new(),
            }),
        };

        tracing::debug!(
            "モデル構成: 入力 {}x{}, 特徴 {}, ヘッド {}, クラス数 {}",
            self.image_size,
            self.image_size,
            features,
            self.head,
            self.num_classes
        );

        WasteClassifierModel {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head,
            output: LinearConfig::new(128, self.num_classes).init(device),
        }
    }
}

/// 改良版ヘッド
#[derive(Module, Debug)]
pub struct ImprovedHead<B: Backend> {
    dense1: Linear<B>,
    bn1: BatchNorm<B>,
    dropout1: Dropout,
    dense2: Linear<B>,
    bn2: BatchNorm<B>,
    dropout2: Dropout,
    activation: Relu,
}

/// 単層ヘッド
#[derive(Module, Debug)]
pub struct CompactHead<B: Backend> {
    dense: Linear<B>,
    activation: Relu,
}

/// 分類ヘッド
#[derive(Module, Debug)]
pub enum ClassifierHead<B: Backend> {
    Improved(ImprovedHead<B>),
    Compact(CompactHead<B>),
}

impl<B: Backend> ClassifierHead<B> {
    /// # 入出力
    /// - 入力: [batch, features]
    /// - 出力: [batch, 128]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            ClassifierHead::Improved(head) => {
                let x = head.activation.forward(head.dense1.forward(x));
                let x = head.dropout1.forward(head.bn1.forward(x));
                let x = head.activation.forward(head.dense2.forward(x));
                head.dropout2.forward(head.bn2.forward(x))
            }
            ClassifierHead::Compact(head) => head.activation.forward(head.dense.forward(x)),
        }
    }

    pub fn variant(&self) -> HeadVariant {
        match self {
            ClassifierHead::Improved(_) => HeadVariant::Improved,
            ClassifierHead::Compact(_) => HeadVariant::Compact,
        }
    }

    /// 全結合層の数（出力層を除く）
    pub fn num_dense_layers(&self) -> usize {
        match self {
            ClassifierHead::Improved(_) => 2,
            ClassifierHead::Compact(_) => 1,
        }
    }
}

/// ごみ分類モデル
///
/// # アーキテクチャ
/// - 入力: [0, 1] に正規化済みのRGB画像
/// - 入力変換: ×255 で画素値域に戻し、ImageNet平均・標準偏差で正規化
/// - EfficientNet-B0（分類層なし、凍結）
/// - Global Average Pooling
/// - 分類ヘッド（Improved / Compact）
/// - FC: 128 -> num_classes + Softmax
#[derive(Module, Debug)]
pub struct WasteClassifierModel<B: Backend> {
    backbone: EfficientNet<B>,
    pool: AdaptiveAvgPool2d,
    head: ClassifierHead<B>,
    output: Linear<B>,
}

impl<B: Backend> WasteClassifierModel<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]（値域 [0, 1]）
    ///
    /// # 戻り値
    /// - クラスごとの確率 [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // 2段階の入力変換は学習時と同じ順序で適用すること
        let x = scale_to_pixel_range(images);
        let x = imagenet_normalize(x);

        let features = self.backbone.forward(x);
        let pooled = self.pool.forward(features);
        let [batch_size, channels, _, _] = pooled.dims();
        let x = pooled.reshape([batch_size, channels]);

        let x = self.head.forward(x);
        softmax(self.output.forward(x), 1)
    }

    pub fn head(&self) -> &ClassifierHead<B> {
        &self.head
    }

    pub fn head_variant(&self) -> HeadVariant {
        self.head.variant()
    }
}

/// [0, 1] の入力を [0, 255] に戻す
pub fn scale_to_pixel_range<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    images.mul_scalar(255.0)
}

/// [0, 255] の画像をImageNet平均・標準偏差で正規化
pub fn imagenet_normalize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

    images.div_scalar(255.0).sub(mean).div(std)
}

/// 前処理済み画像
///
/// 値域 [0, 1]、(C, H, W) の順で平坦化したRGBデータ。
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub data: Vec<f32>,
    pub size: usize,
}

impl PreprocessedImage {
    /// バッチ次元を付けたテンソル [1, 3, size, size] に変換
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 1>::from_floats(self.data.as_slice(), device)
            .reshape([1, 3, self.size, self.size])
    }
}

/// 画像を読み込んで [0, 1] に正規化（サイズ指定版）
///
/// 縦横比は保持せず `size`x`size` にリサイズします（最近傍補間）。
/// ファイル形式は拡張子ではなく内容から判定します。
pub fn load_and_scale_image_with_size(
    path: &Path,
    size: usize,
) -> crate::error::Result<PreprocessedImage> {
    let decode_error = |reason: String| ClassifierError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let img = image::ImageReader::open(path)
        .map_err(|e| decode_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?;

    let img = img
        .resize_exact(size as u32, size as u32, FilterType::Nearest)
        .to_rgb8();

    let mut data = Vec::with_capacity(3 * size * size);
    for channel in 0..3 {
        for y in 0..size as u32 {
            for x in 0..size as u32 {
                let pixel = img.get_pixel(x, y);
                data.push(pixel[channel] as f32 / 255.0);
            }
        }
    }

    Ok(PreprocessedImage { data, size })
}

/// 画像を読み込んで [0, 1] に正規化（デフォルトサイズ版）
pub fn load_and_scale_image(path: &Path) -> crate::error::Result<PreprocessedImage> {
    load_and_scale_image_with_size(path, IMAGE_SIZE)
}
