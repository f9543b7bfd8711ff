//! EfficientNet-B0 特徴抽出器（分類層なし）
//!
//! ImageNetで事前学習されたKeras版EfficientNet-B0と同じ層構成です。
//! 重みの互換性のため、以下を揃えています：
//! - BatchNorm epsilon = 1e-3
//! - 活性化関数は swish (SiLU)
//! - stride 2 の畳み込みは非対称ゼロパディング（前 k/2-1、後 k/2）

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};

/// MBConvステージの設定
#[derive(Config, Debug)]
pub struct StageConfig {
    /// 深さ方向畳み込みのカーネルサイズ
    pub kernel_size: usize,
    /// ブロックの繰り返し数
    pub repeats: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    /// 拡張率（1なら拡張用1x1畳み込みを省略）
    pub expand_ratio: usize,
    /// 先頭ブロックのstride
    pub stride: usize,
}

/// 特徴抽出器の設定
#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    pub stages: Vec<StageConfig>,
    #[config(default = 32)]
    pub stem_channels: usize,
    #[config(default = 1280)]
    pub top_channels: usize,
    /// Squeeze-and-Excitation の縮小率（ブロック入力チャネルに対する比）
    #[config(default = 0.25)]
    pub se_ratio: f64,
    #[config(default = 1e-3)]
    pub bn_epsilon: f64,
}

impl EfficientNetConfig {
    /// EfficientNet-B0 の標準構成
    pub fn b0() -> Self {
        Self::new(vec![
            StageConfig::new(3, 1, 32, 16, 1, 1),
            StageConfig::new(3, 2, 16, 24, 6, 2),
            StageConfig::new(5, 2, 24, 40, 6, 2),
            StageConfig::new(3, 3, 40, 80, 6, 2),
            StageConfig::new(5, 3, 80, 112, 6, 1),
            StageConfig::new(5, 4, 112, 192, 6, 2),
            StageConfig::new(3, 1, 192, 320, 6, 1),
        ])
    }

    /// テスト用の縮小構成（出力16チャネル）
    #[cfg(test)]
    pub(crate) fn tiny() -> Self {
        Self::new(vec![
            StageConfig::new(3, 1, 8, 8, 1, 1),
            StageConfig::new(5, 2, 8, 12, 2, 2),
        ])
        .with_stem_channels(8)
        .with_top_channels(16)
    }

    /// 特徴抽出器を初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let bn = |channels: usize| {
            BatchNormConfig::new(channels)
                .with_epsilon(self.bn_epsilon)
                .init(device)
        };

        let stem = Conv2dConfig::new([3, self.stem_channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Valid)
            .with_bias(false)
            .init(device);

        let mut blocks = Vec::new();
        for stage in &self.stages {
            for i in 0..stage.repeats {
                // ステージ先頭のみチャネル変更とstrideを適用
                let (in_channels, stride) = if i == 0 {
                    (stage.in_channels, stage.stride)
                } else {
                    (stage.out_channels, 1)
                };
                blocks.push(self.init_block(
                    in_channels,
                    stage.out_channels,
                    stage.kernel_size,
                    stage.expand_ratio,
                    stride,
                    device,
                ));
            }
        }

        let last_channels = self
            .stages
            .last()
            .map(|s| s.out_channels)
            .unwrap_or(self.stem_channels);

        EfficientNet {
            stem,
            stem_bn: bn(self.stem_channels),
            blocks,
            top: Conv2dConfig::new([last_channels, self.top_channels], [1, 1])
                .with_bias(false)
                .init(device),
            top_bn: bn(self.top_channels),
        }
    }

    fn init_block<B: Backend>(
        &self,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        expand_ratio: usize,
        stride: usize,
        device: &B::Device,
    ) -> MbConvBlock<B> {
        let bn = |channels: usize| {
            BatchNormConfig::new(channels)
                .with_epsilon(self.bn_epsilon)
                .init(device)
        };
        let expanded = in_channels * expand_ratio;
        let se_channels = ((in_channels as f64 * self.se_ratio) as usize).max(1);

        let expand = if expand_ratio != 1 {
            Some(ConvBn {
                conv: Conv2dConfig::new([in_channels, expanded], [1, 1])
                    .with_bias(false)
                    .init(device),
                bn: bn(expanded),
            })
        } else {
            None
        };

        // stride 1 は左右対称の "same"、stride 2 は forward 内で手動パディング
        let depthwise_padding = if stride == 1 {
            PaddingConfig2d::Explicit(kernel_size / 2, kernel_size / 2)
        } else {
            PaddingConfig2d::Valid
        };

        MbConvBlock {
            expand,
            depthwise: Conv2dConfig::new([expanded, expanded], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(depthwise_padding)
                .with_groups(expanded)
                .with_bias(false)
                .init(device),
            depthwise_bn: bn(expanded),
            se_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            se_reduce: Conv2dConfig::new([expanded, se_channels], [1, 1]).init(device),
            se_expand: Conv2dConfig::new([se_channels, expanded], [1, 1]).init(device),
            project: Conv2dConfig::new([expanded, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            project_bn: bn(out_channels),
            kernel_size,
            stride,
            residual: stride == 1 && in_channels == out_channels,
        }
    }
}

/// 1x1畳み込み + BatchNorm + swish
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        silu(self.bn.forward(self.conv.forward(x)))
    }
}

/// Mobile Inverted Bottleneck ブロック（SE付き）
#[derive(Module, Debug)]
pub struct MbConvBlock<B: Backend> {
    expand: Option<ConvBn<B>>,
    depthwise: Conv2d<B>,
    depthwise_bn: BatchNorm<B>,
    se_pool: AdaptiveAvgPool2d,
    se_reduce: Conv2d<B>,
    se_expand: Conv2d<B>,
    project: Conv2d<B>,
    project_bn: BatchNorm<B>,
    kernel_size: usize,
    stride: usize,
    residual: bool,
}

impl<B: Backend> MbConvBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };

        let x = if self.stride == 2 {
            correct_pad(x, self.kernel_size)
        } else {
            x
        };
        let x = silu(self.depthwise_bn.forward(self.depthwise.forward(x)));

        // Squeeze-and-Excitation
        let se = self.se_pool.forward(x.clone());
        let se = silu(self.se_reduce.forward(se));
        let se = sigmoid(self.se_expand.forward(se));
        let x = x.mul(se);

        let x = self.project_bn.forward(self.project.forward(x));

        // 推論時の drop connect は恒等写像
        if self.residual {
            x.add(input)
        } else {
            x
        }
    }
}

/// EfficientNet-B0 本体
///
/// # 入出力
/// - 入力: 正規化済み画像 [batch, 3, H, W]
/// - 出力: 特徴マップ [batch, top_channels, H/32, W/32]
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B>,
    blocks: Vec<MbConvBlock<B>>,
    top: Conv2d<B>,
    top_bn: BatchNorm<B>,
}

impl<B: Backend> EfficientNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = correct_pad(images, 3);
        let mut x = silu(self.stem_bn.forward(self.stem.forward(x)));

        for block in &self.blocks {
            x = block.forward(x);
        }

        silu(self.top_bn.forward(self.top.forward(x)))
    }

    /// ブロック数
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// stride 2 畳み込み用のゼロパディング
///
/// 偶数サイズの入力では前側を1つ少なくします（Kerasの `correct_pad` と同じ）。
pub fn correct_pad<B: Backend>(x: Tensor<B, 4>, kernel_size: usize) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    let after = kernel_size / 2;
    let before_h = if height % 2 == 0 { after.saturating_sub(1) } else { after };
    let before_w = if width % 2 == 0 { after.saturating_sub(1) } else { after };

    let x = zero_pad_dim(x, 2, before_h, after);
    zero_pad_dim(x, 3, before_w, after)
}

fn zero_pad_dim<B: Backend>(x: Tensor<B, 4>, dim: usize, before: usize, after: usize) -> Tensor<B, 4> {
    if before == 0 && after == 0 {
        return x;
    }

    let device = x.device();
    let dims = x.dims();
    let zeros = |size: usize| {
        let mut shape = dims;
        shape[dim] = size;
        Tensor::<B, 4>::zeros(shape, &device)
    };

    let mut parts = Vec::with_capacity(3);
    if before > 0 {
        parts.push(zeros(before));
    }
    parts.push(x);
    if after > 0 {
        parts.push(zeros(after));
    }
    Tensor::cat(parts, dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_b0_block_count() {
        let config = EfficientNetConfig::b0();
        let repeats: usize = config.stages.iter().map(|s| s.repeats).sum();
        assert_eq!(repeats, 16);
        assert_eq!(config.top_channels, 1280);
        assert_eq!(config.bn_epsilon, 1e-3);
    }

    #[test]
    fn test_correct_pad_even_input() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 2, 8, 8], &device);
        let padded = correct_pad(x, 5);
        // 前1、後2
        assert_eq!(padded.dims(), [1, 2, 11, 11]);

        let values = padded.into_data().to_vec::<f32>().unwrap();
        // 先頭行はゼロ、2行目(index 1)の2列目から値が入る
        assert_eq!(values[0], 0.0);
        assert_eq!(values[11 + 1], 1.0);
        assert_eq!(values[11], 0.0);
    }

    #[test]
    fn test_correct_pad_odd_input() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 7, 7], &device);
        assert_eq!(correct_pad(x, 3).dims(), [1, 1, 9, 9]);
    }

    #[test]
    fn test_tiny_forward_shape() {
        let device = Default::default();
        let config = EfficientNetConfig::tiny();
        let model = config.init::<TestBackend>(&device);
        assert_eq!(model.num_blocks(), 3);

        let x = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let features = model.forward(x);
        // stem stride 2 + ステージ2 stride 2 -> 1/4
        assert_eq!(features.dims(), [1, 16, 8, 8]);
    }
}
