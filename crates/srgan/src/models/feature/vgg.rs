//! # VGG-19 Feature Backbone and Extractors
//!
//! The feature stack is laid out torchvision-style (conv/act/pool layer
//! sequence, optionally batch-normed) so truncation indices and
//! pretrained weights line up with the original artifacts.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::norm::NormalizationConfig;
use crate::layers::upsample::upsample_bicubic;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// ImageNet per-channel mean, for inputs in ``[0, 1]``.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation, for inputs in ``[0, 1]``.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Apply the fixed ImageNet input normalization.
///
/// The constants assume inputs in ``[0, 1]``; callers using ``[-1, 1]``
/// images rescale before this.
pub fn imagenet_normalize<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = input.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);
    (input - mean) / std
}

/// One operation in the torchvision VGG feature layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggPlanOp {
    /// 3x3 "same" convolution.
    Conv {
        /// Input channels.
        in_channels: usize,
        /// Output channels.
        out_channels: usize,
    },

    /// Batch normalization.
    Norm {
        /// Normalized channels.
        channels: usize,
    },

    /// ReLU.
    Act,

    /// 2x2/2 max pool.
    Pool,
}

/// The torchvision VGG-19 feature layout.
///
/// Indices into this plan match torchvision's `features` indices, so
/// truncation layers and pretrained-weight keys line up.
pub fn vgg19_plan(
    in_channels: usize,
    batch_norm: bool,
) -> Vec<VggPlanOp> {
    let stages: [(usize, usize); 5] = [(64, 2), (128, 2), (256, 4), (512, 4), (512, 4)];

    let mut ops = Vec::new();
    let mut prev = in_channels;
    for (width, convs) in stages {
        for _ in 0..convs {
            ops.push(VggPlanOp::Conv {
                in_channels: prev,
                out_channels: width,
            });
            if batch_norm {
                ops.push(VggPlanOp::Norm { channels: width });
            }
            ops.push(VggPlanOp::Act);
            prev = width;
        }
        ops.push(VggPlanOp::Pool);
    }
    ops
}

/// One layer of a [`VggFeatures`] stack.
#[derive(Module, Debug)]
pub enum VggLayer<B: Backend> {
    /// 3x3 "same" convolution.
    Conv(Conv2d<B>),

    /// Batch normalization.
    Norm(BatchNorm<B, 2>),

    /// ReLU.
    Act(Relu),

    /// 2x2/2 max pool.
    Pool(MaxPool2d),
}

impl<B: Backend> VggLayer<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            VggLayer::Conv(layer) => layer.forward(input),
            VggLayer::Norm(layer) => layer.forward(input),
            VggLayer::Act(layer) => layer.forward(input),
            VggLayer::Pool(layer) => layer.forward(input),
        }
    }
}

/// [`VggFeatures`] Config.
#[derive(Config, Debug)]
pub struct VggFeaturesConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Interleave batch normalization (the `vgg19_bn` layout).
    #[config(default = false)]
    pub batch_norm: bool,

    /// Truncation index into the torchvision layout, inclusive.
    ///
    /// The defaults used by the extractors are 34 (plain) and 49
    /// (batch-normed): the last convolution, before its ReLU.
    #[config(default = 34)]
    pub truncate_at: usize,
}

impl VggFeaturesConfig {
    /// Initialize a [`VggFeatures`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> VggFeatures<B> {
        let layers = vgg19_plan(self.in_channels, self.batch_norm)
            .into_iter()
            .take(self.truncate_at + 1)
            .map(|op| match op {
                VggPlanOp::Conv {
                    in_channels,
                    out_channels,
                } => VggLayer::Conv(
                    Conv2dConfig::new([in_channels, out_channels], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                ),
                VggPlanOp::Norm { channels } => {
                    VggLayer::Norm(BatchNormConfig::new(channels).init(device))
                }
                VggPlanOp::Act => VggLayer::Act(Relu),
                VggPlanOp::Pool => VggLayer::Pool(
                    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                ),
            })
            .collect();

        VggFeatures { layers }
    }
}

/// Truncated VGG feature stack.
#[derive(Module, Debug)]
pub struct VggFeatures<B: Backend> {
    /// The layer sequence.
    pub layers: Vec<VggLayer<B>>,
}

impl<B: Backend> VggFeatures<B> {
    /// Output channels of the truncated stack.
    pub fn out_channels(&self) -> usize {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| match layer {
                VggLayer::Conv(conv) => Some(conv.weight.shape().dims[0]),
                _ => None,
            })
            .expect("a VGG feature stack holds at least one convolution")
    }

    /// Overall spatial reduction of the truncated stack.
    pub fn downsample_factor(&self) -> usize {
        let pools = self
            .layers
            .iter()
            .filter(|layer| matches!(layer, VggLayer::Pool(_)))
            .count();
        1 << pools
    }

    /// Whether the stack interleaves batch normalization.
    pub fn batch_norm(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| matches!(layer, VggLayer::Norm(_)))
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.layers
            .iter()
            .fold(input, |x, layer| layer.forward(x))
    }
}

/// [`VggFeatureExtractor`] Config.
#[derive(Config, Debug)]
pub struct VggFeatureExtractorConfig {
    /// Truncation index into the torchvision layout, inclusive.
    #[config(default = 34)]
    pub feature_layer: usize,

    /// Use the batch-normed backbone layout.
    #[config(default = false)]
    pub batch_norm: bool,

    /// Apply the fixed ImageNet input normalization.
    #[config(default = true)]
    pub input_norm: bool,
}

impl VggFeatureExtractorConfig {
    /// Initialize a [`VggFeatureExtractor`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> VggFeatureExtractor<B> {
        VggFeatureExtractor {
            features: VggFeaturesConfig::new()
                .with_batch_norm(self.batch_norm)
                .with_truncate_at(self.feature_layer)
                .init(device),
            input_norm: self.input_norm,
        }
    }
}

/// VGG feature extractor.
///
/// Whether this instance is the frozen reference or the trainable copy is
/// decided by the factory: the frozen variant has pretrained weights
/// loaded and gradient tracking disabled after construction.
#[derive(Module, Debug)]
pub struct VggFeatureExtractor<B: Backend> {
    /// The truncated backbone.
    pub features: VggFeatures<B>,

    /// Apply the fixed ImageNet input normalization.
    pub input_norm: bool,
}

impl<B: Backend> VggFeatureExtractor<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``.
    /// - `pre_upsample`: integer bicubic upsampling factor applied before
    ///   normalization; 1 is the identity.
    ///
    /// # Returns
    ///
    /// The truncated backbone activations.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        pre_upsample: usize,
    ) -> Tensor<B, 4> {
        let x = upsample_bicubic(input, pre_upsample);
        let x = if self.input_norm {
            imagenet_normalize(x)
        } else {
            x
        };
        self.features.forward(x)
    }
}

/// [`QualityVggExtractor`] Config.
#[derive(Config, Debug)]
pub struct QualityVggExtractorConfig {
    /// Truncation index into the torchvision layout, inclusive.
    #[config(default = 34)]
    pub feature_layer: usize,

    /// Use the batch-normed backbone layout.
    #[config(default = false)]
    pub batch_norm: bool,

    /// Apply the fixed ImageNet input normalization.
    #[config(default = true)]
    pub input_norm: bool,
}

impl QualityVggExtractorConfig {
    /// Initialize a [`QualityVggExtractor`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> QualityVggExtractor<B> {
        let base = VggFeatureExtractorConfig::new()
            .with_feature_layer(self.feature_layer)
            .with_batch_norm(self.batch_norm)
            .with_input_norm(self.input_norm)
            .init(device);

        let head_in = base.features.out_channels();
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        QualityVggExtractor {
            qual1: Cna2dConfig::block([head_in, head_in / 2], 3)
                .with_bias(true)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
                .init(device),
            qual2: Cna2dConfig::block([head_in / 2, head_in / 4], 3)
                .with_norm(Some(norm))
                .with_act(Some(act))
                .init(device),
            qual3: Cna2dConfig::block([head_in / 4, 1], 3).init(device),
            base,
        }
    }
}

/// Trainable VGG extractor with a quality-scoring head.
///
/// The head collapses the truncated feature map to a single-channel
/// quality score map, returned alongside the features.
#[derive(Module, Debug)]
pub struct QualityVggExtractor<B: Backend> {
    /// The backbone extractor.
    pub base: VggFeatureExtractor<B>,

    /// First head unit.
    pub qual1: Cna2d<B>,
    /// Second head unit.
    pub qual2: Cna2d<B>,
    /// Collapse to a single channel.
    pub qual3: Cna2d<B>,
}

impl<B: Backend> QualityVggExtractor<B> {
    /// Forward Pass.
    ///
    /// # Returns
    ///
    /// ``(features, quality)``; the quality map shares the feature map's
    /// resolution.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        pre_upsample: usize,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let features = self.base.forward(input, pre_upsample);

        let [_batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &features,
            &["batch"],
            &[("channels", self.qual1.in_channels())],
        );

        let quality = self.qual1.forward(features.clone());
        let quality = self.qual2.forward(quality);
        let quality = self.qual3.forward(quality);

        (features, quality)
    }
}
