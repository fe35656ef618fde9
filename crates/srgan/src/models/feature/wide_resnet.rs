//! # Wide-ResNet Feature Trunk
//!
//! The wide-ResNet-50-2 layout (bottleneck blocks at double base width),
//! truncated after the third residual stage: a shallower cut than the VGG
//! extractor, trading depth for width.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::norm::NormalizationConfig;
use crate::models::feature::vgg::imagenet_normalize;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// Bottleneck expansion factor.
const EXPANSION: usize = 4;

/// Wide bottleneck block.
#[derive(Module, Debug)]
pub struct WideBottleneck<B: Backend> {
    /// 1x1 entry conv.
    pub cna1: Cna2d<B>,

    /// 3x3 (possibly strided) conv.
    pub cna2: Cna2d<B>,

    /// 1x1 exit conv; un-activated, the residual joins first.
    pub cna3: Cna2d<B>,

    /// Residual projection, when the shape changes.
    pub downsample: Option<Cna2d<B>>,

    /// Post-residual activation.
    pub act: Activation<B>,
}

impl<B: Backend> WideBottleneck<B> {
    fn build(
        in_channels: usize,
        planes: usize,
        stride: usize,
        base_width: usize,
        device: &B::Device,
    ) -> Self {
        let width = planes * base_width / 64;
        let out_channels = planes * EXPANSION;

        let norm = NormalizationConfig::batch();
        let act = ActivationConfig::Relu;

        let downsample = (stride != 1 || in_channels != out_channels).then(|| {
            Cna2dConfig::block([in_channels, out_channels], 1)
                .with_stride(stride)
                .with_norm(Some(norm.clone()))
                .init(device)
        });

        Self {
            cna1: Cna2dConfig::block([in_channels, width], 1)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
                .init(device),
            cna2: Cna2dConfig::block([width, width], 3)
                .with_stride(stride)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
                .init(device),
            cna3: Cna2dConfig::block([width, out_channels], 1)
                .with_norm(Some(norm))
                .init(device),
            downsample,
            act: act.init(device),
        }
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.cna3.out_channels()
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);
        let x = self.cna3.forward(x);

        self.act.forward(x + identity)
    }
}

/// [`WideResnetExtractor`] Config.
#[derive(Config, Debug)]
pub struct WideResnetExtractorConfig {
    /// Bottleneck base width; 128 doubles the standard ResNet-50 width.
    #[config(default = 128)]
    pub base_width: usize,

    /// Apply the fixed ImageNet input normalization.
    #[config(default = true)]
    pub input_norm: bool,
}

impl WideResnetExtractorConfig {
    /// Initialize a [`WideResnetExtractor`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> WideResnetExtractor<B> {
        let build_layer = |in_channels: usize, planes: usize, blocks: usize, stride: usize| {
            (0..blocks)
                .map(|idx| {
                    let (c_in, s) = if idx == 0 {
                        (in_channels, stride)
                    } else {
                        (planes * EXPANSION, 1)
                    };
                    WideBottleneck::build(c_in, planes, s, self.base_width, device)
                })
                .collect()
        };

        WideResnetExtractor {
            stem: Cna2dConfig::block([3, 64], 7)
                .with_stride(2)
                .with_norm(Some(NormalizationConfig::batch()))
                .with_act(Some(ActivationConfig::Relu))
                .init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),

            layer1: build_layer(64, 64, 3, 1),
            layer2: build_layer(64 * EXPANSION, 128, 4, 2),
            layer3: build_layer(128 * EXPANSION, 256, 6, 2),

            input_norm: self.input_norm,
        }
    }
}

/// Wide-ResNet trunk truncated after the third residual stage.
///
/// Maps ``[batch, 3, height, width]`` to
/// ``[batch, 1024, height / 16, width / 16]``.
#[derive(Module, Debug)]
pub struct WideResnetExtractor<B: Backend> {
    /// 7x7/2 stem conv.
    pub stem: Cna2d<B>,

    /// 3x3/2 stem pool.
    pub pool: MaxPool2d,

    /// First residual stage.
    pub layer1: Vec<WideBottleneck<B>>,

    /// Second residual stage.
    pub layer2: Vec<WideBottleneck<B>>,

    /// Third residual stage.
    pub layer3: Vec<WideBottleneck<B>>,

    /// Apply the fixed ImageNet input normalization.
    pub input_norm: bool,
}

impl<B: Backend> WideResnetExtractor<B> {
    /// Output channels of the truncated trunk.
    pub fn out_channels(&self) -> usize {
        self.layer3
            .last()
            .expect("the third residual stage is never empty")
            .out_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``; height and width must be
    ///   divisible by 16.
    ///
    /// # Returns
    ///
    /// ``[batch, 1024, height / 16, width / 16]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[("channels", 3)],
        );

        let x = if self.input_norm {
            imagenet_normalize(input)
        } else {
            input
        };

        let x = self.stem.forward(x);
        let x = self.pool.forward(x);

        let x = self.layer1.iter().fold(x, |x, block| block.forward(x));
        let x = self.layer2.iter().fold(x, |x, block| block.forward(x));
        self.layer3.iter().fold(x, |x, block| block.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_bottleneck_width() {
        let device = Default::default();

        let block: WideBottleneck<TestBackend> = WideBottleneck::build(64, 64, 1, 128, &device);
        // Doubled base width: 64 * 128 / 64 = 128 inner channels.
        assert_eq!(block.cna1.out_channels(), 128);
        assert_eq!(block.out_channels(), 256);
        assert!(block.downsample.is_some());

        let input = Tensor::zeros([1, 64, 8, 8], &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [1, 256, 8, 8]);
    }

    #[test]
    fn test_extractor_forward() {
        let device = Default::default();

        let extractor: WideResnetExtractor<TestBackend> =
            WideResnetExtractorConfig::new().init(&device);
        assert_eq!(extractor.out_channels(), 1024);
        assert_eq!(extractor.layer1.len(), 3);
        assert_eq!(extractor.layer2.len(), 4);
        assert_eq!(extractor.layer3.len(), 6);

        let input = Tensor::zeros([1, 3, 32, 32], &device);
        let output = extractor.forward(input);
        assert_eq!(output.dims(), [1, 1024, 2, 2]);
    }
}
