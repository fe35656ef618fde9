//! # MSRResNet-Style Generator
//!
//! A modernized SRResNet: first conv, a trunk of un-normalized residual
//! blocks, nearest+conv upsampling stages, and a bilinear global skip
//! from the input.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::layers::upsample::upsample_bilinear;
use crate::models::generator::{UpconvBlock, upconv_factors};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

fn conv3x3_config(channels: [usize; 2]) -> Conv2dConfig {
    Conv2dConfig::new(channels, [3, 3]).with_padding(PaddingConfig2d::Explicit(1, 1))
}

/// Residual block without normalization: conv/act/conv plus identity.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    /// First conv.
    pub conv1: Conv2d<B>,

    /// Second conv.
    pub conv2: Conv2d<B>,

    /// Mid-block activation.
    pub act: Activation<B>,
}

impl<B: Backend> ResidualBlock<B> {
    fn build(
        channels: usize,
        act: &ActivationConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            conv1: conv3x3_config([channels, channels]).init(device),
            conv2: conv3x3_config([channels, channels]).init(device),
            act: act.init(device),
        }
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.act.forward(self.conv1.forward(input.clone()));
        input + self.conv2.forward(x)
    }
}

/// [`MsrResnet`] Config.
#[derive(Config, Debug)]
pub struct MsrResnetConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Number of output image channels.
    #[config(default = 3)]
    pub out_channels: usize,

    /// Trunk feature channels.
    #[config(default = 64)]
    pub base_channels: usize,

    /// Number of trunk residual blocks.
    #[config(default = 16)]
    pub num_blocks: usize,

    /// Upscaling factor; one of {1, 2, 3, 4}.
    #[config(default = 4)]
    pub scale: usize,
}

impl MsrResnetConfig {
    /// Initialize an [`MsrResnet`].
    ///
    /// # Panics
    ///
    /// If `scale` is not one of {1, 2, 3, 4}.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> MsrResnet<B> {
        assert!(
            matches!(self.scale, 1 | 2 | 3 | 4),
            "MSRResNet scale must be one of {{1, 2, 3, 4}}, got {}",
            self.scale,
        );

        let nf = self.base_channels;
        let act = ActivationConfig::leaky_relu(0.1);

        MsrResnet {
            conv_first: conv3x3_config([self.in_channels, nf]).init(device),
            blocks: (0..self.num_blocks)
                .map(|_| ResidualBlock::build(nf, &act, device))
                .collect(),
            upconvs: upconv_factors(self.scale)
                .into_iter()
                .map(|factor| UpconvBlock {
                    conv: conv3x3_config([nf, nf]).init(device),
                    act: act.init(device),
                    factor,
                })
                .collect(),
            conv_hr: conv3x3_config([nf, nf]).init(device),
            conv_last: conv3x3_config([nf, self.out_channels]).init(device),
            act: act.init(device),
            scale: self.scale,
        }
    }
}

/// MSRResNet-style generator.
#[derive(Module, Debug)]
pub struct MsrResnet<B: Backend> {
    /// Input conv.
    pub conv_first: Conv2d<B>,

    /// Trunk residual blocks.
    pub blocks: Vec<ResidualBlock<B>>,

    /// Upsampling stages.
    pub upconvs: Vec<UpconvBlock<B>>,

    /// High-resolution processing conv.
    pub conv_hr: Conv2d<B>,

    /// Output conv.
    pub conv_last: Conv2d<B>,

    /// Activation.
    pub act: Activation<B>,

    /// Upscaling factor.
    pub scale: usize,
}

impl<B: Backend> MsrResnet<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, height * scale, width * scale]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.conv_first.weight.shape().dims[1])],
        );

        let fea = self.act.forward(self.conv_first.forward(input.clone()));
        let x = self.blocks.iter().fold(fea, |x, block| block.forward(x));

        let x = self.upconvs.iter().fold(x, |x, up| up.forward(x));
        let x = self.conv_last.forward(self.act.forward(self.conv_hr.forward(x)));

        // Learn the residual over a plain interpolation of the input.
        let base = upsample_bilinear(input, self.scale);
        let out = x + base;

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.conv_last.weight.shape().dims[0]),
                ("out_height", height * self.scale),
                ("out_width", width * self.scale)
            ],
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_x4() {
        let device = Default::default();

        let model: MsrResnet<TestBackend> = MsrResnetConfig::new()
            .with_base_channels(8)
            .with_num_blocks(2)
            .init(&device);

        let input = Tensor::zeros([1, 3, 8, 8], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [1, 3, 32, 32]);
    }

    #[test]
    fn test_forward_x3() {
        let device = Default::default();

        let model: MsrResnet<TestBackend> = MsrResnetConfig::new()
            .with_base_channels(8)
            .with_num_blocks(1)
            .with_scale(3)
            .init(&device);

        let input = Tensor::zeros([2, 3, 4, 4], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 3, 12, 12]);
    }

    #[test]
    #[should_panic(expected = "MSRResNet scale must be one of {1, 2, 3, 4}")]
    fn test_invalid_scale() {
        let device = Default::default();
        let _model: MsrResnet<TestBackend> =
            MsrResnetConfig::new().with_scale(8).init(&device);
    }
}
