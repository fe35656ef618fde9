//! # RRDB Generator
//!
//! The ESRGAN-lineage generator: a trunk of residual-in-residual dense
//! blocks with growth channels and residual scaling, a global trunk skip,
//! and nearest+conv upsampling stages.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::models::generator::{UpconvBlock, upconv_factors};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// Residual branch scaling inside the dense blocks.
const RESIDUAL_SCALE: f64 = 0.2;

fn conv3x3_config(channels: [usize; 2]) -> Conv2dConfig {
    Conv2dConfig::new(channels, [3, 3]).with_padding(PaddingConfig2d::Explicit(1, 1))
}

/// Five-conv dense block: every conv sees the concatenation of the block
/// input and all previous conv outputs.
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    /// Growth convs; the i-th maps ``channels + i * growth`` to ``growth``.
    pub convs: Vec<Conv2d<B>>,

    /// Fusion conv collapsing the accumulated features back to the block
    /// width.
    pub fuse: Conv2d<B>,

    /// Activation after each growth conv.
    pub act: Activation<B>,
}

impl<B: Backend> DenseBlock<B> {
    fn build(
        channels: usize,
        growth: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            convs: (0..4)
                .map(|idx| conv3x3_config([channels + idx * growth, growth]).init(device))
                .collect(),
            fuse: conv3x3_config([channels + 4 * growth, channels]).init(device),
            act: ActivationConfig::leaky_relu(0.2).init(device),
        }
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let mut features = vec![input.clone()];
        for conv in &self.convs {
            let x = self.act.forward(conv.forward(Tensor::cat(features.clone(), 1)));
            features.push(x);
        }
        self.fuse.forward(Tensor::cat(features, 1)) * RESIDUAL_SCALE + input
    }
}

/// Residual-in-residual dense block: three [`DenseBlock`]s under a scaled
/// outer residual.
#[derive(Module, Debug)]
pub struct Rrdb<B: Backend> {
    /// The nested dense blocks.
    pub blocks: Vec<DenseBlock<B>>,
}

impl<B: Backend> Rrdb<B> {
    fn build(
        channels: usize,
        growth: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            blocks: (0..3)
                .map(|_| DenseBlock::build(channels, growth, device))
                .collect(),
        }
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self
            .blocks
            .iter()
            .fold(input.clone(), |x, block| block.forward(x));
        x * RESIDUAL_SCALE + input
    }
}

/// [`RrdbNet`] Config.
#[derive(Config, Debug)]
pub struct RrdbNetConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Number of output image channels.
    #[config(default = 3)]
    pub out_channels: usize,

    /// Trunk feature channels.
    #[config(default = 64)]
    pub base_channels: usize,

    /// Number of trunk RRDB blocks.
    #[config(default = 23)]
    pub num_blocks: usize,

    /// Dense-block growth channels.
    #[config(default = 32)]
    pub growth_channels: usize,

    /// Upscaling factor; 1 or a power of two.
    #[config(default = 4)]
    pub scale: usize,
}

impl RrdbNetConfig {
    /// Initialize an [`RrdbNet`].
    ///
    /// # Panics
    ///
    /// If `scale` is not 1 or a power of two.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> RrdbNet<B> {
        assert!(
            self.scale.is_power_of_two(),
            "RRDB scale must be 1 or a power of two, got {}",
            self.scale,
        );

        let nf = self.base_channels;
        let act = ActivationConfig::leaky_relu(0.2);

        RrdbNet {
            conv_first: conv3x3_config([self.in_channels, nf]).init(device),
            blocks: (0..self.num_blocks)
                .map(|_| Rrdb::build(nf, self.growth_channels, device))
                .collect(),
            trunk_conv: conv3x3_config([nf, nf]).init(device),
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

/// RRDB generator.
#[derive(Module, Debug)]
pub struct RrdbNet<B: Backend> {
    /// Input conv.
    pub conv_first: Conv2d<B>,

    /// Trunk RRDB blocks.
    pub blocks: Vec<Rrdb<B>>,

    /// Trunk output conv, joined back to the input features.
    pub trunk_conv: Conv2d<B>,

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

impl<B: Backend> RrdbNet<B> {
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

        let fea = self.conv_first.forward(input);
        let trunk = self
            .blocks
            .iter()
            .fold(fea.clone(), |x, block| block.forward(x));
        let fea = fea + self.trunk_conv.forward(trunk);

        let x = self.upconvs.iter().fold(fea, |x, up| up.forward(x));
        let out = self.conv_last.forward(self.act.forward(self.conv_hr.forward(x)));

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
    fn test_dense_block_preserves_shape() {
        let device = Default::default();

        let block: DenseBlock<TestBackend> = DenseBlock::build(8, 4, &device);

        let input = Tensor::zeros([1, 8, 6, 6], &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [1, 8, 6, 6]);
    }

    #[test]
    fn test_forward_x4() {
        let device = Default::default();

        let model: RrdbNet<TestBackend> = RrdbNetConfig::new()
            .with_base_channels(8)
            .with_num_blocks(1)
            .with_growth_channels(4)
            .init(&device);

        let input = Tensor::zeros([1, 3, 4, 4], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [1, 3, 16, 16]);
    }

    #[test]
    #[should_panic(expected = "RRDB scale must be 1 or a power of two")]
    fn test_invalid_scale() {
        let device = Default::default();
        let _model: RrdbNet<TestBackend> = RrdbNetConfig::new().with_scale(3).init(&device);
    }
}
