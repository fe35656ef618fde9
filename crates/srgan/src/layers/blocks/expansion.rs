//! # `ExpansionBlock2d` - upsample-and-merge block.
//!
//! Fuses a coarse feature map into a finer one: the coarse map is
//! upsampled x2 (nearest) and channel-reduced, the fine "passthrough" map
//! is pre-processed, and the two are concatenated and converged back to
//! the target channel count. The U-Net discriminators build their top-down
//! path from these.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::norm::NormalizationConfig;
use crate::layers::upsample::upsample_nearest;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// [`ExpansionBlock2d`] Config.
#[derive(Config, Debug)]
pub struct ExpansionBlock2dConfig {
    /// Channels of the coarse input map.
    pub in_channels: usize,

    /// Channels of the passthrough map, and of the output.
    pub out_channels: usize,

    /// The [`crate::layers::norm::Normalization`] config.
    #[config(default = "NormalizationConfig::group(8)")]
    pub norm: NormalizationConfig,

    /// The [`crate::layers::activation::Activation`] config.
    #[config(default = "ActivationConfig::leaky_relu(0.2)")]
    pub act: ActivationConfig,
}

impl ExpansionBlock2dConfig {
    /// Initialize an [`ExpansionBlock2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ExpansionBlock2d<B> {
        let norm = &self.norm;
        let act = &self.act;

        ExpansionBlock2d {
            decimate: Cna2dConfig::block([self.in_channels, self.out_channels], 1)
                .with_norm(Some(norm.clone()))
                .init(device),
            process_passthrough: Cna2dConfig::block([self.out_channels, self.out_channels], 3)
                .with_bias(true)
                .with_norm(Some(norm.clone()))
                .init(device),
            conjoin: Cna2dConfig::block([self.out_channels * 2, self.out_channels], 3)
                .with_act(Some(act.clone()))
                .init(device),
            process: Cna2dConfig::block([self.out_channels, self.out_channels], 3)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
                .init(device),
        }
    }
}

/// Upsample-and-merge block.
#[derive(Module, Debug)]
pub struct ExpansionBlock2d<B: Backend> {
    /// 1x1 channel reduction applied to the upsampled coarse map.
    pub decimate: Cna2d<B>,

    /// Pre-processing applied to the passthrough map.
    pub process_passthrough: Cna2d<B>,

    /// Convergence conv over the concatenated maps.
    pub conjoin: Cna2d<B>,

    /// Post-processing conv.
    pub process: Cna2d<B>,
}

impl<B: Backend> ExpansionBlock2d<B> {
    /// Channels of the coarse input map.
    pub fn in_channels(&self) -> usize {
        self.decimate.in_channels()
    }

    /// Channels of the passthrough map, and of the output.
    pub fn out_channels(&self) -> usize {
        self.decimate.out_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: the coarse map; ``[batch, in_channels, height, width]``.
    /// - `passthrough`: the fine map; ``[batch, out_channels, height*2, width*2]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, height*2, width*2]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        passthrough: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())],
        );

        let x = upsample_nearest(input, 2);
        let x = self.decimate.forward(x);

        let p = self.process_passthrough.forward(passthrough);

        let x = self.conjoin.forward(Tensor::cat(vec![x, p], 1));
        let x = self.process.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", height * 2),
                ("out_width", width * 2)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_expansion_block() {
        let device = Default::default();

        let block: ExpansionBlock2d<TestBackend> =
            ExpansionBlock2dConfig::new(32, 16).init(&device);

        assert_eq!(block.in_channels(), 32);
        assert_eq!(block.out_channels(), 16);

        let coarse = Tensor::ones([2, 32, 4, 4], &device);
        let fine = Tensor::ones([2, 16, 8, 8], &device);

        let output = block.forward(coarse, fine);
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 2), ("channels", 16), ("height", 8), ("width", 8)],
        );
    }
}
