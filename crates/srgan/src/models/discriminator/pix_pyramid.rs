//! # Pixel-Loss Pyramid Discriminator
//!
//! A group-normalized VGG trunk followed by a top-down pyramid producing
//! per-pixel score maps at three resolutions. The maps are brought to a
//! common resolution so every level carries equal weight, then stacked
//! into the batch dimension for the consuming loss.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::norm::NormalizationConfig;
use crate::layers::upsample::upsample_nearest;
use crate::models::discriminator::{DownStage, stack_level_scores};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// [`PixPyramidDiscriminator`] Config.
#[derive(Config, Debug)]
pub struct PixPyramidDiscriminatorConfig {
    /// Number of input image channels.
    pub in_channels: usize,

    /// Base feature channels.
    pub base_channels: usize,
}

impl PixPyramidDiscriminatorConfig {
    /// Initialize a [`PixPyramidDiscriminator`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> PixPyramidDiscriminator<B> {
        let nf = self.base_channels;
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        let cna = |channels: [usize; 2], kernel: usize| {
            Cna2dConfig::block(channels, kernel)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
        };

        let stage_channels = [
            [self.in_channels, nf],
            [nf, nf * 2],
            [nf * 2, nf * 4],
            [nf * 4, nf * 8],
            [nf * 8, nf * 8],
        ];
        let stages = stage_channels
            .into_iter()
            .enumerate()
            .map(|(idx, [c_in, c_out])| {
                let expand = if idx == 0 {
                    Cna2dConfig::block([c_in, c_out], 3)
                        .with_bias(true)
                        .with_act(Some(act.clone()))
                } else {
                    cna([c_in, c_out], 3)
                };
                DownStage {
                    expand: expand.init(device),
                    reduce: cna([c_out, c_out], 4).with_stride(2).init(device),
                }
            })
            .collect();

        PixPyramidDiscriminator {
            stages,

            reduce: cna([nf * 8, nf * 4], 3).init(device),
            collapse: Cna2dConfig::block([nf * 4, 1], 3).init(device),

            up3_decimate: Cna2dConfig::block([nf * 8, nf * 8], 3)
                .with_bias(true)
                .with_norm(Some(norm.clone()))
                .init(device),
            up3_converge: cna([nf * 16, nf * 8], 3).init(device),
            up3_process: cna([nf * 8, nf * 8], 3).init(device),
            up3_reduce: cna([nf * 8, nf * 4], 3).init(device),
            up3_collapse: Cna2dConfig::block([nf * 4, 1], 3).init(device),

            up2_decimate: Cna2dConfig::block([nf * 8, nf * 4], 1)
                .with_bias(true)
                .with_norm(Some(norm.clone()))
                .init(device),
            up2_converge: cna([nf * 8, nf * 4], 3).init(device),
            up2_process: cna([nf * 4, nf * 4], 3).init(device),
            up2_reduce: cna([nf * 4, nf * 2], 3).init(device),
            up2_collapse: Cna2dConfig::block([nf * 2, 1], 3).init(device),
        }
    }
}

/// Pyramid discriminator producing scores at three resolutions.
#[derive(Module, Debug)]
pub struct PixPyramidDiscriminator<B: Backend> {
    /// Downsampling trunk; each stage halves the resolution.
    pub stages: Vec<DownStage<B>>,

    /// Channel reduction ahead of the coarsest score map.
    pub reduce: Cna2d<B>,
    /// Coarsest (1/32) score collapse.
    pub collapse: Cna2d<B>,

    /// 1/16 level: channel adjustment of the upsampled trunk output.
    pub up3_decimate: Cna2d<B>,
    /// 1/16 level: convergence over the skip concatenation.
    pub up3_converge: Cna2d<B>,
    /// 1/16 level: post-merge processing.
    pub up3_process: Cna2d<B>,
    /// 1/16 level: channel reduction ahead of the collapse.
    pub up3_reduce: Cna2d<B>,
    /// 1/16 level: score collapse.
    pub up3_collapse: Cna2d<B>,

    /// 1/8 level: channel adjustment of the upsampled 1/16 features.
    pub up2_decimate: Cna2d<B>,
    /// 1/8 level: convergence over the skip concatenation.
    pub up2_converge: Cna2d<B>,
    /// 1/8 level: post-merge processing.
    pub up2_process: Cna2d<B>,
    /// 1/8 level: channel reduction ahead of the collapse.
    pub up2_reduce: Cna2d<B>,
    /// 1/8 level: score collapse.
    pub up2_collapse: Cna2d<B>,
}

impl<B: Backend> PixPyramidDiscriminator<B> {
    /// Number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.stages[0].expand.in_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``; height and
    ///   width must be divisible by 32.
    ///
    /// # Returns
    ///
    /// ``[batch * 3, 1]`` stacked per-level scores, coarsest level first.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        let fea0 = self.stages[0].forward(input);
        let fea1 = self.stages[1].forward(fea0);
        let fea2 = self.stages[2].forward(fea1);
        let fea3 = self.stages[3].forward(fea2);
        let fea4 = self.stages[4].forward(fea3.clone());

        // Every level's map is interpolated to the 1/8 resolution so the
        // levels carry equal weight.
        let loss = self.collapse.forward(self.reduce.forward(fea4.clone()));
        let loss = upsample_nearest(loss, 4);

        let dec3 = self.up3_decimate.forward(upsample_nearest(fea4, 2));
        let dec3 = self.up3_converge.forward(Tensor::cat(vec![dec3, fea3], 1));
        let dec3 = self.up3_process.forward(dec3);
        let loss3 = self.up3_collapse.forward(self.up3_reduce.forward(dec3.clone()));
        let loss3 = upsample_nearest(loss3, 2);

        let dec2 = self.up2_decimate.forward(upsample_nearest(dec3, 2));
        let dec2 = self.up2_converge.forward(Tensor::cat(vec![dec2, fea2], 1));
        let dec2 = self.up2_process.forward(dec2);
        let dec2 = self.up2_reduce.forward(dec2);
        let loss2 = self.up2_collapse.forward(dec2);

        stack_level_scores(vec![loss, loss3, loss2])
    }

    /// Patch semantics of the output, as (output channel count, spatial
    /// reduction factor).
    pub fn pixgan_parameters(&self) -> (usize, usize) {
        (3, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward() {
        let device = Default::default();

        let model: PixPyramidDiscriminator<TestBackend> =
            PixPyramidDiscriminatorConfig::new(3, 8).init(&device);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.pixgan_parameters(), (3, 8));

        // Three pyramid levels: batch 2 stacks to 6 rows.
        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [6, 1]);
    }

    #[test]
    fn test_forward_larger_input() {
        let device = Default::default();

        let model: PixPyramidDiscriminator<TestBackend> =
            PixPyramidDiscriminatorConfig::new(3, 8).init(&device);

        let input = Tensor::zeros([1, 3, 64, 64], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [3, 1]);
    }
}
