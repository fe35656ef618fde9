//! # U-Net Discriminators
//!
//! Group-normalized encoder/decoder discriminators. [`UnetDiscriminator`]
//! scores three decoder resolutions and stacks them into the batch
//! dimension; [`UnetFeatureDiscriminator`] stops after one expansion and
//! can additionally expose its decoder features for downstream use.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::blocks::expansion::{ExpansionBlock2d, ExpansionBlock2dConfig};
use crate::layers::norm::NormalizationConfig;
use crate::layers::upsample::upsample_nearest;
use crate::models::discriminator::{DownStage, stack_level_scores};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

fn build_encoder<B: Backend>(
    in_channels: usize,
    nf: usize,
    device: &B::Device,
) -> Vec<DownStage<B>> {
    let norm = NormalizationConfig::group(8);
    let act = ActivationConfig::leaky_relu(0.2);

    let cna = |channels: [usize; 2]| {
        Cna2dConfig::block(channels, 3)
            .with_norm(Some(norm.clone()))
            .with_act(Some(act.clone()))
    };

    let stage_channels = [
        [in_channels, nf],
        [nf, nf * 2],
        [nf * 2, nf * 4],
        [nf * 4, nf * 8],
        [nf * 8, nf * 8],
    ];
    stage_channels
        .into_iter()
        .enumerate()
        .map(|(idx, [c_in, c_out])| {
            // The stem conv is normalized but un-activated and biased.
            let expand = if idx == 0 {
                Cna2dConfig::block([c_in, c_out], 3)
                    .with_bias(true)
                    .with_norm(Some(norm.clone()))
            } else {
                cna([c_in, c_out])
            };
            DownStage {
                expand: expand.init(device),
                reduce: cna([c_out, c_out]).with_stride(2).init(device),
            }
        })
        .collect()
}

fn score_collapse_config(channels: usize) -> Cna2dConfig {
    Cna2dConfig::block([channels, 1], 3).with_bias(true)
}

/// [`UnetDiscriminator`] Config.
#[derive(Config, Debug)]
pub struct UnetDiscriminatorConfig {
    /// Number of input image channels.
    pub in_channels: usize,

    /// Base feature channels.
    pub base_channels: usize,
}

impl UnetDiscriminatorConfig {
    /// Initialize a [`UnetDiscriminator`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> UnetDiscriminator<B> {
        let nf = self.base_channels;
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        let process = |channels: usize| {
            Cna2dConfig::block([channels, channels], 3)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
        };

        UnetDiscriminator {
            stages: build_encoder(self.in_channels, nf, device),

            up1: ExpansionBlock2dConfig::new(nf * 8, nf * 8).init(device),
            process1: process(nf * 8).init(device),
            collapse1: score_collapse_config(nf * 8).init(device),

            up2: ExpansionBlock2dConfig::new(nf * 8, nf * 4).init(device),
            process2: process(nf * 4).init(device),
            collapse2: score_collapse_config(nf * 4).init(device),

            up3: ExpansionBlock2dConfig::new(nf * 4, nf * 2).init(device),
            process3: process(nf * 2).init(device),
            collapse3: score_collapse_config(nf * 2).init(device),
        }
    }
}

/// Encoder/decoder discriminator scoring three decoder resolutions.
#[derive(Module, Debug)]
pub struct UnetDiscriminator<B: Backend> {
    /// Downsampling encoder; each stage halves the resolution.
    pub stages: Vec<DownStage<B>>,

    /// First expansion (1/32 -> 1/16), merging the stage-3 skip.
    pub up1: ExpansionBlock2d<B>,
    /// 1/16 level processing.
    pub process1: Cna2d<B>,
    /// 1/16 level score collapse.
    pub collapse1: Cna2d<B>,

    /// Second expansion (1/16 -> 1/8), merging the stage-2 skip.
    pub up2: ExpansionBlock2d<B>,
    /// 1/8 level processing.
    pub process2: Cna2d<B>,
    /// 1/8 level score collapse.
    pub collapse2: Cna2d<B>,

    /// Third expansion (1/8 -> 1/4), merging the stage-1 skip.
    pub up3: ExpansionBlock2d<B>,
    /// 1/4 level processing.
    pub process3: Cna2d<B>,
    /// 1/4 level score collapse.
    pub collapse3: Cna2d<B>,
}

impl<B: Backend> UnetDiscriminator<B> {
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
        let fea2 = self.stages[2].forward(fea1.clone());
        let fea3 = self.stages[3].forward(fea2.clone());
        let fea4 = self.stages[4].forward(fea3.clone());

        let u1 = self.up1.forward(fea4, fea3);
        let loss1 = self.collapse1.forward(self.process1.forward(u1.clone()));

        let u2 = self.up2.forward(u1, fea2);
        let loss2 = self.collapse2.forward(self.process2.forward(u2.clone()));

        let u3 = self.up3.forward(u2, fea1);
        let loss3 = self.collapse3.forward(self.process3.forward(u3));

        stack_level_scores(vec![
            upsample_nearest(loss1, 4),
            upsample_nearest(loss2, 2),
            loss3,
        ])
    }

    /// Patch semantics of the output, as (output channel count, spatial
    /// reduction factor).
    pub fn pixgan_parameters(&self) -> (usize, usize) {
        (3, 4)
    }
}

/// [`UnetFeatureDiscriminator`] Config.
#[derive(Config, Debug)]
pub struct UnetFeatureDiscriminatorConfig {
    /// Number of input image channels.
    pub in_channels: usize,

    /// Base feature channels.
    pub base_channels: usize,

    /// Whether consumers should treat this discriminator as a feature
    /// source.
    #[config(default = false)]
    pub feature_mode: bool,
}

impl UnetFeatureDiscriminatorConfig {
    /// Initialize a [`UnetFeatureDiscriminator`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> UnetFeatureDiscriminator<B> {
        let nf = self.base_channels;
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        UnetFeatureDiscriminator {
            stages: build_encoder(self.in_channels, nf, device),

            up1: ExpansionBlock2dConfig::new(nf * 8, nf * 8).init(device),
            process1: Cna2dConfig::block([nf * 8, nf * 8], 3)
                .with_norm(Some(norm))
                .with_act(Some(act))
                .init(device),
            feature_process: Cna2dConfig::block([nf * 8, nf * 8], 3)
                .with_bias(true)
                .init(device),
            collapse1: score_collapse_config(nf * 8).init(device),

            feature_mode: self.feature_mode,
        }
    }
}

/// Encoder/decoder discriminator with a single score level and an
/// optional feature output.
#[derive(Module, Debug)]
pub struct UnetFeatureDiscriminator<B: Backend> {
    /// Downsampling encoder; each stage halves the resolution.
    pub stages: Vec<DownStage<B>>,

    /// Expansion (1/32 -> 1/16), merging the stage-3 skip.
    pub up1: ExpansionBlock2d<B>,
    /// Score-path processing.
    pub process1: Cna2d<B>,
    /// Feature-path processing.
    pub feature_process: Cna2d<B>,
    /// Score collapse.
    pub collapse1: Cna2d<B>,

    /// Whether consumers should treat this discriminator as a feature
    /// source.
    pub feature_mode: bool,
}

impl<B: Backend> UnetFeatureDiscriminator<B> {
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
    /// - `want_features`: also return the decoder feature map.
    ///
    /// # Returns
    ///
    /// ``([batch, 1], Option<[batch, base_channels * 8, height / 16, width / 16]>)``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        want_features: bool,
    ) -> (Tensor<B, 2>, Option<Tensor<B, 4>>) {
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

        let u1 = self.up1.forward(fea4, fea3);
        let loss = self.collapse1.forward(self.process1.forward(u1.clone()));

        let score = stack_level_scores(vec![upsample_nearest(loss, 4)]);
        let features = want_features.then(|| self.feature_process.forward(u1));

        (score, features)
    }

    /// Patch semantics of the output, as (output channel count, spatial
    /// reduction factor).
    pub fn pixgan_parameters(&self) -> (usize, usize) {
        (1, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_unet_forward() {
        let device = Default::default();

        let model: UnetDiscriminator<TestBackend> =
            UnetDiscriminatorConfig::new(3, 8).init(&device);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.pixgan_parameters(), (3, 4));

        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [6, 1]);
    }

    #[test]
    fn test_unet_feature_forward() {
        let device = Default::default();

        let model: UnetFeatureDiscriminator<TestBackend> =
            UnetFeatureDiscriminatorConfig::new(3, 8).init(&device);
        assert_eq!(model.pixgan_parameters(), (1, 4));

        let input = Tensor::zeros([2, 3, 32, 32], &device);

        let (score, features) = model.forward(input.clone(), false);
        assert_eq!(score.dims(), [2, 1]);
        assert!(features.is_none());

        let (score, features) = model.forward(input, true);
        assert_eq!(score.dims(), [2, 1]);
        // 1/16 resolution, 8x base channels.
        assert_eq!(features.unwrap().dims(), [2, 64, 2, 2]);
    }
}
