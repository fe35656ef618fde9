//! # Cross-Compare Discriminator
//!
//! Judges a high-resolution candidate *against* its low-resolution
//! reference: the two streams are processed in parallel and the reference
//! is folded into the candidate stream at every stage via a 1x1 merge over
//! their concatenation.

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::norm::NormalizationConfig;
use crate::models::discriminator::stack_level_scores;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// One paired stage of the cross-compare trunk.
#[derive(Module, Debug)]
pub struct CrossCompareBlock<B: Backend> {
    /// 1x1 merge of the concatenated streams back to the image stream.
    pub merge: Cna2d<B>,

    /// Image stream processing conv.
    pub process_image: Cna2d<B>,

    /// Reference stream processing conv.
    pub process_reference: Cna2d<B>,

    /// Image stream strided reduction.
    pub reduce_image: Cna2d<B>,

    /// Reference stream strided reduction.
    pub reduce_reference: Cna2d<B>,
}

impl<B: Backend> CrossCompareBlock<B> {
    fn build(
        in_channels: usize,
        out_channels: usize,
        device: &B::Device,
    ) -> Self {
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        let process = || {
            Cna2dConfig::block([in_channels, out_channels], 3)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
        };
        let reduce = || {
            Cna2dConfig::block([out_channels, out_channels], 3)
                .with_stride(2)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
        };

        Self {
            merge: Cna2dConfig::block([in_channels * 2, in_channels], 1)
                .with_norm(Some(norm.clone()))
                .init(device),
            process_image: process().init(device),
            process_reference: process().init(device),
            reduce_image: reduce().init(device),
            reduce_reference: reduce().init(device),
        }
    }

    /// Forward Pass; both streams are halved in resolution.
    pub fn forward(
        &self,
        image: Tensor<B, 4>,
        reference: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let merged = self
            .merge
            .forward(Tensor::cat(vec![image, reference.clone()], 1));
        let image = self.reduce_image.forward(self.process_image.forward(merged));

        let reference = self
            .reduce_reference
            .forward(self.process_reference.forward(reference));

        (image, reference)
    }
}

/// [`CrossCompareDiscriminator`] Config.
#[derive(Config, Debug)]
pub struct CrossCompareDiscriminatorConfig {
    /// Number of candidate image channels.
    pub in_channels: usize,

    /// Base feature channels.
    pub base_channels: usize,

    /// Number of reference image channels; defaults to `in_channels`.
    #[config(default = "None")]
    pub ref_channels: Option<usize>,

    /// Resolution ratio between the candidate and the reference.
    ///
    /// Restricted to {1, 2, 4}.
    #[config(default = 4)]
    pub scale: usize,
}

impl CrossCompareDiscriminatorConfig {
    /// Initialize a [`CrossCompareDiscriminator`].
    ///
    /// # Panics
    ///
    /// If `scale` is not one of {1, 2, 4}.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CrossCompareDiscriminator<B> {
        assert!(
            matches!(self.scale, 1 | 2 | 4),
            "cross-compare scale must be one of {{1, 2, 4}}, got {}",
            self.scale,
        );

        let nf = self.base_channels;
        let ref_channels = self.ref_channels.unwrap_or(self.in_channels);
        let norm = NormalizationConfig::group(8);
        let act = ActivationConfig::leaky_relu(0.2);

        // The candidate stream is pre-reduced until it matches the
        // reference resolution.
        let stride_1 = if self.scale != 1 { 2 } else { 1 };
        let stride_2 = if self.scale == 4 { 2 } else { 1 };

        CrossCompareDiscriminator {
            init_conv_image: Cna2dConfig::block([self.in_channels, nf], 3)
                .with_stride(stride_1)
                .with_bias(true)
                .with_act(Some(act.clone()))
                .init(device),
            init_conv_reference: Cna2dConfig::block([ref_channels, nf], 3)
                .with_bias(true)
                .with_act(Some(act.clone()))
                .init(device),
            second_conv: Cna2dConfig::block([nf, nf], 3)
                .with_stride(stride_2)
                .with_norm(Some(norm.clone()))
                .with_act(Some(act.clone()))
                .init(device),

            cross1: CrossCompareBlock::build(nf, nf * 2, device),
            cross2: CrossCompareBlock::build(nf * 2, nf * 4, device),
            cross3: CrossCompareBlock::build(nf * 4, nf * 8, device),
            cross4: CrossCompareBlock::build(nf * 8, nf * 8, device),

            final_process: Cna2dConfig::block([nf * 8, nf], 3)
                .with_bias(true)
                .with_norm(Some(norm))
                .with_act(Some(act))
                .init(device),
            score_conv: Cna2dConfig::block([nf, 1], 3).init(device),

            reduction: self.scale * 16,
        }
    }
}

/// Two-stream cross-comparing discriminator.
#[derive(Module, Debug)]
pub struct CrossCompareDiscriminator<B: Backend> {
    /// Candidate stream stem.
    pub init_conv_image: Cna2d<B>,

    /// Reference stream stem.
    pub init_conv_reference: Cna2d<B>,

    /// Second candidate-stream conv; finishes aligning the resolutions.
    pub second_conv: Cna2d<B>,

    /// First paired stage.
    pub cross1: CrossCompareBlock<B>,
    /// Second paired stage.
    pub cross2: CrossCompareBlock<B>,
    /// Third paired stage.
    pub cross3: CrossCompareBlock<B>,
    /// Fourth paired stage; its reference output is discarded.
    pub cross4: CrossCompareBlock<B>,

    /// Final feature processing conv.
    pub final_process: Cna2d<B>,

    /// Scoring conv.
    pub score_conv: Cna2d<B>,

    /// Overall spatial reduction of the score map relative to the
    /// candidate input.
    pub reduction: usize,
}

impl<B: Backend> CrossCompareDiscriminator<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `image`: the candidate; ``[batch, in_channels, height, width]``.
    /// - `reference`: ``[batch, ref_channels, height / scale, width / scale]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 1]`` scores.
    pub fn forward(
        &self,
        image: Tensor<B, 4>,
        reference: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &image,
            &["batch"],
            &[("in_channels", self.init_conv_image.in_channels())],
        );

        let image = self.init_conv_image.forward(image);
        let image = self.second_conv.forward(image);
        let reference = self.init_conv_reference.forward(reference);

        let (image, reference) = self.cross1.forward(image, reference);
        let (image, reference) = self.cross2.forward(image, reference);
        let (image, reference) = self.cross3.forward(image, reference);
        let (image, _) = self.cross4.forward(image, reference);

        let score = self.score_conv.forward(self.final_process.forward(image));
        stack_level_scores(vec![score])
    }

    /// Patch semantics of the output, as (output channel count, spatial
    /// reduction factor).
    pub fn pixgan_parameters(&self) -> (usize, usize) {
        (3, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_scale_4() {
        let device = Default::default();

        let model: CrossCompareDiscriminator<TestBackend> =
            CrossCompareDiscriminatorConfig::new(3, 8).init(&device);
        assert_eq!(model.pixgan_parameters(), (3, 64));

        let image = Tensor::zeros([2, 3, 64, 64], &device);
        let reference = Tensor::zeros([2, 3, 16, 16], &device);

        let output = model.forward(image, reference);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_forward_scale_1() {
        let device = Default::default();

        let model: CrossCompareDiscriminator<TestBackend> =
            CrossCompareDiscriminatorConfig::new(3, 8)
                .with_scale(1)
                .init(&device);
        assert_eq!(model.pixgan_parameters(), (3, 16));

        let image = Tensor::zeros([1, 3, 16, 16], &device);
        let reference = Tensor::zeros([1, 3, 16, 16], &device);

        let output = model.forward(image, reference);
        assert_eq!(output.dims(), [1, 1]);
    }

    #[test]
    fn test_reference_channels_override() {
        let device = Default::default();

        let model: CrossCompareDiscriminator<TestBackend> =
            CrossCompareDiscriminatorConfig::new(3, 8)
                .with_ref_channels(Some(1))
                .with_scale(2)
                .init(&device);

        let image = Tensor::zeros([1, 3, 32, 32], &device);
        let reference = Tensor::zeros([1, 1, 16, 16], &device);

        let output = model.forward(image, reference);
        assert_eq!(output.dims(), [1, 1]);
    }

    #[test]
    #[should_panic(expected = "cross-compare scale must be one of {1, 2, 4}")]
    fn test_invalid_scale() {
        let device = Default::default();
        let _model: CrossCompareDiscriminator<TestBackend> =
            CrossCompareDiscriminatorConfig::new(3, 8)
                .with_scale(3)
                .init(&device);
    }
}
