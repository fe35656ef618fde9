//! # VGG-Style Classifier Discriminator
//!
//! The classic SRGAN discriminator: paired 3x3 expansion / 4x4-stride-2
//! reduction stages over a 128-base input, flattened into a two-layer
//! linear head producing one real/fake score per sample.
//!
//! The batch-normalized and group-normalized variants of the zoo are the
//! same structure with a different [`NormalizationConfig`]; the optional
//! extra stage supports 256-base inputs at the original head size.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::layers::blocks::cna::{Cna2d, Cna2dConfig, Cna2dMeta};
use crate::layers::conv_shape::expect_square_conv2d_output_size;
use crate::layers::norm::NormalizationConfig;
use crate::models::discriminator::DownStage;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// Width of the hidden linear layer in the head.
const HEAD_WIDTH: usize = 100;

/// [`Vgg128Discriminator`] Config.
#[derive(Config, Debug)]
pub struct Vgg128DiscriminatorConfig {
    /// Number of input image channels.
    pub in_channels: usize,

    /// Base feature channels; stages widen up to 8x (16x with the extra
    /// stage).
    pub base_channels: usize,

    /// Declared input resolution; the flatten size of the linear head is
    /// computed from this at construction.
    #[config(default = 128)]
    pub input_size: usize,

    /// Stage normalization.
    #[config(default = "NormalizationConfig::batch()")]
    pub norm: NormalizationConfig,

    /// Append a sixth stage widening to 16x base channels.
    #[config(default = false)]
    pub extra_conv: bool,
}

impl Vgg128DiscriminatorConfig {
    /// Per-stage (in, out) channel counts.
    fn stage_channels(&self) -> Vec<[usize; 2]> {
        let nf = self.base_channels;
        let mut channels = vec![
            [self.in_channels, nf],
            [nf, nf * 2],
            [nf * 2, nf * 4],
            [nf * 4, nf * 8],
            [nf * 8, nf * 8],
        ];
        if self.extra_conv {
            channels.push([nf * 8, nf * 16]);
        }
        channels
    }

    /// The total spatial stride across all stages.
    pub fn total_stride(&self) -> usize {
        1 << self.stage_channels().len()
    }

    /// The spatial resolution of the final feature map.
    fn final_resolution(&self) -> usize {
        let mut size = self.input_size;
        for _ in self.stage_channels() {
            size = expect_square_conv2d_output_size(size, 3, 1, 1);
            size = expect_square_conv2d_output_size(size, 4, 2, 1);
        }
        size
    }

    /// The flatten size feeding the linear head.
    pub fn flatten_size(&self) -> usize {
        let out_channels = self.stage_channels().last().unwrap()[1];
        let resolution = self.final_resolution();
        out_channels * resolution * resolution
    }

    /// Check if the config is valid.
    ///
    /// The declared input size must be exactly divisible by the total
    /// stride, so the flatten size of the head is well-defined.
    pub fn try_validate(&self) -> Result<(), String> {
        let total_stride = self.total_stride();
        if self.input_size % total_stride != 0 || self.input_size < total_stride {
            return Err(format!(
                "input size {} is not divisible by the discriminator's total stride {}",
                self.input_size, total_stride,
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        match self.try_validate() {
            Ok(_) => (),
            Err(err) => panic!("{}", err),
        }
    }

    /// Initialize a [`Vgg128Discriminator`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Vgg128Discriminator<B> {
        self.expect_valid();

        let act = ActivationConfig::leaky_relu(0.2);

        let stages = self
            .stage_channels()
            .into_iter()
            .enumerate()
            .map(|(idx, [c_in, c_out])| {
                // The stem conv carries a bias and no norm; every other
                // conv is normalized and bias-free.
                let expand = if idx == 0 {
                    Cna2dConfig::block([c_in, c_out], 3)
                        .with_bias(true)
                        .with_act(Some(act.clone()))
                } else {
                    Cna2dConfig::block([c_in, c_out], 3)
                        .with_norm(Some(self.norm.clone()))
                        .with_act(Some(act.clone()))
                };
                let reduce = Cna2dConfig::block([c_out, c_out], 4)
                    .with_stride(2)
                    .with_norm(Some(self.norm.clone()))
                    .with_act(Some(act.clone()));
                DownStage {
                    expand: expand.init(device),
                    reduce: reduce.init(device),
                }
            })
            .collect();

        Vgg128Discriminator {
            stages,
            linear1: LinearConfig::new(self.flatten_size(), HEAD_WIDTH).init(device),
            linear2: LinearConfig::new(HEAD_WIDTH, 1).init(device),
            act: act.init(device),
            input_size: self.input_size,
        }
    }
}

/// VGG-style classifier discriminator.
#[derive(Module, Debug)]
pub struct Vgg128Discriminator<B: Backend> {
    /// Downsampling stages; each halves the resolution.
    pub stages: Vec<DownStage<B>>,

    /// Hidden head layer over the flattened final feature map.
    pub linear1: Linear<B>,

    /// Scoring head layer.
    pub linear2: Linear<B>,

    /// Head activation.
    pub act: Activation<B>,

    /// Declared input resolution.
    pub input_size: usize,
}

impl<B: Backend> Vgg128Discriminator<B> {
    /// Number of input image channels.
    pub fn in_channels(&self) -> usize {
        self.stages[0].expand.in_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, input_size, input_size]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 1]`` scores.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[
                ("in_channels", self.in_channels()),
                ("height", self.input_size),
                ("width", self.input_size),
            ],
        );

        let x = self
            .stages
            .iter()
            .fold(input, |x, stage| stage.forward(x));

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.act.forward(self.linear1.forward(x));
        self.linear2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_config_sizing() {
        let config = Vgg128DiscriminatorConfig::new(3, 64);
        config.expect_valid();
        assert_eq!(config.total_stride(), 32);
        assert_eq!(config.flatten_size(), 64 * 8 * 4 * 4);

        let config = config.with_extra_conv(true);
        config.expect_valid();
        assert_eq!(config.total_stride(), 64);
        assert_eq!(config.flatten_size(), 64 * 16 * 2 * 2);
    }

    #[test]
    fn test_indivisible_input_size() {
        let config = Vgg128DiscriminatorConfig::new(3, 64).with_input_size(100);
        assert!(config.try_validate().is_err());
    }

    #[test]
    #[should_panic(expected = "not divisible")]
    fn test_indivisible_input_size_panics_at_init() {
        let device = Default::default();
        let _model: Vgg128Discriminator<TestBackend> = Vgg128DiscriminatorConfig::new(3, 4)
            .with_input_size(33)
            .init(&device);
    }

    #[test]
    fn test_batch_norm_forward() {
        let device = Default::default();

        let model: Vgg128Discriminator<TestBackend> = Vgg128DiscriminatorConfig::new(3, 4)
            .with_input_size(32)
            .init(&device);

        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_group_norm_forward() {
        let device = Default::default();

        let model: Vgg128Discriminator<TestBackend> = Vgg128DiscriminatorConfig::new(3, 8)
            .with_input_size(32)
            .with_norm(NormalizationConfig::group(8))
            .init(&device);

        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_extra_conv_forward() {
        let device = Default::default();

        let model: Vgg128Discriminator<TestBackend> = Vgg128DiscriminatorConfig::new(3, 4)
            .with_input_size(64)
            .with_extra_conv(true)
            .init(&device);

        let input = Tensor::zeros([1, 3, 64, 64], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [1, 1]);
    }
}
