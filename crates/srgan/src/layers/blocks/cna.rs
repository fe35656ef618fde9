//! # `Cna2d` - conv/norm/activation block.
//!
//! A [`Cna2d`] module is:
//! * a [`Conv2d`] layer,
//! * an optional [`Normalization`] layer,
//! * an optional [`Activation`] layer.
//!
//! This is the normalized convolutional unit the discriminators, heads,
//! and expansion blocks compose.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::layers::norm::{Normalization, NormalizationConfig};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`Cna2d`] Meta.
pub trait Cna2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the stride.
    fn stride(&self) -> [usize; 2];
}

/// [`Cna2d`] Config.
///
/// Implements [`Cna2dMeta`].
#[derive(Config, Debug)]
pub struct Cna2dConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,

    /// The optional [`Normalization`] config.
    ///
    /// The feature size is auto-matched to the conv output channels.
    #[config(default = "None")]
    pub norm: Option<NormalizationConfig>,

    /// The optional [`Activation`] config.
    #[config(default = "None")]
    pub act: Option<ActivationConfig>,
}

impl Cna2dMeta for Cna2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride.clone()
    }
}

impl Cna2dConfig {
    /// A square conv block with ``kernel_size / 2`` padding and no bias.
    ///
    /// This is "same" padding for the odd kernels, and the step-exact
    /// padding for the 4x4/2 reduction convs.
    pub fn block(
        channels: [usize; 2],
        kernel_size: usize,
    ) -> Self {
        let pad = kernel_size / 2;
        Self::new(
            Conv2dConfig::new(channels, [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .with_bias(false),
        )
    }

    /// Set the conv stride.
    pub fn with_stride(
        self,
        stride: usize,
    ) -> Self {
        Self {
            conv: self.conv.with_stride([stride, stride]),
            ..self
        }
    }

    /// Set the conv bias.
    pub fn with_bias(
        self,
        bias: bool,
    ) -> Self {
        Self {
            conv: self.conv.with_bias(bias),
            ..self
        }
    }

    /// Adjust the norm features to match the conv output size.
    ///
    /// [`Cna2dConfig::init`] does this automatically.
    pub fn match_norm_features(self) -> Self {
        let features = self.out_channels();
        let norm = self.norm.map(|norm| norm.with_num_features(features));
        Self { norm, ..self }
    }

    /// Initialize a [`Cna2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Cna2d<B> {
        let cfg = self.match_norm_features();
        Cna2d {
            conv: cfg.conv.init(device),
            norm: cfg.norm.as_ref().map(|norm| norm.init(device)),
            act: cfg.act.as_ref().map(|act| act.init(device)),
        }
    }
}

/// Sequenced conv/norm/activation block.
///
/// Implements [`Cna2dMeta`].
#[derive(Module, Debug)]
pub struct Cna2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Optional Norm Layer.
    pub norm: Option<Normalization<B>>,

    /// Optional Activation layer.
    pub act: Option<Activation<B>>,
}

impl<B: Backend> Cna2dMeta for Cna2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride.clone()
    }
}

impl<B: Backend> Cna2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        let x = self.conv.forward(input);

        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };

        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_channels", self.out_channels())],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_cna_config() {
        let config = Cna2dConfig::block([2, 4], 3)
            .with_stride(2)
            .with_norm(Some(NormalizationConfig::group(2)))
            .with_act(Some(ActivationConfig::leaky_relu(0.2)));

        assert_eq!(config.in_channels(), 2);
        assert_eq!(config.out_channels(), 4);
        assert_eq!(config.stride(), [2, 2]);

        let config = config.match_norm_features();
        assert_eq!(config.norm.as_ref().unwrap().num_features(), 4);
    }

    #[test]
    fn test_cna_forward() {
        let device = Default::default();

        let config = Cna2dConfig::block([2, 4], 3)
            .with_stride(2)
            .with_norm(Some(NormalizationConfig::group(2)))
            .with_act(Some(ActivationConfig::leaky_relu(0.2)));

        let layer: Cna2d<TestBackend> = config.init(&device);
        assert_eq!(layer.in_channels(), 2);
        assert_eq!(layer.out_channels(), 4);
        assert_eq!(layer.stride(), [2, 2]);

        let input = Tensor::random([2, 2, 10, 10], Distribution::Default, &device);

        let output = layer.forward(input.clone());
        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 4),
                ("out_height", 5),
                ("out_width", 5)
            ],
        );

        let expected = {
            let x = layer.conv.forward(input);
            let x = layer.norm.as_ref().unwrap().forward(x);
            layer.act.as_ref().unwrap().forward(x)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_bare_conv() {
        let device = Default::default();

        // No norm, no activation; just the padded conv.
        let layer: Cna2d<TestBackend> = Cna2dConfig::block([3, 1], 1).init(&device);

        let input = Tensor::random([1, 3, 8, 8], Distribution::Default, &device);
        let output = layer.forward(input.clone());

        let expected = layer.conv.forward(input);
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
