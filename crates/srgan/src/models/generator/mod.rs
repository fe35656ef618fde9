//! # Generator Zoo
//!
//! Super-resolution generators: image batch in, upscaled image batch out.

pub mod rrdb;
pub mod srresnet;

use crate::layers::activation::Activation;
use crate::layers::upsample::upsample_nearest;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::prelude::{Backend, Tensor};

pub use rrdb::RrdbNet;
pub use srresnet::MsrResnet;

/// Upsampling block: nearest-neighbor interpolation followed by a conv
/// and activation.
#[derive(Module, Debug)]
pub struct UpconvBlock<B: Backend> {
    /// Post-interpolation conv.
    pub conv: Conv2d<B>,

    /// Activation.
    pub act: Activation<B>,

    /// Interpolation factor.
    pub factor: usize,
}

impl<B: Backend> UpconvBlock<B> {
    /// Forward Pass; upsamples spatially by `factor`.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = upsample_nearest(input, self.factor);
        self.act.forward(self.conv.forward(x))
    }
}

/// Per-factor-of-2 upsampling stages for a scale; a single x3 stage for
/// scale 3.
pub(crate) fn upconv_factors(scale: usize) -> Vec<usize> {
    match scale {
        1 => vec![],
        3 => vec![3],
        _ => {
            assert!(
                scale.is_power_of_two(),
                "generator scale must be 1, 3, or a power of two, got {scale}",
            );
            let stages = scale.trailing_zeros() as usize;
            vec![2; stages]
        }
    }
}

/// Polymorphic generator wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Generator<B: Backend> {
    /// [`MsrResnet`].
    MsrResnet(MsrResnet<B>),

    /// [`RrdbNet`].
    Rrdb(RrdbNet<B>),
}

impl<B: Backend> Generator<B> {
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
        match self {
            Generator::MsrResnet(model) => model.forward(input),
            Generator::Rrdb(model) => model.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upconv_factors() {
        assert_eq!(upconv_factors(1), Vec::<usize>::new());
        assert_eq!(upconv_factors(2), vec![2]);
        assert_eq!(upconv_factors(3), vec![3]);
        assert_eq!(upconv_factors(4), vec![2, 2]);
        assert_eq!(upconv_factors(8), vec![2, 2, 2]);
    }

    #[test]
    #[should_panic(expected = "generator scale must be")]
    fn test_invalid_scale() {
        upconv_factors(6);
    }
}
