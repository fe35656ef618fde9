//! # Discriminator Zoo
//!
//! Feed-forward classifier/pyramid networks over one or two images. Each
//! variant maps image(s) to real/fake scores; the pyramid variants score
//! several resolutions at once and stack the per-level scores into the
//! batch dimension, so a scalar adversarial loss can consume them as
//! independent samples.

pub mod cross_compare;
pub mod pix_pyramid;
pub mod unet;
pub mod vgg;

use crate::layers::blocks::cna::Cna2d;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

pub use cross_compare::CrossCompareDiscriminator;
pub use pix_pyramid::PixPyramidDiscriminator;
pub use unet::{UnetDiscriminator, UnetFeatureDiscriminator};
pub use vgg::Vgg128Discriminator;

/// A downsampling stage: an expansion conv followed by a strided
/// reduction conv.
#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    /// Channel-expansion conv, stride 1.
    pub expand: Cna2d<B>,

    /// Strided reduction conv.
    pub reduce: Cna2d<B>,
}

impl<B: Backend> DownStage<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.reduce.forward(self.expand.forward(input))
    }
}

/// Reduce per-level score maps to one score per (sample, level), stacked
/// into the batch dimension.
///
/// Every map must already be at the common resolution; the per-level
/// ordering of the input is preserved (coarsest level first, by
/// convention). The consuming loss is responsible for un-stacking and
/// weighting the levels.
///
/// # Arguments
///
/// - `levels`: `k` maps of shape ``[batch, 1, height, width]``.
///
/// # Returns
///
/// ``[batch * k, 1]``
pub fn stack_level_scores<B: Backend>(levels: Vec<Tensor<B, 4>>) -> Tensor<B, 2> {
    let stacked = Tensor::cat(levels, 1);
    let x: Tensor<B, 3> = stacked.flatten(2, 3);
    let x = x.mean_dim(2);
    x.reshape([-1, 1])
}

/// Input arity for the [`Discriminator`] forward surface.
#[derive(Debug, Clone)]
pub enum DiscriminatorInput<B: Backend> {
    /// A single image batch.
    Single(Tensor<B, 4>),

    /// An (image, low-resolution reference) pair.
    Pair {
        /// The high-resolution candidate batch.
        image: Tensor<B, 4>,
        /// The reference batch.
        reference: Tensor<B, 4>,
    },
}

impl<B: Backend> From<Tensor<B, 4>> for DiscriminatorInput<B> {
    fn from(image: Tensor<B, 4>) -> Self {
        Self::Single(image)
    }
}

/// Polymorphic discriminator wrapper.
///
/// The zoo's factory returns this; training code dispatches through it
/// without knowing the concrete variant.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Discriminator<B: Backend> {
    /// [`Vgg128Discriminator`] (batch- or group-normalized).
    Vgg128(Vgg128Discriminator<B>),

    /// [`CrossCompareDiscriminator`].
    CrossCompare(CrossCompareDiscriminator<B>),

    /// [`PixPyramidDiscriminator`].
    PixPyramid(PixPyramidDiscriminator<B>),

    /// [`UnetDiscriminator`].
    Unet(UnetDiscriminator<B>),

    /// [`UnetFeatureDiscriminator`].
    UnetFeature(UnetFeatureDiscriminator<B>),
}

impl<B: Backend> Discriminator<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a [`DiscriminatorInput`] matching the variant's arity.
    ///
    /// # Returns
    ///
    /// ``[batch, 1]`` scores, or ``[batch * levels, 1]`` for the pyramid
    /// variants.
    ///
    /// # Panics
    ///
    /// If the input arity does not match the variant.
    pub fn forward(
        &self,
        input: DiscriminatorInput<B>,
    ) -> Tensor<B, 2> {
        match (self, input) {
            (Discriminator::Vgg128(model), DiscriminatorInput::Single(image)) => {
                model.forward(image)
            }
            (
                Discriminator::CrossCompare(model),
                DiscriminatorInput::Pair { image, reference },
            ) => model.forward(image, reference),
            (Discriminator::PixPyramid(model), DiscriminatorInput::Single(image)) => {
                model.forward(image)
            }
            (Discriminator::Unet(model), DiscriminatorInput::Single(image)) => {
                model.forward(image)
            }
            (Discriminator::UnetFeature(model), DiscriminatorInput::Single(image)) => {
                model.forward(image, false).0
            }
            (Discriminator::CrossCompare(_), DiscriminatorInput::Single(_)) => {
                panic!("cross-compare discriminator requires an (image, reference) pair")
            }
            (_, DiscriminatorInput::Pair { .. }) => {
                panic!("this discriminator takes a single image input")
            }
        }
    }

    /// Patch semantics of the output, as (output channel count, spatial
    /// reduction factor), for variants consumed by a patch-based
    /// adversarial loss.
    pub fn pixgan_parameters(&self) -> Option<(usize, usize)> {
        match self {
            Discriminator::Vgg128(_) => None,
            Discriminator::CrossCompare(model) => Some(model.pixgan_parameters()),
            Discriminator::PixPyramid(model) => Some(model.pixgan_parameters()),
            Discriminator::Unet(model) => Some(model.pixgan_parameters()),
            Discriminator::UnetFeature(model) => Some(model.pixgan_parameters()),
        }
    }
}

/// A frozen discriminator paired with the scalar weight its scores carry
/// in the combined loss.
///
/// Replaces tagging a loose attribute onto a polymorphic model object:
/// the association is part of the type.
#[derive(Module, Debug)]
pub struct WeightedDiscriminator<B: Backend> {
    /// The frozen model.
    pub model: Discriminator<B>,

    /// Loss-combination weight for this discriminator's scores.
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_stack_level_scores() {
        let device = Default::default();

        let a: Tensor<TestBackend, 4> = Tensor::ones([2, 1, 4, 4], &device);
        let b = Tensor::ones([2, 1, 4, 4], &device) * 3.0;

        let scores = stack_level_scores(vec![a, b]);
        assert_eq!(scores.dims(), [4, 1]);

        // Rows are sample-major: [s0l0, s0l1, s1l0, s1l1].
        let expected: Tensor<TestBackend, 2> =
            Tensor::from_data([[1.0], [3.0], [1.0], [3.0]], &device);
        scores.to_data().assert_eq(&expected.to_data(), true);
    }
}
