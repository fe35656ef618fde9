//! # Perceptual Feature Extractors
//!
//! Classification backbones truncated at a fixed depth, used as a
//! perceptual-similarity signal during training.

pub mod pretrained;
pub mod torch_io;
pub mod vgg;
pub mod wide_resnet;

use crate::layers::upsample::upsample_bicubic;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

pub use vgg::{QualityVggExtractor, VggFeatureExtractor};
pub use wide_resnet::WideResnetExtractor;

/// Output of a [`FeatureExtractor`] forward pass.
#[derive(Debug, Clone)]
pub struct FeatureMaps<B: Backend> {
    /// The truncated backbone's activation tensor.
    pub features: Tensor<B, 4>,

    /// Single-channel quality score map, when the variant produces one.
    pub quality: Option<Tensor<B, 4>>,
}

/// Polymorphic feature extractor wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum FeatureExtractor<B: Backend> {
    /// [`VggFeatureExtractor`].
    Vgg(VggFeatureExtractor<B>),

    /// [`QualityVggExtractor`].
    VggQuality(QualityVggExtractor<B>),

    /// [`WideResnetExtractor`].
    WideResnet(WideResnetExtractor<B>),
}

impl<B: Backend> FeatureExtractor<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]`` images in the caller's
    ///   value convention.
    /// - `pre_upsample`: integer bicubic upsampling factor applied before
    ///   normalization; 1 is the identity.
    ///
    /// # Returns
    ///
    /// The backbone [`FeatureMaps`].
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        pre_upsample: usize,
    ) -> FeatureMaps<B> {
        match self {
            FeatureExtractor::Vgg(model) => FeatureMaps {
                features: model.forward(input, pre_upsample),
                quality: None,
            },
            FeatureExtractor::VggQuality(model) => {
                let (features, quality) = model.forward(input, pre_upsample);
                FeatureMaps {
                    features,
                    quality: Some(quality),
                }
            }
            FeatureExtractor::WideResnet(model) => FeatureMaps {
                features: model.forward(upsample_bicubic(input, pre_upsample)),
                quality: None,
            },
        }
    }
}
