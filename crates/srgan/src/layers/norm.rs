//! # Normalization Layer Wrapper
//!
//! The discriminator zoo is split between batch-normalized and
//! group-normalized variants; this wrapper lets a block config carry either.

use burn::nn::{BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
pub enum NormalizationConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`GroupNorm`] Configuration.
    Group(GroupNormConfig),
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl NormalizationConfig {
    /// Batch norm; the feature count is matched to the host block.
    pub fn batch() -> Self {
        BatchNormConfig::new(0).into()
    }

    /// Group norm over `num_groups`; the channel count is matched to the
    /// host block.
    pub fn group(num_groups: usize) -> Self {
        GroupNormConfig::new(num_groups, 0).into()
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            NormalizationConfig::Batch(config) => config.init(device).into(),
            NormalizationConfig::Group(config) => config.init(device).into(),
        }
    }

    /// Adjust the config to the feature size.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            NormalizationConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Group(config) => GroupNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            NormalizationConfig::Batch(config) => config.num_features,
            NormalizationConfig::Group(config) => config.num_channels,
        }
    }
}

/// Normalization Layer Wrapper.
#[derive(Module, Debug)]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer; restricted to `BatchNorm`<2>.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 2>> for Normalization<B> {
    fn from(layer: BatchNorm<B, 2>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(layer: GroupNorm<B>) -> Self {
        Self::Group(layer)
    }
}

impl<B: Backend> Normalization<B> {
    /// Applies normalization to a tensor.
    ///
    /// All wrapped norm layers produce an output of the same rank and shape
    /// as their input.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Normalization::Batch(norm) => norm.forward(input),
            Normalization::Group(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            Normalization::Batch(norm) => norm.gamma.shape().dims[0],
            Normalization::Group(norm) => norm.num_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_norm() {
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<TestBackend, 4> = Tensor::ones([2, num_features, 3, 4], &device);

        let config = NormalizationConfig::batch().with_num_features(num_features);
        assert_eq!(config.num_features(), num_features);

        let layer = config.init(&device);
        assert_eq!(layer.num_features(), num_features);

        let expected = match &layer {
            Normalization::Batch(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_group_norm() {
        let device = Default::default();

        let num_features = 16;
        let input: Tensor<TestBackend, 4> = Tensor::ones([2, num_features, 3, 4], &device);

        let config = NormalizationConfig::group(8).with_num_features(num_features);
        assert_eq!(config.num_features(), num_features);

        let layer = config.init(&device);
        assert_eq!(layer.num_features(), num_features);

        let expected = match &layer {
            Normalization::Group(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
