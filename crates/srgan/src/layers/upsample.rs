//! # Integer-Factor Upsampling Helpers
//!
//! Thin wrappers over burn's functional `interpolate` for the fixed-factor
//! upsampling the pyramid discriminators, expansion blocks, and feature
//! extractors perform.

use burn::prelude::{Backend, Tensor};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Upsample a ``[batch, channels, height, width]`` tensor by an integer
/// factor with the given interpolation mode.
///
/// A factor of 1 is the identity.
pub fn upsample<B: Backend>(
    input: Tensor<B, 4>,
    factor: usize,
    mode: InterpolateMode,
) -> Tensor<B, 4> {
    assert!(factor > 0, "upsample factor must be positive");
    if factor == 1 {
        return input;
    }
    let [_, _, height, width] = input.dims();
    interpolate(
        input,
        [height * factor, width * factor],
        InterpolateOptions::new(mode),
    )
}

/// Nearest-neighbor upsampling by an integer factor.
pub fn upsample_nearest<B: Backend>(
    input: Tensor<B, 4>,
    factor: usize,
) -> Tensor<B, 4> {
    upsample(input, factor, InterpolateMode::Nearest)
}

/// Bilinear upsampling by an integer factor.
pub fn upsample_bilinear<B: Backend>(
    input: Tensor<B, 4>,
    factor: usize,
) -> Tensor<B, 4> {
    upsample(input, factor, InterpolateMode::Bilinear)
}

/// Bicubic upsampling by an integer factor.
pub fn upsample_bicubic<B: Backend>(
    input: Tensor<B, 4>,
    factor: usize,
) -> Tensor<B, 4> {
    upsample(input, factor, InterpolateMode::Bicubic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_upsample_nearest() {
        let device = Default::default();
        let input: Tensor<TestBackend, 4> = Tensor::ones([2, 3, 4, 5], &device);

        let output = upsample_nearest(input, 2);
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 2), ("channels", 3), ("height", 8), ("width", 10)],
        );
    }

    #[test]
    fn test_upsample_identity() {
        let device = Default::default();
        let input: Tensor<TestBackend, 4> = Tensor::ones([1, 2, 3, 3], &device);

        let output = upsample_nearest(input.clone(), 1);
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_nearest_preserves_mean() {
        let device = Default::default();
        let input: Tensor<TestBackend, 4> = Tensor::from_data(
            [[[[1.0, 2.0], [3.0, 4.0]]]],
            &device,
        );

        let output = upsample_nearest(input.clone(), 2);

        let before = input.mean().into_scalar();
        let after = output.mean().into_scalar();
        assert!((before - after).abs() < 1e-6);
    }
}
