//! # Convolution Shape Utilities
//!
//! Analytic output-size prediction for convolution stacks. The VGG-style
//! discriminators use this to size their flatten/linear head at
//! construction time instead of discovering a mismatch at the first
//! forward call.

/// Predict the output size of a 1D convolution operation.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - kernel_size) / stride) + 1 )
/// ```
///
/// # Arguments
///
/// - `input_size`: the input dimension size, must be > 0.
/// - `kernel_size`: the kernel size, must be > 0.
/// - `stride`: the stride of the convolution, must be > 0.
/// - `padding`: the padding, added evenly to both sides of the input.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` for <= 0.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);

    let effective_size = input_size + 2 * padding;
    let pos = effective_size + stride;

    if pos < kernel_size {
        return None;
    }
    let x = (pos - kernel_size) / stride;
    if x < 1 { None } else { Some(x) }
}

/// Predict the square output size of a square 2D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv1d_output_size`],
/// applied to both spatial dimensions at once.
///
/// # Panics
///
/// If the output size would be <= 0.
pub fn expect_square_conv2d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> usize {
    match maybe_conv1d_output_size(input_size, kernel_size, stride, padding) {
        Some(x) => x,
        None => panic!(
            "No legal output size for conv2d with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n padding:{padding}",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_output_size() {
        pub fn conv1d_output_size_reference(
            input_size: usize,
            kernel_size: usize,
            stride: usize,
            padding: usize,
        ) -> Option<usize> {
            let input_size = input_size as f64;
            let kernel_size = kernel_size as f64;
            let stride = stride as f64;
            let padding = padding as f64;

            let effective_size = input_size + 2.0 * padding;

            let x = (((effective_size - kernel_size) / stride) + 1.0).floor();
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_size in 1..12 {
            for stride in 1..3 {
                for kernel_size in 1..5 {
                    for padding in 0..3 {
                        assert_eq!(
                            maybe_conv1d_output_size(input_size, kernel_size, stride, padding),
                            conv1d_output_size_reference(input_size, kernel_size, stride, padding),
                        )
                    }
                }
            }
        }
    }

    #[test]
    fn test_strided_pair() {
        // The discriminator stage pair: 3x3/1 "same" conv, then 4x4/2 conv.
        let x = expect_square_conv2d_output_size(128, 3, 1, 1);
        assert_eq!(x, 128);
        let x = expect_square_conv2d_output_size(x, 4, 2, 1);
        assert_eq!(x, 64);
    }
}
