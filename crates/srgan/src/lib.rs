#![warn(missing_docs)]
//!# srgan - Super-Resolution GAN models for burn
//!
//! Architecture definitions and the configuration-driven factory for a
//! super-resolution GAN training framework.
//!
//! ## Notable Components
//!
//! * [`cache`] - pretrained-weight disk cache.
//! * [`layers`] - reusable neural network layers.
//!   * [`layers::blocks::cna`] - conv / optional-norm / optional-activation block.
//!   * [`layers::blocks::expansion`] - upsample-and-merge block.
//! * [`models`] - the model zoo.
//!   * [`models::discriminator`] - classifier, cross-compare, and pyramid discriminators.
//!   * [`models::feature`] - perceptual feature extractors.
//!   * [`models::generator`] - super-resolution generators.
//! * [`record`] - PyTorch artifact loading, `module.` prefix normalization.
//! * [`zoo`] - the network factory and its architecture registries.

pub mod cache;
pub mod layers;
pub mod models;
pub mod record;
pub mod zoo;
