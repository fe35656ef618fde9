//! # Network Factory
//!
//! Maps architecture names plus a parameter mapping to constructed,
//! uninitialized model instances. The supported architectures live in
//! data-driven registries, so the set is introspectable and adding a
//! variant is a registration rather than another dispatch arm.

pub mod options;

use crate::models::discriminator::{
    Discriminator, WeightedDiscriminator, cross_compare::CrossCompareDiscriminatorConfig,
    pix_pyramid::PixPyramidDiscriminatorConfig, unet::UnetDiscriminatorConfig,
    unet::UnetFeatureDiscriminatorConfig, vgg::Vgg128DiscriminatorConfig,
};
use crate::models::feature::pretrained::backbone_descriptor;
use crate::models::feature::torch_io::{load_torchvision_vgg, load_torchvision_wide_resnet};
use crate::models::feature::vgg::{QualityVggExtractorConfig, VggFeatureExtractorConfig};
use crate::models::feature::wide_resnet::WideResnetExtractorConfig;
use crate::models::feature::{FeatureExtractor, VggFeatureExtractor};
use crate::models::generator::{
    Generator, rrdb::RrdbNetConfig, srresnet::MsrResnetConfig,
};
use crate::layers::norm::NormalizationConfig;
use crate::record::load_pytorch_module;
use anyhow::{Error, Result, anyhow, bail};
use burn::module::Module;
use burn::prelude::Backend;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

pub use options::NetOptions;

/// Ambient inputs a builder may need beyond its own option keys.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a, B: Backend> {
    /// The global upscaling factor of the training run.
    pub scale: usize,

    /// The training target image resolution, when known; required by the
    /// VGG-head discriminators to size their flatten layer.
    pub image_size: Option<usize>,

    /// Target device.
    pub device: &'a B::Device,
}

/// Boxed architecture constructor.
pub type BuilderFn<B, M> =
    Arc<dyn Fn(&NetOptions<'_>, &BuildContext<'_, B>) -> Result<M> + Send + Sync>;

/// A named architecture registration.
pub struct ArchEntry<B: Backend, M> {
    /// Architecture name, as it appears in the options mapping.
    pub name: String,

    /// Human description.
    pub description: String,

    /// Constructor.
    pub builder: BuilderFn<B, M>,
}

impl<B: Backend, M> std::fmt::Debug for ArchEntry<B, M> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ArchEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Registry of architecture constructors for one model family.
#[derive(Debug)]
pub struct ArchRegistry<B: Backend, M> {
    family: &'static str,
    items: BTreeMap<String, ArchEntry<B, M>>,
}

impl<B: Backend, M> ArchRegistry<B, M> {
    /// Create an empty registry.
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            items: BTreeMap::new(),
        }
    }

    /// The model family this registry covers.
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Register an architecture constructor.
    pub fn register<F>(
        &mut self,
        name: &str,
        description: &str,
        builder: F,
    ) where
        F: Fn(&NetOptions<'_>, &BuildContext<'_, B>) -> Result<M> + Send + Sync + 'static,
    {
        self.items.insert(
            name.to_string(),
            ArchEntry {
                name: name.to_string(),
                description: description.to_string(),
                builder: Arc::new(builder),
            },
        );
    }

    /// The registered architecture names.
    pub fn names(&self) -> Vec<&str> {
        self.items.keys().map(String::as_str).collect()
    }

    /// Build a registered architecture.
    ///
    /// Unrecognized names fail with an error identifying the name; all
    /// other validation is the constructor's.
    pub fn try_build(
        &self,
        name: &str,
        opts: &NetOptions<'_>,
        ctx: &BuildContext<'_, B>,
    ) -> Result<M> {
        match self.items.get(name) {
            Some(entry) => {
                tracing::debug!("building {} model [{}]", self.family, name);
                (entry.builder)(opts, ctx)
            }
            None => bail!(
                "{} model [{}] is not recognized; known models: {:?}",
                self.family,
                name,
                self.names(),
            ),
        }
    }
}

/// The generator registry.
pub fn generator_registry<B: Backend>() -> ArchRegistry<B, Generator<B>> {
    let mut registry = ArchRegistry::new("Generator");

    registry.register(
        "MSRResNet",
        "modernized SRResNet; un-normalized residual trunk",
        |opts, ctx| {
            let config = MsrResnetConfig::new()
                .with_in_channels(opts.require_usize("in_nc")?)
                .with_out_channels(opts.require_usize("out_nc")?)
                .with_base_channels(opts.require_usize("nf")?)
                .with_num_blocks(opts.require_usize("nb")?)
                .with_scale(opts.usize_or("scale", ctx.scale)?);
            Ok(Generator::MsrResnet(config.init(ctx.device)))
        },
    );

    registry.register(
        "RRDBNet",
        "residual-in-residual dense block generator",
        |opts, ctx| {
            let config = RrdbNetConfig::new()
                .with_in_channels(opts.require_usize("in_nc")?)
                .with_out_channels(opts.require_usize("out_nc")?)
                .with_base_channels(opts.require_usize("nf")?)
                .with_num_blocks(opts.require_usize("nb")?)
                .with_growth_channels(opts.usize_or("gc", 32)?)
                .with_scale(ctx.scale);
            Ok(Generator::Rrdb(config.init(ctx.device)))
        },
    );

    registry
}

/// The discriminator registry.
pub fn discriminator_registry<B: Backend>() -> ArchRegistry<B, Discriminator<B>> {
    let mut registry = ArchRegistry::new("Discriminator");

    fn vgg_config(
        opts: &NetOptions<'_>,
        ctx: &BuildContext<'_, impl Backend>,
    ) -> Result<Vgg128DiscriminatorConfig> {
        let image_size = ctx.image_size.ok_or_else(|| {
            anyhow!("VGG-head discriminators require the training image size")
        })?;
        Ok(
            Vgg128DiscriminatorConfig::new(
                opts.require_usize("in_nc")?,
                opts.require_usize("nf")?,
            )
            .with_input_size(image_size),
        )
    }

    registry.register(
        "discriminator_vgg_128",
        "batch-normalized VGG-style classifier",
        |opts, ctx| {
            let config = vgg_config(opts, ctx)?
                .with_extra_conv(opts.bool_or("extra_conv", false)?);
            config.try_validate().map_err(Error::msg)?;
            Ok(Discriminator::Vgg128(config.init(ctx.device)))
        },
    );

    registry.register(
        "discriminator_vgg_128_gn",
        "group-normalized VGG-style classifier",
        |opts, ctx| {
            let config = vgg_config(opts, ctx)?.with_norm(NormalizationConfig::group(8));
            config.try_validate().map_err(Error::msg)?;
            Ok(Discriminator::Vgg128(config.init(ctx.device)))
        },
    );

    registry.register(
        "discriminator_pix",
        "pyramid discriminator with per-pixel losses at three scales",
        |opts, ctx| {
            let config = PixPyramidDiscriminatorConfig::new(
                opts.require_usize("in_nc")?,
                opts.require_usize("nf")?,
            );
            Ok(Discriminator::PixPyramid(config.init(ctx.device)))
        },
    );

    registry.register(
        "discriminator_unet",
        "U-Net discriminator scoring three decoder scales",
        |opts, ctx| {
            let config = UnetDiscriminatorConfig::new(
                opts.require_usize("in_nc")?,
                opts.require_usize("nf")?,
            );
            Ok(Discriminator::Unet(config.init(ctx.device)))
        },
    );

    registry.register(
        "discriminator_unet_fea",
        "U-Net discriminator with a feature output",
        |opts, ctx| {
            let config = UnetFeatureDiscriminatorConfig::new(
                opts.require_usize("in_nc")?,
                opts.require_usize("nf")?,
            )
            .with_feature_mode(opts.bool_or("feature_mode", false)?);
            Ok(Discriminator::UnetFeature(config.init(ctx.device)))
        },
    );

    registry.register(
        "cross_compare_vgg128",
        "two-stream discriminator comparing an image against its reference",
        |opts, ctx| {
            let config = CrossCompareDiscriminatorConfig::new(
                opts.require_usize("in_nc")?,
                opts.require_usize("nf")?,
            )
            .with_ref_channels(opts.opt_usize("in_nc_ref")?)
            .with_scale(opts.require_usize("scale")?);
            Ok(Discriminator::CrossCompare(config.init(ctx.device)))
        },
    );

    registry
}

/// Build a generator from the full options mapping.
///
/// Reads the global `scale` and the `network_G` section.
pub fn build_generator<B: Backend>(
    opt: &Value,
    device: &B::Device,
) -> Result<Generator<B>> {
    let root = NetOptions::from_value(opt)?;
    let scale = root.require_usize("scale")?;
    let opts = root.section("network_G")?;
    let which = opts.require_str("which_model_G")?;

    let ctx = BuildContext {
        scale,
        image_size: None,
        device,
    };
    generator_registry::<B>().try_build(which, &opts, &ctx)
}

/// Build a discriminator from its options section.
pub fn build_discriminator_net<B: Backend>(
    opts: &NetOptions<'_>,
    image_size: Option<usize>,
    device: &B::Device,
) -> Result<Discriminator<B>> {
    let which = opts.require_str("which_model_D")?;

    let ctx = BuildContext {
        scale: 1,
        image_size,
        device,
    };
    discriminator_registry::<B>().try_build(which, opts, &ctx)
}

/// Build a discriminator from the full options mapping.
///
/// Reads the training target size (for the VGG-head flatten sizing) and
/// the `network_D` section.
pub fn build_discriminator<B: Backend>(
    opt: &Value,
    device: &B::Device,
) -> Result<Discriminator<B>> {
    let root = NetOptions::from_value(opt)?;
    let image_size = root
        .section("datasets")?
        .section("train")?
        .require_usize("target_size")?;
    let opts = root.section("network_D")?;

    build_discriminator_net(&opts, Some(image_size), device)
}

/// Build a frozen discriminator from a pretrained artifact.
///
/// The options section describes the architecture plus `pretrained_path`
/// and `weight`. The artifact's parameter names are normalized (the
/// `module.` prefix strip) before loading; the loaded model is frozen and
/// paired with its loss-combination weight.
pub fn load_frozen_discriminator<B: Backend>(
    opt: &Value,
    image_size: Option<usize>,
    device: &B::Device,
) -> Result<WeightedDiscriminator<B>> {
    let opts = NetOptions::from_value(opt)?;
    let path = PathBuf::from(opts.require_str("pretrained_path")?);
    let weight = opts.require_f64("weight")?;

    let model = match build_discriminator_net(&opts, image_size, device)? {
        Discriminator::Vgg128(model) => {
            Discriminator::Vgg128(load_pytorch_module(model, path)?)
        }
        Discriminator::CrossCompare(model) => {
            Discriminator::CrossCompare(load_pytorch_module(model, path)?)
        }
        Discriminator::PixPyramid(model) => {
            Discriminator::PixPyramid(load_pytorch_module(model, path)?)
        }
        Discriminator::Unet(model) => Discriminator::Unet(load_pytorch_module(model, path)?),
        Discriminator::UnetFeature(model) => {
            Discriminator::UnetFeature(load_pytorch_module(model, path)?)
        }
    };

    Ok(WeightedDiscriminator {
        model: model.no_grad(),
        weight,
    })
}

/// The feature-extractor architecture names.
pub const FEATURE_EXTRACTOR_NAMES: [&str; 3] = ["vgg", "qual_vgg", "wide_resnet"];

/// Build a perceptual feature extractor.
///
/// # Arguments
///
/// - `opt`: the full options mapping; `train.which_model_F` selects the
///   architecture when `which` is not given (default `"vgg"`).
/// - `which`: architecture override.
/// - `use_bn`: use the batch-normalized VGG layout (truncation moves from
///   layer 34 to 49).
/// - `for_training`: leave the backbone randomly initialized and
///   trainable instead of pretrained-frozen.
/// - `load_path`: optional fine-tuned backbone artifact (torchvision
///   layout); the loaded extractor is frozen.
pub fn build_feature_extractor<B: Backend>(
    opt: &Value,
    which: Option<&str>,
    use_bn: bool,
    for_training: bool,
    load_path: Option<PathBuf>,
    device: &B::Device,
) -> Result<FeatureExtractor<B>> {
    let root = NetOptions::from_value(opt)?;
    let which = match which {
        Some(name) => name.to_string(),
        None => root
            .section("train")?
            .opt_str("which_model_F")?
            .unwrap_or("vgg")
            .to_string(),
    };
    tracing::debug!("building feature extractor [{which}]");

    let feature_layer = if use_bn { 49 } else { 34 };

    let mut extractor = match which.as_str() {
        "vgg" => {
            let extractor: VggFeatureExtractor<B> = VggFeatureExtractorConfig::new()
                .with_feature_layer(feature_layer)
                .with_batch_norm(use_bn)
                .init(device);
            if for_training {
                FeatureExtractor::Vgg(extractor)
            } else {
                let descriptor =
                    backbone_descriptor(if use_bn { "vgg19_bn" } else { "vgg19" })?;
                let path = descriptor.fetch()?;

                let VggFeatureExtractor {
                    features,
                    input_norm,
                } = extractor;
                FeatureExtractor::Vgg(VggFeatureExtractor {
                    features: load_torchvision_vgg(features, path)?,
                    input_norm,
                })
                .no_grad()
            }
        }
        "qual_vgg" => FeatureExtractor::VggQuality(
            QualityVggExtractorConfig::new()
                .with_feature_layer(feature_layer)
                .with_batch_norm(use_bn)
                .init(device),
        ),
        "wide_resnet" => {
            let extractor = WideResnetExtractorConfig::new().init(device);
            let path = backbone_descriptor("wide_resnet50_2")?.fetch()?;
            FeatureExtractor::WideResnet(load_torchvision_wide_resnet(extractor, path)?)
                .no_grad()
        }
        other => bail!(
            "Feature extractor model [{}] is not recognized; known models: {:?}",
            other,
            FEATURE_EXTRACTOR_NAMES,
        ),
    };

    if let Some(path) = load_path {
        extractor = match extractor {
            FeatureExtractor::Vgg(extractor) => {
                let VggFeatureExtractor {
                    features,
                    input_norm,
                } = extractor;
                FeatureExtractor::Vgg(VggFeatureExtractor {
                    features: load_torchvision_vgg(features, path)?,
                    input_norm,
                })
            }
            FeatureExtractor::WideResnet(extractor) => {
                FeatureExtractor::WideResnet(load_torchvision_wide_resnet(extractor, path)?)
            }
            FeatureExtractor::VggQuality(_) => {
                bail!("loading fine-tuned quality-head extractors is not supported")
            }
        }
        .no_grad();
    }

    Ok(extractor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::discriminator::DiscriminatorInput;
    use burn::backend::{Autodiff, NdArray};
    use burn::prelude::Tensor;
    use serde_json::json;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_registry_names() {
        let names = discriminator_registry::<TestBackend>().names();
        assert_eq!(
            names,
            vec![
                "cross_compare_vgg128",
                "discriminator_pix",
                "discriminator_unet",
                "discriminator_unet_fea",
                "discriminator_vgg_128",
                "discriminator_vgg_128_gn",
            ]
        );

        let names = generator_registry::<TestBackend>().names();
        assert_eq!(names, vec!["MSRResNet", "RRDBNet"]);
    }

    #[test]
    fn test_unrecognized_name() {
        let device = Default::default();
        let value = json!({ "which_model_D": "bogus_arch" });
        let opts = NetOptions::from_value(&value).unwrap();

        let err =
            build_discriminator_net::<TestBackend>(&opts, Some(128), &device).unwrap_err();
        assert!(err.to_string().contains("bogus_arch"));
    }

    #[test]
    fn test_missing_key_names_the_key() {
        let device = Default::default();
        let value = json!({ "which_model_D": "discriminator_unet", "in_nc": 3 });
        let opts = NetOptions::from_value(&value).unwrap();

        let err = build_discriminator_net::<TestBackend>(&opts, None, &device).unwrap_err();
        assert!(err.to_string().contains("nf"));
    }

    #[test]
    fn test_build_generator() {
        let device = Default::default();
        let opt = json!({
            "scale": 2,
            "network_G": {
                "which_model_G": "MSRResNet",
                "in_nc": 3, "out_nc": 3, "nf": 8, "nb": 2,
            },
        });

        let generator = build_generator::<TestBackend>(&opt, &device).unwrap();

        let input = Tensor::zeros([1, 3, 8, 8], &device);
        let output = generator.forward(input);
        assert_eq!(output.dims(), [1, 3, 16, 16]);
    }

    #[test]
    fn test_build_rrdb_generator() {
        let device = Default::default();
        let opt = json!({
            "scale": 4,
            "network_G": {
                "which_model_G": "RRDBNet",
                "in_nc": 3, "out_nc": 3, "nf": 8, "nb": 1, "gc": 4,
            },
        });

        let generator = build_generator::<TestBackend>(&opt, &device).unwrap();

        let input = Tensor::zeros([1, 3, 4, 4], &device);
        let output = generator.forward(input);
        assert_eq!(output.dims(), [1, 3, 16, 16]);
    }

    #[test]
    fn test_build_discriminator_from_full_options() {
        let device = Default::default();
        let opt = json!({
            "datasets": { "train": { "target_size": 32 } },
            "network_D": {
                "which_model_D": "discriminator_vgg_128",
                "in_nc": 3, "nf": 4, "extra_conv": false,
            },
        });

        let discriminator = build_discriminator::<TestBackend>(&opt, &device).unwrap();
        assert!(discriminator.pixgan_parameters().is_none());

        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = discriminator.forward(DiscriminatorInput::Single(input));
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_vgg_head_requires_image_size() {
        let device = Default::default();
        let value = json!({
            "which_model_D": "discriminator_vgg_128_gn",
            "in_nc": 3, "nf": 8,
        });
        let opts = NetOptions::from_value(&value).unwrap();

        let err = build_discriminator_net::<TestBackend>(&opts, None, &device).unwrap_err();
        assert!(err.to_string().contains("image size"));
    }

    #[test]
    fn test_vgg_head_rejects_indivisible_image_size() {
        let device = Default::default();
        let value = json!({
            "which_model_D": "discriminator_vgg_128_gn",
            "in_nc": 3, "nf": 8,
        });
        let opts = NetOptions::from_value(&value).unwrap();

        let err =
            build_discriminator_net::<TestBackend>(&opts, Some(100), &device).unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_build_pyramid_discriminators() {
        let device = Default::default();

        for (which, pixgan) in [
            ("discriminator_pix", (3, 8)),
            ("discriminator_unet", (3, 4)),
            ("discriminator_unet_fea", (1, 4)),
        ] {
            let value = json!({ "which_model_D": which, "in_nc": 3, "nf": 8 });
            let opts = NetOptions::from_value(&value).unwrap();

            let discriminator =
                build_discriminator_net::<TestBackend>(&opts, None, &device).unwrap();
            assert_eq!(discriminator.pixgan_parameters(), Some(pixgan));

            let input = Tensor::zeros([2, 3, 32, 32], &device);
            let output = discriminator.forward(DiscriminatorInput::Single(input));

            let levels = if which == "discriminator_unet_fea" { 1 } else { 3 };
            assert_eq!(output.dims(), [2 * levels, 1]);
        }
    }

    #[test]
    fn test_build_cross_compare() {
        let device = Default::default();
        let value = json!({
            "which_model_D": "cross_compare_vgg128",
            "in_nc": 3, "nf": 8, "scale": 4, "in_nc_ref": null,
        });
        let opts = NetOptions::from_value(&value).unwrap();

        let discriminator =
            build_discriminator_net::<TestBackend>(&opts, None, &device).unwrap();
        assert_eq!(discriminator.pixgan_parameters(), Some((3, 64)));

        let image = Tensor::zeros([2, 3, 64, 64], &device);
        let reference = Tensor::zeros([2, 3, 16, 16], &device);
        let output = discriminator.forward(DiscriminatorInput::Pair { image, reference });
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_trainable_extractor_tracks_gradients() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let opt = json!({ "train": {} });
        let extractor =
            build_feature_extractor::<B>(&opt, Some("qual_vgg"), false, true, None, &device)
                .unwrap();

        let FeatureExtractor::VggQuality(extractor) = extractor else {
            panic!("expected the quality extractor");
        };
        let weight = match &extractor.base.features.layers[0] {
            crate::models::feature::vgg::VggLayer::Conv(conv) => conv.weight.val(),
            other => panic!("expected a conv layer, got {other:?}"),
        };
        assert!(weight.is_require_grad());
    }

    #[test]
    fn test_frozen_extractor_disables_gradients() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        // Freeze without the pretrained fetch; the factory's frozen path
        // applies the same `no_grad`.
        let extractor: VggFeatureExtractor<B> = VggFeatureExtractorConfig::new()
            .with_feature_layer(10)
            .init(&device);
        let extractor = extractor.no_grad();

        let weight = match &extractor.features.layers[0] {
            crate::models::feature::vgg::VggLayer::Conv(conv) => conv.weight.val(),
            other => panic!("expected a conv layer, got {other:?}"),
        };
        assert!(!weight.is_require_grad());
    }

    #[test]
    fn test_unrecognized_feature_extractor() {
        let device = Default::default();
        let opt = json!({ "train": {} });

        let err = build_feature_extractor::<TestBackend>(
            &opt,
            Some("resnet18"),
            false,
            true,
            None,
            &device,
        )
        .unwrap_err();
        assert!(err.to_string().contains("resnet18"));
    }

    #[test]
    fn test_record_roundtrip_is_identical() {
        let device = Default::default();

        let value = json!({
            "which_model_D": "discriminator_vgg_128_gn",
            "in_nc": 3, "nf": 8,
        });
        let opts = NetOptions::from_value(&value).unwrap();

        let source =
            build_discriminator_net::<TestBackend>(&opts, Some(32), &device).unwrap();

        let input: Tensor<TestBackend, 4> =
            Tensor::random([1, 3, 32, 32], burn::tensor::Distribution::Default, &device);
        let expected = source.forward(DiscriminatorInput::Single(input.clone()));

        let record = source.into_record();
        let reloaded = build_discriminator_net::<TestBackend>(&opts, Some(32), &device)
            .unwrap()
            .load_record(record);

        let output = reloaded.forward(DiscriminatorInput::Single(input));
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
