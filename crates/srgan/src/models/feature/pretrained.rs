//! # Pretrained Backbone Catalog
//!
//! The torchvision classification backbones the feature extractors wrap.

use crate::cache::weights::{StaticWeightsCatalog, StaticWeightsDescriptor, WeightsDescriptor};

/// Catalog of the backbone weight artifacts.
pub static BACKBONE_WEIGHTS: StaticWeightsCatalog = StaticWeightsCatalog {
    items: &[
        &StaticWeightsDescriptor {
            name: "vgg19",
            description: "VGG-19 pretrained on ImageNet",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            url: "https://download.pytorch.org/models/vgg19-dcbb9e9d.pth",
        },
        &StaticWeightsDescriptor {
            name: "vgg19_bn",
            description: "Batch-normalized VGG-19 pretrained on ImageNet",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            url: "https://download.pytorch.org/models/vgg19_bn-c79401a0.pth",
        },
        &StaticWeightsDescriptor {
            name: "wide_resnet50_2",
            description: "Wide ResNet-50-2 pretrained on ImageNet",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            url: "https://download.pytorch.org/models/wide_resnet50_2-95faca4d.pth",
        },
    ],
};

/// Lookup a backbone descriptor by name.
pub fn backbone_descriptor(name: &str) -> anyhow::Result<WeightsDescriptor> {
    BACKBONE_WEIGHTS.to_catalog().try_lookup_by_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names() {
        let catalog = BACKBONE_WEIGHTS.to_catalog();
        let names: Vec<&str> = catalog.items.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["vgg19", "vgg19_bn", "wide_resnet50_2"]);
    }

    #[test]
    fn test_unknown_backbone() {
        let err = backbone_descriptor("vgg11").unwrap_err();
        assert!(err.to_string().contains("vgg11"));
    }
}
