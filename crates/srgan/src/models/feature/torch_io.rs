//! # Torchvision Weight Stubs
//!
//! Stub modules mirroring the torchvision parameter layout of the feature
//! backbones. Loaded weights carry no information about stateless layers
//! (activations, pools), so artifacts are read into these stubs and the
//! tensors are then copied into this crate's own module structure.

#![allow(missing_docs)]

use crate::layers::blocks::cna::Cna2d;
use crate::layers::norm::Normalization;
use crate::models::feature::vgg::{VggFeatures, VggLayer, VggPlanOp, vgg19_plan};
use crate::models::feature::wide_resnet::{WideBottleneck, WideResnetExtractor};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dRecord};
use burn::nn::{BatchNorm, BatchNormRecord, Linear};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Copy conv + batch-norm records onto a [`Cna2d`].
fn copy_cna<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: Cna2d<B>,
) -> Cna2d<B> {
    let Cna2d {
        conv: target_conv,
        norm,
        act,
    } = target;
    match norm {
        Some(Normalization::Batch(target_bn)) => Cna2d {
            conv: target_conv.load_record(conv),
            norm: Some(target_bn.load_record(bn).into()),
            act,
        },
        other => panic!("stub weights require a batch-normalized block, got {other:?}"),
    }
}

/// Stub module matching the torchvision VGG parameter layout after key
/// remapping (``features.<i>`` becomes ``convs.<n>`` / ``norms.<n>``).
#[derive(Module, Debug)]
pub struct VggStub<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub norms: Vec<BatchNorm<B, 2>>,
    pub classifier: Vec<Linear<B>>,
}

/// Build the [`LoadArgs`] remapping torchvision VGG keys onto the
/// [`VggStub`] layout.
pub fn vgg_load_args(
    path: PathBuf,
    batch_norm: bool,
) -> LoadArgs {
    let mut args = LoadArgs::new(path).with_key_remap(r"^module\.", "");

    let mut conv_idx = 0;
    let mut norm_idx = 0;
    for (i, op) in vgg19_plan(3, batch_norm).into_iter().enumerate() {
        match op {
            VggPlanOp::Conv { .. } => {
                args = args.with_key_remap(
                    &format!(r"^features\.{i}\."),
                    &format!("convs.{conv_idx}."),
                );
                conv_idx += 1;
            }
            VggPlanOp::Norm { .. } => {
                args = args.with_key_remap(
                    &format!(r"^features\.{i}\."),
                    &format!("norms.{norm_idx}."),
                );
                norm_idx += 1;
            }
            _ => {}
        }
    }

    // The classifier head is not used, but its parameters are present in
    // the artifact and must land somewhere contiguous.
    args.with_key_remap(r"^classifier\.0\.", "classifier.0.")
        .with_key_remap(r"^classifier\.3\.", "classifier.1.")
        .with_key_remap(r"^classifier\.6\.", "classifier.2.")
}

/// Copy a [`VggStub`] record into a (possibly truncated) [`VggFeatures`].
pub fn copy_vgg_weights<B: Backend>(
    record: VggStubRecord<B>,
    target: VggFeatures<B>,
) -> VggFeatures<B> {
    let mut convs = record.convs.into_iter();
    let mut norms = record.norms.into_iter();

    let layers = target
        .layers
        .into_iter()
        .map(|layer| match layer {
            VggLayer::Conv(conv) => {
                let record = convs
                    .next()
                    .expect("pretrained VGG artifact has too few convolution entries");
                VggLayer::Conv(conv.load_record(record))
            }
            VggLayer::Norm(norm) => {
                let record = norms
                    .next()
                    .expect("pretrained VGG artifact has too few norm entries");
                VggLayer::Norm(norm.load_record(record))
            }
            other => other,
        })
        .collect();

    VggFeatures { layers }
}

/// Load torchvision VGG-19 weights onto a [`VggFeatures`].
pub fn load_torchvision_vgg<B: Backend>(
    features: VggFeatures<B>,
    path: PathBuf,
) -> anyhow::Result<VggFeatures<B>> {
    let devices = features.devices();
    let device = &devices[0];

    let args = vgg_load_args(path, features.batch_norm());
    let record: VggStubRecord<B> =
        PyTorchFileRecorder::<FullPrecisionSettings>::new().load(args, device)?;

    Ok(copy_vgg_weights(record, features))
}

#[derive(Module, Debug)]
pub struct WideDownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct WideBottleneckStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub downsample: Option<WideDownsampleStub<B>>,
}

impl<B: Backend> WideBottleneckStubRecord<B> {
    fn copy_weights(
        self,
        target: WideBottleneck<B>,
    ) -> WideBottleneck<B> {
        let WideBottleneck {
            cna1,
            cna2,
            cna3,
            downsample,
            act,
        } = target;

        let downsample = match (self.downsample, downsample) {
            (Some(stub), Some(target)) => Some(copy_cna(stub.conv, stub.bn, target)),
            (None, None) => None,
            (Some(_), None) => panic!("artifact has a residual projection the model lacks"),
            (None, Some(_)) => panic!("model has a residual projection the artifact lacks"),
        };

        WideBottleneck {
            cna1: copy_cna(self.conv1, self.bn1, cna1),
            cna2: copy_cna(self.conv2, self.bn2, cna2),
            cna3: copy_cna(self.conv3, self.bn3, cna3),
            downsample,
            act,
        }
    }
}

#[derive(Module, Debug)]
pub struct WideLayerStub<B: Backend> {
    pub blocks: Vec<WideBottleneckStub<B>>,
}

/// Stub module matching the torchvision wide-ResNet parameter layout
/// after key remapping.
#[derive(Module, Debug)]
pub struct WideResnetStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub layers: Vec<WideLayerStub<B>>,
    pub fc: Linear<B>,
}

/// Build the [`LoadArgs`] remapping torchvision ResNet keys onto the
/// [`WideResnetStub`] layout.
pub fn wide_resnet_load_args(path: PathBuf) -> LoadArgs {
    let mut args = LoadArgs::new(path)
        .with_key_remap(r"^module\.", "")
        .with_key_remap(r"downsample\.0", "downsample.conv")
        .with_key_remap(r"downsample\.1", "downsample.bn");

    for i in 1..=4usize {
        args = args.with_key_remap(
            &format!(r"^layer{i}\."),
            &format!("layers.{}.blocks.", i - 1),
        );
    }
    args
}

/// Copy a [`WideResnetStub`] record into a [`WideResnetExtractor`].
///
/// The artifact's fourth residual stage and classification head have no
/// counterpart in the truncated trunk and are dropped.
pub fn copy_wide_resnet_weights<B: Backend>(
    record: WideResnetStubRecord<B>,
    target: WideResnetExtractor<B>,
) -> WideResnetExtractor<B> {
    let WideResnetExtractor {
        stem,
        pool,
        layer1,
        layer2,
        layer3,
        input_norm,
    } = target;

    let mut stages = record.layers.into_iter();
    let mut next_stage = |targets: Vec<WideBottleneck<B>>| -> Vec<WideBottleneck<B>> {
        let stub = stages
            .next()
            .expect("pretrained wide-resnet artifact has too few residual stages");
        stub.blocks
            .into_iter()
            .zip(targets)
            .map(|(stub, target)| stub.copy_weights(target))
            .collect()
    };

    let layer1 = next_stage(layer1);
    let layer2 = next_stage(layer2);
    let layer3 = next_stage(layer3);

    WideResnetExtractor {
        stem: copy_cna(record.conv1, record.bn1, stem),
        pool,
        layer1,
        layer2,
        layer3,
        input_norm,
    }
}

/// Load torchvision wide-ResNet-50-2 weights onto a
/// [`WideResnetExtractor`].
pub fn load_torchvision_wide_resnet<B: Backend>(
    extractor: WideResnetExtractor<B>,
    path: PathBuf,
) -> anyhow::Result<WideResnetExtractor<B>> {
    let devices = extractor.devices();
    let device = &devices[0];

    let record: WideResnetStubRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::new()
        .load(wide_resnet_load_args(path), device)?;

    Ok(copy_wide_resnet_weights(record, extractor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vgg_load_args_cover_all_convs() {
        // 16 convs in the plain layout, 16 convs + 16 norms with bn.
        let plan = vgg19_plan(3, false);
        let convs = plan
            .iter()
            .filter(|op| matches!(op, VggPlanOp::Conv { .. }))
            .count();
        assert_eq!(convs, 16);

        let plan = vgg19_plan(3, true);
        let norms = plan
            .iter()
            .filter(|op| matches!(op, VggPlanOp::Norm { .. }))
            .count();
        assert_eq!(norms, 16);
    }
}
