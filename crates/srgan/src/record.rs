//! # Pretrained-Artifact Record Utilities
//!
//! Loading PyTorch ``.pth`` artifacts into this crate's modules, including
//! the uniform strip of the literal ``module.`` parameter-name prefix left
//! behind by multi-device training wrappers.

use anyhow::Result;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Normalize a serialized parameter name.
///
/// Strips one leading ``module.`` prefix; unprefixed names pass through
/// unchanged, so normalization is idempotent.
pub fn normalize_state_key(key: &str) -> &str {
    key.strip_prefix("module.").unwrap_or(key)
}

/// [`LoadArgs`] applying [`normalize_state_key`]'s prefix strip as a key
/// remap.
pub fn distributed_load_args<P: Into<PathBuf>>(path: P) -> LoadArgs {
    LoadArgs::new(path.into()).with_key_remap(r"^module\.", "")
}

/// Load a PyTorch weight artifact into a module.
///
/// Parameter names are normalized with [`normalize_state_key`] before
/// matching; a name or shape mismatch fails the load, with no
/// partial-load recovery.
pub fn load_pytorch_module<B: Backend, M: Module<B>>(
    module: M,
    path: PathBuf,
) -> Result<M> {
    tracing::info!("loading pretrained weights from [{}]", path.display());

    let devices = module.devices();
    let device = &devices[0];

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new()
        .load::<M::Record>(distributed_load_args(path), device)?;

    Ok(module.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_state_key() {
        assert_eq!(normalize_state_key("conv.weight"), "conv.weight");
        assert_eq!(normalize_state_key("module.conv.weight"), "conv.weight");

        // Only the leading prefix is stripped.
        assert_eq!(
            normalize_state_key("layers.module.weight"),
            "layers.module.weight"
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for key in ["conv.weight", "module.conv.weight", "module.module.x"] {
            let once = normalize_state_key(key);
            assert_eq!(normalize_state_key(once), once);
        }
    }
}
