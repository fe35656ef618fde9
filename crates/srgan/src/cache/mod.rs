//! # Pretrained-Weight Disk Cache
//!
//! Read-through caching of backbone weight artifacts under
//! ``~/.cache/srgan``.

pub mod disk;
pub mod weights;
