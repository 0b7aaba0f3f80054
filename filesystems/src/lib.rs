//! Filesystem and partitioning-scheme decoders for raw disk images.
//!
//! The `scheme` module decodes MBR and GPT partition tables; `ntfs` decodes
//! NTFS volume metadata down to individual MFT attributes. `registration`
//! wires the built-in plugins into a [`diskprobe_core::FilesystemDetector`].

pub mod ntfs;
pub mod registration;
pub mod scheme;

pub use registration::{builtin_detector, builtin_plugins};
pub use scheme::{detect_scheme, PartitionScheme};
