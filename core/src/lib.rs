pub mod cursor;
pub mod detector;
pub mod error;
pub mod source;
pub mod volume;

pub use cursor::ByteCursor;
pub use detector::{FilesystemDetector, FilesystemPlugin};
pub use error::ProbeError;
pub use source::ByteSource;
pub use volume::{PartitionTypeId, UnknownVolume, Volume};
