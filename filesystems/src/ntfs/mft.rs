// Master File Table access with a lazy record cache

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::debug;

use diskprobe_core::{ByteCursor, ByteSource, ProbeError};

use super::mft_entry::MftEntry;

/// Number of reserved system records at the front of the MFT.
pub const NUM_SYSTEM_ENTRIES: u64 = 12;

/// A window onto the MFT of one volume.
///
/// Records are fetched on demand and cached, so each index hits the
/// source at most once for the table's lifetime.
#[derive(Debug)]
pub struct MftTable {
    source: ByteSource,
    /// Absolute byte offset of the MFT on the underlying source.
    offset: u64,
    record_size: u32,
    cache: HashMap<u64, MftEntry>,
}

impl MftTable {
    pub fn new(source: ByteSource, offset: u64, record_size: u32) -> Self {
        Self {
            source,
            offset,
            record_size,
            cache: HashMap::new(),
        }
    }

    pub fn record_size(&self) -> u32 {
        self.record_size
    }

    /// Fetch the record at `index`, reading it from the source on the
    /// first request and from the cache afterwards.
    pub fn get_entry(&mut self, index: u64) -> Result<&MftEntry, ProbeError> {
        match self.cache.entry(index) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let offset = self.offset + index * u64::from(self.record_size);
                let cursor = ByteCursor::load(&self.source, offset, self.record_size as usize)?;
                let entry = MftEntry::decode(&cursor, index)?;
                debug!("loaded MFT record {index} ({})", entry.name().unwrap_or("unnamed"));
                Ok(slot.insert(entry))
            }
        }
    }

    /// Load the reserved system records ($MFT through $Extend) into the
    /// cache in one pass.
    pub fn preload_system_entries(&mut self) -> Result<(), ProbeError> {
        for index in 0..NUM_SYSTEM_ENTRIES {
            self.get_entry(index)?;
        }
        Ok(())
    }

    /// Number of records currently held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::attributes::tests::{build_file_name_attr, build_volume_name_attr};
    use crate::ntfs::mft_entry::tests::{build_record, RECORD_SIZE};
    use crate::ntfs::mft_entry::ENTRY_VOLUME;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// An MFT image with the 12 system records at `MFT_BASE` of a larger
    /// buffer, so offsets are exercised.
    const MFT_BASE: u64 = 4096;

    fn build_mft_image() -> Vec<u8> {
        let mut image = vec![0u8; MFT_BASE as usize + 12 * RECORD_SIZE];
        for index in 0..12u64 {
            let record = if index == ENTRY_VOLUME {
                build_record(&[build_volume_name_attr("DATA")])
            } else if index == 0 {
                build_record(&[build_file_name_attr(5, "$MFT")])
            } else {
                build_record(&[])
            };
            let start = MFT_BASE as usize + index as usize * RECORD_SIZE;
            image[start..start + RECORD_SIZE].copy_from_slice(&record);
        }
        image
    }

    #[test]
    fn fetches_records_by_index() {
        let source = ByteSource::buffer(build_mft_image());
        let mut mft = MftTable::new(source, MFT_BASE, RECORD_SIZE as u32);
        assert_eq!(mft.get_entry(0).unwrap().name(), Some("$MFT"));
        let volume = mft.get_entry(ENTRY_VOLUME).unwrap();
        assert_eq!(volume.volume_name().unwrap().name, "DATA");
        assert_eq!(mft.cached_len(), 2);
    }

    #[test]
    fn preload_caches_the_system_range() {
        let source = ByteSource::buffer(build_mft_image());
        let mut mft = MftTable::new(source, MFT_BASE, RECORD_SIZE as u32);
        mft.preload_system_entries().unwrap();
        assert_eq!(mft.cached_len(), 12);
    }

    #[test]
    fn cached_records_never_touch_the_source_again() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&build_mft_image()).unwrap();
        let path = file.path().to_path_buf();
        let mut mft = MftTable::new(ByteSource::file(&path), MFT_BASE, RECORD_SIZE as u32);
        assert_eq!(mft.get_entry(0).unwrap().name(), Some("$MFT"));

        // With the backing file gone only the cache can serve this.
        drop(file);
        assert_eq!(mft.get_entry(0).unwrap().name(), Some("$MFT"));
        assert!(mft.get_entry(1).is_err());
    }

    #[test]
    fn read_past_the_source_is_io_error() {
        let source = ByteSource::buffer(build_mft_image());
        let mut mft = MftTable::new(source, MFT_BASE, RECORD_SIZE as u32);
        assert!(matches!(
            mft.get_entry(500).unwrap_err(),
            ProbeError::IoError(_)
        ));
    }
}
