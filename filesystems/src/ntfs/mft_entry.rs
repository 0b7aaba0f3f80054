// MFT file records and their attribute walk

use std::fmt;

use log::warn;
use serde::Serialize;

use diskprobe_core::{ByteCursor, ProbeError};

use super::attributes::{
    AttrPayload, FileName, MftAttribute, VolumeInformation, VolumeName, ATTR_END_MARKER,
    ATTR_FILE_NAME, ATTR_VOLUME_INFORMATION, ATTR_VOLUME_NAME,
};

pub const ENTRY_SIGNATURE: &[u8; 4] = b"FILE";
pub const ENTRY_HEADER_SIZE: usize = 48;

// MFT record header flags
pub const ENTRY_IN_USE: u16 = 0x0001;
pub const ENTRY_IS_DIRECTORY: u16 = 0x0002;

// Well-known system record indexes
pub const ENTRY_MFT: u64 = 0;
pub const ENTRY_MFT_MIRROR: u64 = 1;
pub const ENTRY_LOG_FILE: u64 = 2;
pub const ENTRY_VOLUME: u64 = 3;
pub const ENTRY_ATTR_DEF: u64 = 4;
pub const ENTRY_ROOT: u64 = 5;
pub const ENTRY_BITMAP: u64 = 6;
pub const ENTRY_BOOT: u64 = 7;
pub const ENTRY_BAD_CLUSTERS: u64 = 8;
pub const ENTRY_SECURE: u64 = 9;
pub const ENTRY_UPCASE: u64 = 10;
pub const ENTRY_EXTEND: u64 = 11;

/// Reserved name of a system MFT record, if `index` is one.
pub fn system_entry_name(index: u64) -> Option<&'static str> {
    match index {
        ENTRY_MFT => Some("$MFT"),
        ENTRY_MFT_MIRROR => Some("$MFTMirr"),
        ENTRY_LOG_FILE => Some("$LogFile"),
        ENTRY_VOLUME => Some("$Volume"),
        ENTRY_ATTR_DEF => Some("$AttrDef"),
        ENTRY_ROOT => Some("."),
        ENTRY_BITMAP => Some("$Bitmap"),
        ENTRY_BOOT => Some("$Boot"),
        ENTRY_BAD_CLUSTERS => Some("$BadClus"),
        ENTRY_SECURE => Some("$Secure"),
        ENTRY_UPCASE => Some("$UpCase"),
        ENTRY_EXTEND => Some("$Extend"),
        _ => None,
    }
}

/// The fixed 48-byte header of an MFT file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MftEntryHeader {
    pub signature: [u8; 4],
    pub fixup_offset: u16,
    pub fixup_count: u16,
    pub logfile_sequence: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub attributes_offset: u16,
    pub flags: u16,
    pub used_size: u32,
    pub allocated_size: u32,
    pub base_record: u64,
    pub next_attribute_id: u16,
    pub record_number: u32,
}

impl MftEntryHeader {
    fn decode(cursor: &ByteCursor) -> Result<Self, ProbeError> {
        if cursor.size() < ENTRY_HEADER_SIZE {
            return Err(ProbeError::FormatError(format!(
                "MFT record of {} bytes cannot hold a header",
                cursor.size()
            )));
        }
        let mut signature = [0u8; 4];
        signature.copy_from_slice(cursor.get_bytes(0, 4));
        Ok(Self {
            signature,
            fixup_offset: cursor.get_u16_le(0x04),
            fixup_count: cursor.get_u16_le(0x06),
            logfile_sequence: cursor.get_u64_le(0x08),
            sequence_number: cursor.get_u16_le(0x10),
            hard_link_count: cursor.get_u16_le(0x12),
            attributes_offset: cursor.get_u16_le(0x14),
            flags: cursor.get_u16_le(0x16),
            used_size: cursor.get_u32_le(0x18),
            allocated_size: cursor.get_u32_le(0x1C),
            base_record: cursor.get_u64_le(0x20),
            next_attribute_id: cursor.get_u16_le(0x28),
            record_number: cursor.get_u32_le(0x2C),
        })
    }
}

/// One decoded MFT record: header plus the attributes found by walking
/// the record from `attributes_offset` to the 0xFFFFFFFF end marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MftEntry {
    /// Position in the MFT, in records.
    pub index: u64,
    pub header: MftEntryHeader,
    pub attributes: Vec<MftAttribute>,
}

impl MftEntry {
    /// Decode the record slice for MFT index `index`.
    ///
    /// Records whose signature is not `FILE` (BAAD, zeroed slack) keep
    /// their header verbatim and an empty attribute list; the walk only
    /// runs over well-formed records.
    pub fn decode(cursor: &ByteCursor, index: u64) -> Result<Self, ProbeError> {
        let header = MftEntryHeader::decode(cursor)?;

        if &header.signature != ENTRY_SIGNATURE {
            warn!(
                "MFT record {index} has signature {:02X?}, keeping it opaque",
                header.signature
            );
            return Ok(Self {
                index,
                header,
                attributes: Vec::new(),
            });
        }

        let attributes = Self::walk_attributes(cursor, &header)?;
        Ok(Self {
            index,
            header,
            attributes,
        })
    }

    fn walk_attributes(
        cursor: &ByteCursor,
        header: &MftEntryHeader,
    ) -> Result<Vec<MftAttribute>, ProbeError> {
        let mut attributes = Vec::new();
        let mut offset = usize::from(header.attributes_offset);

        while offset + 8 <= cursor.size() {
            if cursor.get_u32_le(offset) == ATTR_END_MARKER {
                break;
            }
            let length = cursor.get_u32_le(offset + 4) as usize;
            if length < 8 || offset + length > cursor.size() {
                return Err(ProbeError::FormatError(format!(
                    "attribute at record offset {offset} claims {length} bytes"
                )));
            }

            let slice = cursor.chunk(offset, length);
            match MftAttribute::decode(&slice)? {
                Some(attribute) => attributes.push(attribute),
                None => break,
            }
            offset += length;
        }

        Ok(attributes)
    }

    /// First attribute with the given type code, in record order.
    pub fn lookup_attribute(&self, type_code: u32) -> Option<&MftAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.header.type_code == type_code)
    }

    pub fn file_name(&self) -> Option<&FileName> {
        match &self.lookup_attribute(ATTR_FILE_NAME)?.payload {
            AttrPayload::FileName(fname) => Some(fname),
            _ => None,
        }
    }

    pub fn volume_name(&self) -> Option<&VolumeName> {
        match &self.lookup_attribute(ATTR_VOLUME_NAME)?.payload {
            AttrPayload::VolumeName(name) => Some(name),
            _ => None,
        }
    }

    pub fn volume_information(&self) -> Option<&VolumeInformation> {
        match &self.lookup_attribute(ATTR_VOLUME_INFORMATION)?.payload {
            AttrPayload::VolumeInformation(info) => Some(info),
            _ => None,
        }
    }

    /// Record name: the $FILE_NAME attribute if present, else the reserved
    /// system name for the index.
    pub fn name(&self) -> Option<&str> {
        self.file_name()
            .map(|fname| fname.name.as_str())
            .or_else(|| system_entry_name(self.index))
    }

    pub fn is_in_use(&self) -> bool {
        self.header.flags & ENTRY_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.header.flags & ENTRY_IS_DIRECTORY != 0
    }
}

impl fmt::Display for MftEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MFT Record {} ({}): {} attributes, in use: {}",
            self.index,
            self.name().unwrap_or("unnamed"),
            self.attributes.len(),
            self.is_in_use()
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ntfs::attributes::tests::{
        build_file_name_attr, build_standard_information_attr, build_volume_information_attr,
        build_volume_name_attr,
    };
    use crate::ntfs::attributes::ATTR_STANDARD_INFORMATION;

    pub(crate) const RECORD_SIZE: usize = 1024;
    const ATTRS_OFFSET: usize = 0x38;

    /// Well-formed `record_size`-byte MFT record containing `attrs` in
    /// order, followed by the end marker.
    pub(crate) fn build_record(attrs: &[Vec<u8>]) -> Vec<u8> {
        let mut record = vec![0u8; RECORD_SIZE];
        record[0..4].copy_from_slice(ENTRY_SIGNATURE);
        record[0x14..0x16].copy_from_slice(&(ATTRS_OFFSET as u16).to_le_bytes());
        record[0x16..0x18].copy_from_slice(&ENTRY_IN_USE.to_le_bytes());

        let mut offset = ATTRS_OFFSET;
        for attr in attrs {
            record[offset..offset + attr.len()].copy_from_slice(attr);
            offset += attr.len();
        }
        record[offset..offset + 4].copy_from_slice(&ATTR_END_MARKER.to_le_bytes());

        let used = (offset + 8) as u32;
        record[0x18..0x1C].copy_from_slice(&used.to_le_bytes());
        record[0x1C..0x20].copy_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
        record
    }

    #[test]
    fn walks_attributes_to_end_marker() {
        let record = build_record(&[
            build_standard_information_attr(true),
            build_file_name_attr(5, "$MFT"),
        ]);
        let entry = MftEntry::decode(&ByteCursor::new(record), 0).unwrap();
        assert_eq!(entry.attributes.len(), 2);
        assert!(entry.is_in_use());
        assert!(!entry.is_directory());
        assert!(entry.lookup_attribute(ATTR_STANDARD_INFORMATION).is_some());
        assert_eq!(entry.file_name().unwrap().name, "$MFT");
        assert_eq!(entry.name(), Some("$MFT"));
    }

    #[test]
    fn volume_record_exposes_name_and_version() {
        let record = build_record(&[
            build_volume_name_attr("ARCHIVE"),
            build_volume_information_attr(3, 1, 0),
        ]);
        let entry = MftEntry::decode(&ByteCursor::new(record), ENTRY_VOLUME).unwrap();
        assert_eq!(entry.volume_name().unwrap().name, "ARCHIVE");
        let info = entry.volume_information().unwrap();
        assert_eq!((info.major_version, info.minor_version), (3, 1));
        // No $FILE_NAME attribute, so the reserved name applies.
        assert_eq!(entry.name(), Some("$Volume"));
    }

    #[test]
    fn baad_record_stays_opaque() {
        let mut record = build_record(&[build_file_name_attr(5, "ghost")]);
        record[0..4].copy_from_slice(b"BAAD");
        let entry = MftEntry::decode(&ByteCursor::new(record), 17).unwrap();
        assert_eq!(&entry.header.signature, b"BAAD");
        assert!(entry.attributes.is_empty());
        assert_eq!(entry.name(), None);
    }

    #[test]
    fn zeroed_record_stays_opaque() {
        let record = vec![0u8; RECORD_SIZE];
        let entry = MftEntry::decode(&ByteCursor::new(record), 30).unwrap();
        assert!(entry.attributes.is_empty());
    }

    #[test]
    fn corrupt_attribute_length_is_format_error() {
        let mut record = build_record(&[build_file_name_attr(5, "x")]);
        // Claim a length that runs past the record.
        record[ATTRS_OFFSET + 4..ATTRS_OFFSET + 8]
            .copy_from_slice(&(RECORD_SIZE as u32 * 2).to_le_bytes());
        let err = MftEntry::decode(&ByteCursor::new(record), 0).unwrap_err();
        assert!(matches!(err, ProbeError::FormatError(_)));
    }

    #[test]
    fn unknown_attribute_type_ends_the_walk() {
        let mut bogus = vec![0u8; 0x18];
        bogus[0..4].copy_from_slice(&0x0777u32.to_le_bytes());
        bogus[4..8].copy_from_slice(&0x18u32.to_le_bytes());
        let record = build_record(&[
            build_standard_information_attr(false),
            bogus,
            build_file_name_attr(5, "after"),
        ]);
        let entry = MftEntry::decode(&ByteCursor::new(record), 0).unwrap();
        assert_eq!(entry.attributes.len(), 1);
    }

    #[test]
    fn system_names_cover_the_reserved_range() {
        assert_eq!(system_entry_name(0), Some("$MFT"));
        assert_eq!(system_entry_name(3), Some("$Volume"));
        assert_eq!(system_entry_name(11), Some("$Extend"));
        assert_eq!(system_entry_name(12), None);
    }
}
