// MFT attribute headers and typed payloads

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use diskprobe_core::{ByteCursor, ProbeError};

// Attribute type codes
pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_OBJECT_ID: u32 = 0x40;
pub const ATTR_SECURITY_DESCRIPTOR: u32 = 0x50;
pub const ATTR_VOLUME_NAME: u32 = 0x60;
pub const ATTR_VOLUME_INFORMATION: u32 = 0x70;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_INDEX_ROOT: u32 = 0x90;
pub const ATTR_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_BITMAP: u32 = 0xB0;
pub const ATTR_REPARSE_POINT: u32 = 0xC0;
pub const ATTR_LOGGED_UTILITY_STREAM: u32 = 0x100;
/// Terminates the attribute list of an MFT record.
pub const ATTR_END_MARKER: u32 = 0xFFFF_FFFF;

// Attribute flags
pub const ATTR_COMPRESSION_MASK: u16 = 0x00FF;
pub const ATTR_IS_ENCRYPTED: u16 = 0x4000;
pub const ATTR_IS_SPARSE: u16 = 0x8000;

// $VOLUME_INFORMATION flags
pub const VOLUME_IS_DIRTY: u16 = 0x0001;
pub const VOLUME_RESIZE_LOG_FILE: u16 = 0x0002;
pub const VOLUME_UPGRADE_ON_MOUNT: u16 = 0x0004;
pub const VOLUME_MOUNTED_ON_NT4: u16 = 0x0008;
pub const VOLUME_MODIFIED_BY_CHKDSK: u16 = 0x8000;

const FILETIME_UNIX_DIFF_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// Convert a Windows FILETIME (100ns ticks since 1601-01-01) to UTC.
/// `None` for values outside chrono's representable range.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let secs = (filetime / FILETIME_TICKS_PER_SECOND) as i64 - FILETIME_UNIX_DIFF_SECS;
    let nanos = ((filetime % FILETIME_TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Attribute header size is a pure function of the residency flag and the
/// name length: 0x18 + 2·namelen resident, 0x40 + 2·namelen non-resident.
pub fn attr_header_size(non_resident: bool, name_length: u8) -> usize {
    let fixed = if non_resident { 0x40 } else { 0x18 };
    fixed + 2 * usize::from(name_length)
}

/// Residency-specific half of the attribute header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttrForm {
    Resident {
        value_length: u32,
        value_offset: u16,
        indexed: u8,
    },
    NonResident {
        lowest_vcn: u64,
        highest_vcn: u64,
        mapping_pairs_offset: u16,
        compression_unit: u16,
        allocated_size: u64,
        real_size: u64,
        initialized_size: u64,
    },
}

/// Common MFT attribute header, shared by every attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MftAttrHeader {
    pub type_code: u32,
    /// Total attribute length, header included.
    pub length: u32,
    pub non_resident: bool,
    /// Name length in UTF-16 units; nonzero for alternate data streams.
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub attribute_id: u16,
    pub name: Option<String>,
    pub form: AttrForm,
}

impl MftAttrHeader {
    pub fn decode(cursor: &ByteCursor) -> Result<Self, ProbeError> {
        if cursor.size() < 0x18 {
            return Err(ProbeError::FormatError(format!(
                "attribute slice of {} bytes cannot hold a header",
                cursor.size()
            )));
        }

        let type_code = cursor.get_u32_le(0x00);
        let length = cursor.get_u32_le(0x04);
        let non_resident = cursor.get_u8(0x08) != 0;
        let name_length = cursor.get_u8(0x09);
        let name_offset = cursor.get_u16_le(0x0A);
        let flags = cursor.get_u16_le(0x0C);
        let attribute_id = cursor.get_u16_le(0x0E);

        let header_size = attr_header_size(non_resident, name_length);
        if (length as usize) < header_size || cursor.size() < header_size {
            return Err(ProbeError::FormatError(format!(
                "attribute {type_code:#x} length {length} shorter than its {header_size}-byte header"
            )));
        }

        let form = if non_resident {
            AttrForm::NonResident {
                lowest_vcn: cursor.get_u64_le(0x10),
                highest_vcn: cursor.get_u64_le(0x18),
                mapping_pairs_offset: cursor.get_u16_le(0x20),
                compression_unit: cursor.get_u16_le(0x22),
                allocated_size: cursor.get_u64_le(0x28),
                real_size: cursor.get_u64_le(0x30),
                initialized_size: cursor.get_u64_le(0x38),
            }
        } else {
            AttrForm::Resident {
                value_length: cursor.get_u32_le(0x10),
                value_offset: cursor.get_u16_le(0x14),
                indexed: cursor.get_u8(0x16),
            }
        };

        let name = if name_length > 0 {
            let offset = if name_offset != 0 {
                usize::from(name_offset)
            } else {
                attr_header_size(non_resident, 0)
            };
            if offset + 2 * usize::from(name_length) > cursor.size() {
                return Err(ProbeError::FormatError(format!(
                    "attribute {type_code:#x} name extends past the attribute"
                )));
            }
            Some(cursor.get_utf16_le(offset, usize::from(name_length)))
        } else {
            None
        };

        Ok(Self {
            type_code,
            length,
            non_resident,
            name_length,
            name_offset,
            flags,
            attribute_id,
            name,
            form,
        })
    }

    pub fn header_size(&self) -> usize {
        attr_header_size(self.non_resident, self.name_length)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & ATTR_COMPRESSION_MASK != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & ATTR_IS_ENCRYPTED != 0
    }

    pub fn is_sparse(&self) -> bool {
        self.flags & ATTR_IS_SPARSE != 0
    }
}

/// $STANDARD_INFORMATION (0x10). Always resident.
///
/// The 2K-era fields after class id are only present on NTFS 3.0+ volumes;
/// shorter values simply omit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardInformation {
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub dos_permissions: u32,
    pub max_versions: u32,
    pub version: u32,
    pub class_id: u32,
    pub owner_id: Option<u32>,
    pub security_id: Option<u32>,
    pub quota_charged: Option<u64>,
    pub usn: Option<u64>,
}

impl StandardInformation {
    fn decode(value: &ByteCursor) -> Result<Self, ProbeError> {
        if value.size() < 0x30 {
            return Err(ProbeError::FormatError(format!(
                "standard information value of {} bytes too small",
                value.size()
            )));
        }

        let extended = value.size() >= 0x48;
        Ok(Self {
            created: value.get_u64_le(0x00),
            modified: value.get_u64_le(0x08),
            mft_modified: value.get_u64_le(0x10),
            accessed: value.get_u64_le(0x18),
            dos_permissions: value.get_u32_le(0x20),
            max_versions: value.get_u32_le(0x24),
            version: value.get_u32_le(0x28),
            class_id: value.get_u32_le(0x2C),
            owner_id: extended.then(|| value.get_u32_le(0x30)),
            security_id: extended.then(|| value.get_u32_le(0x34)),
            quota_charged: extended.then(|| value.get_u64_le(0x38)),
            usn: extended.then(|| value.get_u64_le(0x40)),
        })
    }

    pub fn created_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.created)
    }

    pub fn modified_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.modified)
    }

    pub fn accessed_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.accessed)
    }
}

/// $FILE_NAME (0x30). Always resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName {
    pub parent_ref: u64,
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
    pub reparse_tag: u32,
    pub namespace: u8,
    pub name: String,
}

impl FileName {
    fn decode(value: &ByteCursor) -> Result<Self, ProbeError> {
        if value.size() < 0x42 {
            return Err(ProbeError::FormatError(format!(
                "file name value of {} bytes too small",
                value.size()
            )));
        }

        let name_length = usize::from(value.get_u8(0x40));
        if 0x42 + 2 * name_length > value.size() {
            return Err(ProbeError::FormatError(
                "file name extends past the attribute value".to_string(),
            ));
        }

        Ok(Self {
            parent_ref: value.get_u64_le(0x00),
            created: value.get_u64_le(0x08),
            modified: value.get_u64_le(0x10),
            mft_modified: value.get_u64_le(0x18),
            accessed: value.get_u64_le(0x20),
            allocated_size: value.get_u64_le(0x28),
            real_size: value.get_u64_le(0x30),
            flags: value.get_u32_le(0x38),
            reparse_tag: value.get_u32_le(0x3C),
            namespace: value.get_u8(0x41),
            name: value.get_utf16_le(0x42, name_length),
        })
    }
}

/// $VOLUME_NAME (0x60): a nul-partitioned UTF-16 label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeName {
    pub name: String,
}

impl VolumeName {
    fn decode(value: &ByteCursor) -> Self {
        let raw = value.get_utf16_le(0, value.size() / 2);
        let name = raw.split('\0').next().unwrap_or_default().to_string();
        Self { name }
    }
}

/// $VOLUME_INFORMATION (0x70): filesystem version and dirty flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInformation {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
}

impl VolumeInformation {
    fn decode(value: &ByteCursor) -> Result<Self, ProbeError> {
        if value.size() < 0x0C {
            return Err(ProbeError::FormatError(format!(
                "volume information value of {} bytes too small",
                value.size()
            )));
        }
        Ok(Self {
            major_version: value.get_u8(0x08),
            minor_version: value.get_u8(0x09),
            flags: value.get_u16_le(0x0A),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.flags & VOLUME_IS_DIRTY != 0
    }
}

/// Decoded payload of an attribute. Types without structural decoding keep
/// an opaque marker; their bytes stay addressable through the entry slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttrPayload {
    StandardInformation(StandardInformation),
    AttributeList,
    FileName(FileName),
    ObjectId,
    SecurityDescriptor,
    VolumeName(VolumeName),
    VolumeInformation(VolumeInformation),
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    LoggedUtilityStream,
}

/// One decoded MFT attribute: common header plus typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MftAttribute {
    pub header: MftAttrHeader,
    pub payload: AttrPayload,
}

impl MftAttribute {
    /// Factory over the attribute slice `[0, length)`.
    ///
    /// Returns `Ok(None)` for type codes outside the known set, which
    /// terminates the caller's attribute walk; malformed slices for known
    /// types are `FormatError`s.
    pub fn decode(cursor: &ByteCursor) -> Result<Option<Self>, ProbeError> {
        let type_code = cursor.get_u32_le(0);
        let payload_kind = match type_code {
            ATTR_STANDARD_INFORMATION
            | ATTR_ATTRIBUTE_LIST
            | ATTR_FILE_NAME
            | ATTR_OBJECT_ID
            | ATTR_SECURITY_DESCRIPTOR
            | ATTR_VOLUME_NAME
            | ATTR_VOLUME_INFORMATION
            | ATTR_DATA
            | ATTR_INDEX_ROOT
            | ATTR_INDEX_ALLOCATION
            | ATTR_BITMAP
            | ATTR_REPARSE_POINT
            | ATTR_LOGGED_UTILITY_STREAM => type_code,
            _ => return Ok(None),
        };

        let header = MftAttrHeader::decode(cursor)?;
        let payload = match payload_kind {
            ATTR_STANDARD_INFORMATION => AttrPayload::StandardInformation(
                StandardInformation::decode(&Self::resident_value(cursor, &header)?)?,
            ),
            ATTR_FILE_NAME => {
                AttrPayload::FileName(FileName::decode(&Self::resident_value(cursor, &header)?)?)
            }
            ATTR_VOLUME_NAME => {
                AttrPayload::VolumeName(VolumeName::decode(&Self::resident_value(cursor, &header)?))
            }
            ATTR_VOLUME_INFORMATION => AttrPayload::VolumeInformation(VolumeInformation::decode(
                &Self::resident_value(cursor, &header)?,
            )?),
            ATTR_ATTRIBUTE_LIST => AttrPayload::AttributeList,
            ATTR_OBJECT_ID => AttrPayload::ObjectId,
            ATTR_SECURITY_DESCRIPTOR => AttrPayload::SecurityDescriptor,
            ATTR_DATA => AttrPayload::Data,
            ATTR_INDEX_ROOT => AttrPayload::IndexRoot,
            ATTR_INDEX_ALLOCATION => AttrPayload::IndexAllocation,
            ATTR_BITMAP => AttrPayload::Bitmap,
            ATTR_REPARSE_POINT => AttrPayload::ReparsePoint,
            _ => AttrPayload::LoggedUtilityStream,
        };

        Ok(Some(Self { header, payload }))
    }

    fn resident_value(cursor: &ByteCursor, header: &MftAttrHeader) -> Result<ByteCursor, ProbeError> {
        match header.form {
            AttrForm::Resident {
                value_length,
                value_offset,
                ..
            } => {
                let start = usize::from(value_offset);
                let length = value_length as usize;
                if start + length > cursor.size() {
                    return Err(ProbeError::FormatError(format!(
                        "attribute {:#x} value extends past the attribute slice",
                        header.type_code
                    )));
                }
                Ok(cursor.chunk(start, length))
            }
            AttrForm::NonResident { .. } => Err(ProbeError::FormatError(format!(
                "attribute {:#x} must be resident",
                header.type_code
            ))),
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self.header.type_code {
            ATTR_STANDARD_INFORMATION => "$STANDARD_INFORMATION",
            ATTR_ATTRIBUTE_LIST => "$ATTRIBUTE_LIST",
            ATTR_FILE_NAME => "$FILE_NAME",
            ATTR_OBJECT_ID => "$OBJECT_ID",
            ATTR_SECURITY_DESCRIPTOR => "$SECURITY_DESCRIPTOR",
            ATTR_VOLUME_NAME => "$VOLUME_NAME",
            ATTR_VOLUME_INFORMATION => "$VOLUME_INFORMATION",
            ATTR_DATA => "$DATA",
            ATTR_INDEX_ROOT => "$INDEX_ROOT",
            ATTR_INDEX_ALLOCATION => "$INDEX_ALLOCATION",
            ATTR_BITMAP => "$BITMAP",
            ATTR_REPARSE_POINT => "$REPARSE_POINT",
            ATTR_LOGGED_UTILITY_STREAM => "$LOGGED_UTILITY_STREAM",
            _ => "$UNKNOWN",
        }
    }
}

impl fmt::Display for MftAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: {} Name: {} {} Size: {}",
            self.type_str(),
            self.header.name.as_deref().unwrap_or("N/A"),
            if self.header.non_resident {
                "Non-Resident"
            } else {
                "Resident"
            },
            self.header.length
        )
    }
}
