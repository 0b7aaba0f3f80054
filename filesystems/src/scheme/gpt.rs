// GUID Partition Table decoding

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use diskprobe_core::{ByteCursor, ByteSource, ProbeError};

/// The GPT header lives at LBA 1 of a 512-byte-block disk.
pub const GPT_HEADER_OFFSET: u64 = 0x200;
pub const GPT_SIG_SIZE: usize = 8;
pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
/// Fixed header fields end at byte 92.
pub const GPT_HEADER_MIN_SIZE: u32 = 92;
/// A partition entry carries a 36-unit UTF-16 name field.
pub const GPT_ENTRY_NAME_UNITS: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub crc32: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Uuid,
    pub part_lba: u64,
    pub num_partitions: u32,
    pub part_size: u32,
    pub part_array_crc32: u32,
}

impl GptHeader {
    fn decode(cursor: &ByteCursor) -> Result<Self, ProbeError> {
        let signature = cursor.get_bytes(0, GPT_SIG_SIZE);
        if signature != GPT_SIGNATURE {
            return Err(ProbeError::FormatError(format!(
                "invalid GPT signature: {signature:02X?}"
            )));
        }

        Ok(Self {
            revision: cursor.get_u32_le(0x08),
            header_size: cursor.get_u32_le(0x0C),
            crc32: cursor.get_u32_le(0x10),
            current_lba: cursor.get_u64_le(0x18),
            backup_lba: cursor.get_u64_le(0x20),
            first_usable_lba: cursor.get_u64_le(0x28),
            last_usable_lba: cursor.get_u64_le(0x30),
            disk_guid: cursor.get_uuid_le(0x38),
            part_lba: cursor.get_u64_le(0x48),
            num_partitions: cursor.get_u32_le(0x50),
            part_size: cursor.get_u32_le(0x54),
            part_array_crc32: cursor.get_u32_le(0x58),
        })
    }
}

/// One GPT partition array entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GptPartitionEntry {
    pub type_guid: Uuid,
    pub part_guid: Uuid,
    pub first_lba: u64,
    pub last_lba: u64,
    pub attr_flags: u64,
    pub name: String,
}

impl GptPartitionEntry {
    pub fn decode(cursor: &ByteCursor) -> Self {
        let raw_name = cursor.get_utf16_le(0x38, GPT_ENTRY_NAME_UNITS);
        let name = raw_name
            .split('\0')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            type_guid: cursor.get_uuid_le(0x00),
            part_guid: cursor.get_uuid_le(0x10),
            first_lba: cursor.get_u64_le(0x20),
            last_lba: cursor.get_u64_le(0x28),
            attr_flags: cursor.get_u64_le(0x30),
            name,
        }
    }

    /// An all-zero type GUID marks the end of the used portion of the array.
    pub fn is_empty(&self) -> bool {
        self.type_guid == Uuid::nil()
    }

    pub fn part_offset(&self, block_size: u64) -> u64 {
        self.first_lba * block_size
    }

    /// Partition length in bytes. A malformed entry with `last_lba` below
    /// `first_lba` reports zero instead of wrapping.
    pub fn size_bytes(&self, block_size: u64) -> u64 {
        self.last_lba
            .saturating_add(1)
            .saturating_sub(self.first_lba)
            .saturating_mul(block_size)
    }
}

/// A decoded GPT: header plus the used portion of the partition array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gpt {
    pub header: GptHeader,
    pub partition_entries: Vec<GptPartitionEntry>,
}

impl Gpt {
    /// Load the GPT header and partition array from `source`.
    ///
    /// The declared `header_size` field sizes the full header read. Array
    /// loading honors `num_partitions` but stops early at the first entry
    /// with an all-zero type GUID; trailing unused slots are not read, so a
    /// truncated-but-terminated array still decodes.
    pub fn load(source: &ByteSource, block_size: u64) -> Result<Self, ProbeError> {
        let size_field = source.read_at(GPT_HEADER_OFFSET + 0x0C, 4)?;
        let header_size = LittleEndian::read_u32(&size_field);
        if header_size < GPT_HEADER_MIN_SIZE {
            return Err(ProbeError::FormatError(format!(
                "GPT header size {header_size} below minimum {GPT_HEADER_MIN_SIZE}"
            )));
        }

        let cursor = ByteCursor::load(source, GPT_HEADER_OFFSET, header_size as usize)?;
        let header = GptHeader::decode(&cursor)?;

        let array_offset = header.part_lba * block_size;
        let mut partition_entries = Vec::new();
        for index in 0..u64::from(header.num_partitions) {
            let entry_offset = array_offset + index * u64::from(header.part_size);
            let cursor = ByteCursor::load(source, entry_offset, header.part_size as usize)?;
            let entry = GptPartitionEntry::decode(&cursor);
            if entry.is_empty() {
                break;
            }
            partition_entries.push(entry);
        }

        debug!(
            "GPT decoded: disk {} with {} used partition entries",
            header.disk_guid,
            partition_entries.len()
        );
        Ok(Self {
            header,
            partition_entries,
        })
    }

    /// Recompute the header CRC32 (with the stored CRC field zeroed) and
    /// compare it to the stored value. Advisory: a mismatch flags a damaged
    /// or hand-edited header but does not abort decoding.
    pub fn verify_header_crc(&self, source: &ByteSource) -> Result<bool, ProbeError> {
        let mut data = source.read_at(GPT_HEADER_OFFSET, self.header.header_size as usize)?;
        data[0x10..0x14].fill(0);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data);
        Ok(hasher.finalize() == self.header.crc32)
    }
}
