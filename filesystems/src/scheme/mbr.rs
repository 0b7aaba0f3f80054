// Master Boot Record decoding

use std::fmt;

use log::debug;
use serde::Serialize;

use diskprobe_core::{ByteCursor, ByteSource, ProbeError};

pub const MBR_SIGNATURE: u16 = 0xAA55;
pub const MBR_SIG_OFFSET: u64 = 0x1FE;
pub const MBR_SIG_SIZE: usize = 2;
pub const MBR_SIZE: usize = 512;
pub const PT_ENTRY_SIZE: usize = 16;
pub const PT_TABLE_OFFSET: usize = 0x1BE;
pub const PT_TABLE_SIZE: usize = PT_ENTRY_SIZE * 4;
pub const SECTOR_SIZE: u64 = 512;

/// Default CHS translation geometry.
pub const HEADS_PER_CYLINDER: u32 = 255;
pub const SECTORS_PER_TRACK: u32 = 63;

/// Label for a well-known MBR partition type byte.
pub fn type_label(part_type: u8) -> &'static str {
    match part_type {
        0x01 | 0x04 | 0x06 => "fat16",
        0x05 | 0x0F => "extended",
        0x07 => "ntfs",
        0x0B => "fat32",
        0x0C => "fat32_lba",
        0x82 => "linux_swap",
        0x83 => "linux",
        0xAF => "hfs_plus",
        0xEE => "gpt_protective",
        0xEF => "efi_system",
        _ => "unknown",
    }
}

/// One 16-byte MBR partition table entry.
///
/// The CHS triplets pack a 6-bit sector into the low bits of a byte whose
/// two high bits extend the 8-bit cylinder field to 10 bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MbrPartitionEntry {
    /// Slot position in the on-disk table (0..=3).
    pub index: usize,
    pub boot_indicator: u8,
    pub starting_head: u8,
    pub starting_sector: u8,
    pub starting_cylinder: u16,
    pub part_type: u8,
    pub ending_head: u8,
    pub ending_sector: u8,
    pub ending_cylinder: u16,
    pub relative_sector: u32,
    pub total_sectors: u32,
}

impl MbrPartitionEntry {
    fn decode(cursor: &ByteCursor, index: usize) -> Self {
        let packed = cursor.get_u8(2);
        let starting_sector = packed & 0x3F;
        let starting_cylinder = (u16::from(packed & 0xC0) << 2) | u16::from(cursor.get_u8(3));

        let packed = cursor.get_u8(6);
        let ending_sector = packed & 0x3F;
        let ending_cylinder = (u16::from(packed & 0xC0) << 2) | u16::from(cursor.get_u8(7));

        Self {
            index,
            boot_indicator: cursor.get_u8(0),
            starting_head: cursor.get_u8(1),
            starting_sector,
            starting_cylinder,
            part_type: cursor.get_u8(4),
            ending_head: cursor.get_u8(5),
            ending_sector,
            ending_cylinder,
            relative_sector: cursor.get_u32_le(8),
            total_sectors: cursor.get_u32_le(12),
        }
    }

    pub fn is_bootable(&self) -> bool {
        self.boot_indicator == 0x80
    }

    /// Byte offset of the partition from the start of the disk.
    pub fn part_offset(&self) -> u64 {
        u64::from(self.relative_sector) * SECTOR_SIZE
    }

    /// Partition length in bytes.
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.total_sectors) * SECTOR_SIZE
    }

    pub fn type_label(&self) -> &'static str {
        type_label(self.part_type)
    }

    /// CHS triplet to LBA under the default 255/63 translation geometry.
    /// Consistency-check helper; the LBA fields are authoritative.
    pub fn chs_to_lba(cylinder: u16, head: u8, sector: u8) -> u32 {
        u32::from(sector).saturating_sub(1)
            + u32::from(head) * SECTORS_PER_TRACK
            + u32::from(cylinder) * HEADS_PER_CYLINDER * SECTORS_PER_TRACK
    }
}

impl fmt::Display for MbrPartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bootable: {}", self.is_bootable())?;
        writeln!(
            f,
            "Type: {:#04X} ({})",
            self.part_type,
            self.type_label()
        )?;
        writeln!(
            f,
            "Start (CHS): {}",
            Self::chs_to_lba(self.starting_cylinder, self.starting_head, self.starting_sector)
        )?;
        writeln!(
            f,
            "End   (CHS): {}",
            Self::chs_to_lba(self.ending_cylinder, self.ending_head, self.ending_sector)
        )?;
        writeln!(f, "Start (LBA): {}", self.relative_sector)?;
        write!(
            f,
            "End   (LBA): {}",
            (u64::from(self.relative_sector) + u64::from(self.total_sectors)).saturating_sub(1)
        )
    }
}

/// The 4-slot MBR partition table.
///
/// All four slots are decoded in on-disk order; only slots with a nonzero
/// type byte are kept, each remembering its original index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MbrPartitionTable {
    pub entries: Vec<MbrPartitionEntry>,
}

impl MbrPartitionTable {
    fn decode(cursor: &ByteCursor) -> Self {
        let mut entries = Vec::new();
        for slot in 0..4 {
            let chunk = cursor.chunk(PT_ENTRY_SIZE * slot, PT_ENTRY_SIZE);
            let entry = MbrPartitionEntry::decode(&chunk, slot);
            if entry.part_type != 0 {
                entries.push(entry);
            }
        }
        Self { entries }
    }
}

/// The Master Boot Record: signature check plus partition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mbr {
    pub partition_table: MbrPartitionTable,
}

impl Mbr {
    /// Read the first sector of `source` and decode the partition table.
    /// A missing 0xAA55 signature is a `FormatError`.
    pub fn load(source: &ByteSource) -> Result<Self, ProbeError> {
        let cursor = ByteCursor::load(source, 0, MBR_SIZE)?;
        let signature = cursor.get_u16_le(MBR_SIG_OFFSET as usize);
        if signature != MBR_SIGNATURE {
            return Err(ProbeError::FormatError(format!(
                "invalid MBR signature: {signature:#06x}"
            )));
        }

        let table = cursor.chunk(PT_TABLE_OFFSET, PT_TABLE_SIZE);
        let partition_table = MbrPartitionTable::decode(&table);
        debug!(
            "MBR decoded: {} active partition entries",
            partition_table.entries.len()
        );
        Ok(Self { partition_table })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 512-byte MBR image with the given (type, start LBA, sectors) slots.
    fn build_mbr(slots: &[(u8, u32, u32)]) -> Vec<u8> {
        let mut disk = vec![0u8; MBR_SIZE];
        disk[0x1FE] = 0x55;
        disk[0x1FF] = 0xAA;
        for (slot, &(part_type, start_lba, sectors)) in slots.iter().enumerate() {
            let base = PT_TABLE_OFFSET + slot * PT_ENTRY_SIZE;
            disk[base + 4] = part_type;
            disk[base + 8..base + 12].copy_from_slice(&start_lba.to_le_bytes());
            disk[base + 12..base + 16].copy_from_slice(&sectors.to_le_bytes());
        }
        disk
    }

    #[test]
    fn bad_signature_is_format_error() {
        let source = ByteSource::buffer(vec![0u8; MBR_SIZE]);
        let err = Mbr::load(&source).unwrap_err();
        assert!(matches!(err, ProbeError::FormatError(_)));
    }

    #[test]
    fn only_nonzero_type_slots_are_active() {
        let disk = build_mbr(&[(0x07, 128, 2048), (0, 0, 0), (0, 0, 0), (0x0C, 4096, 1024)]);
        let mbr = Mbr::load(&ByteSource::buffer(disk)).unwrap();
        let entries = &mbr.partition_table.entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].part_type, 0x07);
        assert_eq!(entries[1].index, 3);
        assert_eq!(entries[1].part_type, 0x0C);
    }

    #[test]
    fn part_offset_is_lba_times_sector_size() {
        let disk = build_mbr(&[(0x07, 128, 2048)]);
        let mbr = Mbr::load(&ByteSource::buffer(disk)).unwrap();
        let entry = &mbr.partition_table.entries[0];
        assert_eq!(entry.part_offset(), 128 * 512);
        assert_eq!(entry.size_bytes(), 2048 * 512);
    }

    #[test]
    fn chs_fields_unpack_shared_byte() {
        let mut disk = build_mbr(&[(0x83, 63, 1000)]);
        let base = PT_TABLE_OFFSET;
        disk[base] = 0x80; // bootable
        disk[base + 1] = 32; // starting head
        // sector 5 in the low 6 bits, cylinder high bits 0b10 in the top 2
        disk[base + 2] = 0x80 | 5;
        disk[base + 3] = 0x34; // cylinder low byte
        let mbr = Mbr::load(&ByteSource::buffer(disk)).unwrap();
        let entry = &mbr.partition_table.entries[0];
        assert!(entry.is_bootable());
        assert_eq!(entry.starting_head, 32);
        assert_eq!(entry.starting_sector, 5);
        assert_eq!(entry.starting_cylinder, (0b10 << 8) | 0x34);
    }

    #[test]
    fn chs_to_lba_matches_geometry() {
        // CHS (0, 0, 1) is LBA 0; (0, 1, 1) is one track further.
        assert_eq!(MbrPartitionEntry::chs_to_lba(0, 0, 1), 0);
        assert_eq!(MbrPartitionEntry::chs_to_lba(0, 1, 1), 63);
        assert_eq!(MbrPartitionEntry::chs_to_lba(1, 0, 1), 255 * 63);
    }

    #[test]
    fn zero_sector_entry_displays_without_wrapping() {
        // A nonzero type byte with no sectors is kept as an active slot;
        // its summary must not wrap around zero.
        let disk = build_mbr(&[(0x83, 0, 0)]);
        let mbr = Mbr::load(&ByteSource::buffer(disk)).unwrap();
        let text = mbr.partition_table.entries[0].to_string();
        assert!(text.contains("End   (LBA): 0"), "{text}");
    }

    #[test]
    fn entry_serializes_to_json() {
        let disk = build_mbr(&[(0x07, 128, 2048)]);
        let mbr = Mbr::load(&ByteSource::buffer(disk)).unwrap();
        let json = serde_json::to_string(&mbr.partition_table.entries[0]).unwrap();
        assert!(json.contains("\"part_type\":7"), "{json}");
    }
}
