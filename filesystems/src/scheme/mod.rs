// Partitioning scheme detection (MBR or GPT)

pub mod gpt;
pub mod mbr;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use diskprobe_core::{ByteSource, ProbeError};

/// Partitioning scheme of a disk image or device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionScheme {
    Mbr,
    Gpt,
    Unknown,
}

/// Detect the partitioning scheme of `source`.
///
/// The 0xAA55 signature alone is ambiguous because a GPT disk carries a
/// protective MBR, so when it matches the GPT header signature at LBA 1 is
/// probed to disambiguate.
pub fn detect_scheme(source: &ByteSource) -> Result<PartitionScheme, ProbeError> {
    let sig = source.read_at(mbr::MBR_SIG_OFFSET, mbr::MBR_SIG_SIZE)?;
    if LittleEndian::read_u16(&sig) != mbr::MBR_SIGNATURE {
        return Ok(PartitionScheme::Unknown);
    }

    let gpt_sig = source.read_at(gpt::GPT_HEADER_OFFSET, gpt::GPT_SIG_SIZE)?;
    let scheme = if gpt_sig == gpt::GPT_SIGNATURE {
        PartitionScheme::Gpt
    } else {
        PartitionScheme::Mbr
    };
    debug!("detected partitioning scheme: {scheme:?}");
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_disk() -> Vec<u8> {
        vec![0u8; 1024]
    }

    fn with_mbr_signature(mut disk: Vec<u8>) -> Vec<u8> {
        disk[0x1FE] = 0x55;
        disk[0x1FF] = 0xAA;
        disk
    }

    #[test]
    fn no_signature_is_unknown() {
        let source = ByteSource::buffer(blank_disk());
        assert_eq!(detect_scheme(&source).unwrap(), PartitionScheme::Unknown);
    }

    #[test]
    fn mbr_signature_alone_is_mbr() {
        let source = ByteSource::buffer(with_mbr_signature(blank_disk()));
        assert_eq!(detect_scheme(&source).unwrap(), PartitionScheme::Mbr);
    }

    #[test]
    fn both_signatures_mean_gpt() {
        let mut disk = with_mbr_signature(blank_disk());
        disk[0x200..0x208].copy_from_slice(b"EFI PART");
        let source = ByteSource::buffer(disk);
        assert_eq!(detect_scheme(&source).unwrap(), PartitionScheme::Gpt);
    }
}
