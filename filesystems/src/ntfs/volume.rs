// NTFS volume: boot sector, MFT and $Volume metadata behind the Volume trait

use std::fmt;

use humansize::{format_size, BINARY};
use log::{debug, info};

use diskprobe_core::{ByteSource, ProbeError, Volume};

use super::boot_sector::BootSector;
use super::mft::MftTable;
use super::mft_entry::ENTRY_VOLUME;

/// MFT zone reservation in clusters.
///
/// The zone multiplier comes from system configuration and scales the
/// reservation in 12.5% steps: 1 reserves an eighth of the volume, 4 half
/// of it. Out-of-range values fall back to the 12.5% default.
pub fn mft_zone_size(total_clusters: u64, multiplier: u8) -> u64 {
    match multiplier {
        4 => total_clusters >> 1,
        3 => total_clusters * 3 >> 3,
        2 => total_clusters >> 2,
        _ => total_clusters >> 3,
    }
}

const DEFAULT_MFT_ZONE_MULTIPLIER: u8 = 1;

/// A mounted view of one NTFS partition.
///
/// Construction is cheap and inert; `load` reads the boot sector, mounts
/// the MFT at its derived offset, preloads the system records, and pulls
/// the label and version from the $Volume record.
#[derive(Debug, Default)]
pub struct NtfsVolume {
    offset: u64,
    boot_sector: Option<BootSector>,
    mft: Option<MftTable>,
    volume_name: Option<String>,
    volume_version: Option<(u8, u8)>,
    mft_zone_bytes: u64,
}

impl NtfsVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boot_sector(&self) -> Option<&BootSector> {
        self.boot_sector.as_ref()
    }

    /// MFT access for record-level inspection. `None` before `load`.
    pub fn mft(&mut self) -> Option<&mut MftTable> {
        self.mft.as_mut()
    }

    pub fn volume_name(&self) -> Option<&str> {
        self.volume_name.as_deref()
    }

    /// NTFS version from $VOLUME_INFORMATION as (major, minor).
    pub fn version(&self) -> Option<(u8, u8)> {
        self.volume_version
    }

    /// Size of the reserved MFT zone in bytes.
    pub fn mft_zone_bytes(&self) -> u64 {
        self.mft_zone_bytes
    }
}

impl Volume for NtfsVolume {
    fn load(&mut self, source: &ByteSource, offset: u64) -> Result<(), ProbeError> {
        self.offset = offset;
        let boot_sector = BootSector::load(source, offset)?;
        let bpb = &boot_sector.bpb;

        let mut mft = MftTable::new(
            source.clone(),
            offset + bpb.mft_offset(),
            bpb.mft_record_size(),
        );
        mft.preload_system_entries()?;

        let volume_record = mft.get_entry(ENTRY_VOLUME)?;
        self.volume_name = volume_record.volume_name().map(|name| name.name.clone());
        self.volume_version = volume_record
            .volume_information()
            .map(|info| (info.major_version, info.minor_version));

        self.mft_zone_bytes = mft_zone_size(bpb.total_clusters(), DEFAULT_MFT_ZONE_MULTIPLIER)
            * u64::from(bpb.bytes_per_cluster());

        debug!(
            "NTFS volume at {offset:#x}: MFT at {:#x}, {} byte records, zone {} bytes",
            offset + bpb.mft_offset(),
            bpb.mft_record_size(),
            self.mft_zone_bytes
        );
        info!(
            "mounted NTFS volume {:?} v{}.{}",
            self.volume_name.as_deref().unwrap_or(""),
            self.volume_version.map_or(0, |v| v.0),
            self.volume_version.map_or(0, |v| v.1)
        );

        self.boot_sector = Some(boot_sector);
        self.mft = Some(mft);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "ntfs"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.boot_sector
            .as_ref()
            .map_or(0, |boot| boot.bpb.volume_size())
    }

    fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NtfsVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: NTFS, Offset: {:#X}, Size: {}",
            self.offset,
            format_size(self.size(), BINARY)
        )?;
        if let Some(name) = &self.volume_name {
            write!(f, ", Name: {name}")?;
        }
        if let Some((major, minor)) = self.volume_version {
            write!(f, ", Version: {major}.{minor}")?;
        }
        Ok(())
    }
}
