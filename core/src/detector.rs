// Filesystem detection registry: partition-type identifiers to plugins

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::error::ProbeError;
use crate::source::ByteSource;
use crate::volume::Volume;

/// A filesystem decoder that claims partition-type identifiers and confirms
/// its format by probing raw bytes.
///
/// A plugin may declare MBR type bytes, GPT type GUIDs, or both; the unused
/// capability defaults to an empty set.
pub trait FilesystemPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// MBR partition type bytes this plugin should be tried for.
    fn mbr_identifiers(&self) -> Vec<u8> {
        Vec::new()
    }

    /// GPT partition type GUIDs this plugin should be tried for.
    fn gpt_identifiers(&self) -> Vec<Uuid> {
        Vec::new()
    }

    /// Byte-level confirmation that the partition at `offset` holds this
    /// plugin's filesystem.
    fn detect(&self, source: &ByteSource, offset: u64) -> Result<bool, ProbeError>;

    /// Fresh, unloaded volume object for this filesystem.
    fn volume(&self) -> Box<dyn Volume>;
}

/// Registry mapping partition-type identifiers to candidate plugins.
///
/// Built once from an explicit plugin list, read-only afterwards. A key may
/// map to several plugins; registration order decides who probes first.
pub struct FilesystemDetector {
    mbr_plugins: HashMap<u8, Vec<Arc<dyn FilesystemPlugin>>>,
    gpt_plugins: HashMap<Uuid, Vec<Arc<dyn FilesystemPlugin>>>,
}

impl FilesystemDetector {
    pub fn new(plugins: &[Arc<dyn FilesystemPlugin>]) -> Self {
        let mut detector = Self {
            mbr_plugins: HashMap::new(),
            gpt_plugins: HashMap::new(),
        };
        for plugin in plugins {
            for fs_id in plugin.mbr_identifiers() {
                detector.add_mbr_plugin(fs_id, Arc::clone(plugin));
            }
            for fs_guid in plugin.gpt_identifiers() {
                detector.add_gpt_plugin(fs_guid, Arc::clone(plugin));
            }
        }
        detector
    }

    pub fn add_mbr_plugin(&mut self, fs_id: u8, plugin: Arc<dyn FilesystemPlugin>) {
        debug!("registering {} for MBR type {:#04x}", plugin.name(), fs_id);
        self.mbr_plugins.entry(fs_id).or_default().push(plugin);
    }

    pub fn add_gpt_plugin(&mut self, fs_guid: Uuid, plugin: Arc<dyn FilesystemPlugin>) {
        debug!("registering {} for GPT GUID {}", plugin.name(), fs_guid);
        self.gpt_plugins.entry(fs_guid).or_default().push(plugin);
    }

    /// Match an MBR partition against registered plugins.
    ///
    /// Candidates registered for `fs_id` probe in registration order; the
    /// first confirming plugin supplies the volume. `Ok(None)` means no
    /// plugin claimed the partition, which is an expected outcome, not an
    /// error.
    pub fn detect_mbr(
        &self,
        source: &ByteSource,
        offset: u64,
        fs_id: u8,
    ) -> Result<Option<Box<dyn Volume>>, ProbeError> {
        let Some(candidates) = self.mbr_plugins.get(&fs_id) else {
            return Ok(None);
        };
        for plugin in candidates {
            if plugin.detect(source, offset)? {
                debug!("{} confirmed MBR type {:#04x}", plugin.name(), fs_id);
                return Ok(Some(plugin.volume()));
            }
        }
        Ok(None)
    }

    /// GUID-keyed analog of `detect_mbr` for GPT partitions.
    pub fn detect_gpt(
        &self,
        source: &ByteSource,
        offset: u64,
        fs_guid: Uuid,
    ) -> Result<Option<Box<dyn Volume>>, ProbeError> {
        let Some(candidates) = self.gpt_plugins.get(&fs_guid) else {
            return Ok(None);
        };
        for plugin in candidates {
            if plugin.detect(source, offset)? {
                debug!("{} confirmed GPT GUID {}", plugin.name(), fs_guid);
                return Ok(Some(plugin.volume()));
            }
        }
        Ok(None)
    }
}
