// Explicit list of the built-in filesystem plugins

use std::sync::Arc;

use diskprobe_core::{FilesystemDetector, FilesystemPlugin};

use crate::ntfs::NtfsPlugin;

/// All built-in plugins, in the order they should probe.
pub fn builtin_plugins() -> Vec<Arc<dyn FilesystemPlugin>> {
    vec![Arc::new(NtfsPlugin)]
}

/// Detector preloaded with the built-in plugins.
pub fn builtin_detector() -> FilesystemDetector {
    FilesystemDetector::new(&builtin_plugins())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_contains_ntfs() {
        let plugins = builtin_plugins();
        assert!(plugins.iter().any(|plugin| plugin.name() == "ntfs"));
    }
}
