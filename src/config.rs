//! Immutable configuration shared by every component.
//!
//! The reference implementation hard-codes these as module constants
//! (`KEYFILE`, `SIGEXT`, …); here they are an explicit record
//! constructed once and passed into component constructors, so a
//! caller embedding this crate as a library can override file names
//! without reaching for process-global state.

use std::path::PathBuf;

/// File and extension names used throughout the on-disk layout.
#[derive(Debug, Clone)]
pub struct SongeConfig {
    /// Name of the key file within the resolved project directory.
    pub key_file_name: String,
    /// Name of the plain-text trust list file.
    pub trust_file_name: String,
    /// Extension appended to a signed file's path, and to the trust
    /// file's path, to name its signature sibling (e.g. `.sgsig`).
    pub sig_ext: String,
}

impl Default for SongeConfig {
    fn default() -> Self {
        Self {
            key_file_name: ".songe.key".to_string(),
            trust_file_name: ".songe.trust".to_string(),
            sig_ext: ".sgsig".to_string(),
        }
    }
}

impl SongeConfig {
    /// Full trust-file path within `dir`.
    pub fn trust_file_path(&self, dir: &std::path::Path) -> PathBuf {
        dir.join(&self.trust_file_name)
    }

    /// Full trust-file signature sibling path within `dir`.
    pub fn trust_sig_path(&self, dir: &std::path::Path) -> PathBuf {
        let mut name = self.trust_file_name.clone();
        name.push_str(&self.sig_ext);
        dir.join(name)
    }

    /// Signature sibling path for an arbitrary signed file.
    pub fn sig_path_for(&self, file: &std::path::Path) -> PathBuf {
        let mut os = file.as_os_str().to_owned();
        os.push(&self.sig_ext);
        PathBuf::from(os)
    }
}
