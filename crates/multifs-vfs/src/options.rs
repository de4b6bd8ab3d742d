//! VFS configuration options.

/// Options controlling mount behavior and kernel caching.
#[derive(Debug, Clone)]
pub struct VfsOptions {
    /// TTL handed to the kernel for attribute and entry replies, in seconds.
    pub attr_timeout_secs: u64,
    /// Filesystem name shown in mount tables.
    pub fs_name: String,
    /// Allow access by users other than the mounting user.
    pub allow_other: bool,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            attr_timeout_secs: 1,
            fs_name: "multifs".to_string(),
            allow_other: false,
        }
    }
}
