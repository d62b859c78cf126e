//! Whether the host stores packed (nanosecond) timestamps.
//!
//! The answer is guessed from the macOS version rather than read from the
//! data, so a future release that changes the encoding will be misclassified.

use std::process::Command;
use std::sync::OnceLock;

use tracing::{info, warn};

/// First macOS release that writes packed timestamps.
const PACKED_SINCE: (u32, u32) = (10, 13);

pub trait TimestampEncoding: Send + Sync + 'static {
    fn uses_packed_timestamps(&self) -> bool;
}

/// An encoding chosen up front, e.g. from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedEncoding(pub bool);

impl TimestampEncoding for FixedEncoding {
    fn uses_packed_timestamps(&self) -> bool {
        self.0
    }
}

/// Detects the encoding from `sw_vers -productVersion`, once.
#[derive(Debug, Default)]
pub struct MacosVersion {
    packed: OnceLock<bool>,
}

impl MacosVersion {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimestampEncoding for MacosVersion {
    fn uses_packed_timestamps(&self) -> bool {
        *self.packed.get_or_init(detect)
    }
}

fn detect() -> bool {
    let output = match Command::new("sw_vers").arg("-productVersion").output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!("sw_vers exited with {}; assuming unpacked timestamps", output.status);
            return false;
        }
        Err(e) => {
            warn!("sw_vers unavailable ({}); assuming unpacked timestamps", e);
            return false;
        }
    };

    let version = String::from_utf8_lossy(&output.stdout);
    let packed = uses_packed(version.trim());
    info!(version = %version.trim(), packed, "Timestamp encoding from macOS version");
    packed
}

/// `true` for versions at or after 10.13. Unparseable input yields `false`.
pub fn uses_packed(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>());
    let major = match parts.next() {
        Some(Ok(major)) => major,
        _ => return false,
    };
    let minor = match parts.next() {
        Some(Ok(minor)) => minor,
        Some(Err(_)) => return false,
        None => 0,
    };
    (major, minor) >= PACKED_SINCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_threshold() {
        assert!(!uses_packed("10.12.6"));
        assert!(uses_packed("10.13"));
        assert!(uses_packed("10.15.7"));
        assert!(uses_packed("11"));
        assert!(uses_packed("14.4.1"));
    }

    #[test]
    fn garbage_is_unpacked() {
        assert!(!uses_packed(""));
        assert!(!uses_packed("ten.13"));
        assert!(!uses_packed("10.x"));
    }

    #[test]
    fn fixed_encoding() {
        assert!(FixedEncoding(true).uses_packed_timestamps());
        assert!(!FixedEncoding(false).uses_packed_timestamps());
    }
}
