// error.rs — Error taxonomy for the mod.
//
// Initialization errors (ConfigInvalid, ModuleNotFound, ScanMiss,
// HookInstall) are fatal: the caller unwinds everything acquired so far and
// the toggle loop never starts. ChannelUnset and MemoryUnsafe are runtime
// conditions during a single patch attempt: logged, the action is skipped,
// and the loop keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Module '{0}' not found after retry timeout")]
    ModuleNotFound(String),

    #[error("AOB pattern not found in target module (game version mismatch?)")]
    ScanMiss,

    #[error("Hook {op} failed with status {status}")]
    HookInstall { op: &'static str, status: i32 },

    #[error("Captured pointer not yet written by the hook")]
    ChannelUnset,

    #[error("Target memory at {address:#x} unsafe to patch: {reason}")]
    MemoryUnsafe { address: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Runtime patch errors are skipped and retried next key press; anything
    /// else aborts initialization.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ChannelUnset | Error::MemoryUnsafe { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ChannelUnset.is_recoverable());
        assert!(Error::MemoryUnsafe { address: 0x1000, reason: "not committed".into() }
            .is_recoverable());
        assert!(!Error::ScanMiss.is_recoverable());
        assert!(!Error::ConfigInvalid("empty pattern".into()).is_recoverable());
        assert!(!Error::HookInstall { op: "enable", status: 9 }.is_recoverable());
    }
}
