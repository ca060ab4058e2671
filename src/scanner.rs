// scanner.rs — Masked byte-pattern search and target module lookup.
//
// The scan itself is a pure function over a byte slice so it can be tested
// against synthetic buffers. The Windows half resolves the game module
// (retrying for late loaders) and runs the scan over its mapped image.

use crate::pattern::Pattern;

/// Mapped range of a loaded module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRegion {
    pub base: usize,
    pub size: usize,
}

/// Find the lowest offset of a masked match of `pattern` in `haystack`.
/// Returns None when no match exists or the pattern is longer than the
/// region. Never reads outside the slice.
pub fn find_pattern(haystack: &[u8], pattern: &Pattern) -> Option<usize> {
    let n = pattern.len();
    if n == 0 || n > haystack.len() {
        return None;
    }
    // Pattern is tens of bytes and the region is scanned once at startup;
    // a naive windowed scan is fast enough.
    haystack.windows(n).position(|w| pattern.matches(w))
}

#[cfg(windows)]
pub use windows::{scan_region, wait_for_module};

#[cfg(windows)]
mod windows {
    use std::ffi::CString;
    use std::mem;
    use std::time::Duration;

    use log::{debug, warn};
    use winapi::um::libloaderapi::GetModuleHandleA;
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::psapi::{GetModuleInformation, MODULEINFO};

    use super::{find_pattern, ModuleRegion};
    use crate::constants::{MODULE_RETRY_ATTEMPTS, MODULE_RETRY_DELAY_MS};
    use crate::error::{Error, Result};
    use crate::pattern::Pattern;

    /// Resolve `name` in the current process, retrying with a bounded backoff
    /// so a module the game loads late is still found. Fails permanently with
    /// ModuleNotFound once the retry budget is spent.
    pub fn wait_for_module(name: &str) -> Result<ModuleRegion> {
        let c_name = CString::new(name)
            .map_err(|_| Error::ConfigInvalid(format!("module name '{name}' contains NUL")))?;

        let mut handle = std::ptr::null_mut();
        for attempt in 0..MODULE_RETRY_ATTEMPTS {
            handle = unsafe { GetModuleHandleA(c_name.as_ptr()) };
            if !handle.is_null() {
                break;
            }
            if attempt == 0 {
                warn!("Module '{name}' not loaded yet, retrying...");
            }
            std::thread::sleep(Duration::from_millis(MODULE_RETRY_DELAY_MS));
        }
        if handle.is_null() {
            return Err(Error::ModuleNotFound(name.to_string()));
        }

        let mut info: MODULEINFO = unsafe { mem::zeroed() };
        let ok = unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                handle,
                &mut info,
                mem::size_of::<MODULEINFO>() as u32,
            )
        };
        if ok == 0 {
            return Err(Error::ModuleNotFound(name.to_string()));
        }

        let region = ModuleRegion {
            base: info.lpBaseOfDll as usize,
            size: info.SizeOfImage as usize,
        };
        debug!(
            "Module '{name}' mapped at {:#x}, size {:#x}",
            region.base, region.size
        );
        Ok(region)
    }

    /// Scan a module's mapped image for `pattern`, returning the absolute
    /// address of the first match. The region is only ever read.
    pub fn scan_region(region: ModuleRegion, pattern: &Pattern) -> Result<usize> {
        // The module image is mapped and committed for its whole SizeOfImage
        // while the module stays loaded.
        let image = unsafe { std::slice::from_raw_parts(region.base as *const u8, region.size) };
        find_pattern(image, pattern)
            .map(|offset| region.base + offset)
            .ok_or(Error::ScanMiss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> Pattern {
        Pattern::compile(s).unwrap()
    }

    #[test]
    fn test_wildcard_match_at_known_offset() {
        // AA BB ?? DD at offset 3; the wildcard byte's value must not matter.
        for filler in [0x00u8, 0x42, 0xFF] {
            let buf = [0x01, 0x02, 0x03, 0xAA, 0xBB, filler, 0xDD, 0x09];
            assert_eq!(find_pattern(&buf, &pat("AA BB ?? DD")), Some(3));
        }
    }

    #[test]
    fn test_first_match_wins() {
        let buf = [0x48, 0x8B, 0x00, 0x10, 0x48, 0x8B, 0xFF, 0x10];
        assert_eq!(find_pattern(&buf, &pat("48 8B ?? 10")), Some(0));
    }

    #[test]
    fn test_not_found() {
        let buf = [0x11, 0x22, 0x33, 0x44];
        assert_eq!(find_pattern(&buf, &pat("AA BB")), None);
    }

    #[test]
    fn test_pattern_longer_than_region() {
        let buf = [0xAA, 0xBB];
        assert_eq!(find_pattern(&buf, &pat("AA BB CC DD")), None);
    }

    #[test]
    fn test_match_flush_at_end_of_region() {
        let buf = [0x00, 0x00, 0xAA, 0xBB];
        assert_eq!(find_pattern(&buf, &pat("AA BB")), Some(2));
    }

    #[test]
    fn test_all_wildcards_match_start() {
        let buf = [0x10, 0x20, 0x30];
        assert_eq!(find_pattern(&buf, &pat("?? ??")), Some(0));
    }
}
