// logging.rs — File logging and path resolution beside the DLL.
//
// The log and config files live next to the injected DLL (not the game
// executable), so the module handle saved at DLL_PROCESS_ATTACH is used to
// resolve the DLL's own path.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::LevelFilter;
use once_cell::sync::OnceCell;
use simplelog::{Config as LogConfig, WriteLogger};
use winapi::shared::minwindef::HMODULE;
use winapi::um::libloaderapi::GetModuleFileNameA;

use crate::constants::MOD_NAME;

/// Module handle of this DLL, saved at attach time.
static DLL_HANDLE: AtomicUsize = AtomicUsize::new(0);

/// Directory containing the DLL, resolved once.
static DLL_DIR: OnceCell<PathBuf> = OnceCell::new();

pub fn set_dll_handle(handle: usize) {
    DLL_HANDLE.store(handle, Ordering::Release);
}

fn dll_dir() -> PathBuf {
    DLL_DIR
        .get_or_init(|| {
            let handle = DLL_HANDLE.load(Ordering::Acquire);
            let mut buf = [0u8; 260];
            let len = unsafe {
                GetModuleFileNameA(handle as HMODULE, buf.as_mut_ptr() as *mut i8, buf.len() as u32)
            };
            if len > 0 {
                let path = String::from_utf8_lossy(&buf[..len as usize]).into_owned();
                if let Some(dir) = Path::new(&path).parent() {
                    return dir.to_path_buf();
                }
            }
            PathBuf::from(".")
        })
        .clone()
}

pub fn config_path() -> PathBuf {
    dll_dir().join(format!("{MOD_NAME}.toml"))
}

pub fn log_path() -> PathBuf {
    dll_dir().join(format!("{MOD_NAME}.log"))
}

/// Route the `log` facade into the mod's log file. Logging stays disabled if
/// the file cannot be created; the mod itself still runs.
pub fn init(level: LevelFilter) {
    if let Ok(file) = File::create(log_path()) {
        let _ = WriteLogger::init(level, LogConfig::default(), file);
    }
}
