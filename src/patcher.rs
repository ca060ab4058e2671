// patcher.rs — Safe memory-patch executor for the view flag byte.
//
// The only code path that mutates game memory. Every invocation re-validates
// the captured pointer and the target page: the game may remap or unmap the
// region between polls, so writability is never assumed to be stable across
// calls. Access faults surface as error returns from the memory seam, never
// as a crash of the monitor thread.

use log::{debug, info};

use crate::channel::CaptureCell;
use crate::error::{Error, Result};

/// The two values the flag byte can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    FirstPerson,
    ThirdPerson,
}

impl ViewState {
    pub fn as_byte(self) -> u8 {
        match self {
            ViewState::FirstPerson => 0,
            ViewState::ThirdPerson => 1,
        }
    }

    pub fn from_byte(value: u8) -> Self {
        if value == 0 {
            ViewState::FirstPerson
        } else {
            ViewState::ThirdPerson
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            ViewState::FirstPerson => ViewState::ThirdPerson,
            ViewState::ThirdPerson => ViewState::FirstPerson,
        }
    }
}

/// Whether a set actually wrote or the flag already held the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Written,
    Unchanged,
}

/// Access to the target process's memory, narrow enough to mock in tests.
/// `probe_writable` must confirm the page holding `addr` is committed and
/// writable; read/write report faults as errors instead of raising them.
pub trait FlagMemory {
    fn probe_writable(&self, addr: usize) -> std::result::Result<(), String>;
    fn read_byte(&self, addr: usize) -> std::result::Result<u8, String>;
    fn write_byte(&mut self, addr: usize, value: u8) -> std::result::Result<(), String>;
}

/// Applies flag-byte patches through a captured view-context pointer.
pub struct FlagPatcher<'a, M: FlagMemory> {
    cell: &'a CaptureCell,
    flag_offset: usize,
    mem: M,
}

impl<'a, M: FlagMemory> FlagPatcher<'a, M> {
    pub fn new(cell: &'a CaptureCell, flag_offset: usize, mem: M) -> Self {
        FlagPatcher { cell, flag_offset, mem }
    }

    /// Resolve the flag address from the captured pointer, or fail if the
    /// hook has not captured anything yet.
    fn flag_address(&self) -> Result<usize> {
        let captured = self.cell.load();
        if captured == 0 {
            return Err(Error::ChannelUnset);
        }
        Ok(captured + self.flag_offset)
    }

    /// Set the flag byte, validating the target page first. Writing a value
    /// the flag already holds is a successful no-op.
    pub fn set_view(&mut self, state: ViewState) -> Result<PatchOutcome> {
        let addr = self.flag_address()?;

        self.mem
            .probe_writable(addr)
            .map_err(|reason| Error::MemoryUnsafe { address: addr, reason })?;

        let current = self
            .mem
            .read_byte(addr)
            .map_err(|reason| Error::MemoryUnsafe { address: addr, reason })?;
        if current == state.as_byte() {
            debug!("View flag already {} at {addr:#x}, no change", state.as_byte());
            return Ok(PatchOutcome::Unchanged);
        }

        self.mem
            .write_byte(addr, state.as_byte())
            .map_err(|reason| Error::MemoryUnsafe { address: addr, reason })?;
        info!("View flag set to {} at {addr:#x}", state.as_byte());
        Ok(PatchOutcome::Written)
    }

    /// Read the current flag (best-effort validated) and write the opposite.
    pub fn toggle(&mut self) -> Result<PatchOutcome> {
        let addr = self.flag_address()?;
        let current = self
            .mem
            .read_byte(addr)
            .map_err(|reason| Error::MemoryUnsafe { address: addr, reason })?;
        // set_view re-validates the page before the write.
        self.set_view(ViewState::from_byte(current).opposite())
    }

    pub fn set_first_person(&mut self) -> Result<PatchOutcome> {
        self.set_view(ViewState::FirstPerson)
    }

    pub fn set_third_person(&mut self) -> Result<PatchOutcome> {
        self.set_view(ViewState::ThirdPerson)
    }
}

#[cfg(windows)]
pub use process::ProcessMemory;

#[cfg(windows)]
mod process {
    use std::mem;
    use std::ptr;

    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::memoryapi::{ReadProcessMemory, VirtualQuery, WriteProcessMemory};
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::winnt::{
        MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
        PAGE_READWRITE, PAGE_WRITECOPY,
    };

    use super::FlagMemory;

    const WRITABLE_MASK: u32 =
        PAGE_READWRITE | PAGE_WRITECOPY | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY;

    /// Live process memory. Reads and writes go through
    /// Read/WriteProcessMemory on the current process so a stale pointer
    /// produces an error return instead of an access violation.
    pub struct ProcessMemory;

    impl FlagMemory for ProcessMemory {
        fn probe_writable(&self, addr: usize) -> Result<(), String> {
            let mut info: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
            let len = unsafe {
                VirtualQuery(
                    addr as *const _,
                    &mut info,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if len == 0 {
                return Err(format!("VirtualQuery failed, error {}", unsafe {
                    GetLastError()
                }));
            }
            if info.State != MEM_COMMIT {
                return Err(format!("page not committed (state {:#x})", info.State));
            }
            if info.Protect & WRITABLE_MASK == 0 {
                return Err(format!("page not writable (protect {:#x})", info.Protect));
            }
            Ok(())
        }

        fn read_byte(&self, addr: usize) -> Result<u8, String> {
            let mut value = 0u8;
            let ok = unsafe {
                ReadProcessMemory(
                    GetCurrentProcess(),
                    addr as *const _,
                    &mut value as *mut u8 as *mut _,
                    1,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                Err(format!("read failed, error {}", unsafe { GetLastError() }))
            } else {
                Ok(value)
            }
        }

        fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), String> {
            let ok = unsafe {
                WriteProcessMemory(
                    GetCurrentProcess(),
                    addr as *mut _,
                    &value as *const u8 as *const _,
                    1,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                Err(format!("write failed, error {}", unsafe { GetLastError() }))
            } else {
                Ok(())
            }
        }
    }
}
