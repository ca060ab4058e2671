// detour.rs — The R9 capture stub installed as the MinHook detour.
//
// When the game's instruction pointer reaches the hook address, MinHook
// redirects it here. The stub stores R9 (the view-context pointer at that
// point) through the capture cell address baked into it, then jumps to the
// original-code continuation MinHook saved. RAX is preserved and no flags
// are touched, so original execution resumes exactly as if the hook were
// absent. The cell address is always a live allocation: the stub is built
// with it baked in and the hook is removed before the cell is freed.
//
// Layout (x86_64):
//   push rax
//   mov  rax, imm64        ; capture cell address      <- CELL_SLOT
//   mov  [rax], r9
//   pop  rax
//   jmp  [rip+0]
//   dq   imm64             ; continuation address      <- CONTINUATION_SLOT
//
// The continuation is only known after MH_CreateHook, so the stub is built
// with that slot zeroed and patched before the hook is enabled.

pub const STUB_LEN: usize = 29;

/// Byte offset of the imm64 holding the capture cell address.
pub const CELL_SLOT: usize = 3;

/// Byte offset of the imm64 holding the continuation address.
pub const CONTINUATION_SLOT: usize = 21;

/// Assemble the stub with `cell_addr` baked in and the continuation zeroed.
pub fn stub_template(cell_addr: u64) -> [u8; STUB_LEN] {
    let mut code = [0u8; STUB_LEN];
    code[0] = 0x50; // push rax
    code[1] = 0x48; // mov rax, imm64
    code[2] = 0xB8;
    code[CELL_SLOT..CELL_SLOT + 8].copy_from_slice(&cell_addr.to_le_bytes());
    code[11] = 0x4C; // mov [rax], r9
    code[12] = 0x89;
    code[13] = 0x08;
    code[14] = 0x58; // pop rax
    code[15] = 0xFF; // jmp [rip+0]
    code[16] = 0x25;
    // 4 zero bytes of rip displacement, then the 8-byte continuation slot.
    code
}

#[cfg(windows)]
pub use exec::CaptureStub;

#[cfg(windows)]
mod exec {
    use std::ptr;

    use log::debug;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
    use winapi::um::processthreadsapi::{FlushInstructionCache, GetCurrentProcess};
    use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE};

    use super::{stub_template, CONTINUATION_SLOT, STUB_LEN};
    use crate::error::{Error, Result};

    /// The stub placed in its own page of executable memory. Released only
    /// after the hook that points at it has been removed.
    pub struct CaptureStub {
        mem: *mut u8,
    }

    // The stub memory is written during setup only; the game thread just
    // executes it.
    unsafe impl Send for CaptureStub {}

    impl CaptureStub {
        /// Allocate executable memory and write the stub, with the capture
        /// cell address baked in and the continuation still unset.
        pub fn new(cell_addr: usize) -> Result<Self> {
            let mem = unsafe {
                VirtualAlloc(
                    ptr::null_mut(),
                    STUB_LEN,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_EXECUTE_READWRITE,
                )
            } as *mut u8;
            if mem.is_null() {
                return Err(Error::HookInstall {
                    op: "stub alloc",
                    status: unsafe { GetLastError() } as i32,
                });
            }
            let code = stub_template(cell_addr as u64);
            unsafe {
                ptr::copy_nonoverlapping(code.as_ptr(), mem, STUB_LEN);
            }
            debug!("Capture stub written at {:#x}", mem as usize);
            Ok(CaptureStub { mem })
        }

        /// Entry address passed to MH_CreateHook as the detour.
        pub fn entry(&self) -> usize {
            self.mem as usize
        }

        /// Patch the saved continuation address in. Must happen before the
        /// hook is enabled.
        pub fn set_continuation(&self, continuation: usize) {
            unsafe {
                let slot = self.mem.add(CONTINUATION_SLOT) as *mut u64;
                slot.write_unaligned(continuation as u64);
                FlushInstructionCache(GetCurrentProcess(), self.mem as *const _, STUB_LEN);
            }
        }

        /// Free the stub memory. Idempotent; the hook must already be
        /// removed so nothing can still jump here.
        pub fn release(&mut self) {
            if !self.mem.is_null() {
                unsafe {
                    VirtualFree(self.mem as *mut _, 0, MEM_RELEASE);
                }
                self.mem = ptr::null_mut();
            }
        }
    }

    impl Drop for CaptureStub {
        fn drop(&mut self) {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_layout() {
        let code = stub_template(0x1122_3344_5566_7788);
        assert_eq!(code.len(), STUB_LEN);
        assert_eq!(code[0], 0x50);
        // Cell address little-endian at its slot.
        assert_eq!(
            &code[CELL_SLOT..CELL_SLOT + 8],
            &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        // Store through the cell, restore rax.
        assert_eq!(&code[11..15], &[0x4C, 0x89, 0x08, 0x58]);
        // Indirect jump reads the qword right behind it.
        assert_eq!(&code[15..21], &[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
        // Continuation slot starts zeroed.
        assert_eq!(&code[CONTINUATION_SLOT..], &[0u8; 8]);
    }

    #[test]
    fn test_jump_slot_sits_at_stub_end() {
        // The rip-relative jump must read exactly the trailing 8-byte slot.
        assert_eq!(CONTINUATION_SLOT + 8, STUB_LEN);
        let code = stub_template(0);
        assert_eq!(code[CONTINUATION_SLOT - 6], 0xFF);
    }
}
