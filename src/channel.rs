// channel.rs — Captured-pointer channel between the detour and the monitor
// thread.
//
// The detour (running inside the game's own instruction stream) stores the
// R9 register through a raw address; the toggle loop reads it back. There is
// deliberately no lock: the cell is a single naturally-aligned machine word,
// so individual reads and writes are atomic at the hardware level. A stale
// value is fine (the next hook invocation refreshes it); a torn one cannot
// happen.

use std::sync::atomic::{AtomicUsize, Ordering};

/// One machine word of process-owned read/write memory. Value 0 means the
/// hook has not captured anything yet.
pub struct CaptureCell {
    slot: Box<AtomicUsize>,
}

impl CaptureCell {
    pub fn new() -> Self {
        CaptureCell {
            slot: Box::new(AtomicUsize::new(0)),
        }
    }

    /// Raw address of the word, handed to the detour at hook-creation time.
    /// The detour writes through this address; it does not own the memory.
    pub fn as_ptr(&self) -> *mut usize {
        self.slot.as_ref() as *const AtomicUsize as *mut usize
    }

    /// Last value the detour stored, or 0 if it never ran. Relaxed is enough:
    /// the contract is stale-but-not-torn, not ordered.
    pub fn load(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    /// Stand-in for the detour's store (the real one writes through
    /// `as_ptr()` from assembly).
    pub fn store(&self, value: usize) {
        self.slot.store(value, Ordering::Relaxed);
    }
}

impl Default for CaptureCell {
    fn default() -> Self {
        Self::new()
    }
}
