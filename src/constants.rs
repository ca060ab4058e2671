// constants.rs — Central definitions: mod identity, memory offsets, AOB
// pattern, and timing values used across the crate.

/// Mod name, used for the config and log file names.
pub const MOD_NAME: &str = "tpv_toggle";

/// Name of the game module whose image is scanned for the view-context code.
pub const GAME_MODULE: &str = "WHGame.dll";

/// Default AOB pattern locating the third-person view context code.
///
/// Sequence breakdown:
///   48 8B 8F 58 0A 00 00  ; mov rcx, [rdi+0A58]
///   48 83 C1 10           ; add rcx, 10
///   4C 8B 48 38           ; mov r9, [rax+38]   <-- hook target (+11)
///   4C 8B 01              ; mov r8, [rcx]
///   41 8A 41 38           ; mov al, [r9+38]    <-- view flag read
///   F6 D8                 ; neg al
///   48 1B D2              ; sbb rdx, rdx
pub const DEFAULT_AOB_PATTERN: &str =
    "48 8B 8F 58 0A 00 00 48 83 C1 10 4C 8B 48 38 4C 8B 01 41 8A 41 38 F6 D8 48 1B D2";

/// Offset (bytes) from the pattern match to the `mov r9, [rax+38]` hook target.
pub const HOOK_OFFSET: usize = 11;

/// Offset (bytes) from the captured R9 pointer to the view flag byte.
/// Flag: 0 = first person, 1 = third person.
pub const FLAG_OFFSET: usize = 0x38;

/// How many times to look for the game module before giving up (one second
/// apart — the game loads it shortly after process start).
pub const MODULE_RETRY_ATTEMPTS: u32 = 30;

/// Delay between module lookup attempts, in milliseconds.
pub const MODULE_RETRY_DELAY_MS: u64 = 1000;

/// Poll-loop sleep right after a cycle that fired an action (stay responsive
/// to rapid input), in milliseconds.
pub const POLL_ACTIVE_SLEEP_MS: u64 = 15;

/// Poll-loop sleep after a quiet cycle, in milliseconds.
pub const POLL_IDLE_SLEEP_MS: u64 = 50;

/// Back-off sleep after an unexpected fault inside a poll cycle.
pub const POLL_FAULT_SLEEP_MS: u64 = 1000;

/// Sleep between wake-ups when no keys are configured at all.
pub const POLL_UNBOUND_SLEEP_MS: u64 = 5000;
