// lib.rs — DLL entry point for the third-person view toggle mod.
//
// When this DLL is injected into the game via LoadLibraryA, DllMain fires
// with DLL_PROCESS_ATTACH. It spawns a worker thread that:
//   1. Loads the config and opens the log file (both beside the DLL)
//   2. Scans the game module for the view-context AOB pattern
//   3. Installs a MinHook detour that captures R9 into the shared cell
//   4. Polls the configured keys forever, flipping the view flag byte
// DLL_PROCESS_DETACH unwinds the hook and frees the stub synchronously
// before the module is unmapped.
//
// Everything platform-neutral (pattern compile, scan, hook state machine,
// patch executor, edge detection, config) lives in the modules below and is
// testable on any host; only the glue here and the per-module Windows
// adapters need Win32.

pub mod channel;
pub mod config;
pub mod constants;
pub mod detour;
pub mod error;
pub mod hook;
pub mod input;
pub mod pattern;
pub mod patcher;
pub mod scanner;

#[cfg(windows)]
pub mod logging;

#[cfg(windows)]
mod entry {
    #![allow(non_snake_case)]

    use std::ptr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use log::{error, info};
    use winapi::shared::minwindef::{BOOL, DWORD, HINSTANCE, LPVOID, TRUE};
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::libloaderapi::DisableThreadLibraryCalls;
    use winapi::um::processthreadsapi::CreateThread;
    use winapi::um::winnt::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    use crate::channel::CaptureCell;
    use crate::config::Config;
    use crate::constants::{FLAG_OFFSET, GAME_MODULE, HOOK_OFFSET, MOD_NAME};
    use crate::detour::CaptureStub;
    use crate::error::Result;
    use crate::hook::{HookSession, MinHookBackend};
    use crate::input::{self, AsyncKeySampler, KeyBindings};
    use crate::pattern::Pattern;
    use crate::patcher::{FlagPatcher, ProcessMemory};
    use crate::scanner;
    use crate::logging;

    /// Flipped on DLL_PROCESS_DETACH; the poll loop's cancellation token.
    static STOP: AtomicBool = AtomicBool::new(false);

    /// Everything the detach path must release. None until initialization
    /// succeeds, and taken exactly once by shutdown.
    static STATE: Mutex<Option<ModState>> = Mutex::new(None);

    struct ModState {
        session: HookSession<MinHookBackend>,
        stub: CaptureStub,
        // Keeps the capture cell alive as long as the hook could write it.
        _cell: Arc<CaptureCell>,
    }

    /// The whole initialization sequence: config -> logging -> pattern ->
    /// module -> scan -> hook. Runs once; on any error everything acquired
    /// so far is already released when this returns.
    fn initialize() -> Result<(KeyBindings, Arc<CaptureCell>)> {
        let config = Config::load_or_create(&logging::config_path());
        let level = config
            .as_ref()
            .map(|c| c.level_filter())
            .unwrap_or(log::LevelFilter::Info);
        logging::init(level);

        info!("--------------------");
        info!("{MOD_NAME} v{} initializing", env!("CARGO_PKG_VERSION"));
        let config = config?;
        info!(
            "Keys: toggle={:#x?} fpv={:#x?} tpv={:#x?}",
            config.toggle_keys, config.fpv_keys, config.tpv_keys
        );

        let pattern = Pattern::compile(&config.aob_pattern)?;

        let cell = Arc::new(CaptureCell::new());
        let stub = CaptureStub::new(cell.as_ptr() as usize)?;

        let region = scanner::wait_for_module(GAME_MODULE)?;
        let match_addr = scanner::scan_region(region, &pattern)?;
        let hook_addr = match_addr + HOOK_OFFSET;
        info!("Pattern found at {match_addr:#x}, hook target {hook_addr:#x}");

        // Create first so the continuation can be patched into the stub,
        // then enable. A failure in either step unwinds the session and the
        // stub is freed on drop (the hook no longer points at it).
        let mut session = HookSession::new(MinHookBackend);
        let continuation = session.prepare(hook_addr, stub.entry())?;
        stub.set_continuation(continuation);
        session.arm()?;

        let mut guard = STATE.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(ModState { session, stub, _cell: cell.clone() });
        drop(guard);

        info!("Initialization successful, mod active");
        Ok((config.key_bindings(), cell))
    }

    /// Detach-time unwind: disable/remove the hook, uninitialize MinHook,
    /// free the stub. Idempotent; safe when initialization never finished.
    fn shutdown() {
        STOP.store(true, Ordering::Release);
        let taken = {
            let mut guard = STATE.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(mut state) = taken {
            state.session.unwind();
            state.stub.release();
            info!("Cleanup complete");
        }
    }

    /// Worker thread: run initialization, then poll keys until detach.
    unsafe extern "system" fn worker(_: LPVOID) -> DWORD {
        match initialize() {
            Ok((bindings, cell)) => {
                let sampler = AsyncKeySampler;
                let mut patcher = FlagPatcher::new(&cell, FLAG_OFFSET, ProcessMemory);
                input::run_loop(&bindings, &sampler, &mut patcher, &STOP);
                0
            }
            Err(e) => {
                // Fatal: the mod stays inactive, the game keeps running.
                error!("Initialization failed: {e}");
                1
            }
        }
    }

    #[no_mangle]
    pub unsafe extern "system" fn DllMain(
        hinst: HINSTANCE,
        reason: DWORD,
        _reserved: LPVOID,
    ) -> BOOL {
        match reason {
            DLL_PROCESS_ATTACH => {
                DisableThreadLibraryCalls(hinst);
                logging::set_dll_handle(hinst as usize);

                let handle = CreateThread(
                    ptr::null_mut(),
                    0,
                    Some(worker),
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                );
                if !handle.is_null() {
                    CloseHandle(handle);
                }
            }
            DLL_PROCESS_DETACH => {
                shutdown();
            }
            _ => {}
        }
        TRUE
    }
}
