// hook.rs — Hook installer state machine over the MinHook facility.
//
// The session walks Uninitialized -> Initialized -> Created -> Enabled.
// Any forward step that fails triggers a full unwind back to Uninitialized,
// and unwind itself is idempotent: callable twice, or before anything was
// ever installed, without error. Exactly one session exists for the lifetime
// of the mod.
//
// Install is split in two because the capture stub needs the continuation
// address (returned by create) patched in before the hook goes live:
//   prepare(target, detour) -> continuation   (initialize + create)
//   arm()                                      (enable)

use log::{info, warn};

use crate::error::{Error, Result};

/// Outcome of one backend call. `Redundant` is "already in that state"
/// (e.g. disabling a hook that is already disabled), which the unwind path
/// treats as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Ok,
    Redundant,
    Failed(i32),
}

impl HookStatus {
    pub fn accepted(self) -> bool {
        !matches!(self, HookStatus::Failed(_))
    }
}

/// The external hooking facility, at the granularity the mod uses it.
/// `create` returns the original-code continuation address on success.
pub trait HookBackend {
    fn initialize(&mut self) -> HookStatus;
    fn create(&mut self, target: usize, detour: usize) -> std::result::Result<usize, i32>;
    fn enable(&mut self, target: usize) -> HookStatus;
    fn disable(&mut self, target: usize) -> HookStatus;
    fn remove(&mut self, target: usize) -> HookStatus;
    fn uninitialize(&mut self) -> HookStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Uninitialized,
    Initialized,
    Created,
    Enabled,
}

/// Owns the one installed detour: target address, saved continuation, and
/// how far installation got. Either fully enabled or fully absent — no
/// partially-installed state survives a failure or detach.
pub struct HookSession<B: HookBackend> {
    backend: B,
    stage: Stage,
    target: usize,
    continuation: usize,
}

impl<B: HookBackend> HookSession<B> {
    pub fn new(backend: B) -> Self {
        HookSession {
            backend,
            stage: Stage::Uninitialized,
            target: 0,
            continuation: 0,
        }
    }

    /// Initialize the facility and create (but not yet enable) the detour at
    /// `target`. Returns the continuation address. Unwinds fully on failure.
    pub fn prepare(&mut self, target: usize, detour: usize) -> Result<usize> {
        debug_assert_eq!(self.stage, Stage::Uninitialized);

        let status = self.backend.initialize();
        if !status.accepted() {
            let code = failure_code(status);
            self.unwind();
            return Err(Error::HookInstall { op: "initialize", status: code });
        }
        self.stage = Stage::Initialized;

        match self.backend.create(target, detour) {
            Ok(continuation) if continuation != 0 => {
                self.target = target;
                self.continuation = continuation;
                self.stage = Stage::Created;
                info!("Hook created at {target:#x}, continuation {continuation:#x}");
                Ok(continuation)
            }
            Ok(_) => {
                // Facility reported success but handed back no continuation.
                self.unwind();
                Err(Error::HookInstall { op: "create", status: -1 })
            }
            Err(code) => {
                self.unwind();
                Err(Error::HookInstall { op: "create", status: code })
            }
        }
    }

    /// Enable the prepared hook so control actually transfers to the detour.
    pub fn arm(&mut self) -> Result<()> {
        debug_assert_eq!(self.stage, Stage::Created);

        let status = self.backend.enable(self.target);
        if !status.accepted() {
            let code = failure_code(status);
            self.unwind();
            return Err(Error::HookInstall { op: "enable", status: code });
        }
        self.stage = Stage::Enabled;
        info!("Hook enabled at {:#x}", self.target);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.stage == Stage::Enabled
    }

    pub fn continuation(&self) -> Option<usize> {
        if self.stage >= Stage::Created {
            Some(self.continuation)
        } else {
            None
        }
    }

    /// Tear down whatever was installed: disable if enabled, remove if
    /// created, uninitialize the facility if initialized. Safe to call from
    /// any state, any number of times.
    pub fn unwind(&mut self) {
        if self.stage >= Stage::Enabled {
            let status = self.backend.disable(self.target);
            if !status.accepted() {
                warn!("Hook disable failed: {status:?}");
            }
        }
        if self.stage >= Stage::Created {
            let status = self.backend.remove(self.target);
            if !status.accepted() {
                warn!("Hook remove failed: {status:?}");
            }
        }
        if self.stage >= Stage::Initialized {
            let status = self.backend.uninitialize();
            if !status.accepted() {
                warn!("Hook facility uninitialize failed: {status:?}");
            }
        }
        self.stage = Stage::Uninitialized;
        self.target = 0;
        self.continuation = 0;
    }
}

fn failure_code(status: HookStatus) -> i32 {
    match status {
        HookStatus::Failed(code) => code,
        _ => 0,
    }
}

#[cfg(windows)]
pub use minhook::MinHookBackend;

#[cfg(windows)]
mod minhook {
    use std::ffi::c_void;
    use std::ptr;

    use minhook_sys::{
        MH_CreateHook, MH_DisableHook, MH_EnableHook, MH_Initialize, MH_RemoveHook,
        MH_Uninitialize, MH_OK,
    };

    use super::{HookBackend, HookStatus};

    // MinHook status codes minhook-sys does not re-export by name.
    const MH_ERROR_ALREADY_INITIALIZED: i32 = 1;
    const MH_ERROR_NOT_INITIALIZED: i32 = 2;
    const MH_ERROR_ENABLED: i32 = 5;
    const MH_ERROR_DISABLED: i32 = 6;

    fn map(status: i32, redundant: &[i32]) -> HookStatus {
        if status == MH_OK {
            HookStatus::Ok
        } else if redundant.contains(&status) {
            HookStatus::Redundant
        } else {
            HookStatus::Failed(status)
        }
    }

    /// The real hooking facility: thin adapter over minhook-sys.
    pub struct MinHookBackend;

    impl HookBackend for MinHookBackend {
        fn initialize(&mut self) -> HookStatus {
            map(unsafe { MH_Initialize() }, &[MH_ERROR_ALREADY_INITIALIZED])
        }

        fn create(&mut self, target: usize, detour: usize) -> Result<usize, i32> {
            let mut original = ptr::null_mut::<c_void>();
            let status = unsafe {
                MH_CreateHook(target as *mut c_void, detour as *mut c_void, &mut original)
            };
            if status == MH_OK {
                Ok(original as usize)
            } else {
                Err(status)
            }
        }

        fn enable(&mut self, target: usize) -> HookStatus {
            map(unsafe { MH_EnableHook(target as *mut c_void) }, &[MH_ERROR_ENABLED])
        }

        fn disable(&mut self, target: usize) -> HookStatus {
            map(unsafe { MH_DisableHook(target as *mut c_void) }, &[MH_ERROR_DISABLED])
        }

        fn remove(&mut self, target: usize) -> HookStatus {
            map(unsafe { MH_RemoveHook(target as *mut c_void) }, &[])
        }

        fn uninitialize(&mut self) -> HookStatus {
            map(unsafe { MH_Uninitialize() }, &[MH_ERROR_NOT_INITIALIZED])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Op {
        Init,
        Create,
        Enable,
        Disable,
        Remove,
        Uninit,
    }

    /// Scriptable facility: records every call, fails on request.
    struct MockBackend {
        ops: Rc<RefCell<Vec<Op>>>,
        fail_on: Option<Op>,
    }

    impl MockBackend {
        fn new(fail_on: Option<Op>) -> (Self, Rc<RefCell<Vec<Op>>>) {
            let ops = Rc::new(RefCell::new(Vec::new()));
            (MockBackend { ops: ops.clone(), fail_on }, ops)
        }

        fn record(&mut self, op: Op) -> HookStatus {
            self.ops.borrow_mut().push(op);
            if self.fail_on == Some(op) {
                HookStatus::Failed(9)
            } else {
                HookStatus::Ok
            }
        }
    }

    impl HookBackend for MockBackend {
        fn initialize(&mut self) -> HookStatus {
            self.record(Op::Init)
        }
        fn create(&mut self, _target: usize, _detour: usize) -> std::result::Result<usize, i32> {
            match self.record(Op::Create) {
                HookStatus::Failed(code) => Err(code),
                _ => Ok(0x7000_1234),
            }
        }
        fn enable(&mut self, _target: usize) -> HookStatus {
            self.record(Op::Enable)
        }
        fn disable(&mut self, _target: usize) -> HookStatus {
            self.record(Op::Disable)
        }
        fn remove(&mut self, _target: usize) -> HookStatus {
            self.record(Op::Remove)
        }
        fn uninitialize(&mut self) -> HookStatus {
            self.record(Op::Uninit)
        }
    }

    #[test]
    fn test_full_install_and_unwind() {
        let (backend, ops) = MockBackend::new(None);
        let mut session = HookSession::new(backend);

        let continuation = session.prepare(0x1000, 0x2000).unwrap();
        assert_eq!(continuation, 0x7000_1234);
        assert_eq!(session.continuation(), Some(continuation));
        session.arm().unwrap();
        assert!(session.is_enabled());

        session.unwind();
        assert!(!session.is_enabled());
        assert_eq!(session.continuation(), None);
        assert_eq!(
            *ops.borrow(),
            vec![Op::Init, Op::Create, Op::Enable, Op::Disable, Op::Remove, Op::Uninit]
        );
    }

    #[test]
    fn test_unwind_is_idempotent() {
        let (backend, ops) = MockBackend::new(None);
        let mut session = HookSession::new(backend);
        session.prepare(0x1000, 0x2000).unwrap();
        session.arm().unwrap();

        session.unwind();
        let after_first = ops.borrow().len();
        session.unwind();
        session.unwind();
        // Later unwinds touch nothing: handles are already released.
        assert_eq!(ops.borrow().len(), after_first);
    }

    #[test]
    fn test_unwind_from_uninitialized_is_a_noop() {
        let (backend, ops) = MockBackend::new(None);
        let mut session = HookSession::new(backend);
        session.unwind();
        assert!(ops.borrow().is_empty());
        assert_eq!(session.continuation(), None);
    }

    #[test]
    fn test_create_failure_unwinds_facility() {
        let (backend, ops) = MockBackend::new(Some(Op::Create));
        let mut session = HookSession::new(backend);
        let err = session.prepare(0x1000, 0x2000).unwrap_err();
        assert!(matches!(err, Error::HookInstall { op: "create", status: 9 }));
        // Facility was initialized, so it must be uninitialized again.
        assert_eq!(*ops.borrow(), vec![Op::Init, Op::Create, Op::Uninit]);
        assert_eq!(session.continuation(), None);
    }

    #[test]
    fn test_enable_failure_removes_created_hook() {
        let (backend, ops) = MockBackend::new(Some(Op::Enable));
        let mut session = HookSession::new(backend);
        session.prepare(0x1000, 0x2000).unwrap();
        let err = session.arm().unwrap_err();
        assert!(matches!(err, Error::HookInstall { op: "enable", .. }));
        assert_eq!(
            *ops.borrow(),
            vec![Op::Init, Op::Create, Op::Enable, Op::Remove, Op::Uninit]
        );
        assert!(!session.is_enabled());
    }

    #[test]
    fn test_initialize_failure_leaves_nothing_to_clean() {
        let (backend, ops) = MockBackend::new(Some(Op::Init));
        let mut session = HookSession::new(backend);
        assert!(session.prepare(0x1000, 0x2000).is_err());
        assert_eq!(*ops.borrow(), vec![Op::Init]);
    }
}
