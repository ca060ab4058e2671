// input.rs — Key polling, edge detection, and the toggle loop.
//
// The loop samples physical key state at a fixed rate and fires an action
// exactly once per down-transition: holding a key produces one action, and a
// press that falls entirely between two polls is lost (accepted limitation
// of polling). It runs until the cancel flag flips, which only happens on
// process detach.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::constants::{
    POLL_ACTIVE_SLEEP_MS, POLL_FAULT_SLEEP_MS, POLL_IDLE_SLEEP_MS, POLL_UNBOUND_SLEEP_MS,
};
use crate::patcher::{FlagMemory, FlagPatcher};

/// Samples whether a key is physically down right now. No event queue: a
/// boolean per key per poll.
pub trait KeySampler {
    fn is_down(&self, vk: u32) -> bool;
}

/// The three configured key sets. Immutable for the loop's lifetime. The
/// same key may appear in more than one set; every matching action fires.
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    pub toggle: Vec<u32>,
    pub first_person: Vec<u32>,
    pub third_person: Vec<u32>,
}

impl KeyBindings {
    pub fn is_empty(&self) -> bool {
        self.toggle.is_empty() && self.first_person.is_empty() && self.third_person.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Toggle,
    ForceFirstPerson,
    ForceThirdPerson,
}

/// Last-observed down/up state per configured key, shared across all three
/// sets. Mutated only by the poll cycle.
pub struct EdgeTracker {
    was_down: HashMap<u32, bool>,
}

impl EdgeTracker {
    pub fn new(bindings: &KeyBindings) -> Self {
        let mut was_down = HashMap::new();
        for vk in bindings
            .toggle
            .iter()
            .chain(&bindings.first_person)
            .chain(&bindings.third_person)
        {
            was_down.insert(*vk, false);
        }
        EdgeTracker { was_down }
    }

    /// One poll cycle. Each unique key is sampled once and its edge is
    /// computed against the previous cycle, so a key bound in several sets
    /// fires every matching action on the same press. Actions are collected
    /// in the fixed order toggle -> first-person -> third-person, and the
    /// fresh state is stored whether or not anything fired.
    pub fn poll<S: KeySampler>(
        &mut self,
        bindings: &KeyBindings,
        sampler: &S,
    ) -> Vec<(KeyAction, u32)> {
        let mut rose = Vec::new();
        for (&vk, was) in self.was_down.iter_mut() {
            let down = sampler.is_down(vk);
            if down && !*was {
                rose.push(vk);
            }
            *was = down;
        }

        let mut fired = Vec::new();
        let sets = [
            (KeyAction::Toggle, &bindings.toggle),
            (KeyAction::ForceFirstPerson, &bindings.first_person),
            (KeyAction::ForceThirdPerson, &bindings.third_person),
        ];
        for (action, keys) in sets {
            for &vk in keys {
                if rose.contains(&vk) {
                    fired.push((action, vk));
                }
            }
        }
        fired
    }
}

/// Run the polling loop until `cancel` flips. With no keys configured at
/// all the loop just idles (valid degenerate configuration). Patch errors
/// are logged and skipped; the loop always continues.
pub fn run_loop<S: KeySampler, M: FlagMemory>(
    bindings: &KeyBindings,
    sampler: &S,
    patcher: &mut FlagPatcher<M>,
    cancel: &AtomicBool,
) {
    if bindings.is_empty() {
        info!("No keys configured; monitor thread idling");
        while !cancel.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(POLL_UNBOUND_SLEEP_MS));
        }
        return;
    }

    let mut tracker = EdgeTracker::new(bindings);
    info!("Key polling loop started");

    while !cancel.load(Ordering::Acquire) {
        let cycle = panic::catch_unwind(AssertUnwindSafe(|| {
            let fired = tracker.poll(bindings, sampler);
            for &(action, vk) in &fired {
                debug!("Key {vk:#x} pressed, action {action:?}");
                let result = match action {
                    KeyAction::Toggle => patcher.toggle(),
                    KeyAction::ForceFirstPerson => patcher.set_first_person(),
                    KeyAction::ForceThirdPerson => patcher.set_third_person(),
                };
                if let Err(e) = result {
                    if e.is_recoverable() {
                        // Per-press condition; skip and keep polling.
                        warn!("Patch skipped for key {vk:#x}: {e}");
                    } else {
                        error!("Unexpected patch failure for key {vk:#x}: {e}");
                    }
                }
            }
            !fired.is_empty()
        }));

        let sleep_ms = match cycle {
            Ok(true) => POLL_ACTIVE_SLEEP_MS,
            Ok(false) => POLL_IDLE_SLEEP_MS,
            Err(_) => {
                error!("Panic caught in poll cycle; backing off");
                POLL_FAULT_SLEEP_MS
            }
        };
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }
    info!("Key polling loop stopped");
}

#[cfg(windows)]
pub use async_keys::AsyncKeySampler;

#[cfg(windows)]
mod async_keys {
    use winapi::um::winuser::GetAsyncKeyState;

    use super::KeySampler;

    /// Physical key state via GetAsyncKeyState; the high bit is the
    /// currently-down flag.
    pub struct AsyncKeySampler;

    impl KeySampler for AsyncKeySampler {
        fn is_down(&self, vk: u32) -> bool {
            (unsafe { GetAsyncKeyState(vk as i32) } as u16 & 0x8000) != 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Replays a scripted down/up sequence for a single key.
    struct ScriptedSampler {
        script: Vec<bool>,
        cycle: Cell<usize>,
    }

    impl ScriptedSampler {
        fn new(script: Vec<bool>) -> Self {
            ScriptedSampler { script, cycle: Cell::new(0) }
        }
        fn advance(&self) {
            self.cycle.set(self.cycle.get() + 1);
        }
    }

    impl KeySampler for ScriptedSampler {
        fn is_down(&self, _vk: u32) -> bool {
            self.script[self.cycle.get()]
        }
    }

    #[test]
    fn test_rising_edges_fire_exactly_once() {
        // up, down, down, up, down across five cycles: actions at cycles 2
        // and 5 only.
        let bindings = KeyBindings { toggle: vec![0x72], ..Default::default() };
        let sampler = ScriptedSampler::new(vec![false, true, true, false, true]);
        let mut tracker = EdgeTracker::new(&bindings);

        let mut fired_at = Vec::new();
        for cycle in 1..=5 {
            if !tracker.poll(&bindings, &sampler).is_empty() {
                fired_at.push(cycle);
            }
            sampler.advance();
        }
        assert_eq!(fired_at, vec![2, 5]);
    }

    #[test]
    fn test_actions_fire_in_set_order() {
        struct AllDown;
        impl KeySampler for AllDown {
            fn is_down(&self, _vk: u32) -> bool {
                true
            }
        }
        let bindings = KeyBindings {
            toggle: vec![0x10],
            first_person: vec![0x11],
            third_person: vec![0x12],
        };
        let mut tracker = EdgeTracker::new(&bindings);
        let fired = tracker.poll(&bindings, &AllDown);
        assert_eq!(
            fired,
            vec![
                (KeyAction::Toggle, 0x10),
                (KeyAction::ForceFirstPerson, 0x11),
                (KeyAction::ForceThirdPerson, 0x12),
            ]
        );
        // Still held next cycle: nothing new fires.
        assert!(tracker.poll(&bindings, &AllDown).is_empty());
    }

    #[test]
    fn test_key_bound_in_two_sets_fires_both_actions() {
        // Debounce state is shared across sets, so one press of a key bound
        // to both Toggle and ForceFirstPerson fires both actions.
        struct AllDown;
        impl KeySampler for AllDown {
            fn is_down(&self, _vk: u32) -> bool {
                true
            }
        }
        let bindings = KeyBindings {
            toggle: vec![0x20],
            first_person: vec![0x20],
            ..Default::default()
        };
        let mut tracker = EdgeTracker::new(&bindings);
        let fired = tracker.poll(&bindings, &AllDown);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn test_empty_bindings_detected() {
        assert!(KeyBindings::default().is_empty());
        assert!(!KeyBindings { toggle: vec![1], ..Default::default() }.is_empty());
    }
}
