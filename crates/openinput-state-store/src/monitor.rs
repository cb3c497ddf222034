//! State-change monitors.
//!
//! Upper layers (the action/binding machinery) register interest in a bit
//! region of a device's state. When the store commits a new value, every
//! monitor whose region intersects the written bits and whose bits actually
//! changed is signalled, then fired synchronously in caller-specified group
//! order. A callback may mark the change handled, which suppresses only the
//! remaining signalled monitors of its own group.
//!
//! A registration may additionally carry an expiry timer: if no qualifying
//! change arrives before the deadline, a separate callback path fires once
//! and the timer is cleared. A real change or a new timer always supersedes
//! a pending timer.

use openinput_state_block::{FourCC, StateBlock, bits};

/// A bit range within a device's state block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitRegion {
    /// First bit, relative to the device block start.
    pub bit_offset: u32,
    /// Width of the region.
    pub size_in_bits: u32,
}

impl BitRegion {
    /// Region from explicit byte/bit coordinates.
    pub const fn new(byte_offset: u32, bit_offset: u32, size_in_bits: u32) -> Self {
        Self {
            bit_offset: byte_offset * 8 + bit_offset,
            size_in_bits,
        }
    }

    /// The region a state block occupies.
    pub const fn from_block(block: &StateBlock) -> Self {
        Self::new(block.byte_offset, block.bit_offset, block.size_in_bits)
    }

    /// Whether the region covers no bits.
    pub const fn is_empty(&self) -> bool {
        self.size_in_bits == 0
    }

    fn end(&self) -> u32 {
        self.bit_offset + self.size_in_bits
    }

    /// The intersection of two regions (empty when they do not touch).
    pub fn overlap(&self, other: &BitRegion) -> BitRegion {
        let start = self.bit_offset.max(other.bit_offset);
        let end = self.end().min(other.end());
        if end <= start {
            return BitRegion::default();
        }
        BitRegion {
            bit_offset: start,
            size_in_bits: end - start,
        }
    }
}

// Bitwise comparison of one region across two snapshots of the same device
// block. Bits past either buffer's end compare equal.
fn region_bits_equal(a: &[u8], b: &[u8], region: BitRegion) -> bool {
    let first = region.bit_offset as usize;
    (first..first + region.size_in_bits as usize)
        .all(|bit| bits::read_bit(a, bit).ok() == bits::read_bit(b, bit).ok())
}

/// Identity of the event record that triggered a notification. Carries no
/// borrow into the event arena so notifications can outlive the walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventInfo {
    /// Type tag of the triggering record.
    pub type_tag: FourCC,
    /// Device the record was for.
    pub device_id: u32,
    /// Timestamp of the record.
    pub timestamp: f64,
    /// Arena offset of the record within its buffer.
    pub buffer_offset: usize,
}

/// Callback interface for state-change monitors.
pub trait StateChangeMonitor {
    /// The monitored bits changed. `event` identifies the triggering record,
    /// when there is one. Return `true` to mark the change handled and
    /// suppress the remaining signalled monitors of the same group.
    fn notify_state_changed(
        &mut self,
        control_id: u32,
        time: f64,
        event: Option<&EventInfo>,
        monitor_index: u64,
    ) -> bool;

    /// A registered expiry timer lapsed without a qualifying change.
    fn notify_timer_expired(
        &mut self,
        _control_id: u32,
        _time: f64,
        _monitor_index: u64,
        _timer_index: u32,
    ) {
    }
}

/// Handle identifying one monitor registration within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorHandle(u64);

struct MonitorEntry {
    handle: MonitorHandle,
    control_id: u32,
    region: BitRegion,
    group: u32,
    monitor_index: u64,
    monitor: Box<dyn StateChangeMonitor>,
    signalled: bool,
}

struct TimeoutEntry {
    handle: MonitorHandle,
    control_id: u32,
    deadline: f64,
    timer_index: u32,
}

/// Per-device table of state-change monitors.
///
/// Entries are kept sorted by ascending group so dispatch is a plain
/// in-order iteration; registration order breaks ties within a group.
#[derive(Default)]
pub struct MonitorRegistry {
    entries: Vec<MonitorEntry>,
    timeouts: Vec<TimeoutEntry>,
    next_handle: u64,
}

impl MonitorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered monitors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no monitors are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a monitor over `region`, in priority group `group` (lower
    /// groups fire first). `monitor_index` is an opaque value handed back on
    /// every notification. Returns the handle for removal and timers.
    pub fn add(
        &mut self,
        control_id: u32,
        region: BitRegion,
        group: u32,
        monitor_index: u64,
        monitor: Box<dyn StateChangeMonitor>,
    ) -> MonitorHandle {
        let handle = MonitorHandle(self.next_handle);
        self.next_handle += 1;

        // Keep the table sorted by group: insert at the end of the entry's
        // group so registration order is preserved within it.
        let position = self
            .entries
            .iter()
            .position(|e| e.group > group)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            MonitorEntry {
                handle,
                control_id,
                region,
                group,
                monitor_index,
                monitor,
                signalled: false,
            },
        );
        handle
    }

    /// Remove a registration and any timers pending on it. Returns whether
    /// the handle was known.
    pub fn remove(&mut self, handle: MonitorHandle) -> bool {
        self.timeouts.retain(|t| t.handle != handle);
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Drop every registration and timer.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.timeouts.clear();
    }

    /// Compare `old_state` and `new_state` over `written` and signal every
    /// monitor whose region intersects the written bits and actually
    /// changed. Returns whether anything signalled. A signalled monitor's
    /// pending timers are superseded.
    pub fn process(&mut self, old_state: &[u8], new_state: &[u8], written: BitRegion) -> bool {
        let mut signalled_any = false;
        let mut superseded: Vec<MonitorHandle> = Vec::new();
        for entry in &mut self.entries {
            let overlap = written.overlap(&entry.region);
            if overlap.is_empty() || region_bits_equal(old_state, new_state, overlap) {
                continue;
            }
            entry.signalled = true;
            signalled_any = true;
            superseded.push(entry.handle);
        }
        if !superseded.is_empty() {
            self.timeouts.retain(|t| !superseded.contains(&t.handle));
        }
        signalled_any
    }

    /// Fire every signalled monitor in group order. A callback returning
    /// `true` (handled) clears the remaining signals of its own group only.
    pub fn fire(&mut self, time: f64, event: Option<&EventInfo>) {
        for i in 0..self.entries.len() {
            if !self.entries[i].signalled {
                continue;
            }
            self.entries[i].signalled = false;
            let control_id = self.entries[i].control_id;
            let group = self.entries[i].group;
            let monitor_index = self.entries[i].monitor_index;
            let handled =
                self.entries[i]
                    .monitor
                    .notify_state_changed(control_id, time, event, monitor_index);
            if handled {
                for entry in &mut self.entries[i + 1..] {
                    if entry.group == group {
                        entry.signalled = false;
                    }
                }
            }
        }
    }

    /// Arm an expiry timer on a registration. Replaces a pending timer with
    /// the same `timer_index`. Returns whether the handle was known.
    pub fn add_timeout(&mut self, handle: MonitorHandle, deadline: f64, timer_index: u32) -> bool {
        let Some(entry) = self.entries.iter().find(|e| e.handle == handle) else {
            return false;
        };
        let control_id = entry.control_id;
        self.timeouts
            .retain(|t| !(t.handle == handle && t.timer_index == timer_index));
        self.timeouts.push(TimeoutEntry {
            handle,
            control_id,
            deadline,
            timer_index,
        });
        true
    }

    /// Disarm a pending timer.
    pub fn remove_timeout(&mut self, handle: MonitorHandle, timer_index: u32) {
        self.timeouts
            .retain(|t| !(t.handle == handle && t.timer_index == timer_index));
    }

    /// Fire `notify_timer_expired` once for every timer whose deadline has
    /// passed, then clear it.
    pub fn process_timeouts(&mut self, now: f64) {
        if self.timeouts.is_empty() {
            return;
        }
        let (expired, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timeouts)
            .into_iter()
            .partition(|t| t.deadline <= now);
        self.timeouts = remaining;
        for timeout in expired {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.handle == timeout.handle)
            {
                entry.monitor.notify_timer_expired(
                    timeout.control_id,
                    now,
                    entry.monitor_index,
                    timeout.timer_index,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        Changed(u32, u64),
        Expired(u32, u32),
    }

    struct Recorder {
        calls: Rc<RefCell<Vec<Call>>>,
        handle_it: bool,
    }

    impl StateChangeMonitor for Recorder {
        fn notify_state_changed(
            &mut self,
            control_id: u32,
            _time: f64,
            _event: Option<&EventInfo>,
            monitor_index: u64,
        ) -> bool {
            self.calls
                .borrow_mut()
                .push(Call::Changed(control_id, monitor_index));
            self.handle_it
        }

        fn notify_timer_expired(
            &mut self,
            control_id: u32,
            _time: f64,
            _monitor_index: u64,
            timer_index: u32,
        ) {
            self.calls
                .borrow_mut()
                .push(Call::Expired(control_id, timer_index));
        }
    }

    fn recorder(calls: &Rc<RefCell<Vec<Call>>>, handle_it: bool) -> Box<Recorder> {
        Box::new(Recorder {
            calls: Rc::clone(calls),
            handle_it,
        })
    }

    #[test]
    fn test_bit_region_overlap() {
        let a = BitRegion::new(0, 0, 16);
        let b = BitRegion::new(1, 0, 16);
        let overlap = a.overlap(&b);
        assert_eq!(overlap.bit_offset, 8);
        assert_eq!(overlap.size_in_bits, 8);

        let disjoint = BitRegion::new(4, 0, 8);
        assert!(a.overlap(&disjoint).is_empty());
    }

    #[test]
    fn test_monitor_fires_only_on_real_change_in_region() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        registry.add(7, BitRegion::new(1, 0, 8), 0, 42, recorder(&calls, false));

        let old = [0u8, 0x10, 0xFF];
        // Write touched byte 1 but its bits did not change.
        let unchanged = [9u8, 0x10, 0xFF];
        assert!(!registry.process(&old, &unchanged, BitRegion::new(0, 0, 24)));

        // Bits changed but outside the written region.
        let changed = [0u8, 0x22, 0xFF];
        assert!(!registry.process(&old, &changed, BitRegion::new(2, 0, 8)));

        // Changed inside the written region.
        assert!(registry.process(&old, &changed, BitRegion::new(0, 0, 24)));
        registry.fire(1.0, None);
        assert_eq!(&*calls.borrow(), &[Call::Changed(7, 42)]);
    }

    #[test]
    fn test_fire_order_follows_groups_then_registration() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let region = BitRegion::new(0, 0, 8);
        registry.add(1, region, 5, 1, recorder(&calls, false));
        registry.add(2, region, 0, 2, recorder(&calls, false));
        registry.add(3, region, 5, 3, recorder(&calls, false));

        registry.process(&[0u8], &[1u8], region);
        registry.fire(0.0, None);
        assert_eq!(
            &*calls.borrow(),
            &[Call::Changed(2, 2), Call::Changed(1, 1), Call::Changed(3, 3)]
        );
    }

    #[test]
    fn test_handled_suppresses_own_group_only() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let region = BitRegion::new(0, 0, 8);
        registry.add(1, region, 0, 1, recorder(&calls, true));
        registry.add(2, region, 0, 2, recorder(&calls, false));
        registry.add(3, region, 1, 3, recorder(&calls, false));

        registry.process(&[0u8], &[1u8], region);
        registry.fire(0.0, None);
        // Control 2 (same group as the handler) is suppressed; control 3
        // (different group) still fires.
        assert_eq!(
            &*calls.borrow(),
            &[Call::Changed(1, 1), Call::Changed(3, 3)]
        );
    }

    #[test]
    fn test_remove_monitor() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let region = BitRegion::new(0, 0, 8);
        let handle = registry.add(1, region, 0, 1, recorder(&calls, false));
        assert!(registry.remove(handle));
        assert!(!registry.remove(handle));

        registry.process(&[0u8], &[1u8], region);
        registry.fire(0.0, None);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_timeout_fires_once_after_deadline() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let handle = registry.add(1, BitRegion::new(0, 0, 8), 0, 1, recorder(&calls, false));
        assert!(registry.add_timeout(handle, 5.0, 3));

        registry.process_timeouts(4.0);
        assert!(calls.borrow().is_empty());

        registry.process_timeouts(5.0);
        assert_eq!(&*calls.borrow(), &[Call::Expired(1, 3)]);

        registry.process_timeouts(6.0);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_real_change_supersedes_pending_timer() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let region = BitRegion::new(0, 0, 8);
        let handle = registry.add(1, region, 0, 1, recorder(&calls, false));
        registry.add_timeout(handle, 5.0, 0);

        registry.process(&[0u8], &[1u8], region);
        registry.fire(1.0, None);
        registry.process_timeouts(10.0);
        assert_eq!(&*calls.borrow(), &[Call::Changed(1, 1)]);
    }

    #[test]
    fn test_new_timer_replaces_pending_timer_with_same_index() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let handle = registry.add(1, BitRegion::new(0, 0, 8), 0, 1, recorder(&calls, false));
        registry.add_timeout(handle, 5.0, 0);
        registry.add_timeout(handle, 50.0, 0);

        registry.process_timeouts(10.0);
        assert!(calls.borrow().is_empty());
        registry.process_timeouts(50.0);
        assert_eq!(&*calls.borrow(), &[Call::Expired(1, 0)]);
    }

    #[test]
    fn test_remove_timeout_disarms() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MonitorRegistry::new();
        let handle = registry.add(1, BitRegion::new(0, 0, 8), 0, 1, recorder(&calls, false));
        registry.add_timeout(handle, 5.0, 0);
        registry.remove_timeout(handle, 0);
        registry.process_timeouts(10.0);
        assert!(calls.borrow().is_empty());
    }
}
