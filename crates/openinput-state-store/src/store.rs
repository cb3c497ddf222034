//! The double-buffered state arena.

use std::ops::Range;

use tracing::{debug, trace};

use openinput_state_block::bits;

use crate::catalog::{ControlLayout, DeviceSpec};
use crate::error::StoreError;

/// Which update slice a buffer set belongs to.
///
/// Each context owns an independent front/back pair per device, so a
/// fixed-step and a variable-step consumer can each see their own notion of
/// "previous state". The context is an explicit parameter on every accessor;
/// there is no ambient "current buffer set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateContext {
    /// The variable-step (per-frame) update.
    Dynamic,
    /// The fixed-step update.
    Fixed,
}

/// Which update contexts get their own double buffers in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMask {
    /// Allocate buffers for [`UpdateContext::Dynamic`].
    pub dynamic: bool,
    /// Allocate buffers for [`UpdateContext::Fixed`].
    pub fixed: bool,
}

impl ContextMask {
    /// Variable-step buffers only.
    pub const DYNAMIC: Self = Self {
        dynamic: true,
        fixed: false,
    };

    /// Fixed-step buffers only.
    pub const FIXED: Self = Self {
        dynamic: false,
        fixed: true,
    };

    /// Buffers for both contexts.
    pub const ALL: Self = Self {
        dynamic: true,
        fixed: true,
    };

    /// Whether the mask enables `context`.
    pub fn enables(&self, context: UpdateContext) -> bool {
        match context {
            UpdateContext::Dynamic => self.dynamic,
            UpdateContext::Fixed => self.fixed,
        }
    }

    fn pair_count(&self) -> usize {
        usize::from(self.dynamic) + usize::from(self.fixed)
    }
}

/// Lifecycle of a device's slot in the store.
///
/// A device enters at `Registered` (offset assigned, state zeroed), becomes
/// `Active` once state has been committed into it, and cycles through
/// `Migrating` back to `Active` when the roster changes. It never skips
/// `Registered`: absence from the roster is the unregistered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePhase {
    /// Offset assigned, buffers zeroed, nothing committed yet.
    Registered,
    /// State has been committed and is swappable.
    Active,
    /// Contents are being copied to a new store.
    Migrating,
}

#[derive(Debug, Clone)]
struct DeviceSlot {
    spec: DeviceSpec,
    byte_offset: u32,
    aligned_size: u32,
    phase: DevicePhase,
}

/// The raw memory blocks indexed by state block descriptors.
///
/// One contiguous allocation holds, per enabled context, a front+back buffer
/// pair, followed by a default-state buffer and a noise-mask buffer. Front
/// and back are swapped per device by exchanging indices in the per-device
/// mapping, never by copying.
///
/// Reads are safe from multiple threads as long as no swap or migration is
/// in flight; swaps and migrations take `&mut self` and therefore serialize
/// against all readers through the borrow checker.
#[derive(Debug)]
pub struct StateStore {
    data: Vec<u8>,
    size_per_buffer: usize,
    contexts: ContextMask,
    slots: Vec<DeviceSlot>,
    // Per context, per device: false = buffer 0 is front, true = buffer 1.
    flips: [Vec<bool>; 2],
}

const fn context_index(context: UpdateContext) -> usize {
    match context {
        UpdateContext::Dynamic => 0,
        UpdateContext::Fixed => 1,
    }
}

impl StateStore {
    /// An empty store with no devices and no backing memory.
    pub fn empty(contexts: ContextMask) -> Self {
        Self {
            data: Vec::new(),
            size_per_buffer: 0,
            contexts,
            slots: Vec::new(),
            flips: [Vec::new(), Vec::new()],
        }
    }

    /// Allocate buffers for a device roster, assigning each device a linear
    /// 4-byte-aligned offset. Returns the store and the per-device offsets.
    /// All buffers start zero-initialized and every device starts
    /// [`DevicePhase::Registered`].
    ///
    /// # Errors
    ///
    /// [`StoreError::ZeroSizedState`] when a device declares an empty state
    /// block; no store is built in that case.
    pub fn allocate(
        devices: &[DeviceSpec],
        contexts: ContextMask,
    ) -> Result<(Self, Vec<u32>), StoreError> {
        let mut offsets = Vec::with_capacity(devices.len());
        let mut slots = Vec::with_capacity(devices.len());
        let mut current_offset = 0u32;
        for spec in devices {
            if spec.state_size_in_bytes == 0 {
                return Err(StoreError::ZeroSizedState {
                    device_id: spec.device_id,
                });
            }
            let aligned = spec.state_size_in_bytes.div_ceil(4) * 4;
            offsets.push(current_offset);
            slots.push(DeviceSlot {
                spec: *spec,
                byte_offset: current_offset,
                aligned_size: aligned,
                phase: DevicePhase::Registered,
            });
            current_offset += aligned;
        }

        let size_per_buffer = current_offset as usize;
        // A front+back pair per enabled context, one default-state buffer,
        // one noise-mask buffer.
        let buffer_count = contexts.pair_count() * 2 + 2;
        let total_size = size_per_buffer * buffer_count;

        debug!(
            devices = devices.len(),
            size_per_buffer, total_size, "allocated state buffers"
        );

        let flip_count = devices.len();
        Ok((
            Self {
                data: vec![0; total_size],
                size_per_buffer,
                contexts,
                slots,
                flips: [vec![false; flip_count], vec![false; flip_count]],
            },
            offsets,
        ))
    }

    /// Contexts this store carries buffers for.
    pub fn contexts(&self) -> ContextMask {
        self.contexts
    }

    /// Size of one buffer, i.e. the summed aligned device sizes.
    pub fn size_per_buffer(&self) -> usize {
        self.size_per_buffer
    }

    /// Number of devices in the roster.
    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    /// Roster index of a device id.
    pub fn device_index(&self, device_id: u32) -> Option<usize> {
        self.slots.iter().position(|s| s.spec.device_id == device_id)
    }

    /// The spec a device was registered with.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn spec(&self, device_index: usize) -> Result<&DeviceSpec, StoreError> {
        Ok(&self.slot(device_index)?.spec)
    }

    /// Lifecycle phase of a device's slot.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn phase(&self, device_index: usize) -> Result<DevicePhase, StoreError> {
        Ok(self.slot(device_index)?.phase)
    }

    /// Aligned size in bytes of a device's block.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn device_size(&self, device_index: usize) -> Result<usize, StoreError> {
        Ok(self.slot(device_index)?.aligned_size as usize)
    }

    fn slot(&self, device_index: usize) -> Result<&DeviceSlot, StoreError> {
        self.slots.get(device_index).ok_or(StoreError::UnknownDevice {
            index: device_index,
            count: self.slots.len(),
        })
    }

    // Base offset of a context's buffer pair within the arena. Pairs are
    // laid out dynamic first, then fixed, then default and noise.
    fn context_base(&self, context: UpdateContext) -> Result<usize, StoreError> {
        if !self.contexts.enables(context) {
            return Err(StoreError::ContextDisabled { context });
        }
        match context {
            UpdateContext::Dynamic => Ok(0),
            UpdateContext::Fixed => {
                if self.contexts.dynamic {
                    Ok(self.size_per_buffer * 2)
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn default_base(&self) -> usize {
        self.size_per_buffer * 2 * self.contexts.pair_count()
    }

    fn noise_base(&self) -> usize {
        self.default_base() + self.size_per_buffer
    }

    fn device_range(&self, base: usize, which: usize, device_index: usize) -> Range<usize> {
        let slot = &self.slots[device_index];
        let start = base + which * self.size_per_buffer + slot.byte_offset as usize;
        start..start + slot.aligned_size as usize
    }

    fn front_which(&self, context: UpdateContext, device_index: usize) -> usize {
        usize::from(self.flips[context_index(context)][device_index])
    }

    fn buffer_range(
        &self,
        context: UpdateContext,
        device_index: usize,
        front: bool,
    ) -> Result<Range<usize>, StoreError> {
        self.slot(device_index)?;
        let base = self.context_base(context)?;
        let which = self.front_which(context, device_index);
        let which = if front { which } else { 1 - which };
        Ok(self.device_range(base, which, device_index))
    }

    /// Current-tick snapshot of a device's state.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn front(
        &self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<&[u8], StoreError> {
        let range = self.buffer_range(context, device_index, true)?;
        Ok(&self.data[range])
    }

    /// Previous snapshot of a device's state.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn back(
        &self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<&[u8], StoreError> {
        let range = self.buffer_range(context, device_index, false)?;
        Ok(&self.data[range])
    }

    /// Mutable access to the back buffer, for staging the next commit.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn back_mut(
        &mut self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<&mut [u8], StoreError> {
        let range = self.buffer_range(context, device_index, false)?;
        Ok(&mut self.data[range])
    }

    /// Exchange a device's front and back buffers — an index swap, never a
    /// copy — and mark the device [`DevicePhase::Active`].
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn swap(
        &mut self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<(), StoreError> {
        self.slot(device_index)?;
        self.context_base(context)?;
        let flip = &mut self.flips[context_index(context)][device_index];
        *flip = !*flip;
        self.slots[device_index].phase = DevicePhase::Active;
        Ok(())
    }

    /// Copy the front buffer over the back buffer, carrying the current
    /// state forward so a partial write on top of it stays coherent.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn copy_front_to_back(
        &mut self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<(), StoreError> {
        let src = self.buffer_range(context, device_index, true)?;
        let dst = self.buffer_range(context, device_index, false)?;
        self.data.copy_within(src, dst.start);
        Ok(())
    }

    /// Write `bytes` into the back buffer at a device-relative offset.
    ///
    /// # Errors
    ///
    /// [`StoreError::WriteOutOfBounds`] when the write does not fit the
    /// device block, plus the usual addressing errors.
    pub fn write_back(
        &mut self,
        context: UpdateContext,
        device_index: usize,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let range = self.buffer_range(context, device_index, false)?;
        let block_size = range.len();
        let end = offset.checked_add(bytes.len()).filter(|&e| e <= block_size);
        let Some(end) = end else {
            return Err(StoreError::WriteOutOfBounds {
                offset,
                len: bytes.len(),
                block_size,
            });
        };
        self.data[range.start + offset..range.start + end].copy_from_slice(bytes);
        Ok(())
    }

    /// The default-state snapshot of a device.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn default_state(&self, device_index: usize) -> Result<&[u8], StoreError> {
        self.slot(device_index)?;
        let range = self.device_range(self.default_base(), 0, device_index);
        Ok(&self.data[range])
    }

    /// Mutable default-state snapshot, filled at registration from the
    /// device's layout.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn default_state_mut(&mut self, device_index: usize) -> Result<&mut [u8], StoreError> {
        self.slot(device_index)?;
        let range = self.device_range(self.default_base(), 0, device_index);
        Ok(&mut self.data[range])
    }

    /// The noise bitmask of a device: set bits mark noisy controls.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn noise_mask(&self, device_index: usize) -> Result<&[u8], StoreError> {
        self.slot(device_index)?;
        let range = self.device_range(self.noise_base(), 0, device_index);
        Ok(&self.data[range])
    }

    /// Populate the noise bitmask from a control layout.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn write_noise_mask(
        &mut self,
        device_index: usize,
        layout: &[ControlLayout],
    ) -> Result<(), StoreError> {
        self.slot(device_index)?;
        let range = self.device_range(self.noise_base(), 0, device_index);
        let mask = &mut self.data[range];
        for control in layout.iter().filter(|c| c.noisy) {
            let first = control.block.byte_offset as usize * 8 + control.block.bit_offset as usize;
            for bit in first..first + control.block.size_in_bits as usize {
                // Controls past the block end are a layout bug; the mask
                // write just stops at the boundary.
                if bits::write_bit(mask, bit, true).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Whether two state snapshots agree on every non-noisy bit of a device.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] for an out-of-range index.
    pub fn equals_ignoring_noise(
        &self,
        device_index: usize,
        a: &[u8],
        b: &[u8],
    ) -> Result<bool, StoreError> {
        let mask = self.noise_mask(device_index)?;
        let len = mask.len().min(a.len()).min(b.len());
        Ok((0..len).all(|i| (a[i] ^ b[i]) & !mask[i] == 0))
    }

    /// Copy the default state over a device's front buffer.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownDevice`] / [`StoreError::ContextDisabled`].
    pub fn reset_to_default(
        &mut self,
        context: UpdateContext,
        device_index: usize,
    ) -> Result<(), StoreError> {
        self.slot(device_index)?;
        let src = self.device_range(self.default_base(), 0, device_index);
        let dst = self.buffer_range(context, device_index, true)?;
        self.data.copy_within(src, dst.start);
        Ok(())
    }

    /// Migrate state from an old store into this freshly allocated one.
    ///
    /// For every device present in both rosters (matched by id), the old
    /// front, back, default and noise contents are copied to the device's
    /// new position — `min(old, new)` bytes, so a grown block keeps its new
    /// controls zeroed and a shrunk block truncates. Devices absent from the
    /// new roster are simply not copied. The old store is only read: it
    /// stays fully valid until the caller commits the handoff by replacing
    /// it with this store, which is what makes the migration atomic from a
    /// reader's point of view.
    pub fn migrate_from(&mut self, old: &StateStore) {
        let mut migrated = 0usize;
        for new_index in 0..self.slots.len() {
            let device_id = self.slots[new_index].spec.device_id;
            let Some(old_index) = old.device_index(device_id) else {
                continue;
            };

            let previous_phase = match old.slots[old_index].phase {
                DevicePhase::Migrating => DevicePhase::Active,
                phase => phase,
            };
            self.slots[new_index].phase = DevicePhase::Migrating;

            let len = (self.slots[new_index].aligned_size as usize)
                .min(old.slots[old_index].aligned_size as usize);

            for context in [UpdateContext::Dynamic, UpdateContext::Fixed] {
                if !self.contexts.enables(context) || !old.contexts.enables(context) {
                    continue;
                }
                for front in [true, false] {
                    // Both ranges were validated when the slots were built.
                    let Ok(src) = old.buffer_range(context, old_index, front) else {
                        continue;
                    };
                    let Ok(dst) = self.buffer_range(context, new_index, front) else {
                        continue;
                    };
                    self.data[dst.start..dst.start + len]
                        .copy_from_slice(&old.data[src.start..src.start + len]);
                }
            }

            let src = old.device_range(old.default_base(), 0, old_index);
            let dst = self.device_range(self.default_base(), 0, new_index);
            self.data[dst.start..dst.start + len]
                .copy_from_slice(&old.data[src.start..src.start + len]);

            let src = old.device_range(old.noise_base(), 0, old_index);
            let dst = self.device_range(self.noise_base(), 0, new_index);
            self.data[dst.start..dst.start + len]
                .copy_from_slice(&old.data[src.start..src.start + len]);

            // Preserve which side was front for the contexts carried over.
            for ctx in 0..2 {
                if let Some(flip) = old.flips[ctx].get(old_index).copied() {
                    if let Some(slot) = self.flips[ctx].get_mut(new_index) {
                        *slot = flip;
                    }
                }
            }

            self.slots[new_index].phase = previous_phase;
            migrated += 1;
            trace!(device_id, len, "migrated device state");
        }
        debug!(
            migrated,
            devices = self.slots.len(),
            "state migration complete"
        );
    }
}
