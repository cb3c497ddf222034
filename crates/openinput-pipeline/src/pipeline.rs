//! The pipeline object and its update tick.

use tracing::{debug, warn};

use openinput_events::{EventBuffer, EventRecord, compactor::compact_pointer_moves};
use openinput_state_block::FourCC;
use openinput_state_store::{
    BitRegion, ContextMask, ControlLayout, DeviceCatalog, DeviceSpec, EventInfo, MonitorHandle,
    MonitorRegistry, StateChangeMonitor, StateStore, UpdateContext,
};

use crate::error::PipelineError;

struct DeviceRecord {
    spec: DeviceSpec,
    layout: Vec<ControlLayout>,
}

/// Counts of what one [`update`](InputPipeline::update) tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateSummary {
    /// State records applied and committed.
    pub applied: usize,
    /// State records rejected (unknown device, format mismatch, bad bounds).
    pub rejected: usize,
    /// Records skipped as opaque (unknown type tags).
    pub skipped: usize,
}

/// The device-state pipeline: a store, per-device monitor registries and the
/// roster of registered devices.
///
/// All mutation goes through `&mut self`, so a tick, a registration and a
/// migration can never interleave; readers of the store borrow it via
/// [`store`](Self::store) between ticks.
pub struct InputPipeline {
    store: StateStore,
    contexts: ContextMask,
    devices: Vec<DeviceRecord>,
    registries: Vec<MonitorRegistry>,
}

impl InputPipeline {
    /// A pipeline with no devices, carrying buffers for `contexts`.
    pub fn new(contexts: ContextMask) -> Self {
        Self {
            store: StateStore::empty(contexts),
            contexts,
            devices: Vec::new(),
            registries: Vec::new(),
        }
    }

    /// The backing state store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Roster index of a device id.
    pub fn device_index(&self, device_id: u32) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.spec.device_id == device_id)
    }

    /// The control layout a device registered with.
    pub fn layout(&self, device_id: u32) -> Option<&[ControlLayout]> {
        let index = self.device_index(device_id)?;
        Some(&self.devices[index].layout)
    }

    /// Register a device of `kind`, rebuilding the state buffers and
    /// migrating all existing state into them. Returns the device's roster
    /// index.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DuplicateDevice`] for an id already in the roster,
    /// [`PipelineError::UnknownKind`] when the catalog cannot size the kind,
    /// [`StoreError::ZeroSizedState`](openinput_state_store::StoreError) for
    /// an empty state block — in every case the roster and store are left
    /// unchanged.
    pub fn register_device(
        &mut self,
        device_id: u32,
        kind: FourCC,
        catalog: &dyn DeviceCatalog,
    ) -> Result<usize, PipelineError> {
        if self.device_index(device_id).is_some() {
            return Err(PipelineError::DuplicateDevice { device_id });
        }
        let state_size_in_bytes = catalog
            .state_size_in_bytes(kind)
            .ok_or(PipelineError::UnknownKind { kind })?;
        let spec = DeviceSpec {
            device_id,
            state_format: kind,
            state_size_in_bytes,
        };

        let mut specs: Vec<DeviceSpec> = self.devices.iter().map(|d| d.spec).collect();
        specs.push(spec);
        self.rebuild_store(&specs)?;

        let layout = catalog.control_layout(kind);
        let index = self.devices.len();
        self.store.write_noise_mask(index, &layout)?;
        self.devices.push(DeviceRecord { spec, layout });
        self.registries.push(MonitorRegistry::new());
        debug!(device_id, %kind, "registered device");
        Ok(index)
    }

    /// Remove a device, rebuilding the state buffers without it. Its
    /// monitors and pending timers are dropped.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownDevice`] when the id is not in the roster.
    pub fn remove_device(&mut self, device_id: u32) -> Result<(), PipelineError> {
        let index = self
            .device_index(device_id)
            .ok_or(PipelineError::UnknownDevice { device_id })?;

        let specs: Vec<DeviceSpec> = self
            .devices
            .iter()
            .filter(|d| d.spec.device_id != device_id)
            .map(|d| d.spec)
            .collect();
        self.rebuild_store(&specs)?;

        self.devices.remove(index);
        self.registries.remove(index);
        debug!(device_id, "removed device");
        Ok(())
    }

    // Allocate a store for the new roster, migrate the old contents across
    // and hand off. The old store stays untouched until the migration has
    // fully completed, so a failure leaves everything as it was.
    fn rebuild_store(&mut self, specs: &[DeviceSpec]) -> Result<(), PipelineError> {
        let (mut new_store, _offsets) = StateStore::allocate(specs, self.contexts)?;
        new_store.migrate_from(&self.store);
        self.store = new_store;
        Ok(())
    }

    /// Register a state-change monitor on one control of a device. Lower
    /// `group` values fire first; `monitor_index` is handed back verbatim on
    /// every notification.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownDevice`] / [`PipelineError::UnknownControl`].
    pub fn add_monitor(
        &mut self,
        device_id: u32,
        control_id: u32,
        group: u32,
        monitor_index: u64,
        monitor: Box<dyn StateChangeMonitor>,
    ) -> Result<MonitorHandle, PipelineError> {
        let index = self
            .device_index(device_id)
            .ok_or(PipelineError::UnknownDevice { device_id })?;
        let control = self.devices[index]
            .layout
            .iter()
            .find(|c| c.control_id == control_id)
            .ok_or(PipelineError::UnknownControl {
                device_id,
                control_id,
            })?;
        let region = BitRegion::from_block(&control.block);
        Ok(self.registries[index].add(control_id, region, group, monitor_index, monitor))
    }

    /// Access a device's monitor registry (for removal and timers).
    pub fn monitors_mut(&mut self, device_id: u32) -> Option<&mut MonitorRegistry> {
        let index = self.device_index(device_id)?;
        self.registries.get_mut(index)
    }

    /// Run one update tick over `events`.
    ///
    /// Compacts the buffer, then walks the records in append order. For each
    /// state record: look up the device (unknown ids are skipped), check the
    /// payload's state format against the device's declared format (a
    /// mismatch rejects the record and leaves state untouched), carry the
    /// current state forward into the back buffer, splice the payload in,
    /// signal and fire the change monitors over the written region, and
    /// commit by swapping the device's buffers. Unknown type tags are
    /// skipped by size. Monitor timeouts are processed at the end with
    /// `now`, and the buffer is reset for the next tick.
    ///
    /// # Errors
    ///
    /// [`StoreError::ContextDisabled`](openinput_state_store::StoreError)
    /// when the store has no buffers for `context`. Per-record failures do
    /// not abort the tick; they count as rejected in the summary.
    pub fn update(
        &mut self,
        context: UpdateContext,
        events: &mut EventBuffer,
        now: f64,
    ) -> Result<UpdateSummary, PipelineError> {
        if !self.store.contexts().enables(context) {
            return Err(PipelineError::Store(
                openinput_state_store::StoreError::ContextDisabled { context },
            ));
        }

        let process_until = match context {
            UpdateContext::Fixed => Some(now),
            UpdateContext::Dynamic => None,
        };
        compact_pointer_moves(events, process_until);

        let mut summary = UpdateSummary::default();
        for record in events.iter() {
            match self.apply_record(context, &record) {
                Applied::Yes => summary.applied += 1,
                Applied::Rejected => summary.rejected += 1,
                Applied::Opaque => summary.skipped += 1,
            }
        }

        for registry in &mut self.registries {
            registry.process_timeouts(now);
        }
        events.reset();
        Ok(summary)
    }

    fn apply_record(&mut self, context: UpdateContext, record: &EventRecord<'_>) -> Applied {
        let (state_format, state_offset, state) =
            if let Some(view) = record.as_state_event() {
                (view.state_format, 0usize, view.state)
            } else if let Some(view) = record.as_delta_state_event() {
                (view.state_format, view.state_offset as usize, view.state)
            } else {
                return Applied::Opaque;
            };

        let device_id = record.device_id();
        let Some(index) = self.device_index(device_id) else {
            debug!(device_id, "state event for unregistered device");
            return Applied::Rejected;
        };

        if state_format != self.devices[index].spec.state_format {
            warn!(
                device_id,
                expected = %self.devices[index].spec.state_format,
                received = %state_format,
                "state format mismatch, event dropped"
            );
            return Applied::Rejected;
        }

        // Stage the write: carry the current state forward, splice the
        // payload in at its offset.
        if self.store.copy_front_to_back(context, index).is_err() {
            return Applied::Rejected;
        }
        if let Err(error) = self
            .store
            .write_back(context, index, state_offset, state)
        {
            warn!(device_id, %error, "state write rejected");
            return Applied::Rejected;
        }

        // Monitors compare the committed front against the staged back over
        // the written region, then fire synchronously.
        let registry = &mut self.registries[index];
        if !registry.is_empty() {
            let written = BitRegion::new(state_offset as u32, 0, (state.len() * 8) as u32);
            let (Ok(front), Ok(back)) = (
                self.store.front(context, index),
                self.store.back(context, index),
            ) else {
                return Applied::Rejected;
            };
            if registry.process(front, back, written) {
                let info = EventInfo {
                    type_tag: record.type_tag(),
                    device_id,
                    timestamp: record.timestamp(),
                    buffer_offset: record.offset(),
                };
                registry.fire(record.timestamp(), Some(&info));
            }
        }

        // Commit: the staged back becomes the new front.
        if self.store.swap(context, index).is_err() {
            return Applied::Rejected;
        }
        Applied::Yes
    }
}

enum Applied {
    Yes,
    Rejected,
    Opaque,
}
