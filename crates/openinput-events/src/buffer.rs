//! The growable event arena.

use openinput_state_block::FourCC;

use crate::error::EventError;
use crate::event::{
    EVENT_HEADER_SIZE, EventRecord, MAX_EVENT_SIZE, align_event_size, read_u32, write_header,
};

/// Arena owning a contiguous byte region holding a sequence of framed,
/// self-describing event records.
///
/// Walking record starts sequentially from offset 0 by aligned `size_bytes`
/// lands exactly on either another valid record start or `used_size`. The
/// buffer is created empty, grows by reallocation-and-copy, is reset (not
/// freed) at the start of each update cycle and dropped with the pipeline.
///
/// Not safe for concurrent writers; safe for multiple concurrent readers
/// while no writer is active.
#[derive(Debug, Default)]
pub struct EventBuffer {
    data: Vec<u8>,
    used: usize,
    count: usize,
}

impl EventBuffer {
    /// Extra bytes added beyond the immediate need when the arena grows.
    pub const GROW_INCREMENT: usize = 2048;

    /// An empty buffer with no backing allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty buffer with `capacity` bytes preallocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            used: 0,
            count: 0,
        }
    }

    /// Bytes currently occupied by records (aligned sizes summed).
    pub fn used_size(&self) -> usize {
        self.used
    }

    /// Number of records in the buffer.
    pub fn event_count(&self) -> usize {
        self.count
    }

    /// Bytes the arena can hold before the next reallocation.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whether `offset` falls inside the used region. A bounds check only —
    /// no structural validation of what lives at that offset.
    pub fn contains_offset(&self, offset: usize) -> bool {
        offset < self.used
    }

    /// The used region as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.used]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.used]
    }

    /// Adopt new counters after an in-place compaction pass.
    pub(crate) fn shrink(&mut self, count: usize, used: usize) {
        debug_assert!(used <= self.used && count <= self.count);
        self.used = used;
        self.count = count;
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if needed <= self.data.len() {
            return;
        }
        let new_capacity = (self.data.len() + Self::GROW_INCREMENT).max(needed);
        self.data.resize(new_capacity, 0);
    }

    fn reserve_record(&mut self, total_size: usize) -> Result<usize, EventError> {
        if total_size < EVENT_HEADER_SIZE {
            return Err(EventError::RuntRecord {
                size: total_size,
                header: EVENT_HEADER_SIZE,
            });
        }
        if total_size > MAX_EVENT_SIZE {
            return Err(EventError::OversizedRecord {
                size: total_size,
                max: MAX_EVENT_SIZE,
            });
        }
        let aligned = align_event_size(total_size);
        self.ensure_capacity(self.used + aligned);
        let offset = self.used;
        // The arena may hold stale bytes from before the last reset.
        self.data[offset..offset + aligned].fill(0);
        self.used += aligned;
        self.count += 1;
        Ok(offset)
    }

    /// Append a record framed from its parts. Returns the record's arena
    /// offset.
    ///
    /// # Errors
    ///
    /// [`EventError::OversizedRecord`] when header plus payload exceed the
    /// single-record ceiling.
    pub fn append(
        &mut self,
        type_tag: FourCC,
        device_id: u32,
        timestamp: f64,
        payload: &[u8],
    ) -> Result<usize, EventError> {
        let total = EVENT_HEADER_SIZE + payload.len();
        let offset = self.reserve_record(total)?;
        write_header(
            &mut self.data[offset..],
            type_tag,
            total as u32,
            device_id,
            timestamp,
        );
        self.data[offset + EVENT_HEADER_SIZE..offset + total].copy_from_slice(payload);
        Ok(offset)
    }

    /// Append an already-framed record. The frame's declared `size_bytes`
    /// must equal the slice length.
    ///
    /// # Errors
    ///
    /// [`EventError::SizeMismatch`] when the frame lies about its size, plus
    /// the size errors of [`append`](Self::append).
    pub fn append_record(&mut self, record: &[u8]) -> Result<usize, EventError> {
        let declared = read_u32(record, 4).unwrap_or(0);
        if declared as usize != record.len() {
            return Err(EventError::SizeMismatch {
                declared,
                actual: record.len(),
            });
        }
        let offset = self.reserve_record(record.len())?;
        self.data[offset..offset + record.len()].copy_from_slice(record);
        Ok(offset)
    }

    /// Reserve a framed record of `size_bytes` total bytes and return its
    /// zeroed payload slice for the caller to fill in place.
    ///
    /// # Errors
    ///
    /// Size errors as for [`append`](Self::append).
    pub fn allocate(
        &mut self,
        type_tag: FourCC,
        size_bytes: u32,
        device_id: u32,
        timestamp: f64,
    ) -> Result<&mut [u8], EventError> {
        let total = size_bytes as usize;
        let offset = self.reserve_record(total)?;
        write_header(
            &mut self.data[offset..],
            type_tag,
            size_bytes,
            device_id,
            timestamp,
        );
        Ok(&mut self.data[offset + EVENT_HEADER_SIZE..offset + total])
    }

    /// Forget all records, keeping the allocation for reuse.
    pub fn reset(&mut self) {
        self.used = 0;
        self.count = 0;
    }

    /// Lazily walk the records from offset 0. The sequence is finite and
    /// restartable by calling `iter` again; it terminates early at the first
    /// malformed record.
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            arena: self.as_bytes(),
            offset: 0,
        }
    }

    /// Like [`iter`](Self::iter) but stopping before the first record whose
    /// timestamp is at or past `cutoff`.
    pub fn iter_until(&self, cutoff: f64) -> impl Iterator<Item = EventRecord<'_>> {
        self.iter().take_while(move |r| r.timestamp() < cutoff)
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = EventRecord<'a>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the records of an [`EventBuffer`].
#[derive(Debug, Clone)]
pub struct EventIter<'a> {
    arena: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for EventIter<'a> {
    type Item = EventRecord<'a>;

    fn next(&mut self) -> Option<EventRecord<'a>> {
        if self.offset >= self.arena.len() {
            return None;
        }
        let record = EventRecord::parse(self.arena, self.offset)?;
        self.offset += record.aligned_size();
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::STATE_EVENT;

    #[test]
    fn test_append_and_iterate() {
        let mut buffer = EventBuffer::new();
        buffer
            .append(STATE_EVENT, 1, 1.0, &[1, 2, 3])
            .expect("append");
        buffer.append(STATE_EVENT, 2, 2.0, &[4]).expect("append");

        let records: Vec<_> = buffer.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].device_id(), 1);
        assert_eq!(records[0].payload(), &[1, 2, 3]);
        assert_eq!(records[1].device_id(), 2);
        assert_eq!(records[1].payload(), &[4]);
    }

    #[test]
    fn test_used_size_counts_aligned_extents() {
        let mut buffer = EventBuffer::new();
        buffer.append(STATE_EVENT, 1, 0.0, &[0; 3]).expect("append");
        // 20 + 3 = 23, aligned to 24.
        assert_eq!(buffer.used_size(), 24);
        let record = buffer.iter().next().expect("one record");
        assert_eq!(record.size_bytes(), 23);
    }

    #[test]
    fn test_growth_preserves_existing_records() {
        let mut buffer = EventBuffer::with_capacity(32);
        buffer
            .append(STATE_EVENT, 1, 0.5, &[7; 8])
            .expect("append");
        let before_capacity = buffer.capacity();
        buffer
            .append(STATE_EVENT, 2, 0.6, &[9; 64])
            .expect("append");
        assert!(buffer.capacity() > before_capacity);

        let records: Vec<_> = buffer.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload(), &[7; 8]);
        assert_eq!(records[1].payload(), &[9; 64]);
    }

    #[test]
    fn test_growth_policy() {
        let mut buffer = EventBuffer::new();
        buffer.append(STATE_EVENT, 1, 0.0, &[]).expect("append");
        // A small append from empty grows by the full increment.
        assert_eq!(buffer.capacity(), EventBuffer::GROW_INCREMENT);

        let mut big = EventBuffer::new();
        big.append(STATE_EVENT, 1, 0.0, &[0; 4000]).expect("append");
        assert_eq!(big.capacity(), align_event_size(EVENT_HEADER_SIZE + 4000));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut buffer = EventBuffer::new();
        let result = buffer.append(STATE_EVENT, 1, 0.0, &vec![0u8; MAX_EVENT_SIZE]);
        assert!(matches!(result, Err(EventError::OversizedRecord { .. })));
        assert_eq!(buffer.event_count(), 0);
        assert_eq!(buffer.used_size(), 0);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buffer = EventBuffer::new();
        buffer
            .append(STATE_EVENT, 1, 0.0, &[0; 100])
            .expect("append");
        let capacity = buffer.capacity();
        buffer.reset();
        assert_eq!(buffer.used_size(), 0);
        assert_eq!(buffer.event_count(), 0);
        assert_eq!(buffer.capacity(), capacity);
        assert!(buffer.iter().next().is_none());
    }

    #[test]
    fn test_allocate_returns_framed_payload() {
        let mut buffer = EventBuffer::new();
        let payload = buffer
            .allocate(STATE_EVENT, (EVENT_HEADER_SIZE + 6) as u32, 9, 3.0)
            .expect("allocate");
        assert_eq!(payload.len(), 6);
        payload.copy_from_slice(&[1, 2, 3, 4, 5, 6]);

        let record = buffer.iter().next().expect("one record");
        assert_eq!(record.device_id(), 9);
        assert_eq!(record.timestamp(), 3.0);
        assert_eq!(record.payload(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_append_record_validates_declared_size() {
        let mut buffer = EventBuffer::new();
        let mut frame = vec![0u8; 24];
        write_header(&mut frame, STATE_EVENT, 23, 1, 0.0);
        assert!(matches!(
            buffer.append_record(&frame),
            Err(EventError::SizeMismatch { .. })
        ));
        frame.truncate(23);
        buffer.append_record(&frame).expect("append");
        assert_eq!(buffer.event_count(), 1);
    }

    #[test]
    fn test_malformed_record_terminates_iteration() {
        let mut buffer = EventBuffer::new();
        buffer.append(STATE_EVENT, 1, 0.0, &[]).expect("append");
        buffer.append(STATE_EVENT, 2, 0.0, &[]).expect("append");
        // Corrupt the second record's size field.
        let second_size_field = 20 + 4;
        buffer.bytes_mut()[second_size_field..second_size_field + 4]
            .copy_from_slice(&0u32.to_le_bytes());

        let records: Vec<_> = buffer.iter().collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_contains_offset() {
        let mut buffer = EventBuffer::new();
        buffer.append(STATE_EVENT, 1, 0.0, &[]).expect("append");
        assert!(buffer.contains_offset(0));
        assert!(buffer.contains_offset(19));
        assert!(!buffer.contains_offset(20));
    }

    #[test]
    fn test_iter_until_cutoff() {
        let mut buffer = EventBuffer::new();
        buffer.append(STATE_EVENT, 1, 1.0, &[]).expect("append");
        buffer.append(STATE_EVENT, 1, 2.0, &[]).expect("append");
        buffer.append(STATE_EVENT, 1, 3.0, &[]).expect("append");
        assert_eq!(buffer.iter_until(2.0).count(), 1);
        assert_eq!(buffer.iter_until(10.0).count(), 3);
    }
}
