//! In-place coalescing of consecutive pointer move records.
//!
//! Merges runs of full-state pointer records that agree on every
//! non-positional field into a single record carrying the accumulated
//! motion, then physically removes the merged-away records with one
//! run-length move over the arena. The pass only ever shrinks the buffer
//! and never reorders surviving records.

use crate::buffer::EventBuffer;
use crate::event::{self, EVENT_HEADER_SIZE, EventRecord};
use crate::pointer::{POINTER_FORMAT, POINTER_STATE_SIZE, PointerState};

// Payload layout of a full-state event: state format tag, then state bytes.
const STATE_OFFSET_IN_RECORD: usize = EVENT_HEADER_SIZE + 4;
const TIMESTAMP_OFFSET_IN_RECORD: usize = 12;

struct RecordMeta {
    offset: usize,
    aligned: usize,
    mergeable: bool,
}

/// Merge redundant consecutive pointer move records in place.
///
/// Rules:
///
/// - The whole pass is a no-op if any record is a partial-state event of the
///   pointer family: partial-field deltas cannot be merged without full
///   device context.
/// - With a `process_until` timestamp, records at or past the cutoff are
///   left untouched (a fixed-step update only consumes a prefix of the
///   tick's events).
/// - The first mergeable record of the pass is preserved untouched and never
///   becomes a merge candidate, so the earliest observable transition of the
///   tick keeps its own record and timestamp. Edge-triggered consumers such
///   as button-press detection ride on that record.
/// - A mergeable record whose button mask, display index and click count
///   equal the current candidate's merges into the candidate: the candidate
///   accumulates delta and scroll, adopts the newer record's absolute
///   position and timestamp, and the newer record is removed.
/// - Any other record resets the candidate. Interleaved unrelated events may
///   have hidden data dependencies on the interim pointer position, so
///   compaction must not bridge across them.
///
/// This is a pure optimization: any malformed input aborts the pass and
/// leaves the buffer untouched.
pub fn compact_pointer_moves(buffer: &mut EventBuffer, process_until: Option<f64>) {
    if buffer.used_size() == 0 {
        return;
    }

    // Pass 1: frame the records, find the cutoff, early out on pointer
    // partial-state events.
    let mut metas: Vec<RecordMeta> = Vec::with_capacity(buffer.event_count());
    let mut tail_start = buffer.used_size();
    {
        let arena = buffer.as_bytes();
        let mut offset = 0;
        while offset < arena.len() {
            let Some(record) = EventRecord::parse(arena, offset) else {
                // Malformed framing; leave the buffer for the consumer to
                // deal with.
                return;
            };
            if let Some(cutoff) = process_until
                && record.timestamp() >= cutoff
            {
                tail_start = offset;
                break;
            }
            if let Some(delta) = record.as_delta_state_event()
                && delta.state_format == POINTER_FORMAT
            {
                return;
            }
            let mergeable = record.as_state_event().is_some_and(|view| {
                view.state_format == POINTER_FORMAT && view.state.len() >= POINTER_STATE_SIZE
            });
            metas.push(RecordMeta {
                offset,
                aligned: record.aligned_size(),
                mergeable,
            });
            offset += record.aligned_size();
        }
    }

    let total_count = buffer.event_count();
    let total_used = buffer.used_size();
    let arena = buffer.bytes_mut();

    // Pass 2: merge into the running candidate, marking absorbed records.
    let mut skip = vec![false; metas.len()];
    let mut candidate: Option<usize> = None;
    let mut skipped_first = false;
    let mut removed = 0usize;
    for i in 0..metas.len() {
        if !metas[i].mergeable {
            candidate = None;
            continue;
        }
        if !skipped_first {
            skipped_first = true;
            continue;
        }
        let current = decode_state(arena, metas[i].offset);
        if let (Some(c), Some(current)) = (candidate, current) {
            let cand_state = decode_state(arena, metas[c].offset);
            if let Some(cand_state) = cand_state
                && cand_state.same_non_positional_fields(&current)
            {
                let merged = PointerState {
                    position: current.position,
                    delta: [
                        cand_state.delta[0] + current.delta[0],
                        cand_state.delta[1] + current.delta[1],
                    ],
                    scroll: [
                        cand_state.scroll[0] + current.scroll[0],
                        cand_state.scroll[1] + current.scroll[1],
                    ],
                    ..cand_state
                };
                if write_state(arena, metas[c].offset, &merged).is_none() {
                    return;
                }
                let newer_timestamp = event::read_f64(
                    arena,
                    metas[i].offset + TIMESTAMP_OFFSET_IN_RECORD,
                )
                .unwrap_or(0.0);
                let _ = event::write_f64(
                    arena,
                    metas[c].offset + TIMESTAMP_OFFSET_IN_RECORD,
                    newer_timestamp,
                );
                skip[i] = true;
                removed += 1;
                continue;
            }
        }
        candidate = Some(i);
    }

    if removed == 0 {
        return;
    }

    // Pass 3: one forward run-length move squeezing out the absorbed
    // records, then the untouched tail past the cutoff.
    let mut write = 0usize;
    for (meta, &skipped) in metas.iter().zip(&skip) {
        if skipped {
            continue;
        }
        if meta.offset != write {
            arena.copy_within(meta.offset..meta.offset + meta.aligned, write);
        }
        write += meta.aligned;
    }
    let tail_len = total_used - tail_start;
    if tail_len > 0 && tail_start != write {
        arena.copy_within(tail_start..total_used, write);
    }
    buffer.shrink(total_count - removed, write + tail_len);
}

fn decode_state(arena: &[u8], record_offset: usize) -> Option<PointerState> {
    let start = record_offset + STATE_OFFSET_IN_RECORD;
    PointerState::decode(arena.get(start..start + POINTER_STATE_SIZE)?)
}

fn write_state(arena: &mut [u8], record_offset: usize, state: &PointerState) -> Option<()> {
    let start = record_offset + STATE_OFFSET_IN_RECORD;
    state.write_to(arena.get_mut(start..start + POINTER_STATE_SIZE)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DELTA_STATE_EVENT, STATE_EVENT};
    use openinput_state_block::FourCC;

    fn push_move(
        buffer: &mut EventBuffer,
        timestamp: f64,
        delta: [f32; 2],
        buttons: u16,
    ) -> usize {
        push_pointer(
            buffer,
            timestamp,
            PointerState {
                position: [delta[0] * 10.0, delta[1] * 10.0],
                delta,
                buttons,
                ..Default::default()
            },
        )
    }

    fn push_pointer(buffer: &mut EventBuffer, timestamp: f64, state: PointerState) -> usize {
        let mut payload = POINTER_FORMAT.as_u32().to_le_bytes().to_vec();
        payload.extend_from_slice(&state.encode());
        buffer
            .append(STATE_EVENT, 1, timestamp, &payload)
            .expect("append")
    }

    fn push_other(buffer: &mut EventBuffer, timestamp: f64) -> usize {
        let payload = FourCC::new(*b"KEYS").as_u32().to_le_bytes().to_vec();
        buffer
            .append(STATE_EVENT, 2, timestamp, &payload)
            .expect("append")
    }

    fn pointer_states(buffer: &EventBuffer) -> Vec<(f64, PointerState)> {
        buffer
            .iter()
            .filter_map(|r| {
                let view = r.as_state_event()?;
                if view.state_format != POINTER_FORMAT {
                    return None;
                }
                Some((r.timestamp(), PointerState::decode(view.state)?))
            })
            .collect()
    }

    #[test]
    fn test_first_move_is_never_merged() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [5.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [10.0, 0.0], 0);
        push_move(&mut buffer, 3.0, [20.0, 0.0], 0);

        compact_pointer_moves(&mut buffer, None);

        let states = pointer_states(&buffer);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].1.delta, [5.0, 0.0]);
        assert_eq!(states[0].0, 1.0);
        assert_eq!(states[1].1.delta, [30.0, 0.0]);
        assert_eq!(states[1].0, 3.0);
    }

    #[test]
    fn test_consecutive_moves_merge_with_summed_deltas() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 2.0], 0);
        push_move(&mut buffer, 2.0, [3.0, 4.0], 0);
        push_move(&mut buffer, 3.0, [5.0, 6.0], 0);
        push_move(&mut buffer, 4.0, [7.0, 8.0], 0);

        compact_pointer_moves(&mut buffer, None);

        let states = pointer_states(&buffer);
        assert_eq!(buffer.event_count(), 2);
        // The merged survivor carries the sum of records 2..4, the latest
        // absolute position and the latest timestamp.
        assert_eq!(states[1].1.delta, [15.0, 18.0]);
        assert_eq!(states[1].1.position, [70.0, 80.0]);
        assert_eq!(states[1].0, 4.0);

        // Total motion over the tick is preserved.
        let total: f32 = states.iter().map(|(_, s)| s.delta[0]).sum();
        assert_eq!(total, 16.0);
    }

    #[test]
    fn test_button_change_starts_new_group() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [2.0, 0.0], 0);
        push_move(&mut buffer, 3.0, [3.0, 0.0], 0);
        push_move(&mut buffer, 4.0, [4.0, 0.0], 1);

        compact_pointer_moves(&mut buffer, None);

        let states = pointer_states(&buffer);
        assert_eq!(states.len(), 3);
        assert_eq!(states[1].1.delta, [5.0, 0.0]);
        assert_eq!(states[2].1.delta, [4.0, 0.0]);
        assert_eq!(states[2].1.buttons, 1);
    }

    #[test]
    fn test_foreign_record_resets_candidate() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [2.0, 0.0], 0);
        push_other(&mut buffer, 3.0);
        push_move(&mut buffer, 4.0, [4.0, 0.0], 0);
        push_move(&mut buffer, 5.0, [8.0, 0.0], 0);

        compact_pointer_moves(&mut buffer, None);

        // Nothing merges across the foreign record; only the run after it
        // collapses.
        assert_eq!(buffer.event_count(), 4);
        let states = pointer_states(&buffer);
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].1.delta, [1.0, 0.0]);
        assert_eq!(states[1].1.delta, [2.0, 0.0]);
        assert_eq!(states[2].1.delta, [12.0, 0.0]);
    }

    #[test]
    fn test_pointer_delta_event_aborts_pass() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [2.0, 0.0], 0);
        push_move(&mut buffer, 3.0, [3.0, 0.0], 0);
        let mut payload = POINTER_FORMAT.as_u32().to_le_bytes().to_vec();
        payload.extend_from_slice(&8u32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 8]);
        buffer
            .append(DELTA_STATE_EVENT, 1, 4.0, &payload)
            .expect("append");

        let used = buffer.used_size();
        compact_pointer_moves(&mut buffer, None);

        assert_eq!(buffer.event_count(), 4);
        assert_eq!(buffer.used_size(), used);
    }

    #[test]
    fn test_compaction_is_idempotent_and_never_grows() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [2.0, 0.0], 0);
        push_other(&mut buffer, 3.0);
        push_move(&mut buffer, 4.0, [3.0, 0.0], 1);
        push_move(&mut buffer, 5.0, [4.0, 0.0], 1);
        let before = buffer.used_size();

        compact_pointer_moves(&mut buffer, None);
        let once_used = buffer.used_size();
        let once_count = buffer.event_count();
        let once_bytes = buffer.as_bytes().to_vec();
        assert!(once_used <= before);

        compact_pointer_moves(&mut buffer, None);
        assert_eq!(buffer.used_size(), once_used);
        assert_eq!(buffer.event_count(), once_count);
        assert_eq!(buffer.as_bytes(), &once_bytes[..]);
    }

    #[test]
    fn test_survivor_order_is_preserved() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_other(&mut buffer, 2.0);
        push_move(&mut buffer, 3.0, [2.0, 0.0], 0);
        push_move(&mut buffer, 4.0, [3.0, 0.0], 0);
        push_other(&mut buffer, 5.0);

        compact_pointer_moves(&mut buffer, None);

        let timestamps: Vec<f64> = buffer.iter().map(|r| r.timestamp()).collect();
        assert_eq!(timestamps, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_cutoff_leaves_tail_untouched() {
        let mut buffer = EventBuffer::new();
        push_move(&mut buffer, 1.0, [1.0, 0.0], 0);
        push_move(&mut buffer, 2.0, [2.0, 0.0], 0);
        push_move(&mut buffer, 3.0, [4.0, 0.0], 0);
        push_move(&mut buffer, 10.0, [8.0, 0.0], 0);
        push_move(&mut buffer, 11.0, [16.0, 0.0], 0);

        compact_pointer_moves(&mut buffer, Some(10.0));

        // Only the first three are processed; the two past the cutoff stay
        // separate (and in order).
        assert_eq!(buffer.event_count(), 4);
        let states = pointer_states(&buffer);
        assert_eq!(states[0].1.delta, [1.0, 0.0]);
        assert_eq!(states[1].1.delta, [6.0, 0.0]);
        assert_eq!(states[2].1.delta, [8.0, 0.0]);
        assert_eq!(states[3].1.delta, [16.0, 0.0]);
        assert_eq!(states[3].0, 11.0);
    }

    #[test]
    fn test_empty_buffer_is_a_no_op() {
        let mut buffer = EventBuffer::new();
        compact_pointer_moves(&mut buffer, None);
        assert_eq!(buffer.event_count(), 0);
    }
}
