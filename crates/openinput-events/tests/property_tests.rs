//! Property-based tests for the event arena and compactor.

use openinput_events::{
    EventBuffer, POINTER_FORMAT, PointerState, STATE_EVENT, align_event_size,
    compactor::compact_pointer_moves,
};
use quickcheck_macros::quickcheck;

fn push_move(buffer: &mut EventBuffer, timestamp: f64, delta_x: f32, buttons: u16) {
    let state = PointerState {
        delta: [delta_x, 0.0],
        buttons,
        ..Default::default()
    };
    let mut payload = POINTER_FORMAT.as_u32().to_le_bytes().to_vec();
    payload.extend_from_slice(&state.encode());
    buffer
        .append(STATE_EVENT, 1, timestamp, &payload)
        .expect("append");
}

// After any sequence of appends, the sum of the records' aligned sizes
// equals the buffer's used size.
#[quickcheck]
fn prop_used_size_equals_sum_of_aligned_record_sizes(payload_lens: Vec<u8>) -> bool {
    let mut buffer = EventBuffer::new();
    for (i, len) in payload_lens.iter().enumerate() {
        let payload = vec![0u8; usize::from(*len)];
        if buffer
            .append(STATE_EVENT, i as u32, i as f64, &payload)
            .is_err()
        {
            return false;
        }
    }
    let summed: usize = buffer
        .iter()
        .map(|r| align_event_size(r.size_bytes() as usize))
        .sum();
    summed == buffer.used_size() && buffer.event_count() == payload_lens.len()
}

// Compaction is idempotent and only ever shrinks the buffer.
#[quickcheck]
fn prop_compaction_idempotent(moves: Vec<(u8, bool)>) -> bool {
    let mut buffer = EventBuffer::new();
    for (i, (delta, pressed)) in moves.iter().enumerate() {
        push_move(
            &mut buffer,
            i as f64,
            f32::from(*delta),
            u16::from(*pressed),
        );
    }
    let before = buffer.used_size();

    compact_pointer_moves(&mut buffer, None);
    if buffer.used_size() > before {
        return false;
    }
    let once = buffer.as_bytes().to_vec();
    let once_count = buffer.event_count();

    compact_pointer_moves(&mut buffer, None);
    buffer.as_bytes() == &once[..] && buffer.event_count() == once_count
}

// Compaction preserves the total accumulated motion across the buffer.
#[quickcheck]
fn prop_compaction_preserves_total_delta(moves: Vec<(u8, bool)>) -> bool {
    let mut buffer = EventBuffer::new();
    let mut expected = 0.0f32;
    for (i, (delta, pressed)) in moves.iter().enumerate() {
        expected += f32::from(*delta);
        push_move(
            &mut buffer,
            i as f64,
            f32::from(*delta),
            u16::from(*pressed),
        );
    }

    compact_pointer_moves(&mut buffer, None);

    let total: f32 = buffer
        .iter()
        .filter_map(|r| {
            let view = r.as_state_event()?;
            Some(PointerState::decode(view.state)?.delta[0])
        })
        .sum();
    (total - expected).abs() < 1e-3
}

// Compaction never reorders surviving records.
#[quickcheck]
fn prop_compaction_keeps_timestamps_monotonic(moves: Vec<(u8, bool)>) -> bool {
    let mut buffer = EventBuffer::new();
    for (i, (delta, pressed)) in moves.iter().enumerate() {
        push_move(
            &mut buffer,
            i as f64,
            f32::from(*delta),
            u16::from(*pressed),
        );
    }

    compact_pointer_moves(&mut buffer, None);

    let timestamps: Vec<f64> = buffer.iter().map(|r| r.timestamp()).collect();
    timestamps.windows(2).all(|w| w[0] <= w[1])
}
