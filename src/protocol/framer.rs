//! Resynchronizing frame extraction.

use super::{CARRIAGE_RETURN, MAX_PAYLOAD, SYNC_BYTE, SYNC_LEN, TERMINATOR};
use crate::frame_buffer::ByteQueue;

/// The bytes between the sync marker and the terminator.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// Smallest span that can hold a marker, one payload byte and the terminator.
const MIN_FRAME: usize = SYNC_LEN + 2;

/// Look for one complete frame at the front of `rx`.
///
/// Returns the payload with marker, terminator and an optional trailing `\r` stripped, after
/// discarding the whole frame from the queue. Returns `None` if no complete frame is buffered
/// yet. Noise in front of a marker and frames interrupted by a new marker are discarded along the
/// way. Never blocks and never discards a marker that has only partially arrived.
///
/// A payload longer than [`MAX_PAYLOAD`] is consumed and handed out empty, so the caller still
/// answers it.
pub fn poll_frame<Q: ByteQueue>(rx: &mut Q) -> Option<Payload> {
    if rx.available() < SYNC_LEN {
        return None;
    }

    // Skip noise up to the next marker byte, keeping enough for a partial marker.
    while rx.peek(0) != SYNC_BYTE && rx.available() > SYNC_LEN {
        rx.discard(1);
    }

    if rx.available() < MIN_FRAME {
        return None;
    }

    // The frame starts at the last of a run of marker bytes.
    while (!at_marker(rx) || rx.peek(SYNC_LEN) == SYNC_BYTE) && rx.available() > MIN_FRAME - 1 {
        rx.discard(1);
    }

    if rx.available() < MIN_FRAME {
        return None;
    }

    let available = rx.available();
    let end = (SYNC_LEN..available).find(|&i| matches!(rx.peek(i), TERMINATOR | SYNC_BYTE));

    let Some(end) = end else {
        if rx.writable_space() == 0 {
            // The terminator can never arrive into a full queue.
            warn!("Dropping {=usize} bytes of an oversized frame", available);
            rx.discard(available);
        }
        return None;
    };

    if rx.peek(end) == SYNC_BYTE {
        // Abandon this frame, the new marker becomes the next frame's start.
        debug!("Frame interrupted by a new marker");
        rx.discard(end);
        return None;
    }

    let mut len = end - SYNC_LEN;
    if len > 0 && rx.peek(end - 1) == CARRIAGE_RETURN {
        len -= 1;
    }

    let mut payload = Payload::new();
    if len <= MAX_PAYLOAD {
        for i in 0..len {
            // Cannot fail, the length was checked above.
            let _ = payload.push(rx.peek(SYNC_LEN + i));
        }
    } else {
        warn!("Payload of {=usize} bytes exceeds the payload limit", len);
    }

    rx.discard(end + 1);
    Some(payload)
}

fn at_marker<Q: ByteQueue>(rx: &Q) -> bool {
    (0..SYNC_LEN).all(|i| rx.peek(i) == SYNC_BYTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_buffer::FrameBuffer;

    fn queue(bytes: &[u8]) -> FrameBuffer<64> {
        let mut rx = FrameBuffer::new();
        rx.push_all(bytes);
        rx
    }

    #[test]
    fn extracts_simple_frame() {
        let mut rx = queue(b"$$$id\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"id"[..]));
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn strips_carriage_return() {
        let mut rx = queue(b"$$$psumode\r\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"psumode"[..]));
    }

    #[test]
    fn waits_for_terminator() {
        let mut rx = queue(b"$$$psuge");
        assert_eq!(poll_frame(&mut rx), None);
        // Nothing consumed while waiting.
        assert_eq!(rx.available(), 8);

        rx.push_all(b"tv1\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"psugetv1"[..]));
    }

    #[test]
    fn too_short_is_left_alone() {
        let mut rx = queue(b"$$");
        assert_eq!(poll_frame(&mut rx), None);
        assert_eq!(rx.available(), 2);
    }

    #[test]
    fn skips_leading_noise() {
        let mut rx = queue(b"xx\x00garbage$$$off\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"off"[..]));
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn keeps_partial_marker_behind_noise() {
        let mut rx = queue(b"noise$$");
        assert_eq!(poll_frame(&mut rx), None);
        rx.push_all(b"$id\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"id"[..]));
    }

    #[test]
    fn extra_marker_bytes_move_frame_start() {
        let mut rx = queue(b"$$$$$id\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"id"[..]));
    }

    #[test]
    fn interrupted_frame_is_abandoned() {
        let mut rx = queue(b"$$$psuse$$$insul\n");
        assert_eq!(poll_frame(&mut rx), None);
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"insul"[..]));
    }

    #[test]
    fn consecutive_frames() {
        let mut rx = queue(b"$$$filon\n$$$beamon\r\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"filon"[..]));
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"beamon"[..]));
        assert_eq!(poll_frame(&mut rx), None);
    }

    #[test]
    fn empty_payload_after_carriage_return() {
        let mut rx = queue(b"$$$\r\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b""[..]));
    }

    #[test]
    fn full_queue_without_terminator_is_flushed() {
        let mut rx: FrameBuffer<16> = FrameBuffer::new();
        rx.push_all(b"$$$aaaaaaaaaaaaaaaaaaaa");
        assert_eq!(rx.writable_space(), 0);
        assert_eq!(poll_frame(&mut rx), None);
        assert_eq!(rx.available(), 0);

        rx.push_all(b"$$$id\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"id"[..]));
    }

    #[test]
    fn oversized_payload_is_consumed_empty() {
        let mut rx: FrameBuffer<128> = FrameBuffer::new();
        rx.push_all(b"$$$");
        rx.push_all(&[b'x'; MAX_PAYLOAD + 1]);
        rx.push_all(b"\n$$$id\n");
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b""[..]));
        assert_eq!(poll_frame(&mut rx).as_deref(), Some(&b"id"[..]));
    }
}
