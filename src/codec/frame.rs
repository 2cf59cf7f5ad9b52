// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-frame encoding and validation.
//!
//! A frame is an [`EventEnvelope`], a [`MessageHeader`] and the payload,
//! laid out back to back in one contiguous buffer.

use std::borrow::Cow;

use super::clock::EventTimestamp;
use super::envelope::{ENVELOPE_SIZE, EventEnvelope, encode_topic_field, topic_field_matches};
use super::message_header::{AuxHeader, EVENT_MAGIC, MESSAGE_HEADER_SIZE, MessageHeader};
use crate::error::{DecodeError, EncodingError, SizeField};

/// Size of the two fixed headers, the shortest valid frame.
pub const FRAME_OVERHEAD: usize = ENVELOPE_SIZE + MESSAGE_HEADER_SIZE;

/// Encodes an event with an empty auxiliary header, stamped with the
/// current time.
///
/// # Errors
///
/// Returns [`EncodingError`] if the topic does not fit its field or the
/// payload overflows the 32-bit size fields.
pub fn encode(topic: &str, payload: &[u8], sequence_id: u32) -> Result<Vec<u8>, EncodingError> {
    encode_at(
        topic,
        &AuxHeader::empty(),
        payload,
        sequence_id,
        &EventTimestamp::now(),
    )
}

/// Encodes an event carrying auxiliary header fields, stamped with the
/// current time.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_with_header(
    topic: &str,
    aux: &AuxHeader,
    payload: &[u8],
    sequence_id: u32,
) -> Result<Vec<u8>, EncodingError> {
    encode_at(topic, aux, payload, sequence_id, &EventTimestamp::now())
}

/// Encodes an event with an explicit timestamp.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_at(
    topic: &str,
    aux: &AuxHeader,
    payload: &[u8],
    sequence_id: u32,
    timestamp: &EventTimestamp,
) -> Result<Vec<u8>, EncodingError> {
    // Validate the topic before sizing anything.
    encode_topic_field(topic)?;

    let too_large = || EncodingError::PayloadTooLarge { len: payload.len() };
    let payload_size = u32::try_from(payload.len()).map_err(|_| too_large())?;
    let message_size = u32::try_from(MESSAGE_HEADER_SIZE)
        .ok()
        .and_then(|header| header.checked_add(payload_size))
        .ok_or_else(too_large)?;

    let envelope = EventEnvelope::new(topic, sequence_id, timestamp, message_size)?;
    let header = MessageHeader::new(aux, payload_size);

    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    envelope.write_to(&mut buf);
    header.write_to(&mut buf);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// A validated frame, borrowing its payload from the received buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent<'a> {
    envelope: EventEnvelope,
    header: MessageHeader,
    payload: &'a [u8],
}

impl<'a> DecodedEvent<'a> {
    /// Returns the event topic.
    #[must_use]
    pub fn topic(&self) -> Cow<'_, str> {
        self.envelope.topic()
    }

    /// Returns the publisher's sequence number for this event.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        self.envelope.sequence_id()
    }

    /// Returns the formatted local time at which the event was encoded.
    #[must_use]
    pub fn utc_string(&self) -> Cow<'_, str> {
        self.envelope.utc_string()
    }

    /// Returns the wall-clock encode time in nanoseconds since the epoch.
    #[must_use]
    pub fn local_timestamp_ns(&self) -> u64 {
        self.envelope.local_timestamp_ns()
    }

    /// Returns the monotonic encode time in nanoseconds.
    #[must_use]
    pub fn mono_timestamp_ns(&self) -> u64 {
        self.envelope.mono_timestamp_ns()
    }

    /// Returns the auxiliary header fields.
    #[must_use]
    pub fn aux_header(&self) -> AuxHeader {
        self.header.aux_header()
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Returns the full envelope.
    #[must_use]
    pub fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }

    /// Returns the full message header.
    #[must_use]
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }
}

/// Validates a received frame addressed to `expected_topic`.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. the buffer holds both fixed headers ([`DecodeError::TooShort`])
/// 2. `message_size` matches the bytes after the envelope
///    ([`DecodeError::SizeMismatch`])
/// 3. the topic field equals `expected_topic` exactly
///    ([`DecodeError::TopicMismatch`])
/// 4. `payload_size` matches the bytes after both headers
///    ([`DecodeError::SizeMismatch`])
/// 5. the magic value identifies this protocol ([`DecodeError::BadMagic`])
///
/// A catch-all listener passes the frame's own topic, obtained with
/// [`peek_topic`](super::peek_topic).
///
/// # Errors
///
/// Returns the first failed check as a [`DecodeError`].
///
/// # Examples
///
/// ```
/// use event_notify::codec::{decode, encode};
///
/// let frame = encode("stor.error", &[1, 2, 3], 0).unwrap();
/// let event = decode(&frame, "stor.error").unwrap();
/// assert_eq!(event.payload(), &[1, 2, 3]);
/// assert!(decode(&frame, "stor.status").is_err());
/// ```
pub fn decode<'a>(frame: &'a [u8], expected_topic: &str) -> Result<DecodedEvent<'a>, DecodeError> {
    let len = frame.len();
    if len < FRAME_OVERHEAD {
        return Err(DecodeError::TooShort {
            len,
            min: FRAME_OVERHEAD,
        });
    }

    let (envelope_bytes, rest) = frame.split_at(ENVELOPE_SIZE);
    let (header_bytes, payload) = rest.split_at(MESSAGE_HEADER_SIZE);

    let envelope = EventEnvelope::read_from(envelope_bytes).ok_or(DecodeError::TooShort {
        len,
        min: FRAME_OVERHEAD,
    })?;
    if u64::from(envelope.message_size()) != rest.len() as u64 {
        return Err(DecodeError::SizeMismatch {
            field: SizeField::MessageSize,
            declared: u64::from(envelope.message_size()),
            actual: rest.len() as u64,
        });
    }

    if !topic_field_matches(envelope.topic_field(), expected_topic) {
        return Err(DecodeError::TopicMismatch);
    }

    let header = MessageHeader::read_from(header_bytes).ok_or(DecodeError::TooShort {
        len,
        min: FRAME_OVERHEAD,
    })?;
    if u64::from(header.payload_size()) != payload.len() as u64 {
        return Err(DecodeError::SizeMismatch {
            field: SizeField::PayloadSize,
            declared: u64::from(header.payload_size()),
            actual: payload.len() as u64,
        });
    }

    if header.magic() != EVENT_MAGIC {
        return Err(DecodeError::BadMagic {
            found: header.magic(),
        });
    }

    Ok(DecodedEvent {
        envelope,
        header,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(topic: &str, payload: &[u8]) -> Vec<u8> {
        encode(topic, payload, 5).unwrap()
    }

    fn patch_u32(buf: &mut [u8], offset: usize, f: impl Fn(u32) -> u32) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[offset..offset + 4]);
        let value = f(u32::from_le_bytes(raw));
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    const MESSAGE_SIZE_AT: usize = 184;
    const MAGIC_AT: usize = ENVELOPE_SIZE;
    const PAYLOAD_SIZE_AT: usize = ENVELOPE_SIZE + 136;

    #[test]
    fn round_trip_preserves_payload_and_sequence() {
        let buf = encode("rec.status.started", b"hello", 41).unwrap();
        let event = decode(&buf, "rec.status.started").unwrap();

        assert_eq!(event.payload(), b"hello");
        assert_eq!(event.sequence_id(), 41);
        assert_eq!(event.topic(), "rec.status.started");
        assert!(event.aux_header().is_empty());
    }

    #[test]
    fn round_trip_empty_payload() {
        let buf = frame("stor.status", &[]);
        assert_eq!(buf.len(), FRAME_OVERHEAD);
        assert!(decode(&buf, "stor.status").unwrap().payload().is_empty());
    }

    #[test]
    fn round_trip_aux_header() {
        let aux = AuxHeader::status(-5, 12);
        let buf = encode_with_header("venc.error", &aux, &[9], 0).unwrap();
        let event = decode(&buf, "venc.error").unwrap();
        assert_eq!(event.aux_header(), aux);
        assert_eq!(event.header().header_field_count(), 8);
    }

    #[test]
    fn encode_sets_size_fields() {
        let buf = frame("stor.error", &[1, 2, 3]);
        let event = decode(&buf, "stor.error").unwrap();
        assert_eq!(event.envelope().message_size(), 143);
        assert_eq!(event.header().payload_size(), 3);
        assert_eq!(event.header().magic(), EVENT_MAGIC);
    }

    #[test]
    fn encode_rejects_long_topic() {
        let err = encode(&"x".repeat(32), &[], 0).unwrap_err();
        assert!(matches!(err, EncodingError::TopicTooLong { .. }));
    }

    #[test]
    fn too_short_buffer() {
        let buf = frame("stor.error", &[]);
        let err = decode(&buf[..FRAME_OVERHEAD - 1], "stor.error").unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                len: FRAME_OVERHEAD - 1,
                min: FRAME_OVERHEAD
            }
        );
        assert!(matches!(
            decode(&[], "stor.error"),
            Err(DecodeError::TooShort { len: 0, .. })
        ));
    }

    #[test]
    fn message_size_tamper_is_size_mismatch() {
        for delta in [1u32, 2, 1000, u32::MAX] {
            let mut buf = frame("stor.error", &[1, 2, 3]);
            patch_u32(&mut buf, MESSAGE_SIZE_AT, |v| v.wrapping_add(delta));
            assert!(matches!(
                decode(&buf, "stor.error"),
                Err(DecodeError::SizeMismatch {
                    field: SizeField::MessageSize,
                    ..
                })
            ));
        }
    }

    #[test]
    fn payload_size_tamper_is_size_mismatch() {
        for delta in [1u32, 3, 4, u32::MAX] {
            let mut buf = frame("stor.error", &[1, 2, 3]);
            patch_u32(&mut buf, PAYLOAD_SIZE_AT, |v| v.wrapping_add(delta));
            assert!(matches!(
                decode(&buf, "stor.error"),
                Err(DecodeError::SizeMismatch {
                    field: SizeField::PayloadSize,
                    ..
                })
            ));
        }
    }

    #[test]
    fn truncated_payload_is_size_mismatch() {
        let buf = frame("stor.error", &[1, 2, 3]);
        let err = decode(&buf[..buf.len() - 1], "stor.error").unwrap_err();
        assert!(matches!(err, DecodeError::SizeMismatch { .. }));
    }

    #[test]
    fn topic_mismatch() {
        let buf = frame("rec.status.started", &[]);
        assert_eq!(
            decode(&buf, "rec.status"),
            Err(DecodeError::TopicMismatch)
        );
        assert_eq!(decode(&buf, "rec.status.stopped"), Err(DecodeError::TopicMismatch));
    }

    #[test]
    fn bad_magic() {
        let mut buf = frame("vsrc.error", &[7; 16]);
        patch_u32(&mut buf, MAGIC_AT, |v| v ^ 0xFFFF_0000);
        assert_eq!(
            decode(&buf, "vsrc.error"),
            Err(DecodeError::BadMagic {
                found: EVENT_MAGIC ^ 0xFFFF_0000
            })
        );
    }

    #[test]
    fn size_checks_run_before_topic_check() {
        let mut buf = frame("vsrc.error", &[]);
        patch_u32(&mut buf, MESSAGE_SIZE_AT, |v| v + 1);
        assert!(matches!(
            decode(&buf, "other"),
            Err(DecodeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn explicit_timestamp_is_preserved() {
        use chrono::{FixedOffset, TimeZone};
        let dt = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 2, 3, 15, 34, 4)
            .unwrap();
        let ts = EventTimestamp::from_parts(&dt, 1234);

        let buf = encode_at("rec.status", &AuxHeader::empty(), &[], 0, &ts).unwrap();
        let event = decode(&buf, "rec.status").unwrap();
        assert_eq!(event.utc_string(), "2026-02-03T15:34:04.000Z +08:00");
        assert_eq!(event.mono_timestamp_ns(), 1234);
        assert_eq!(event.local_timestamp_ns(), ts.local_ns());
    }
}
