// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed-layout event envelope.
//!
//! The envelope is the first thing on the wire, so its topic field doubles
//! as the subscription key: transports match subscription prefixes against
//! the leading bytes of every frame.
//!
//! ```text
//! offset  len  field
//!      0   32  topic (NUL-padded)
//!     32    4  sequence_id
//!     36  128  utc_string (NUL-padded)
//!    164    4  (padding)
//!    168    8  local_timestamp_ns
//!    176    8  mono_timestamp_ns
//!    184    4  message_size
//!    188    4  (padding)
//! ```
//!
//! The struct is `#[repr(C)]` with little-endian, alignment-1 integer
//! fields and explicit padding, so its in-memory bytes are the wire bytes.
//! Padding is written as zero and ignored on read.

use std::borrow::Cow;

use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use super::clock::EventTimestamp;
use crate::error::EncodingError;

/// Width of the topic field in bytes.
pub const TOPIC_FIELD_LEN: usize = 32;

/// Longest topic accepted, leaving room for the NUL terminator.
pub const MAX_TOPIC_LEN: usize = TOPIC_FIELD_LEN - 1;

/// Width of the time string field in bytes.
pub const UTC_STRING_LEN: usize = 128;

/// Size of the encoded envelope in bytes.
pub const ENVELOPE_SIZE: usize = 192;

/// The fixed-size header written first in every frame.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct EventEnvelope {
    topic: [u8; TOPIC_FIELD_LEN],
    sequence_id: U32,
    utc_string: [u8; UTC_STRING_LEN],
    _pad0: [u8; 4],
    local_timestamp_ns: U64,
    mono_timestamp_ns: U64,
    message_size: U32,
    _pad1: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<EventEnvelope>() == ENVELOPE_SIZE);

impl EventEnvelope {
    /// Encoded size of the envelope.
    pub const SIZE: usize = ENVELOPE_SIZE;

    /// Creates an envelope for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::TopicTooLong`] if the topic exceeds
    /// [`MAX_TOPIC_LEN`] bytes, or [`EncodingError::TopicContainsNul`] if it
    /// contains a NUL byte.
    pub fn new(
        topic: &str,
        sequence_id: u32,
        timestamp: &EventTimestamp,
        message_size: u32,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            topic: encode_topic_field(topic)?,
            sequence_id: U32::new(sequence_id),
            utc_string: encode_utc_string(timestamp.utc_string()),
            _pad0: [0; 4],
            local_timestamp_ns: U64::new(timestamp.local_ns()),
            mono_timestamp_ns: U64::new(timestamp.mono_ns()),
            message_size: U32::new(message_size),
            _pad1: [0; 4],
        })
    }

    /// Returns the raw topic field, NUL padding included.
    #[must_use]
    pub fn topic_field(&self) -> &[u8; TOPIC_FIELD_LEN] {
        &self.topic
    }

    /// Returns the topic text up to the first NUL.
    #[must_use]
    pub fn topic(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.topic))
    }

    /// Returns the per-publisher counter, starting at 0 and wrapping on
    /// overflow.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        self.sequence_id.get()
    }

    /// Returns the time string up to the first NUL.
    #[must_use]
    pub fn utc_string(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(trim_nul(&self.utc_string))
    }

    /// Returns wall-clock nanoseconds since the Unix epoch.
    #[must_use]
    pub fn local_timestamp_ns(&self) -> u64 {
        self.local_timestamp_ns.get()
    }

    /// Returns monotonic nanoseconds, not comparable across process restarts.
    #[must_use]
    pub fn mono_timestamp_ns(&self) -> u64 {
        self.mono_timestamp_ns.get()
    }

    /// Returns the size of the message header plus payload.
    #[must_use]
    pub fn message_size(&self) -> u32 {
        self.message_size.get()
    }

    /// Appends the encoded envelope to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    /// Reads an envelope from the start of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than [`ENVELOPE_SIZE`].
    #[must_use]
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf)
    }
}

impl std::fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("topic", &self.topic())
            .field("sequence_id", &self.sequence_id())
            .field("utc_string", &self.utc_string())
            .field("local_timestamp_ns", &self.local_timestamp_ns())
            .field("mono_timestamp_ns", &self.mono_timestamp_ns())
            .field("message_size", &self.message_size())
            .finish()
    }
}

/// Builds the NUL-padded topic field.
///
/// # Errors
///
/// Over-long topics are rejected rather than truncated, so a topic that
/// encodes successfully always decodes to the same bytes.
pub fn encode_topic_field(topic: &str) -> Result<[u8; TOPIC_FIELD_LEN], EncodingError> {
    let bytes = topic.as_bytes();
    if bytes.len() > MAX_TOPIC_LEN {
        return Err(EncodingError::TopicTooLong {
            len: bytes.len(),
            max: MAX_TOPIC_LEN,
        });
    }
    if bytes.contains(&0) {
        return Err(EncodingError::TopicContainsNul);
    }

    let mut field = [0u8; TOPIC_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Compares a raw topic field with `expected`, treating the field as
/// NUL-padded.
#[must_use]
pub fn topic_field_matches(field: &[u8], expected: &str) -> bool {
    let expected = expected.as_bytes();
    if expected.len() > MAX_TOPIC_LEN || field.len() < TOPIC_FIELD_LEN {
        return false;
    }
    let (head, padding) = field[..TOPIC_FIELD_LEN].split_at(expected.len());
    head == expected && padding.iter().all(|&b| b == 0)
}

/// Returns the topic carried by a raw frame, if the frame holds a full
/// topic field of valid UTF-8.
///
/// Lets a catch-all handler learn which topic to pass to
/// [`decode`](super::decode).
#[must_use]
pub fn peek_topic(frame: &[u8]) -> Option<&str> {
    let field = frame.get(..TOPIC_FIELD_LEN)?;
    std::str::from_utf8(trim_nul(field)).ok()
}

/// Copies the time string into its fixed field, cutting it at a character
/// boundary if it does not fit.
fn encode_utc_string(text: &str) -> [u8; UTC_STRING_LEN] {
    let mut end = text.len().min(UTC_STRING_LEN - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut field = [0u8; UTC_STRING_LEN];
    field[..end].copy_from_slice(&text.as_bytes()[..end]);
    field
}

fn trim_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}
