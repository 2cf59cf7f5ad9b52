// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary envelope codec.
//!
//! Every event travels as one contiguous frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────┬──────────────────┐
//! │ EventEnvelope    │ MessageHeader    │ Payload          │
//! │ (192 bytes)      │ (140 bytes)      │ (payload_size)   │
//! └──────────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! The codec is pure: no I/O, no shared state. All functions are safe to
//! call from any number of threads at once.
//!
//! # Examples
//!
//! ```
//! use event_notify::codec::{AuxHeader, EventCheck, check_event_with_topic, encode_with_header};
//!
//! let frame = encode_with_header("rec.status.started", &AuxHeader::status(0, 4), b"ok", 0)?;
//!
//! if let EventCheck::Accepted(event) = check_event_with_topic("rec.status.started", &frame) {
//!     assert_eq!(event.aux_header().command_id(), Some(4));
//!     assert_eq!(event.payload(), b"ok");
//! }
//! # Ok::<(), event_notify::error::EncodingError>(())
//! ```

mod check;
mod clock;
mod envelope;
mod frame;
mod message_header;

pub use check::{EventCheck, check_event_with_topic};
pub use clock::{EventTimestamp, format_utc_string, monotonic_ns};
pub use envelope::{
    ENVELOPE_SIZE, EventEnvelope, MAX_TOPIC_LEN, TOPIC_FIELD_LEN, UTC_STRING_LEN,
    encode_topic_field, peek_topic, topic_field_matches,
};
pub use frame::{DecodedEvent, FRAME_OVERHEAD, decode, encode, encode_at, encode_with_header};
pub use message_header::{
    AUX_HEADER_CAPACITY, AuxHeader, EVENT_MAGIC, MESSAGE_HEADER_SIZE, MessageHeader,
};
