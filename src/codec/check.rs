// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic-scoped frame check for handlers that want one topic.

use super::frame::{DecodedEvent, decode};
use crate::error::DecodeError;

/// Outcome of checking a frame against the topic a handler expects.
///
/// Topic mismatch is a normal filtering result, kept apart from frames that
/// are broken, so a handler can ignore the first and log the second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCheck<'a> {
    /// The frame is valid and addressed to the expected topic.
    Accepted(DecodedEvent<'a>),
    /// The frame belongs to another topic.
    Filtered,
    /// The frame is not a valid frame of this protocol.
    Malformed(DecodeError),
}

impl<'a> EventCheck<'a> {
    /// Returns the payload of an accepted frame.
    #[must_use]
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self {
            Self::Accepted(event) => Some(event.payload()),
            Self::Filtered | Self::Malformed(_) => None,
        }
    }

    /// Returns `true` if the frame was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Converts into the decoded event, dropping the reason for rejection.
    #[must_use]
    pub fn accepted(self) -> Option<DecodedEvent<'a>> {
        match self {
            Self::Accepted(event) => Some(event),
            Self::Filtered | Self::Malformed(_) => None,
        }
    }
}

/// Checks a raw frame against `expected_topic`.
///
/// Runs the same validation as [`decode`], but reports a topic mismatch as
/// [`EventCheck::Filtered`] instead of an error. Malformed frames are
/// logged at debug level with the buffer length so protocol drift between
/// producers and consumers is visible.
///
/// # Examples
///
/// ```
/// use event_notify::codec::{EventCheck, check_event_with_topic, encode};
///
/// let frame = encode("vsrc.error", b"lost signal", 3).unwrap();
///
/// let check = check_event_with_topic("vsrc.error", &frame);
/// assert_eq!(check.payload(), Some(&b"lost signal"[..]));
///
/// let other = check_event_with_topic("venc.error", &frame);
/// assert_eq!(other, EventCheck::Filtered);
/// ```
#[must_use]
pub fn check_event_with_topic<'a>(expected_topic: &str, frame: &'a [u8]) -> EventCheck<'a> {
    match decode(frame, expected_topic) {
        Ok(event) => EventCheck::Accepted(event),
        Err(DecodeError::TopicMismatch) => EventCheck::Filtered,
        Err(err) => {
            tracing::debug!(
                topic = %expected_topic,
                len = frame.len(),
                error = %err,
                "Dropping malformed event frame"
            );
            EventCheck::Malformed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FRAME_OVERHEAD, encode};

    #[test]
    fn accepted_exposes_payload() {
        let frame = encode("stor.error", &[1, 2, 3], 0).unwrap();
        let check = check_event_with_topic("stor.error", &frame);
        assert!(check.is_accepted());
        assert_eq!(check.payload(), Some(&[1u8, 2, 3][..]));
        assert_eq!(check.accepted().unwrap().sequence_id(), 0);
    }

    #[test]
    fn other_topic_is_filtered_not_malformed() {
        let frame = encode("stor.error", &[1], 0).unwrap();
        assert_eq!(check_event_with_topic("stor.status", &frame), EventCheck::Filtered);
    }

    #[test]
    fn short_frame_is_malformed() {
        let check = check_event_with_topic("stor.error", &[0u8; 10]);
        assert_eq!(
            check,
            EventCheck::Malformed(DecodeError::TooShort {
                len: 10,
                min: FRAME_OVERHEAD
            })
        );
        assert_eq!(check.payload(), None);
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut frame = encode("stor.error", &[], 0).unwrap();
        frame[crate::codec::ENVELOPE_SIZE] ^= 0xFF;
        assert!(matches!(
            check_event_with_topic("stor.error", &frame),
            EventCheck::Malformed(DecodeError::BadMagic { .. })
        ));
    }
}
