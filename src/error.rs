// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `event_notify` library.
//!
//! Every failure in this crate is returned, never panicked: subscriber
//! workers keep running across malformed or irrelevant messages, and
//! publishers report transport failures as values the caller can retry.
//!
//! The hierarchy mirrors the layers of the crate: encoding a frame,
//! decoding a frame, talking to the transport, and loading configuration.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection or worker pool could not be created.
    ///
    /// Fatal to the calling operation, but safe to retry later.
    #[error("construction failed: {0}")]
    Construction(String),

    /// The subscriber is already listening.
    #[error("subscriber is already active")]
    AlreadyActive,

    /// The subscriber has not been started yet.
    #[error("subscriber is not started")]
    NotStarted,

    /// The subscriber was stopped and cannot be restarted.
    #[error("subscriber has been stopped; create a new one to listen again")]
    Terminated,

    /// A worker pool needs at least one worker.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// The event could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The transport rejected the operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A received frame failed validation.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors produced while building a frame.
///
/// These are caller errors: the input must be fixed before retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The topic does not fit the fixed topic field.
    #[error("topic is {len} bytes, at most {max} allowed")]
    TopicTooLong {
        /// Length of the rejected topic.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The topic contains a NUL byte, which would truncate it on the wire.
    #[error("topic contains a NUL byte")]
    TopicContainsNul,

    /// The payload does not fit the 32-bit size fields.
    #[error("payload of {len} bytes overflows the message size field")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    /// Auxiliary header bytes exceed the opaque header array.
    #[error("auxiliary header is {len} bytes, at most {max} allowed")]
    AuxHeaderTooLarge {
        /// Length of the rejected auxiliary data.
        len: usize,
        /// Capacity of the opaque header array.
        max: usize,
    },
}

/// Which size field of a frame disagreed with the buffer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    /// The envelope's `message_size` field.
    MessageSize,
    /// The message header's `payload_size` field.
    PayloadSize,
}

impl std::fmt::Display for SizeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageSize => f.write_str("message_size"),
            Self::PayloadSize => f.write_str("payload_size"),
        }
    }
}

/// Errors produced while validating a received frame.
///
/// All of these mean the frame is either not for this listener or not a
/// valid frame of this protocol. They are dropped, never escalated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer cannot hold both fixed headers.
    #[error("frame of {len} bytes is shorter than the {min}-byte headers")]
    TooShort {
        /// Length of the received buffer.
        len: usize,
        /// Minimum length of a valid frame.
        min: usize,
    },

    /// A size field does not agree with the buffer length.
    #[error("{field} declares {declared} bytes but frame carries {actual}")]
    SizeMismatch {
        /// The field that disagreed.
        field: SizeField,
        /// Value found in the field.
        declared: u64,
        /// Value implied by the buffer length.
        actual: u64,
    },

    /// The frame is addressed to a different topic.
    #[error("topic mismatch")]
    TopicMismatch,

    /// The magic value does not identify this protocol.
    #[error("bad magic {found:#010x}")]
    BadMagic {
        /// Magic value found in the frame.
        found: u32,
    },
}

/// Errors reported by a transport.
///
/// Treated as transient: the whole publish can be retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nobody is attached to receive the frame.
    #[error("no subscribers attached")]
    NoSubscribers,

    /// The connection or its transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// The endpoint address is not usable by this transport.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors related to configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for [`BusConfig`](crate::BusConfig).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
