// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The message header that follows the envelope.
//!
//! ```text
//! offset  len  field
//!      0    4  magic
//!      4    4  header_field_count
//!      8  128  opaque auxiliary header
//!    136    4  payload_size
//! ```

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::EncodingError;

/// Magic value identifying frames of this protocol family (`"EVNT"`).
pub const EVENT_MAGIC: u32 = 0x544E_5645;

/// Capacity of the opaque auxiliary header in bytes.
pub const AUX_HEADER_CAPACITY: usize = 128;

/// Size of the encoded message header in bytes.
pub const MESSAGE_HEADER_SIZE: usize = 140;

/// Caller-defined auxiliary fields carried in the message header.
///
/// The library does not interpret these bytes. The most common sub-schema
/// is a result code followed by a command id, built with
/// [`AuxHeader::status`].
///
/// # Examples
///
/// ```
/// use event_notify::codec::AuxHeader;
///
/// let aux = AuxHeader::status(-2, 17);
/// assert_eq!(aux.len(), 8);
/// assert_eq!(aux.result_code(), Some(-2));
/// assert_eq!(aux.command_id(), Some(17));
///
/// assert!(AuxHeader::empty().is_empty());
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuxHeader {
    bytes: [u8; AUX_HEADER_CAPACITY],
    len: usize,
}

impl AuxHeader {
    /// An auxiliary header with no bytes in use.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: [0; AUX_HEADER_CAPACITY],
            len: 0,
        }
    }

    /// Creates an auxiliary header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::AuxHeaderTooLarge`] if `data` exceeds
    /// [`AUX_HEADER_CAPACITY`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() > AUX_HEADER_CAPACITY {
            return Err(EncodingError::AuxHeaderTooLarge {
                len: data.len(),
                max: AUX_HEADER_CAPACITY,
            });
        }
        let mut bytes = [0; AUX_HEADER_CAPACITY];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    /// Creates the result-code + command-id header.
    #[must_use]
    pub fn status(result_code: i32, command_id: u32) -> Self {
        let mut bytes = [0; AUX_HEADER_CAPACITY];
        bytes[..4].copy_from_slice(&result_code.to_le_bytes());
        bytes[4..8].copy_from_slice(&command_id.to_le_bytes());
        Self { bytes, len: 8 }
    }

    /// Returns the bytes in use.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Returns the number of bytes in use.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes are in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the result code, if at least 4 bytes are in use.
    #[must_use]
    pub fn result_code(&self) -> Option<i32> {
        let bytes = self.as_bytes().get(0..4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Some(i32::from_le_bytes(raw))
    }

    /// Returns the command id, if at least 8 bytes are in use.
    #[must_use]
    pub fn command_id(&self) -> Option<u32> {
        let bytes = self.as_bytes().get(4..8)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Some(u32::from_le_bytes(raw))
    }
}

impl Default for AuxHeader {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for AuxHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuxHeader").field(&self.as_bytes()).finish()
    }
}

/// The fixed-size header between the envelope and the payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct MessageHeader {
    magic: U32,
    header_field_count: U32,
    opaque: [u8; AUX_HEADER_CAPACITY],
    payload_size: U32,
}

const _: () = assert!(std::mem::size_of::<MessageHeader>() == MESSAGE_HEADER_SIZE);

impl MessageHeader {
    /// Encoded size of the header.
    pub const SIZE: usize = MESSAGE_HEADER_SIZE;

    /// Creates a header for a payload of `payload_size` bytes.
    #[must_use]
    pub fn new(aux: &AuxHeader, payload_size: u32) -> Self {
        // Safe: len never exceeds AUX_HEADER_CAPACITY
        #[allow(clippy::cast_possible_truncation)]
        let header_field_count = aux.len() as u32;

        Self {
            magic: U32::new(EVENT_MAGIC),
            header_field_count: U32::new(header_field_count),
            opaque: aux.bytes,
            payload_size: U32::new(payload_size),
        }
    }

    /// Returns the protocol identifier, [`EVENT_MAGIC`] for valid frames.
    #[must_use]
    pub fn magic(&self) -> u32 {
        self.magic.get()
    }

    /// Returns the number of meaningful bytes in the auxiliary header.
    #[must_use]
    pub fn header_field_count(&self) -> u32 {
        self.header_field_count.get()
    }

    /// Returns the size of the payload following this header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        self.payload_size.get()
    }

    /// Returns the auxiliary header.
    ///
    /// A `header_field_count` larger than the opaque array is clamped.
    #[must_use]
    pub fn aux_header(&self) -> AuxHeader {
        let len = usize::try_from(self.header_field_count())
            .unwrap_or(AUX_HEADER_CAPACITY)
            .min(AUX_HEADER_CAPACITY);
        AuxHeader {
            bytes: self.opaque,
            len,
        }
    }

    /// Appends the encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    /// Reads a header from the start of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than [`MESSAGE_HEADER_SIZE`].
    #[must_use]
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf)
    }
}
