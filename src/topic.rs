// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic taxonomy and prefix matching.
//!
//! Topics are dot-delimited hierarchical strings. Because the topic is the
//! first field of every frame, a subscription is a raw byte prefix matched
//! against the leading bytes of the frame, and hierarchical levels compose
//! as nested prefixes:
//!
//! ```text
//! ""                    → everything
//! "rec."                → rec.status.started, rec.status.stopped, rec.error
//! "rec.status."         → rec.status.started, rec.status.stopped
//! "rec.status.started"  → rec.status.started
//! ```
//!
//! The constants below are the established names; nothing in the crate
//! restricts publishers to them.

use std::collections::BTreeSet;

/// All recording events.
pub const REC: &str = "rec.";
/// Recording state changes.
pub const REC_STATUS: &str = "rec.status.";
/// A recording started.
pub const REC_STATUS_STARTED: &str = "rec.status.started";
/// A recording stopped.
pub const REC_STATUS_STOPPED: &str = "rec.status.stopped";
/// The recorder failed.
pub const REC_ERROR: &str = "rec.error";

/// All video source events.
pub const VSRC: &str = "vsrc.";
/// Video source state changes.
pub const VSRC_STATUS: &str = "vsrc.status";
/// The video source failed.
pub const VSRC_ERROR: &str = "vsrc.error";

/// All encoder events.
pub const VENC: &str = "venc.";
/// Encoder state changes.
pub const VENC_STATUS: &str = "venc.status.";
/// The encoder configuration changed.
pub const VENC_STATUS_CONFIG_CHANGED: &str = "venc.status.config_changed";
/// The encoder failed.
pub const VENC_ERROR: &str = "venc.error";

/// All storage events.
pub const STOR: &str = "stor.";
/// Storage state changes.
pub const STOR_STATUS: &str = "stor.status";
/// Storage failed.
pub const STOR_ERROR: &str = "stor.error";

/// Returns `true` if `frame` starts with `prefix`.
///
/// The empty prefix matches every frame.
#[must_use]
pub fn matches_prefix(frame: &[u8], prefix: &[u8]) -> bool {
    frame.starts_with(prefix)
}

/// A set of subscription prefixes.
///
/// Adding a prefix twice has no further effect, and a frame matching
/// several prefixes still matches once.
///
/// # Examples
///
/// ```
/// use event_notify::topic::{self, TopicFilter};
///
/// let mut filter = TopicFilter::new();
/// filter.insert(topic::REC_STATUS);
///
/// assert!(filter.matches(b"rec.status.started\0\0"));
/// assert!(!filter.matches(b"rec.error\0"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    prefixes: BTreeSet<Vec<u8>>,
}

impl TopicFilter {
    /// Creates an empty filter that matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a prefix. Returns `true` if it was not present.
    pub fn insert(&mut self, prefix: impl AsRef<[u8]>) -> bool {
        self.prefixes.insert(prefix.as_ref().to_vec())
    }

    /// Removes a prefix. Returns `true` if it was present.
    pub fn remove(&mut self, prefix: impl AsRef<[u8]>) -> bool {
        self.prefixes.remove(prefix.as_ref())
    }

    /// Returns `true` if any registered prefix matches the frame.
    #[must_use]
    pub fn matches(&self, frame: &[u8]) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| matches_prefix(frame, prefix))
    }

    /// Returns the number of registered prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns `true` if no prefix is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Returns the registered prefixes, lossily decoded as text.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    /// Removes every prefix.
    pub fn clear(&mut self) {
        self.prefixes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(topic: &str) -> Vec<u8> {
        let mut f = topic.as_bytes().to_vec();
        f.resize(32, 0);
        f
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let filter = TopicFilter::new();
        assert!(filter.is_empty());
        assert!(!filter.matches(&field(STOR_ERROR)));
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let mut filter = TopicFilter::new();
        filter.insert("");
        assert!(filter.matches(&field(STOR_ERROR)));
        assert!(filter.matches(&field(VENC_STATUS_CONFIG_CHANGED)));
        assert!(filter.matches(&[]));
    }

    #[test]
    fn nested_prefixes_compose() {
        let started = field(REC_STATUS_STARTED);
        for prefix in ["", REC, REC_STATUS, REC_STATUS_STARTED] {
            assert!(matches_prefix(&started, prefix.as_bytes()), "{prefix}");
        }
        for prefix in [VENC, REC_STATUS_STOPPED] {
            assert!(!matches_prefix(&started, prefix.as_bytes()), "{prefix}");
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut filter = TopicFilter::new();
        assert!(filter.insert(REC));
        assert!(!filter.insert(REC));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn remove_only_named_prefix() {
        let mut filter = TopicFilter::new();
        filter.insert(REC);
        filter.insert(STOR);

        assert!(filter.remove(REC));
        assert!(!filter.remove(REC));
        assert!(!filter.matches(&field(REC_ERROR)));
        assert!(filter.matches(&field(STOR_ERROR)));
    }

    #[test]
    fn prefixes_listing() {
        let mut filter = TopicFilter::new();
        filter.insert(VSRC);
        filter.insert(REC);
        assert_eq!(filter.prefixes(), vec!["rec.".to_string(), "vsrc.".to_string()]);

        filter.clear();
        assert!(filter.is_empty());
    }
}
