// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle identifier type.

use std::fmt;

use uuid::Uuid;

/// Unique identifier of an [`EventHandle`](crate::EventHandle).
///
/// Used to correlate log lines of one handle. It does not travel on the
/// wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.0.simple().to_string()[..8];
        write!(f, "HandleId({short})")
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(HandleId::new(), HandleId::new());
    }

    #[test]
    fn debug_is_short() {
        let debug = format!("{:?}", HandleId::new());
        assert!(debug.starts_with("HandleId("));
        assert_eq!(debug.len(), "HandleId(".len() + 8 + 1);
    }
}
