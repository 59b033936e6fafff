//! Entity handles
//!
//! Entities never hold references to each other directly. Every link is a
//! [`Handle`], a 24-bit integer packing the entity kind and its slot inside
//! that kind's slab:
//!
//! | kind tag | slot index |
//! |:--------:|:----------:|
//! |  4 bits  |  20 bits   |
//!
//! The raw value `-1` is reserved for "no reference".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of bits used for the kind tag
pub const KIND_BITS: u32 = 4;

/// Number of bits used for the slot index
pub const SLOT_BITS: u32 = 20;

/// Maximum number of entity kinds a handle can address
pub const MAX_KINDS: usize = 1 << KIND_BITS;

/// Maximum number of live entities per kind
pub const MAX_SLOTS: usize = 1 << SLOT_BITS;

const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;
const KIND_MASK: u32 = (1 << KIND_BITS) - 1;

/// Packed (kind, slot) identifier of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i32);

impl Default for Handle {
    fn default() -> Self {
        Self::NONE
    }
}

impl Handle {
    /// The "no reference" handle
    pub const NONE: Handle = Handle(-1);

    /// Pack a kind index and a slot index into a handle.
    ///
    /// # Panics
    /// Panics if `kind_index >= 16` or `slot_index >= 2^20`. Both indicate a
    /// programming error in the caller, never a recoverable condition.
    pub fn assemble(kind_index: usize, slot_index: usize) -> Self {
        assert!(
            kind_index < MAX_KINDS,
            "kind index {kind_index} does not fit into {KIND_BITS} bits"
        );
        assert!(
            slot_index < MAX_SLOTS,
            "slot index {slot_index} does not fit into {SLOT_BITS} bits"
        );
        Self(((kind_index as i32) << SLOT_BITS) | slot_index as i32)
    }

    /// Split a handle into `(kind_index, slot_index)`.
    ///
    /// Only meaningful for non-negative handles.
    pub fn breakdown(self) -> (usize, usize) {
        let raw = self.0 as u32;
        (
            ((raw >> SLOT_BITS) & KIND_MASK) as usize,
            (raw & SLOT_MASK) as usize,
        )
    }

    /// Replace the kind tag while keeping the slot index.
    ///
    /// Used when the ordering of entity kinds changed between file versions.
    pub fn recalc_kind_tag(self, kind_index: usize) -> Self {
        let (_, slot) = self.breakdown();
        Self::assemble(kind_index, slot)
    }

    /// Kind index encoded in this handle
    pub fn kind_index(self) -> usize {
        self.breakdown().0
    }

    /// Slot index encoded in this handle
    pub fn slot(self) -> usize {
        self.breakdown().1
    }

    /// Build a handle from its raw integer value
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 { Self::NONE } else { Self(raw) }
    }

    /// Raw integer value
    pub fn raw(self) -> i32 {
        self.0
    }

    /// True for the "no reference" handle
    pub fn is_none(self) -> bool {
        self.0 < 0
    }

    /// True for any handle that may address an entity
    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Convert to `Option`, mapping [`Handle::NONE`] to `None`
    pub fn to_option(self) -> Option<Handle> {
        self.is_some().then_some(self)
    }
}

impl From<Option<Handle>> for Handle {
    fn from(value: Option<Handle>) -> Self {
        value.unwrap_or(Handle::NONE)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "-");
        }
        let (kind, slot) = self.breakdown();
        write!(f, "{kind}:{slot}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_breakdown() {
        for kind in [0, 1, 5, 9, 15] {
            for slot in [0, 1, 42, 4095, MAX_SLOTS - 1] {
                let handle = Handle::assemble(kind, slot);
                assert_eq!(handle.breakdown(), (kind, slot));
                assert!(handle.is_some());
            }
        }
    }

    #[test]
    fn test_layout() {
        assert_eq!(Handle::assemble(1, 0).raw(), 1 << 20);
        assert_eq!(Handle::assemble(0, 7).raw(), 7);
        assert_eq!(Handle::assemble(15, MAX_SLOTS - 1).raw(), (1 << 24) - 1);
    }

    #[test]
    #[should_panic]
    fn test_slot_overflow() {
        Handle::assemble(0, MAX_SLOTS);
    }

    #[test]
    #[should_panic]
    fn test_kind_overflow() {
        Handle::assemble(MAX_KINDS, 0);
    }

    #[test]
    fn test_recalc_kind_tag() {
        let handle = Handle::assemble(3, 17);
        let moved = handle.recalc_kind_tag(8);
        assert_eq!(moved.breakdown(), (8, 17));
    }

    #[test]
    fn test_none() {
        assert!(Handle::NONE.is_none());
        assert_eq!(Handle::from_raw(-5), Handle::NONE);
        assert_eq!(Handle::default(), Handle::NONE);
        assert_eq!(Handle::NONE.to_option(), None);
        assert_eq!(Handle::from(None), Handle::NONE);
    }
}
