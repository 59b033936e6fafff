//! Reference graph
//!
//! Rewriting and dependency queries walk the reference fields listed by
//! [`EntityKind::reference_fields`](crate::EntityKind::reference_fields), plus
//! the sketch back-reference of a [`TargetObject`](crate::TargetObject).

use std::collections::HashMap;

use tracing::debug;

use crate::entity::Entity;
use crate::handle::Handle;
use crate::store::EntityStore;

impl EntityStore {
    /// Rewrite every reference to `old` into `new`, including the origin
    /// pointers and sketch target back-references.
    pub fn update_pointers(&mut self, old: Handle, new: Handle) {
        if old == new || old.is_none() {
            return;
        }
        debug!("Updating references {} -> {}", old, new);
        self.remap_references(|handle| (handle == old).then_some(new));
    }

    /// Rewrite references through a handle map, all at once.
    ///
    /// Every handle is looked up in the map before anything is written, so
    /// permutations (`a -> b`, `b -> a`) do not collide.
    pub fn update_pointers_map(&mut self, map: &HashMap<Handle, Handle>) {
        if map.is_empty() {
            return;
        }
        debug!("Updating references through a map of {} handles", map.len());
        self.remap_references(|handle| map.get(&handle).copied());
    }

    pub(crate) fn remap_references(&mut self, map: impl Fn(Handle) -> Option<Handle>) {
        let apply = |slot: &mut Handle| {
            if slot.is_some()
                && let Some(new) = map(*slot)
            {
                *slot = new;
            }
        };

        for entity in self.slabs.iter_mut().flatten() {
            let kind = entity.kind();
            for field in kind.reference_fields() {
                if let Some(slot) = entity.data.reference_mut(*field) {
                    apply(slot);
                }
            }
            if let Some(target) = entity.as_sketch_mut().and_then(|s| s.target.as_mut()) {
                apply(&mut target.sketch);
            }
        }

        for slot in self.origin.handles_mut() {
            apply(slot);
        }
    }

    /// Direct references of an entity. Empty for unknown handles.
    pub fn dependencies(&self, handle: Handle) -> Vec<Handle> {
        self.get(handle).map(Entity::dependencies).unwrap_or_default()
    }

    /// Entities that reference `handle` directly
    pub fn referrers(&self, handle: Handle) -> impl Iterator<Item = &Entity> + Clone {
        self.all()
            .filter(move |entity| entity.dependencies().contains(&handle))
    }

    /// Whether any entity, target object or origin pointer references `handle`
    pub fn is_referenced(&self, handle: Handle) -> bool {
        if handle.is_none() {
            return false;
        }
        self.referrers(handle).next().is_some()
            || self
                .all()
                .filter_map(|entity| entity.as_sketch()?.target.as_ref())
                .any(|target| target.sketch == handle)
    }
}
