//! Dirty tracking
//!
//! Every entity carries its own dirty flag. Whether an entity *reports*
//! dirty also depends on its references, following the store's
//! [`DirtyPolicy`].

use std::collections::HashSet;

use crate::config::DirtyPolicy;
use crate::handle::Handle;
use crate::store::EntityStore;

impl EntityStore {
    pub fn dirty_policy(&self) -> DirtyPolicy {
        self.dirty_policy
    }

    pub fn set_dirty_policy(&mut self, policy: DirtyPolicy) {
        self.dirty_policy = policy;
    }

    /// Whether an entity needs its derived geometry rebuilt.
    ///
    /// True when the entity's own flag is set, or when a dependency is dirty
    /// (one level deep under [`DirtyPolicy::Shallow`], recursively under
    /// [`DirtyPolicy::Transitive`]). Unknown handles are never dirty.
    pub fn is_dirty(&self, handle: Handle) -> bool {
        let Some(entity) = self.get(handle) else {
            return false;
        };
        if entity.dirty {
            return true;
        }
        match self.dirty_policy {
            DirtyPolicy::Shallow => entity
                .dependencies()
                .into_iter()
                .any(|dep| self.get(dep).is_some_and(|e| e.dirty)),
            DirtyPolicy::Transitive => {
                let mut visited = HashSet::from([handle]);
                let mut stack = entity.dependencies();
                while let Some(dep) = stack.pop() {
                    if !visited.insert(dep) {
                        continue;
                    }
                    let Some(dep_entity) = self.get(dep) else {
                        continue;
                    };
                    if dep_entity.dirty {
                        return true;
                    }
                    stack.extend(dep_entity.dependencies());
                }
                false
            }
        }
    }

    /// Set an entity's own dirty flag
    pub fn mark_dirty(&mut self, handle: Handle) {
        if let Some(entity) = self.get_mut(handle) {
            entity.dirty = true;
        }
    }

    /// Clear an entity's own dirty flag
    pub fn clear(&mut self, handle: Handle) {
        if let Some(entity) = self.get_mut(handle) {
            entity.dirty = false;
        }
    }

    /// Snapshot of every handle that reports dirty, in store order
    pub fn dirty_handles(&self) -> Vec<Handle> {
        self.all()
            .map(|entity| entity.handle())
            .filter(|handle| self.is_dirty(*handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (EntityStore, Handle, Handle, Handle, Handle) {
        let mut store = EntityStore::new();
        store.ensure_origin_elements().unwrap();
        let wp = store.origin_elements().plane_xy;
        let sketch = store.add_sketch(wp).unwrap();
        let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
        let b = store.add_point_2d([1.0, 0.0], sketch).unwrap();
        let line = store.add_line_2d(a, b, sketch).unwrap();
        for handle in store.handles() {
            store.clear(handle);
        }
        (store, sketch, a, b, line)
    }

    #[test]
    fn test_new_entities_are_dirty() {
        let mut store = EntityStore::new();
        let p = store.add_point_3d([0.0; 3]).unwrap();
        assert!(store.is_dirty(p));
        store.clear(p);
        assert!(!store.is_dirty(p));
        assert!(!store.is_dirty(Handle::NONE));
    }

    #[test]
    fn test_dependency_makes_dirty() {
        let (mut store, _, a, b, line) = chain();
        assert!(!store.is_dirty(line));

        store.mark_dirty(a);
        assert!(store.is_dirty(line));
        assert!(!store.get(line).unwrap().dirty_flag());
        assert!(!store.is_dirty(b));

        store.clear(a);
        assert!(!store.is_dirty(line));
    }

    #[test]
    fn test_policy_depth() {
        let (mut store, _, _, _, line) = chain();
        let wp = store.origin_elements().plane_xy;
        // line -> sketch -> workplane: two levels away
        store.mark_dirty(wp);

        store.set_dirty_policy(DirtyPolicy::Shallow);
        assert!(!store.is_dirty(line));

        store.set_dirty_policy(DirtyPolicy::Transitive);
        assert!(store.is_dirty(line));
    }

    #[test]
    fn test_dirty_handles_snapshot() {
        let (mut store, sketch, a, _, line) = chain();
        store.set_dirty_policy(DirtyPolicy::Shallow);
        store.mark_dirty(a);
        assert_eq!(store.dirty_handles(), vec![a, line]);

        store.mark_dirty(sketch);
        let dirty = store.dirty_handles();
        assert!(dirty.contains(&sketch));
        assert!(dirty.contains(&line));
    }
}
