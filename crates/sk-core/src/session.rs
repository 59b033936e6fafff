//! Editing session
//!
//! Selection, hover, highlight and the render cache. Everything here is
//! keyed by handle and follows entities through compaction.

use std::collections::HashMap;

use tracing::debug;

use crate::config::SketcherConfig;
use crate::constants::DEFAULT_ARC_SEGMENTS;
use crate::entity::Entity;
use crate::handle::Handle;
use crate::render::{DisplayState, RenderBatch, build_batch};
use crate::scene::Scene;
use crate::store::{Relocation, Removal};

/// Per-viewport editing state
#[derive(Debug, Clone)]
pub struct Session {
    selection: Vec<Handle>,
    hover: Option<Handle>,
    highlight: Vec<Handle>,
    batches: HashMap<Handle, RenderBatch>,
    arc_segments: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            selection: Vec::new(),
            hover: None,
            highlight: Vec::new(),
            batches: HashMap::new(),
            arc_segments: DEFAULT_ARC_SEGMENTS,
        }
    }

    pub fn from_config(config: &SketcherConfig) -> Self {
        Self {
            arc_segments: config.arc_segments,
            ..Self::new()
        }
    }

    // ============== Selection ==============

    /// Add to the selection, keeping selection order
    pub fn select(&mut self, handle: Handle) {
        if handle.is_some() && !self.selection.contains(&handle) {
            self.selection.push(handle);
        }
    }

    pub fn deselect(&mut self, handle: Handle) {
        self.selection.retain(|h| *h != handle);
    }

    pub fn toggle_selection(&mut self, handle: Handle) {
        if self.is_selected(handle) {
            self.deselect(handle);
        } else {
            self.select(handle);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, handle: Handle) -> bool {
        self.selection.contains(&handle)
    }

    /// Selected handles in selection order
    pub fn selection(&self) -> &[Handle] {
        &self.selection
    }

    pub fn set_hover(&mut self, handle: Option<Handle>) {
        self.hover = handle.and_then(Handle::to_option);
    }

    pub fn hover(&self) -> Option<Handle> {
        self.hover
    }

    pub fn set_highlight(&mut self, handles: Vec<Handle>) {
        self.highlight = handles;
    }

    pub fn is_highlighted(&self, handle: Handle) -> bool {
        self.hover == Some(handle) || self.highlight.contains(&handle)
    }

    // ============== Render Cache ==============

    /// Rebuild the batches of every entity that reports dirty, then clear
    /// their flags. Returns the number of rebuilt entities.
    pub fn refresh(&mut self, scene: &mut Scene) -> usize {
        let dirty = scene.entities().dirty_handles();
        for handle in &dirty {
            let batch = scene
                .entities()
                .get(*handle)
                .and_then(|entity| build_batch(scene, entity, self.arc_segments));
            match batch {
                Some(batch) => {
                    self.batches.insert(*handle, batch);
                }
                None => {
                    self.batches.remove(handle);
                }
            }
        }
        for handle in &dirty {
            scene.entities_mut().clear(*handle);
        }
        if !dirty.is_empty() {
            debug!("Rebuilt {} render batches", dirty.len());
        }
        dirty.len()
    }

    pub fn batch(&self, handle: Handle) -> Option<&RenderBatch> {
        self.batches.get(&handle)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Colour role of an entity
    pub fn display_state(&self, scene: &Scene, entity: &Entity) -> DisplayState {
        if !scene.is_visible(entity) {
            return DisplayState::Hidden;
        }
        let handle = entity.handle();
        let highlight = self.is_highlighted(handle);
        let selected = self.is_selected(handle);

        if !entity.is_active(scene.active_sketch()) {
            return match (highlight, selected) {
                (true, _) => DisplayState::Highlight,
                (false, true) => DisplayState::InactiveSelected,
                (false, false) => DisplayState::Inactive,
            };
        }
        match (selected, highlight) {
            (true, true) => DisplayState::SelectedHighlight,
            (true, false) => DisplayState::Selected,
            (false, true) => DisplayState::Highlight,
            (false, false) => DisplayState::Default,
        }
    }

    // ============== Compaction ==============

    /// Forget `removed` and move everything keyed by `moved.from` to
    /// `moved.to`
    pub fn relocate(&mut self, removed: Handle, moved: Option<Relocation>) {
        self.deselect(removed);
        self.highlight.retain(|h| *h != removed);
        self.batches.remove(&removed);
        if self.hover == Some(removed) {
            self.hover = None;
        }

        let Some(Relocation { from, to }) = moved else {
            return;
        };
        let rename = |h: &mut Handle| {
            if *h == from {
                *h = to;
            }
        };
        self.selection.iter_mut().for_each(rename);
        self.highlight.iter_mut().for_each(rename);
        if let Some(hover) = self.hover.as_mut() {
            rename(hover);
        }
        if let Some(batch) = self.batches.remove(&from) {
            self.batches.insert(to, batch);
        }
    }

    pub fn apply_removal(&mut self, removal: &Removal) {
        self.relocate(removal.removed.handle(), removal.relocation);
    }
}
