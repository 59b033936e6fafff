//! Scene file serialization
//!
//! Scenes are stored as RON. A file records its format version and the kind
//! order its handles were written with, so that files survive a change of
//! that order.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constraint::ConstraintStore;
use crate::entity::{Entity, EntityKind, KIND_COUNT};
use crate::error::{SketchError, SketchResult};
use crate::handle::Handle;
use crate::scene::Scene;
use crate::store::{EntityStore, OriginElements};

/// Current file format version
pub const FORMAT_VERSION: u32 = 2;

fn default_true() -> bool {
    true
}

/// Serialization format for backward compatibility
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneData {
    version: u32,
    /// Kind names in tag order at the time of writing
    #[serde(default)]
    kinds: Vec<String>,
    entities: Vec<Entity>,
    #[serde(default)]
    origin: OriginElements,
    #[serde(default)]
    constraints: ConstraintStore,
    #[serde(default)]
    active_sketch: Option<Handle>,
    #[serde(default = "default_true")]
    show_origin: bool,
}

impl From<&Scene> for SceneData {
    fn from(scene: &Scene) -> Self {
        Self {
            version: FORMAT_VERSION,
            kinds: EntityKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            entities: scene.entities.all().cloned().collect(),
            origin: scene.entities.origin,
            constraints: scene.constraints.clone(),
            active_sketch: scene.active_sketch,
            show_origin: scene.show_origin,
        }
    }
}

impl TryFrom<SceneData> for Scene {
    type Error = SketchError;

    fn try_from(data: SceneData) -> SketchResult<Self> {
        let stored_order = if data.kinds.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            data.kinds
                .iter()
                .map(|name| {
                    EntityKind::from_name(name).ok_or_else(|| {
                        SketchError::Deserialize(format!("unknown entity kind '{name}'"))
                    })
                })
                .collect::<SketchResult<Vec<_>>>()?
        };

        // Reslot by kind and recompute kind tags
        let mut map = HashMap::new();
        let mut slabs: [Vec<Entity>; KIND_COUNT] = Default::default();
        for mut entity in data.entities {
            let kind = entity.kind();
            let stored = entity.handle;
            if stored_order.get(stored.kind_index()) != Some(&kind) {
                return Err(SketchError::Deserialize(format!(
                    "handle {stored} does not match a {kind}"
                )));
            }
            let handle = stored.recalc_kind_tag(kind.index());
            if handle != stored {
                map.insert(stored, handle);
            }
            entity.handle = handle;
            slabs[kind.index()].push(entity);
        }

        for (kind, slab) in EntityKind::ALL.iter().zip(slabs.iter_mut()) {
            slab.sort_by_key(|entity| entity.handle.slot());
            if let Some(entity) = slab
                .iter()
                .enumerate()
                .find_map(|(slot, e)| (e.handle.slot() != slot).then_some(e))
            {
                return Err(SketchError::Deserialize(format!(
                    "{kind} slab is not contiguous at {}",
                    entity.handle
                )));
            }
        }

        let mut scene = Scene::empty();
        scene.entities = EntityStore {
            slabs,
            origin: data.origin,
            ..Default::default()
        };
        scene.constraints = data.constraints;
        scene.active_sketch = data.active_sketch;
        scene.show_origin = data.show_origin;

        if !map.is_empty() {
            info!("Migrating {} handles to the current kind order", map.len());
            scene.update_pointers_map(&map);
        }

        if data.version < FORMAT_VERSION {
            debug!("Upgrading scene from version {}", data.version);
            scene.entities.ensure_origin_elements()?;
        }

        let dangling = scene
            .entities
            .all()
            .flat_map(|e| e.dependencies())
            .chain(scene.constraints.iter().flat_map(|c| c.entities()))
            .filter(|h| !scene.entities.contains(*h))
            .count();
        if dangling > 0 {
            warn!("Loaded scene has {} dangling references", dangling);
        }

        Ok(scene)
    }
}

impl Scene {
    /// Save scene to a file
    pub fn save(&self, path: impl AsRef<Path>) -> SketchResult<()> {
        let content = self.to_bytes()?;
        std::fs::write(path.as_ref(), content).map_err(|e| SketchError::Io(e.to_string()))?;
        Ok(())
    }

    /// Serialize scene to bytes
    pub fn to_bytes(&self) -> SketchResult<Vec<u8>> {
        let content =
            ron::ser::to_string_pretty(&SceneData::from(self), ron::ser::PrettyConfig::default())
                .map_err(|e| SketchError::Serialize(e.to_string()))?;
        Ok(content.into_bytes())
    }

    /// Load scene from a file
    pub fn load(path: impl AsRef<Path>) -> SketchResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| SketchError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Load scene from bytes
    pub fn load_from_bytes(data: &[u8]) -> SketchResult<Self> {
        let content =
            std::str::from_utf8(data).map_err(|e| SketchError::Deserialize(e.to_string()))?;
        Self::from_ron_str(content)
    }

    fn from_ron_str(content: &str) -> SketchResult<Self> {
        let data: SceneData =
            ron::from_str(content).map_err(|e| SketchError::Deserialize(e.to_string()))?;
        Scene::try_from(data)
    }
}
