use std::collections::HashMap;

use crate::geometry::{Geometry, GeometryId};
use crate::renderer::{GeometryBuffers, RenderHandle, Renderer};
use crate::scene::SceneContainer;

/// Bidirectional mapping between entities and their renderable handles.
///
/// Both directions are hash lookups: `resolve` runs on every pick, so a
/// linear scan over all bindings is not acceptable there.
#[derive(Default)]
pub struct ActorRegistry {
    by_handle: HashMap<RenderHandle, GeometryId>,
    by_id: HashMap<GeometryId, RenderHandle>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the association, replacing any prior binding for the id.
    pub fn bind(&mut self, id: GeometryId, handle: RenderHandle) {
        if let Some(previous) = self.by_id.insert(id, handle) {
            self.by_handle.remove(&previous);
        }
        self.by_handle.insert(handle, id);
    }

    /// Reverse lookup used directly on pick output. A miss is the normal
    /// "clicked empty space" outcome, not an error.
    pub fn resolve(&self, handle: RenderHandle) -> Option<GeometryId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn handle_of(&self, id: GeometryId) -> Option<RenderHandle> {
        self.by_id.get(&id).copied()
    }

    /// Drops the binding for an entity and unregisters its renderable.
    pub fn release(&mut self, id: GeometryId, renderer: &mut dyn Renderer) {
        if let Some(handle) = self.by_id.remove(&id) {
            self.by_handle.remove(&handle);
            renderer.unregister(handle);
        }
    }

    pub fn release_all(&mut self, ids: &[GeometryId], renderer: &mut dyn Renderer) {
        for id in ids {
            self.release(*id, renderer);
        }
    }

    /// Pushes the entity's current buffers into its renderable, binding a
    /// fresh renderable first when none exists. Clears the entity's dirty
    /// flags; a clean, already-bound entity is left alone.
    pub fn sync(&mut self, geometry: &mut Geometry, renderer: &mut dyn Renderer) -> RenderHandle {
        let dirty = geometry.take_dirty();
        match self.handle_of(geometry.id()) {
            Some(handle) => {
                if !dirty.is_empty() {
                    renderer.update(handle, GeometryBuffers::from_geometry(geometry));
                }
                handle
            }
            None => {
                let handle = renderer.register(GeometryBuffers::from_geometry(geometry));
                self.bind(geometry.id(), handle);
                handle
            }
        }
    }

    /// One batched sync pass over a container, run once per user action
    /// rather than per individual mutation. Also drops bindings whose
    /// entity no longer exists. The registry serves both of the session's
    /// containers, so only ids from this container's namespace count as
    /// stale here.
    pub fn sync_container(&mut self, container: &mut SceneContainer, renderer: &mut dyn Renderer) {
        let stale: Vec<GeometryId> = self
            .by_id
            .keys()
            .copied()
            .filter(|id| container.kind().owns_id(*id) && !container.contains(*id))
            .collect();
        self.release_all(&stale, renderer);

        let order: Vec<GeometryId> = container.order().to_vec();
        for id in order {
            if let Some(geometry) = container.get_mut(id) {
                self.sync(geometry, renderer);
            }
        }
        renderer.request_redraw();
    }
}
