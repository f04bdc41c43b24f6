//! Boundary to the external scene graph.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use sylvan_core::{CellCoord, Mesh};

/// Identifies one block's geometry at one detail level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey {
    /// Layer tag of the owning loader (e.g. `"Grass"`).
    pub tag: &'static str,
    pub cell: CellCoord,
    /// Linear block index within the page.
    pub block: u32,
    pub level: u8,
}

/// Receives geometry as blocks become visible or hidden.
///
/// A sink gets its own clone of the mesh handle on attach; the block keeps
/// ownership of its slot and may attach the same mesh again later.
pub trait SceneSink: Send {
    fn attach(&mut self, key: NodeKey, mesh: &Arc<Mesh>);
    fn detach(&mut self, key: NodeKey);
}

/// Sink that discards every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScene;

impl SceneSink for NullScene {
    fn attach(&mut self, _key: NodeKey, _mesh: &Arc<Mesh>) {}
    fn detach(&mut self, _key: NodeKey) {}
}

/// Snapshot of a [`RecordingScene`].
#[derive(Debug, Default)]
pub struct SceneRecord {
    pub attached: HashMap<NodeKey, Arc<Mesh>>,
    pub attach_calls: usize,
    pub detach_calls: usize,
}

/// Sink that tracks live nodes, shareable between a manager and its host.
#[derive(Debug, Default, Clone)]
pub struct RecordingScene {
    inner: Arc<Mutex<SceneRecord>>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently attached.
    pub fn attached_count(&self) -> usize {
        self.inner.lock().attached.len()
    }

    /// Triangles across all attached nodes.
    pub fn attached_triangles(&self) -> usize {
        self.inner
            .lock()
            .attached
            .values()
            .map(|mesh| mesh.triangle_count())
            .sum()
    }

    pub fn is_attached(&self, key: NodeKey) -> bool {
        self.inner.lock().attached.contains_key(&key)
    }

    pub fn attach_calls(&self) -> usize {
        self.inner.lock().attach_calls
    }

    pub fn detach_calls(&self) -> usize {
        self.inner.lock().detach_calls
    }

    /// Execute a function with read access to the record.
    pub fn with_record<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SceneRecord) -> R,
    {
        f(&self.inner.lock())
    }
}

impl SceneSink for RecordingScene {
    fn attach(&mut self, key: NodeKey, mesh: &Arc<Mesh>) {
        let mut record = self.inner.lock();
        record.attach_calls += 1;
        record.attached.insert(key, Arc::clone(mesh));
    }

    fn detach(&mut self, key: NodeKey) {
        let mut record = self.inner.lock();
        record.detach_calls += 1;
        record.attached.remove(&key);
    }
}

impl<S: SceneSink + ?Sized> SceneSink for Box<S> {
    fn attach(&mut self, key: NodeKey, mesh: &Arc<Mesh>) {
        (**self).attach(key, mesh);
    }

    fn detach(&mut self, key: NodeKey) {
        (**self).detach(key);
    }
}
