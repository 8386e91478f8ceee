// preview.rs - Owned thumbnail handles with explicit release

use iced::widget::image::Handle;
use std::collections::HashMap;
use std::path::Path;

/// Reference to a thumbnail held by a [`PreviewStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewId(u64);

/// Owns every live preview. A handle stays alive until it is released, so
/// whoever drops an item's payload must release the matching id.
#[derive(Debug, Default)]
pub struct PreviewStore {
    next: u64,
    live: HashMap<PreviewId, Handle>,
}

impl PreviewStore {
    pub fn create_from_path(&mut self, path: &Path) -> PreviewId {
        self.insert(Handle::from_path(path))
    }

    pub fn create_from_bytes(&mut self, bytes: Vec<u8>) -> PreviewId {
        self.insert(Handle::from_memory(bytes))
    }

    fn insert(&mut self, handle: Handle) -> PreviewId {
        self.next += 1;
        let id = PreviewId(self.next);
        self.live.insert(id, handle);
        id
    }

    pub fn get(&self, id: PreviewId) -> Option<&Handle> {
        self.live.get(&id)
    }

    /// Returns false if the id was already released.
    pub fn release(&mut self, id: PreviewId) -> bool {
        self.live.remove(&id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
