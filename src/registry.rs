// registry.rs - Ordered collection of conversion items and their lifecycle

use crate::preview::{PreviewId, PreviewStore};
use crate::source::SourceFile;
use iced::widget::image::Handle;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Converted output of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

impl ConvertedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Pending,
    Converting,
    Done,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Converting => write!(f, "converting"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The result payload and its preview only exist in `Done`.
#[derive(Debug, Clone)]
pub enum ItemStatus {
    Pending,
    Converting,
    Done {
        result: ConvertedFile,
        preview: PreviewId,
    },
    Error {
        detail: String,
    },
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::Converting => StatusKind::Converting,
            Self::Done { .. } => StatusKind::Done,
            Self::Error { .. } => StatusKind::Error,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[derive(Debug)]
pub struct ConversionItem {
    id: ItemId,
    key: String,
    source: SourceFile,
    source_preview: PreviewId,
    status: ItemStatus,
}

impl ConversionItem {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn source_preview(&self) -> PreviewId {
        self.source_preview
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn result(&self) -> Option<&ConvertedFile> {
        match &self.status {
            ItemStatus::Done { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn result_preview(&self) -> Option<PreviewId> {
        match &self.status {
            ItemStatus::Done { preview, .. } => Some(*preview),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Error { detail } => Some(detail),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no item with id {0}")]
    UnknownItem(ItemId),
    #[error("item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ItemId,
        from: StatusKind,
        to: StatusKind,
    },
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    items: Vec<ConversionItem>,
    previews: PreviewStore,
    next_id: u64,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every image file as a pending item and returns how many were
    /// accepted. Files without an `image/*` type are dropped silently.
    pub fn add(&mut self, files: impl IntoIterator<Item = SourceFile>) -> usize {
        let before = self.items.len();

        for source in files.into_iter().filter(SourceFile::is_image) {
            self.next_id += 1;
            let source_preview = self.previews.create_from_path(&source.path);
            self.items.push(ConversionItem {
                id: ItemId(self.next_id),
                key: source.identity(),
                source,
                source_preview,
                status: ItemStatus::Pending,
            });
        }

        self.items.len() - before
    }

    pub fn mark_converting(&mut self, id: ItemId) -> Result<(), RegistryError> {
        let index = self.expect_kind(id, StatusKind::Pending, StatusKind::Converting)?;
        self.items[index].status = ItemStatus::Converting;
        Ok(())
    }

    pub fn mark_done(&mut self, id: ItemId, result: ConvertedFile) -> Result<(), RegistryError> {
        let index = self.expect_kind(id, StatusKind::Converting, StatusKind::Done)?;
        let preview = self.previews.create_from_bytes(result.data.to_vec());
        self.items[index].status = ItemStatus::Done { result, preview };
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        id: ItemId,
        detail: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let index = self.expect_kind(id, StatusKind::Converting, StatusKind::Error)?;
        self.items[index].status = ItemStatus::Error {
            detail: detail.into(),
        };
        Ok(())
    }

    fn expect_kind(
        &self,
        id: ItemId,
        from: StatusKind,
        to: StatusKind,
    ) -> Result<usize, RegistryError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(RegistryError::UnknownItem(id))?;
        let current = self.items[index].kind();
        if current != from {
            return Err(RegistryError::InvalidTransition {
                id,
                from: current,
                to,
            });
        }
        Ok(index)
    }

    /// Puts every done or failed item back to pending, releasing result
    /// previews first. Returns the number of items reset.
    pub fn reconvert(&mut self) -> usize {
        let mut reset = 0;
        for item in self.items.iter_mut().filter(|item| item.status.is_settled()) {
            if let ItemStatus::Done { preview, .. } = &item.status {
                self.previews.release(*preview);
            }
            item.status = ItemStatus::Pending;
            reset += 1;
        }
        reset
    }

    /// Releases every preview and empties the collection. Returns the number
    /// of previews released.
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        for item in self.items.drain(..) {
            released += usize::from(self.previews.release(item.source_preview));
            if let ItemStatus::Done { preview, .. } = item.status {
                released += usize::from(self.previews.release(preview));
            }
        }
        released
    }

    pub fn items(&self) -> &[ConversionItem] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&ConversionItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn ids_with(&self, kind: StatusKind) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.kind() == kind)
            .map(|item| item.id)
            .collect()
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.items.iter().filter(|item| item.kind() == kind).count()
    }

    /// Converted files in collection order.
    pub fn done_results(&self) -> Vec<&ConvertedFile> {
        self.items.iter().filter_map(ConversionItem::result).collect()
    }

    pub fn has_any_done(&self) -> bool {
        self.items.iter().any(|item| item.kind() == StatusKind::Done)
    }

    pub fn is_batch_settled(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.status.is_settled())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn preview(&self, id: PreviewId) -> Option<&Handle> {
        self.previews.get(id)
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn source(name: &str, modified_ms: u128) -> SourceFile {
        SourceFile {
            path: PathBuf::from(format!("/photos/{name}")),
            name: name.to_string(),
            size: 2048,
            mime_type: crate::source::mime_type_for(std::path::Path::new(name)).to_string(),
            modified_ms,
        }
    }

    pub(crate) fn converted(name: &str) -> ConvertedFile {
        ConvertedFile {
            name: name.to_string(),
            mime_type: "image/webp".to_string(),
            data: Arc::new(vec![0u8; 16]),
        }
    }

    fn settle(registry: &mut FileRegistry, id: ItemId, ok: bool) {
        registry.mark_converting(id).expect("pending");
        if ok {
            registry.mark_done(id, converted("out.webp")).expect("converting");
        } else {
            registry.mark_failed(id, "Conversion failed").expect("converting");
        }
    }

    #[test]
    fn add_keeps_only_images_in_order() {
        let mut registry = FileRegistry::new();
        let added = registry.add(vec![
            source("b.png", 1),
            source("notes.txt", 2),
            source("a.jpg", 3),
        ]);
        assert_eq!(added, 2);
        assert_eq!(registry.add(vec![source("c.gif", 4)]), 1);

        let names: Vec<_> = registry.items().iter().map(|i| i.source().name.as_str()).collect();
        assert_eq!(names, vec!["b.png", "a.jpg", "c.gif"]);
        assert!(registry.items().iter().all(|i| i.source().mime_type.starts_with("image/")));
        assert!(registry.items().iter().all(|i| i.kind() == StatusKind::Pending));
        assert_eq!(registry.live_previews(), 3);
    }

    #[test]
    fn identity_keys_follow_name_and_mtime() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1), source("a.png", 2), source("a.png", 1)]);

        let items = registry.items();
        assert_ne!(items[0].key(), items[1].key());
        // Same file twice gives the same key but distinct ids.
        assert_eq!(items[0].key(), items[2].key());
        assert_ne!(items[0].id(), items[2].id());
    }

    #[test]
    fn transitions_are_guarded() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1)]);
        let id = registry.items()[0].id();

        assert_eq!(
            registry.mark_done(id, converted("a.webp")),
            Err(RegistryError::InvalidTransition {
                id,
                from: StatusKind::Pending,
                to: StatusKind::Done,
            })
        );
        assert!(registry.mark_failed(id, "x").is_err());

        settle(&mut registry, id, true);
        assert!(registry.mark_converting(id).is_err());
        assert_eq!(registry.items()[0].kind(), StatusKind::Done);
        assert_eq!(registry.live_previews(), 2);
    }

    #[test]
    fn unknown_ids_change_nothing() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1)]);
        let id = registry.items()[0].id();
        registry.clear();

        assert_eq!(registry.mark_converting(id), Err(RegistryError::UnknownItem(id)));
        assert!(registry.is_empty());
    }

    #[test]
    fn result_only_present_when_done() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1), source("b.png", 2)]);
        let a = registry.items()[0].id();
        let b = registry.items()[1].id();
        settle(&mut registry, a, true);
        settle(&mut registry, b, false);

        let items = registry.items();
        assert!(items[0].result().is_some() && items[0].result_preview().is_some());
        assert!(items[1].result().is_none() && items[1].result_preview().is_none());
        assert_eq!(items[1].error(), Some("Conversion failed"));
    }

    #[test]
    fn derived_flags() {
        let mut registry = FileRegistry::new();
        assert!(!registry.is_batch_settled());
        assert!(!registry.has_any_done());

        registry.add(vec![source("a.png", 1), source("b.png", 2)]);
        let a = registry.items()[0].id();
        let b = registry.items()[1].id();
        settle(&mut registry, a, false);
        assert!(!registry.is_batch_settled());
        assert!(!registry.has_any_done());

        settle(&mut registry, b, true);
        assert!(registry.is_batch_settled());
        assert!(registry.has_any_done());
    }

    #[test]
    fn reconvert_resets_settled_items_and_releases_results() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1), source("b.png", 2), source("c.png", 3)]);
        let ids: Vec<_> = registry.items().iter().map(|i| i.id()).collect();
        settle(&mut registry, ids[0], true);
        settle(&mut registry, ids[1], true);
        settle(&mut registry, ids[2], false);
        assert_eq!(registry.live_previews(), 5);

        assert_eq!(registry.reconvert(), 3);
        assert!(registry.items().iter().all(|i| i.kind() == StatusKind::Pending));
        assert!(registry.done_results().is_empty());
        assert_eq!(registry.live_previews(), 3);
    }

    #[test]
    fn reconvert_leaves_in_flight_items_alone() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1), source("b.png", 2)]);
        let a = registry.items()[0].id();
        let b = registry.items()[1].id();
        settle(&mut registry, a, true);
        registry.mark_converting(b).expect("pending");

        assert_eq!(registry.reconvert(), 1);
        assert_eq!(registry.items()[1].kind(), StatusKind::Converting);
    }

    #[test]
    fn clear_releases_every_preview() {
        let mut registry = FileRegistry::new();
        registry.add(vec![source("a.png", 1), source("b.png", 2)]);
        let a = registry.items()[0].id();
        settle(&mut registry, a, true);

        assert_eq!(registry.clear(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.live_previews(), 0);

        assert_eq!(registry.clear(), 0);
        assert!(registry.is_empty());
    }
}
