//! Display targets

use std::sync::{Arc, Weak};

use pixacache::Bitmap;

use crate::naming::stable_hash;
use crate::types::ImageSize;

/// Stable identity of a display target across rebinds
pub type TargetId = u64;

/// A surface a loaded bitmap is displayed into — typically a view wrapper.
///
/// The engine tracks targets by [`id`](Self::id): when the same target is
/// re-bound to a new URI, tasks still in flight for the old URI notice the
/// change and cancel themselves.
pub trait ImageTarget: Send + Sync {
    /// Identity used for view-reuse detection
    fn id(&self) -> TargetId;

    /// Preferred decode size, if the target knows one
    fn size_hint(&self) -> Option<ImageSize> {
        None
    }

    /// Show the bitmap
    fn display(&self, bitmap: &Bitmap);

    /// Reset to showing nothing
    fn clear(&self) {}
}

/// Target used by [`ImageLoader::load`](crate::ImageLoader::load) when there
/// is no view to display into; results arrive through the listener only.
pub struct NonViewTarget {
    id: TargetId,
    size: ImageSize,
}

impl NonViewTarget {
    /// Create a target identified by the URI it loads
    pub fn new(uri: &str, size: ImageSize) -> Self {
        Self {
            id: stable_hash(uri),
            size,
        }
    }
}

impl ImageTarget for NonViewTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn size_hint(&self) -> Option<ImageSize> {
        Some(self.size)
    }

    fn display(&self, _bitmap: &Bitmap) {}
}

/// How a task refers to its target.
///
/// View-backed targets are held weakly so a collected view cancels the task;
/// listener-only loads keep their synthetic target alive for the duration.
#[derive(Clone)]
pub(crate) enum TargetRef {
    Weak(Weak<dyn ImageTarget>),
    Strong(Arc<dyn ImageTarget>),
}

impl TargetRef {
    pub(crate) fn upgrade(&self) -> Option<Arc<dyn ImageTarget>> {
        match self {
            TargetRef::Weak(weak) => weak.upgrade(),
            TargetRef::Strong(strong) => Some(Arc::clone(strong)),
        }
    }

    pub(crate) fn is_collected(&self) -> bool {
        matches!(self, TargetRef::Weak(weak) if weak.strong_count() == 0)
    }
}
