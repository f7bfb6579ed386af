use facematch_core::Gallery;
use std::sync::{Arc, RwLock};

/// Holds the gallery currently being served.
///
/// Requests take an `Arc` snapshot and keep it for their whole lifetime.
/// A reload replaces the pointer with a freshly built gallery; it never
/// edits one that is already shared.
#[derive(Default)]
pub struct GalleryStore {
    current: RwLock<Option<Arc<Gallery>>>,
}

impl GalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gallery in service, or `None` until the first build has finished.
    pub fn snapshot(&self) -> Option<Arc<Gallery>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Put a new gallery into service and return it.
    pub fn install(&self, gallery: Gallery) -> Arc<Gallery> {
        let gallery = Arc::new(gallery);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = guard.replace(Arc::clone(&gallery));
        drop(guard);

        tracing::info!(
            entries = gallery.len(),
            previous = previous.as_ref().map(|g| g.len()),
            "gallery installed"
        );
        gallery
    }
}
