use crate::models::Catalog;
use std::sync::Arc;
use tokio::sync::watch;

/// The most recently fetched catalog, shared with any number of readers.
///
/// Only the fetcher that owns the state can replace its value. Each write
/// swaps the whole `Arc`, so readers see either the old or the new catalog.
#[derive(Debug)]
pub struct CatalogState {
    tx: watch::Sender<Option<Arc<Catalog>>>,
}

impl CatalogState {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn publish(&self, catalog: Arc<Catalog>) {
        let previous = self.tx.send_replace(Some(catalog));
        if previous.is_some() {
            tracing::debug!("Replaced previously published catalog");
        }
    }

    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> CatalogSubscription {
        CatalogSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of [`CatalogState`]
#[derive(Debug, Clone)]
pub struct CatalogSubscription {
    rx: watch::Receiver<Option<Arc<Catalog>>>,
}

impl CatalogSubscription {
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published catalog. Returns `None` once the fetcher
    /// owning the state is gone.
    pub async fn changed(&mut self) -> Option<Arc<Catalog>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Whether a catalog was published since this subscription last looked
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
