use futures::FutureExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use super::backend::CartBackend;
use super::scheduler::PersistScheduler;
use super::store::{line_uid, merge_lines, CartStore, ClientCartLine};
use crate::entities::cart::CartLine;
use crate::errors::ServiceError;
use crate::services::catalog::ProductCatalog;

/// Who the cart belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    Guest,
    User(String),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            CartOwner::Guest => None,
            CartOwner::User(id) => Some(id),
        }
    }
}

/// A client's live cart: local lines kept in step with the server cart.
///
/// Signed-in sessions persist through a debounced [`PersistScheduler`];
/// guest sessions stay local.
pub struct CartSession {
    owner: CartOwner,
    store: Arc<Mutex<CartStore>>,
    scheduler: PersistScheduler,
    backend: Arc<dyn CartBackend>,
    catalog: Arc<dyn ProductCatalog>,
}

impl std::fmt::Debug for CartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSession")
            .field("owner", &self.owner)
            .field("store", &*lock(&self.store))
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl CartSession {
    /// Opens a session.
    ///
    /// Guests start empty. A signed-in user's server cart is merged with
    /// `local`, stock is refreshed from the catalog, and a persist is
    /// scheduled if the result differs from what the server holds. When the
    /// server cart cannot be loaded the local lines are kept and nothing is
    /// persisted until the next edit.
    #[instrument(skip_all, fields(owner = ?owner, local_lines = local.len()))]
    pub async fn start(
        owner: CartOwner,
        local: Vec<ClientCartLine>,
        backend: Arc<dyn CartBackend>,
        catalog: Arc<dyn ProductCatalog>,
        scheduler: PersistScheduler,
    ) -> Self {
        let session = Self {
            owner,
            store: Arc::new(Mutex::new(CartStore::new())),
            scheduler,
            backend,
            catalog,
        };

        let Some(user_id) = session.owner.user_id() else {
            info!("Guest cart session started");
            return session;
        };

        let server = match session.backend.load(user_id).await {
            Ok(lines) => Some(lines),
            Err(e) => {
                warn!(error = %e, "Could not load server cart; keeping local lines");
                None
            }
        };

        let server_lines: Vec<ClientCartLine> = server
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(ClientCartLine::from)
            .collect();
        let local: Vec<ClientCartLine> = local.into_iter().filter(|l| l.quantity > 0).collect();
        let merged = merge_lines(&local, &server_lines);
        let refreshed = session.refresh_availability(merged).await;

        let changed = {
            let mut store = lock(&session.store);
            *store = CartStore::from_lines(refreshed);
            info!(lines = store.lines().len(), "Cart session started");
            server.is_some_and(|server| store.to_server_lines() != server)
        };
        if changed {
            session.schedule_persist();
        }
        session
    }

    pub fn owner(&self) -> &CartOwner {
        &self.owner
    }

    pub fn lines(&self) -> Vec<ClientCartLine> {
        lock(&self.store).lines().to_vec()
    }

    pub fn server_lines(&self) -> Vec<CartLine> {
        snapshot(&self.store)
    }

    pub fn scheduler(&self) -> &PersistScheduler {
        &self.scheduler
    }

    /// Adds units of a product variant using the catalog's current price and stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        product_id: &str,
        size: Option<String>,
        quantity: u32,
    ) -> Result<ClientCartLine, ServiceError> {
        let product = self
            .catalog
            .fetch_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let line = ClientCartLine::new(product_id, size, quantity, product.price, Some(product.stock));
        let added = lock(&self.store).add(line)?.clone();
        self.after_mutation();
        Ok(added)
    }

    /// Sets a line's quantity; `0` removes it
    pub fn set_quantity(&self, uid: &str, quantity: u32) -> Result<(), ServiceError> {
        lock(&self.store).set_quantity(uid, quantity)?;
        self.after_mutation();
        Ok(())
    }

    pub fn remove(&self, product_id: &str, size: Option<&str>) -> bool {
        let removed = lock(&self.store).remove(&line_uid(product_id, size));
        if removed {
            self.after_mutation();
        }
        removed
    }

    pub fn clear(&self) {
        lock(&self.store).clear();
        self.after_mutation();
    }

    /// Writes any pending change now
    pub async fn flush(&self) {
        self.scheduler.flush().await;
        self.scheduler.wait_idle().await;
    }

    async fn refresh_availability(&self, lines: Vec<ClientCartLine>) -> Vec<ClientCartLine> {
        let mut kept = Vec::with_capacity(lines.len());
        for mut line in lines {
            match self.catalog.fetch_product(&line.product_id).await {
                Ok(Some(product)) if product.stock == 0 => {
                    info!(product_id = %line.product_id, "Dropping out-of-stock cart line");
                }
                Ok(Some(product)) => {
                    if line.quantity > product.stock {
                        info!(
                            product_id = %line.product_id,
                            from = line.quantity,
                            to = product.stock,
                            "Clamping cart line to stock"
                        );
                        line.quantity = product.stock;
                    }
                    line.available_qty = Some(product.stock);
                    kept.push(line);
                }
                Ok(None) => {
                    info!(product_id = %line.product_id, "Dropping cart line for unknown product");
                }
                Err(e) => {
                    warn!(product_id = %line.product_id, error = %e, "Stock refresh failed; keeping line");
                    kept.push(line);
                }
            }
        }
        kept
    }

    fn after_mutation(&self) {
        if lock(&self.store).is_empty() {
            self.scheduler.cancel_pending();
        } else {
            self.schedule_persist();
        }
    }

    fn schedule_persist(&self) {
        let CartOwner::User(user_id) = &self.owner else {
            return;
        };
        let user_id = user_id.clone();
        let store = self.store.clone();
        let backend = self.backend.clone();
        self.scheduler.schedule(move || {
            async move {
                let items = snapshot(&store);
                backend.save(&user_id, items).await
            }
            .boxed()
        });
    }
}

fn lock(store: &Mutex<CartStore>) -> MutexGuard<'_, CartStore> {
    store.lock().unwrap_or_else(|p| p.into_inner())
}

fn snapshot(store: &Mutex<CartStore>) -> Vec<CartLine> {
    lock(store).to_server_lines()
}
