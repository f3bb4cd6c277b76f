//! Cart to orders transfer.
//!
//! There is no transaction over the document store, so the commit unit is a
//! single cart item: every order create runs concurrently and independently,
//! then the cart items whose orders exist are deleted, again concurrently.
//! The caller gets an explicit partition of what moved and what did not.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use mealcart_core::{CartItem, OrderId, OrderItem, OwnerId, QueryKey};

use crate::cache::QueryCache;
use crate::error::{ErrorKind, Result, SyncError};
use crate::gateway::Gateways;
use crate::mapper;
use crate::membership::SharedIndex;

/// Where a cart item's transfer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferStage {
    /// The order was never created; the item is still only in the cart.
    OrderCreate,
    /// The order exists but the cart item could not be deleted.
    CartRemoval,
}

/// A cart item that became an order and left the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    pub cart_item: CartItem,
    pub order: OrderItem,
}

/// A cart item whose transfer did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub cart_item: CartItem,
    pub stage: TransferStage,
    /// The order, when it was created before the failure.
    pub order: Option<OrderItem>,
    pub error: SyncError,
}

impl TransferFailure {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Per-item outcome of a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub transferred: Vec<Transferred>,
    pub failed: Vec<TransferFailure>,
}

impl TransferReport {
    /// Whether every cart item moved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures at the given stage.
    pub fn failed_at(&self, stage: TransferStage) -> impl Iterator<Item = &TransferFailure> {
        self.failed.iter().filter(move |f| f.stage == stage)
    }

    /// One-line summary of the failures, if any.
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let creates = self.failed_at(TransferStage::OrderCreate).count();
        let removals = self.failed_at(TransferStage::CartRemoval).count();
        Some(format!(
            "{} of {} cart items not transferred ({creates} order creates failed, {removals} cart removals failed)",
            self.failed.len(),
            self.failed.len() + self.transferred.len(),
        ))
    }
}

/// Moves a user's cart into orders.
#[derive(Clone)]
pub struct TransferOrchestrator {
    gateways: Gateways,
    cache: QueryCache,
    cart_index: SharedIndex,
}

impl TransferOrchestrator {
    #[must_use]
    pub const fn new(gateways: Gateways, cache: QueryCache, cart_index: SharedIndex) -> Self {
        Self {
            gateways,
            cache,
            cart_index,
        }
    }

    /// Convert every item in `owner`'s cart into an order.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EmptyCart` if the cart has no items (nothing is
    /// created), or `SyncError::StoreUnavailable` if the cart cannot be
    /// listed. Per-item failures are reported in the [`TransferReport`].
    #[instrument(skip(self))]
    pub async fn transfer(&self, owner: &OwnerId) -> Result<TransferReport> {
        let cart = self.gateways.of::<CartItem>();
        let orders = self.gateways.of::<OrderItem>();

        let items = cart.list_owned(owner).await?.records;
        if items.is_empty() {
            info!("Cart is empty, nothing to transfer");
            return Err(SyncError::EmptyCart);
        }

        let created = join_all(items.into_iter().map(|item| {
            let orders = &orders;
            async move {
                let id = OrderId::generate();
                let result = orders.create(id.as_str(), mapper::order_fields(&item)).await;
                (item, result)
            }
        }))
        .await;

        let mut report = TransferReport::default();
        let mut placed = Vec::new();
        for (item, result) in created {
            match result {
                Ok(order) => placed.push((item, order)),
                Err(error) => {
                    warn!(cart_item = %item.id, error = %error, "Order create failed");
                    report.failed.push(TransferFailure {
                        cart_item: item,
                        stage: TransferStage::OrderCreate,
                        order: None,
                        error,
                    });
                }
            }
        }

        let removed = join_all(placed.into_iter().map(|(item, order)| {
            let cart = &cart;
            async move {
                let result = cart.remove(item.id.as_str()).await;
                (item, order, result)
            }
        }))
        .await;

        self.cache.mark_stale(QueryKey::CartList, Some(owner));
        self.cache.mark_stale(QueryKey::OrdersList, Some(owner));

        for (item, order, result) in removed {
            match result {
                Ok(()) => {
                    self.cart_index.set(item.meal_id.clone(), false);
                    report.transferred.push(Transferred {
                        cart_item: item,
                        order,
                    });
                }
                Err(error) => {
                    warn!(
                        cart_item = %item.id,
                        order = %order.id,
                        error = %error,
                        "Cart removal failed, item is now in both cart and orders"
                    );
                    report.failed.push(TransferFailure {
                        cart_item: item,
                        stage: TransferStage::CartRemoval,
                        order: Some(order),
                        error,
                    });
                }
            }
        }

        info!(
            transferred = report.transferred.len(),
            failed = report.failed.len(),
            "Transfer finished"
        );
        Ok(report)
    }
}
