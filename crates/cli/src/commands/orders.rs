//! Checkout and order commands.

use mealcart_sync::{Storefront, TransferStage};
use tracing::warn;

/// Turn the current user's cart into orders.
///
/// # Errors
///
/// Returns an error if the cart is empty or cannot be read, or if any item
/// failed to transfer.
pub async fn checkout(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    let report = storefront.transfer_cart_to_orders().await?;

    for moved in &report.transferred {
        println!("Ordered {} as {}", moved.cart_item.name, moved.order.id);
    }
    for failure in &report.failed {
        match failure.stage {
            TransferStage::OrderCreate => {
                println!("Not ordered: {} ({})", failure.cart_item.name, failure.error);
            }
            TransferStage::CartRemoval => {
                warn!(cart_item = %failure.cart_item.id, "Ordered but still in cart");
                println!(
                    "Ordered {} but it is still in the cart ({})",
                    failure.cart_item.name, failure.error
                );
            }
        }
    }

    match report.failure_summary() {
        Some(summary) => Err(summary.into()),
        None => Ok(()),
    }
}

/// List the current user's orders.
///
/// # Errors
///
/// Returns an error if nobody is signed in or the list cannot be fetched.
pub async fn list(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    let user = storefront.current_user().await?;
    let orders = storefront.orders_of(&user.id).await?;
    super::warn_if_stale(&orders);

    if orders.is_empty() {
        println!("No orders.");
    }
    for order in &*orders.items {
        println!(
            "{:<38} {:>8}  {}  {}",
            order.id,
            order.price,
            order.name,
            order.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
