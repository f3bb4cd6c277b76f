//! Cart commands.

use mealcart_core::{CartItemId, MealId};
use mealcart_sync::Storefront;

/// List the current user's cart.
///
/// # Errors
///
/// Returns an error if nobody is signed in or the list cannot be fetched.
pub async fn list(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    let user = storefront.current_user().await?;
    let cart = storefront.cart_of(&user.id).await?;
    super::warn_if_stale(&cart);

    if cart.is_empty() {
        println!("Cart is empty.");
    }
    for item in &*cart.items {
        println!("{:<38} {:>8}  {} (meal {})", item.id, item.price, item.name, item.meal_id);
    }
    Ok(())
}

/// Add a meal to the cart, or take it out.
///
/// # Errors
///
/// Returns an error if the toggle was rolled back.
pub async fn toggle(storefront: &Storefront, meal: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = storefront.toggle_cart(&MealId::new(meal)).await?;
    if outcome.is_member() {
        println!("Meal {meal} is in the cart");
    } else {
        println!("Meal {meal} was taken out of the cart");
    }
    Ok(())
}

/// Remove a cart item by id.
///
/// # Errors
///
/// Returns an error if the item does not exist or cannot be deleted.
pub async fn remove(storefront: &Storefront, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = storefront.remove_from_cart(&CartItemId::new(id)).await?;
    println!("Removed cart item {id} (meal {})", outcome.meal_id);
    Ok(())
}

/// Show item count and total.
///
/// # Errors
///
/// Returns an error if nobody is signed in or the cart cannot be fetched.
pub async fn total(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    let total = storefront.cart_total().await?;
    println!("{} items, {}", total.items, total.total);
    Ok(())
}
