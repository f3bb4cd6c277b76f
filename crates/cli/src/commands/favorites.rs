//! Favorites commands.

use mealcart_core::{FavoriteId, MealId};
use mealcart_sync::Storefront;

/// List the current user's favorites.
///
/// # Errors
///
/// Returns an error if nobody is signed in or the list cannot be fetched.
pub async fn list(storefront: &Storefront) -> Result<(), Box<dyn std::error::Error>> {
    let user = storefront.current_user().await?;
    let favorites = storefront.favorites_of(&user.id).await?;
    super::warn_if_stale(&favorites);

    if favorites.is_empty() {
        println!("No favorites.");
    }
    for item in &*favorites.items {
        println!("{:<38} {:>8}  {} (meal {})", item.id, item.price, item.name, item.meal_id);
    }
    Ok(())
}

/// Favorite a meal, or unfavorite it.
///
/// # Errors
///
/// Returns an error if the toggle was rolled back.
pub async fn toggle(storefront: &Storefront, meal: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = storefront.toggle_favorite(&MealId::new(meal)).await?;
    if outcome.is_member() {
        println!("Meal {meal} is a favorite");
    } else {
        println!("Meal {meal} is no longer a favorite");
    }
    Ok(())
}

/// Remove a favorite by id.
///
/// # Errors
///
/// Returns an error if the favorite does not exist or cannot be deleted.
pub async fn remove(storefront: &Storefront, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = storefront.remove_favorite(&FavoriteId::new(id)).await?;
    println!("Removed favorite {id} (meal {})", outcome.meal_id);
    Ok(())
}
