//! Catalog commands.

use mealcart_core::{MealId, NewMeal};
use mealcart_sync::Storefront;

/// List the catalog, marking favorites (`*`) and cart items (`+`).
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn list(storefront: &Storefront, newest: bool) -> Result<(), Box<dyn std::error::Error>> {
    let meals = if newest {
        storefront.newest_meals().await?
    } else {
        let snapshot = storefront.meals().await?;
        super::warn_if_stale(&snapshot);
        snapshot.items.to_vec()
    };

    if meals.is_empty() {
        println!("No meals.");
        return Ok(());
    }

    for meal in &meals {
        let favorite = if storefront.is_favorite(&meal.id) { '*' } else { ' ' };
        let in_cart = if storefront.is_in_cart(&meal.id) { '+' } else { ' ' };
        println!(
            "{favorite}{in_cart} {:<38} {:>8}  {}{}",
            meal.id,
            meal.price,
            meal.name,
            meal.category
                .as_deref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Add a meal to the catalog.
///
/// # Errors
///
/// Returns an error if the meal cannot be created.
pub async fn create(storefront: &Storefront, meal: &NewMeal) -> Result<(), Box<dyn std::error::Error>> {
    let created = storefront.create_meal(meal).await?;
    println!("Created meal {} ({})", created.id, created.name);
    Ok(())
}

/// Remove a meal from the catalog.
///
/// # Errors
///
/// Returns an error if the meal does not exist or cannot be deleted.
pub async fn delete(storefront: &Storefront, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    storefront.delete_meal(&MealId::new(id)).await?;
    println!("Deleted meal {id}");
    Ok(())
}
