//! Favorites and the shopping cart share one contract: a unique
//! `(user, recipe)` marker that can be added once and removed once.

use crate::{
    audit,
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::RecipeShort,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Favorite,
    ShoppingCart,
}

impl Membership {
    pub fn table(self) -> &'static str {
        match self {
            Membership::Favorite => "favorites",
            Membership::ShoppingCart => "shopping_carts",
        }
    }

    pub fn already_member_message(self) -> &'static str {
        match self {
            Membership::Favorite => "recipe is already in favorites",
            Membership::ShoppingCart => "recipe is already in the shopping cart",
        }
    }

    fn added_message(self) -> &'static str {
        match self {
            Membership::Favorite => "Added to favorites",
            Membership::ShoppingCart => "Added to shopping cart",
        }
    }

    fn removed_message(self) -> &'static str {
        match self {
            Membership::Favorite => "Removed from favorites",
            Membership::ShoppingCart => "Removed from shopping cart",
        }
    }

    fn audit_action(self, added: bool) -> &'static str {
        match (self, added) {
            (Membership::Favorite, true) => "favorite_add",
            (Membership::Favorite, false) => "favorite_remove",
            (Membership::ShoppingCart, true) => "cart_add",
            (Membership::ShoppingCart, false) => "cart_remove",
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecipeShortRow {
    id: i64,
    name: String,
    image: Option<String>,
    cooking_time: i32,
}

pub async fn add(
    state: &AppState,
    user: &AuthUser,
    kind: Membership,
    recipe_id: i64,
) -> AppResult<ApiResponse<RecipeShort>> {
    let recipe = sqlx::query_as::<_, RecipeShortRow>(
        "SELECT id, name, image, cooking_time FROM recipes WHERE id = $1",
    )
    .bind(recipe_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound)?;

    let existing: Option<(i64,)> = sqlx::query_as(&format!(
        "SELECT id FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user.user_id)
    .bind(recipe_id)
    .fetch_optional(&state.pool)
    .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest(kind.already_member_message().into()));
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
        kind.table()
    ))
    .bind(user.user_id)
    .bind(recipe_id)
    .execute(&state.pool)
    .await;

    match inserted {
        Ok(_) => {}
        // lost a race against a concurrent add
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::BadRequest(kind.already_member_message().into()));
        }
        Err(err) => return Err(err.into()),
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        kind.audit_action(true),
        kind.table(),
        serde_json::json!({ "recipe_id": recipe_id }),
    )
    .await;

    let data = RecipeShort {
        id: recipe.id,
        name: recipe.name,
        image: recipe.image,
        cooking_time: recipe.cooking_time,
    };
    Ok(ApiResponse::success(
        kind.added_message(),
        data,
        Some(Meta::empty()),
    ))
}

pub async fn remove(
    state: &AppState,
    user: &AuthUser,
    kind: Membership,
    recipe_id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user.user_id)
    .bind(recipe_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        kind.audit_action(false),
        kind.table(),
        serde_json::json!({ "recipe_id": recipe_id }),
    )
    .await;

    Ok(ApiResponse::success(
        kind.removed_message(),
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
