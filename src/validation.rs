//! Request validators. Each returns the first failing field as
//! [`AppError::Validation`], so callers see one field-keyed message at a time.

use std::collections::HashSet;

use crate::{
    dto::recipes::{CreateRecipeRequest, IngredientAmount, UpdateRecipeRequest},
    error::{AppError, AppResult},
};

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const NAME_MAX_LENGTH: usize = 200;

pub fn validate_ingredients(ingredients: &[IngredientAmount]) -> AppResult<()> {
    if ingredients.is_empty() {
        return Err(AppError::field(
            "ingredients",
            "at least one ingredient is required",
        ));
    }
    let mut seen = HashSet::new();
    for ingredient in ingredients {
        if !seen.insert(ingredient.id) {
            return Err(AppError::field("ingredients", "ingredients must be unique"));
        }
        if ingredient.amount <= 0 {
            return Err(AppError::field(
                "amount",
                "ingredient amount must be greater than 0",
            ));
        }
    }
    Ok(())
}

pub fn validate_tags(tags: &[i64]) -> AppResult<()> {
    if tags.is_empty() {
        return Err(AppError::field("tags", "at least one tag is required"));
    }
    let mut seen = HashSet::new();
    if tags.iter().any(|id| !seen.insert(*id)) {
        return Err(AppError::field("tags", "tags must be unique"));
    }
    Ok(())
}

pub fn validate_cooking_time(cooking_time: i32) -> AppResult<()> {
    if cooking_time <= 0 {
        return Err(AppError::field(
            "cooking_time",
            "cooking time must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::field("name", "name must not be empty"));
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(AppError::field(
            "name",
            format!("name must be at most {NAME_MAX_LENGTH} characters"),
        ));
    }
    Ok(())
}

fn validate_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::field("text", "text must not be empty"));
    }
    Ok(())
}

pub fn validate_create_recipe(payload: &CreateRecipeRequest) -> AppResult<()> {
    validate_ingredients(&payload.ingredients)?;
    validate_tags(&payload.tags)?;
    validate_cooking_time(payload.cooking_time)?;
    validate_name(&payload.name)?;
    validate_text(&payload.text)
}

pub fn validate_update_recipe(payload: &UpdateRecipeRequest) -> AppResult<()> {
    validate_ingredients(&payload.ingredients)?;
    validate_tags(&payload.tags)?;
    if let Some(cooking_time) = payload.cooking_time {
        validate_cooking_time(cooking_time)?;
    }
    if let Some(name) = payload.name.as_deref() {
        validate_name(name)?;
    }
    if let Some(text) = payload.text.as_deref() {
        validate_text(text)?;
    }
    Ok(())
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::field("username", "username must not be empty"));
    }
    if username == "me" {
        return Err(AppError::field("username", "\"me\" is not a valid username"));
    }
    if username.chars().count() > USERNAME_MAX_LENGTH {
        return Err(AppError::field(
            "username",
            format!("username must be at most {USERNAME_MAX_LENGTH} characters"),
        ));
    }
    let mut invalid: Vec<char> = username
        .chars()
        .filter(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')))
        .collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        let symbols: String = invalid.into_iter().collect();
        return Err(AppError::field(
            "username",
            format!("invalid characters: {symbols}"),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
        .unwrap_or(false);
    if !valid {
        return Err(AppError::field("email", "enter a valid email address"));
    }
    Ok(())
}

pub fn validate_password(field: &str, password: &str) -> AppResult<()> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(AppError::field(
            field,
            format!("password must be at least {PASSWORD_MIN_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Tag slugs are restricted to `[-a-zA-Z0-9_]`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
