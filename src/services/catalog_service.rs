use sea_orm::{
    EntityTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, extension::postgres::PgExpr},
};

use crate::{
    dto::catalog::{IngredientList, TagList},
    entity::{
        ingredients::{Column as IngredientCol, Entity as Ingredients, Model as IngredientModel},
        tags::{Column as TagCol, Entity as Tags, Model as TagModel},
    },
    error::{AppError, AppResult},
    models::{Ingredient, Tag},
    response::ApiResponse,
};

pub fn tag_from_entity(model: TagModel) -> Tag {
    Tag {
        id: model.id,
        name: model.name,
        color: model.color,
        slug: model.slug,
    }
}

pub fn ingredient_from_entity(model: IngredientModel) -> Ingredient {
    Ingredient {
        id: model.id,
        name: model.name,
        measurement_unit: model.measurement_unit,
    }
}

/// `LIKE` pattern matching names that start with `prefix` literally.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn list_tags(orm: &sea_orm::DatabaseConnection) -> AppResult<ApiResponse<TagList>> {
    let items = Tags::find()
        .order_by_asc(TagCol::Id)
        .all(orm)
        .await?
        .into_iter()
        .map(tag_from_entity)
        .collect();
    Ok(ApiResponse::success("Tags", TagList { items }, None))
}

pub async fn get_tag(orm: &sea_orm::DatabaseConnection, id: i64) -> AppResult<ApiResponse<Tag>> {
    let tag = Tags::find_by_id(id)
        .one(orm)
        .await?
        .map(tag_from_entity)
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Tag", tag, None))
}

pub async fn list_ingredients(
    orm: &sea_orm::DatabaseConnection,
    name: Option<&str>,
) -> AppResult<ApiResponse<IngredientList>> {
    let mut finder = Ingredients::find();
    if let Some(prefix) = name.map(str::trim).filter(|s| !s.is_empty()) {
        finder = finder.filter(Expr::col(IngredientCol::Name).ilike(prefix_pattern(prefix)));
    }
    let items = finder
        .order_by_asc(IngredientCol::Name)
        .order_by_asc(IngredientCol::Id)
        .all(orm)
        .await?
        .into_iter()
        .map(ingredient_from_entity)
        .collect();
    Ok(ApiResponse::success("Ingredients", IngredientList { items }, None))
}

pub async fn get_ingredient(
    orm: &sea_orm::DatabaseConnection,
    id: i64,
) -> AppResult<ApiResponse<Ingredient>> {
    let ingredient = Ingredients::find_by_id(id)
        .one(orm)
        .await?
        .map(ingredient_from_entity)
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Ingredient", ingredient, None))
}
