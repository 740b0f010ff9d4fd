use std::collections::{HashMap, HashSet};

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{LockType, Query},
};

use crate::{
    audit,
    dto::recipes::{CreateRecipeRequest, IngredientAmount, RecipeList, UpdateRecipeRequest},
    entity::{
        favorites::{Column as FavoriteCol, Entity as Favorites},
        ingredients::{Column as IngredientCol, Entity as Ingredients},
        recipe_ingredients::{
            ActiveModel as RecipeIngredientActive, Column as RecipeIngredientCol,
            Entity as RecipeIngredients,
        },
        recipe_tags::{ActiveModel as RecipeTagActive, Column as RecipeTagCol, Entity as RecipeTags},
        recipes::{ActiveModel as RecipeActive, Column as RecipeCol, Entity as Recipes, Model as RecipeModel},
        shopping_carts::{Column as CartCol, Entity as ShoppingCarts},
        tags::{Column as TagCol, Entity as Tags},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser, ensure_owner},
    models::{Recipe, RecipeIngredient, Tag},
    response::{ApiResponse, Meta},
    routes::params::RecipeQuery,
    services::{
        catalog_service::tag_from_entity,
        user_service::{subscribed_authors, user_from_entity},
    },
    state::AppState,
    validation::{validate_create_recipe, validate_update_recipe},
};

/// Resolved recipe filters. User-scoped filters are only present when the
/// request is authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i64>,
    pub tags: Vec<String>,
    pub favorited_by: Option<i64>,
    pub in_cart_of: Option<i64>,
}

impl RecipeFilter {
    pub fn from_query(query: &RecipeQuery, viewer: Option<i64>) -> Self {
        let tags = query
            .tags
            .iter()
            .map(|slug| slug.trim())
            .filter(|slug| !slug.is_empty())
            .map(str::to_owned)
            .collect();
        Self {
            author: query.author,
            tags,
            favorited_by: viewer.filter(|_| query.is_favorited()),
            in_cart_of: viewer.filter(|_| query.is_in_shopping_cart()),
        }
    }

    pub fn condition(&self) -> Condition {
        let mut condition = Condition::all();

        if let Some(author) = self.author {
            condition = condition.add(RecipeCol::AuthorId.eq(author));
        }

        if !self.tags.is_empty() {
            let tag_ids = Query::select()
                .column(TagCol::Id)
                .from(Tags)
                .and_where(TagCol::Slug.is_in(self.tags.clone()))
                .to_owned();
            let tagged = Query::select()
                .column(RecipeTagCol::RecipeId)
                .from(RecipeTags)
                .and_where(RecipeTagCol::TagId.in_subquery(tag_ids))
                .to_owned();
            condition = condition.add(RecipeCol::Id.in_subquery(tagged));
        }

        if let Some(user_id) = self.favorited_by {
            let favorited = Query::select()
                .column(FavoriteCol::RecipeId)
                .from(Favorites)
                .and_where(FavoriteCol::UserId.eq(user_id))
                .to_owned();
            condition = condition.add(RecipeCol::Id.in_subquery(favorited));
        }

        if let Some(user_id) = self.in_cart_of {
            let in_cart = Query::select()
                .column(CartCol::RecipeId)
                .from(ShoppingCarts)
                .and_where(CartCol::UserId.eq(user_id))
                .to_owned();
            condition = condition.add(RecipeCol::Id.in_subquery(in_cart));
        }

        condition
    }
}

/// Build full representations for a page of recipes with one query per
/// relation instead of one per recipe.
pub async fn represent<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    recipes: Vec<RecipeModel>,
) -> AppResult<Vec<Recipe>> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let author_ids: Vec<i64> = recipes
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let authors: HashMap<i64, _> = Users::find()
        .filter(UserCol::Id.is_in(author_ids.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let subscribed = subscribed_authors(conn, viewer, &author_ids).await?;

    let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
    for (link, tag) in RecipeTags::find()
        .filter(RecipeTagCol::RecipeId.is_in(ids.clone()))
        .find_also_related(Tags)
        .all(conn)
        .await?
    {
        if let Some(tag) = tag {
            tags.entry(link.recipe_id)
                .or_default()
                .push(tag_from_entity(tag));
        }
    }

    let mut ingredients: HashMap<i64, Vec<RecipeIngredient>> = HashMap::new();
    for (link, ingredient) in RecipeIngredients::find()
        .filter(RecipeIngredientCol::RecipeId.is_in(ids.clone()))
        .order_by_asc(RecipeIngredientCol::Id)
        .find_also_related(Ingredients)
        .all(conn)
        .await?
    {
        if let Some(ingredient) = ingredient {
            ingredients
                .entry(link.recipe_id)
                .or_default()
                .push(RecipeIngredient {
                    id: ingredient.id,
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount: link.amount,
                });
        }
    }

    let (favorited, in_cart): (HashSet<i64>, HashSet<i64>) = match viewer {
        Some(user_id) => {
            let favorited = Favorites::find()
                .filter(FavoriteCol::UserId.eq(user_id))
                .filter(FavoriteCol::RecipeId.is_in(ids.clone()))
                .all(conn)
                .await?
                .into_iter()
                .map(|f| f.recipe_id)
                .collect();
            let in_cart = ShoppingCarts::find()
                .filter(CartCol::UserId.eq(user_id))
                .filter(CartCol::RecipeId.is_in(ids.clone()))
                .all(conn)
                .await?
                .into_iter()
                .map(|c| c.recipe_id)
                .collect();
            (favorited, in_cart)
        }
        None => (HashSet::new(), HashSet::new()),
    };

    recipes
        .into_iter()
        .map(|recipe| -> AppResult<Recipe> {
            let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("author {} missing", recipe.author_id))
            })?;
            let is_subscribed = subscribed.contains(&author.id);
            let mut recipe_tags = tags.remove(&recipe.id).unwrap_or_default();
            recipe_tags.sort_by_key(|t| t.id);
            Ok(Recipe {
                id: recipe.id,
                author: user_from_entity(author, is_subscribed),
                name: recipe.name,
                image: recipe.image,
                text: recipe.text,
                ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
                tags: recipe_tags,
                cooking_time: recipe.cooking_time,
                is_favorited: favorited.contains(&recipe.id),
                is_in_shopping_cart: in_cart.contains(&recipe.id),
            })
        })
        .collect()
}

async fn represent_one<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    recipe: RecipeModel,
) -> AppResult<Recipe> {
    represent(conn, viewer, vec![recipe])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("recipe representation missing")))
}

pub async fn list_recipes(
    state: &AppState,
    viewer: MaybeAuthUser,
    query: RecipeQuery,
) -> AppResult<ApiResponse<RecipeList>> {
    let (page, limit, offset) = query.pagination().normalize(state.config.page_size);
    let filter = RecipeFilter::from_query(&query, viewer.user_id());

    let finder = Recipes::find()
        .filter(filter.condition())
        .order_by_desc(RecipeCol::CreatedAt)
        .order_by_desc(RecipeCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = represent(&state.orm, viewer.user_id(), models).await?;
    Ok(ApiResponse::success(
        "Recipes",
        RecipeList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_recipe(
    state: &AppState,
    viewer: MaybeAuthUser,
    id: i64,
) -> AppResult<ApiResponse<Recipe>> {
    let model = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let recipe = represent_one(&state.orm, viewer.user_id(), model).await?;
    Ok(ApiResponse::success("Recipe", recipe, None))
}

async fn ensure_ingredients_exist(
    txn: &DatabaseTransaction,
    ingredients: &[IngredientAmount],
) -> AppResult<()> {
    let ids: Vec<i64> = ingredients.iter().map(|i| i.id).collect();
    let found: HashSet<i64> = Ingredients::find()
        .filter(IngredientCol::Id.is_in(ids.clone()))
        .all(txn)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(AppError::field(
            "ingredients",
            format!("ingredient {missing} does not exist"),
        ));
    }
    Ok(())
}

async fn ensure_tags_exist(txn: &DatabaseTransaction, tags: &[i64]) -> AppResult<()> {
    let found: HashSet<i64> = Tags::find()
        .filter(TagCol::Id.is_in(tags.to_vec()))
        .all(txn)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    if let Some(missing) = tags.iter().find(|id| !found.contains(id)) {
        return Err(AppError::field("tags", format!("tag {missing} does not exist")));
    }
    Ok(())
}

/// Insert the junction rows for `recipe_id`. Callers clear old rows first.
async fn write_relations(
    txn: &DatabaseTransaction,
    recipe_id: i64,
    ingredients: &[IngredientAmount],
    tags: &[i64],
) -> AppResult<()> {
    RecipeTags::insert_many(tags.iter().map(|tag_id| RecipeTagActive {
        recipe_id: Set(recipe_id),
        tag_id: Set(*tag_id),
    }))
    .exec_without_returning(txn)
    .await?;

    RecipeIngredients::insert_many(ingredients.iter().map(|ingredient| {
        RecipeIngredientActive {
            id: NotSet,
            recipe_id: Set(recipe_id),
            ingredient_id: Set(ingredient.id),
            amount: Set(ingredient.amount),
        }
    }))
    .exec_without_returning(txn)
    .await?;

    Ok(())
}

pub async fn create_recipe(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    validate_create_recipe(&payload)?;

    let txn = state.orm.begin().await?;
    ensure_ingredients_exist(&txn, &payload.ingredients).await?;
    ensure_tags_exist(&txn, &payload.tags).await?;

    let recipe = RecipeActive {
        id: NotSet,
        author_id: Set(user.user_id),
        name: Set(payload.name.trim().to_string()),
        text: Set(payload.text),
        image: Set(payload.image),
        cooking_time: Set(payload.cooking_time),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    write_relations(&txn, recipe.id, &payload.ingredients, &payload.tags).await?;
    txn.commit().await?;

    tracing::info!(recipe_id = recipe.id, author_id = user.user_id, "recipe created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_create",
        "recipes",
        serde_json::json!({ "recipe_id": recipe.id }),
    )
    .await;

    let data = represent_one(&state.orm, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Recipe created", data, Some(Meta::empty())))
}

pub async fn update_recipe(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    let txn = state.orm.begin().await?;

    let existing = Recipes::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_owner(user, existing.author_id)?;
    validate_update_recipe(&payload)?;

    ensure_ingredients_exist(&txn, &payload.ingredients).await?;
    ensure_tags_exist(&txn, &payload.tags).await?;

    RecipeTags::delete_many()
        .filter(RecipeTagCol::RecipeId.eq(id))
        .exec(&txn)
        .await?;
    RecipeIngredients::delete_many()
        .filter(RecipeIngredientCol::RecipeId.eq(id))
        .exec(&txn)
        .await?;
    write_relations(&txn, id, &payload.ingredients, &payload.tags).await?;

    let mut changed = false;
    let mut active: RecipeActive = existing.clone().into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
        changed = true;
    }
    if let Some(text) = payload.text {
        active.text = Set(text);
        changed = true;
    }
    if let Some(image) = payload.image {
        active.image = Set(Some(image));
        changed = true;
    }
    if let Some(cooking_time) = payload.cooking_time {
        active.cooking_time = Set(cooking_time);
        changed = true;
    }
    let recipe = if changed {
        active.update(&txn).await?
    } else {
        existing
    };

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_update",
        "recipes",
        serde_json::json!({ "recipe_id": id }),
    )
    .await;

    let data = represent_one(&state.orm, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Updated", data, Some(Meta::empty())))
}

pub async fn delete_recipe(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_owner(user, existing.author_id)?;

    Recipes::delete_by_id(id).exec(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_delete",
        "recipes",
        serde_json::json!({ "recipe_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
