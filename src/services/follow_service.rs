use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Query,
};

use crate::{
    audit,
    db::DbPool,
    dto::users::SubscriptionList,
    entity::{
        follows::{ActiveModel as FollowActive, Column as FollowCol, Entity as Follows},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult, is_orm_unique_violation},
    middleware::auth::AuthUser,
    models::{RecipeShort, Subscription},
    response::{ApiResponse, Meta},
    routes::params::SubscriptionQuery,
    services::user_service::user_from_entity,
    state::AppState,
};

#[derive(sqlx::FromRow)]
struct AuthorRecipeRow {
    author_id: i64,
    id: i64,
    name: String,
    image: Option<String>,
    cooking_time: i32,
}

/// Build subscription entries for `authors`, with up to `recipes_limit`
/// newest recipes each. A negative limit means no cap. The cap is applied
/// per author in SQL.
pub async fn subscriptions_for(
    pool: &DbPool,
    authors: Vec<UserModel>,
    recipes_limit: Option<i64>,
) -> AppResult<Vec<Subscription>> {
    let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
    let cap = recipes_limit.filter(|limit| *limit >= 0);

    let mut by_author: HashMap<i64, Vec<RecipeShort>> = HashMap::new();
    let mut counts: HashMap<i64, i64> = HashMap::new();
    if !ids.is_empty() {
        let rows = sqlx::query_as::<_, AuthorRecipeRow>(
            r#"
            SELECT author_id, id, name, image, cooking_time
            FROM (
                SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                       ROW_NUMBER() OVER (
                           PARTITION BY r.author_id
                           ORDER BY r.created_at DESC, r.id DESC
                       ) AS position
                FROM recipes r
                WHERE r.author_id = ANY($1)
            ) ranked
            WHERE $2::BIGINT IS NULL OR position <= $2
            ORDER BY author_id, position
            "#,
        )
        .bind(&ids)
        .bind(cap)
        .fetch_all(pool)
        .await?;
        for row in rows {
            by_author.entry(row.author_id).or_default().push(RecipeShort {
                id: row.id,
                name: row.name,
                image: row.image,
                cooking_time: row.cooking_time,
            });
        }

        let totals: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;
        counts.extend(totals);
    }

    Ok(authors
        .into_iter()
        .map(|author| Subscription {
            recipes: by_author.remove(&author.id).unwrap_or_default(),
            recipes_count: counts.get(&author.id).copied().unwrap_or(0),
            author: user_from_entity(author, true),
        })
        .collect())
}

pub async fn subscribe(
    state: &AppState,
    user: &AuthUser,
    author_id: i64,
    recipes_limit: Option<i64>,
) -> AppResult<ApiResponse<Subscription>> {
    let author = Users::find_by_id(author_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if author.id == user.user_id {
        return Err(AppError::BadRequest(
            "you cannot subscribe to yourself".into(),
        ));
    }

    let existing = Follows::find()
        .filter(FollowCol::UserId.eq(user.user_id))
        .filter(FollowCol::AuthorId.eq(author.id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("already subscribed to this author".into()));
    }

    let active = FollowActive {
        id: NotSet,
        user_id: Set(user.user_id),
        author_id: Set(author.id),
        created_at: NotSet,
    };
    match active.insert(&state.orm).await {
        Ok(_) => {}
        Err(err) if is_orm_unique_violation(&err) => {
            return Err(AppError::BadRequest("already subscribed to this author".into()));
        }
        Err(err) => return Err(err.into()),
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "subscribe",
        "follows",
        serde_json::json!({ "author_id": author_id }),
    )
    .await;

    let mut entries = subscriptions_for(&state.pool, vec![author], recipes_limit).await?;
    let subscription = entries
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("subscription entry missing")))?;

    Ok(ApiResponse::success(
        "Subscribed",
        subscription,
        Some(Meta::empty()),
    ))
}

pub async fn unsubscribe(
    state: &AppState,
    user: &AuthUser,
    author_id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Follows::delete_many()
        .filter(FollowCol::UserId.eq(user.user_id))
        .filter(FollowCol::AuthorId.eq(author_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "unsubscribe",
        "follows",
        serde_json::json!({ "author_id": author_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Unsubscribed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_subscriptions(
    state: &AppState,
    user: &AuthUser,
    query: SubscriptionQuery,
) -> AppResult<ApiResponse<SubscriptionList>> {
    let (page, limit, offset) = query.pagination().normalize(state.config.page_size);

    let followed = Query::select()
        .column(FollowCol::AuthorId)
        .from(Follows)
        .and_where(FollowCol::UserId.eq(user.user_id))
        .to_owned();
    let finder = Users::find()
        .filter(UserCol::Id.in_subquery(followed))
        .order_by_asc(UserCol::Username);

    let total = finder.clone().count(&state.orm).await? as i64;
    let authors = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = subscriptions_for(&state.pool, authors, query.recipes_limit).await?;

    Ok(ApiResponse::success(
        "Subscriptions",
        SubscriptionList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
