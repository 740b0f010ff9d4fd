use std::collections::HashSet;

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use crate::{
    dto::users::UserList,
    entity::{
        follows::{Column as FollowCol, Entity as Follows},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub fn user_from_entity(model: UserModel, is_subscribed: bool) -> User {
    User {
        id: model.id,
        email: model.email,
        username: model.username,
        first_name: model.first_name,
        last_name: model.last_name,
        is_subscribed,
    }
}

/// Which of `author_ids` the viewer follows. Empty for anonymous viewers.
pub async fn subscribed_authors<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    author_ids: &[i64],
) -> AppResult<HashSet<i64>> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let follows = Follows::find()
        .filter(FollowCol::UserId.eq(viewer))
        .filter(FollowCol::AuthorId.is_in(author_ids.iter().copied()))
        .all(conn)
        .await?;
    Ok(follows.into_iter().map(|f| f.author_id).collect())
}

pub async fn list_users(
    state: &AppState,
    viewer: MaybeAuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    let (page, limit, offset) = pagination.normalize(state.config.page_size);
    let finder = Users::find().order_by_asc(UserCol::Username);
    let total = finder.clone().count(&state.orm).await? as i64;

    let users = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
    let subscribed = subscribed_authors(&state.orm, viewer.user_id(), &ids).await?;

    let items = users
        .into_iter()
        .map(|u| {
            let is_subscribed = subscribed.contains(&u.id);
            user_from_entity(u, is_subscribed)
        })
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_user(
    state: &AppState,
    viewer: MaybeAuthUser,
    id: i64,
) -> AppResult<ApiResponse<User>> {
    let user = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let subscribed = subscribed_authors(&state.orm, viewer.user_id(), &[user.id]).await?;
    let is_subscribed = subscribed.contains(&user.id);
    Ok(ApiResponse::success(
        "User",
        user_from_entity(user, is_subscribed),
        None,
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(ApiResponse::success("User", user_from_entity(model, false), None))
}
