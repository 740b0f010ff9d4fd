use foodgram_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::{
        auth::{LoginRequest, RegisterRequest, SetPasswordRequest},
        recipes::{CreateRecipeRequest, IngredientAmount, UpdateRecipeRequest},
    },
    error::AppError,
    middleware::auth::{AuthUser, MaybeAuthUser, decode_token},
    routes::params::{RecipeQuery, SubscriptionQuery},
    services::{
        auth_service, catalog_service, follow_service,
        membership_service::{self, Membership},
        recipe_service, shopping_list,
    },
    state::AppState,
};

// Integration flow: register -> publish recipes -> favorite / cart -> shopping list -> follow.
#[tokio::test]
async fn recipe_membership_and_follow_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let alice = register(&state, "alice", "alice@example.com").await?;
    let bob = register(&state, "bob", "bob@example.com").await?;

    // Duplicate email is a field error.
    let duplicate = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ALICE@example.com".into(),
            username: "alice2".into(),
            first_name: String::new(),
            last_name: String::new(),
            password: "password123".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Validation(ref e)) if e.contains_key("email")));

    let login = auth_service::login_user(
        &state,
        LoginRequest {
            email: "alice@example.com".into(),
            password: "password123".into(),
        },
    )
    .await?;
    let token = login.data.expect("token").auth_token;
    assert_eq!(decode_token(&token, &state.config.jwt_secret)?.user_id, alice.user_id);

    let wrong_current = auth_service::set_password(
        &state,
        &bob,
        SetPasswordRequest {
            current_password: "not-my-password".into(),
            new_password: "newpassword123".into(),
        },
    )
    .await;
    assert!(matches!(wrong_current, Err(AppError::Validation(ref e)) if e.contains_key("current_password")));

    // Catalog
    let breakfast = insert_tag(&state, "Breakfast", "breakfast").await?;
    let dinner = insert_tag(&state, "Dinner", "dinner").await?;
    let salt = insert_ingredient(&state, "Salt", "g").await?;
    let flour = insert_ingredient(&state, "Flour", "g").await?;
    let sugar = insert_ingredient(&state, "Sugar", "g").await?;

    let found = catalog_service::list_ingredients(&state.orm, Some("SU"))
        .await?
        .data
        .expect("ingredients")
        .items;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, sugar);

    // Recipes
    let pancakes = recipe_service::create_recipe(
        &state,
        &alice,
        recipe_payload("Pancakes", vec![(flour, 200), (salt, 5)], vec![breakfast]),
    )
    .await?
    .data
    .expect("recipe");
    assert_eq!(pancakes.author.id, alice.user_id);
    assert_eq!(pancakes.ingredients.len(), 2);
    assert!(!pancakes.is_favorited);

    let stew = recipe_service::create_recipe(
        &state,
        &bob,
        recipe_payload("Stew", vec![(salt, 3), (sugar, 1)], vec![dinner]),
    )
    .await?
    .data
    .expect("recipe");

    let unknown_tag = recipe_service::create_recipe(
        &state,
        &alice,
        recipe_payload("Ghost", vec![(salt, 1)], vec![9_999]),
    )
    .await;
    assert!(matches!(unknown_tag, Err(AppError::Validation(ref e)) if e.contains_key("tags")));

    // Only the author may edit.
    let update = UpdateRecipeRequest {
        ingredients: vec![IngredientAmount { id: salt, amount: 10 }],
        tags: vec![dinner],
        image: None,
        name: Some("Salty stew".into()),
        text: None,
        cooking_time: None,
    };
    let forbidden = recipe_service::update_recipe(&state, &alice, stew.id, update.clone()).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let stew = recipe_service::update_recipe(&state, &bob, stew.id, update)
        .await?
        .data
        .expect("recipe");
    assert_eq!(stew.name, "Salty stew");
    assert_eq!(stew.ingredients.len(), 1);
    assert_eq!(stew.ingredients[0].amount, 10);

    // A failing update leaves ingredients, tags and fields untouched.
    let broken = UpdateRecipeRequest {
        ingredients: vec![
            IngredientAmount { id: sugar, amount: 4 },
            IngredientAmount { id: 9_999, amount: 1 },
        ],
        tags: vec![breakfast],
        image: None,
        name: Some("Should not stick".into()),
        text: None,
        cooking_time: Some(99),
    };
    let failed = recipe_service::update_recipe(&state, &bob, stew.id, broken).await;
    assert!(matches!(failed, Err(AppError::Validation(ref e)) if e.contains_key("ingredients")));

    let broken_tags = UpdateRecipeRequest {
        ingredients: vec![IngredientAmount { id: sugar, amount: 4 }],
        tags: vec![breakfast, 9_999],
        image: None,
        name: Some("Should not stick".into()),
        text: None,
        cooking_time: None,
    };
    let failed = recipe_service::update_recipe(&state, &bob, stew.id, broken_tags).await;
    assert!(matches!(failed, Err(AppError::Validation(ref e)) if e.contains_key("tags")));

    let reread = recipe_service::get_recipe(&state, MaybeAuthUser(None), stew.id)
        .await?
        .data
        .expect("recipe");
    assert_eq!(reread.name, "Salty stew");
    assert_eq!(reread.cooking_time, 20);
    let kept_ingredients: Vec<(i64, i32)> =
        reread.ingredients.iter().map(|i| (i.id, i.amount)).collect();
    assert_eq!(kept_ingredients, vec![(salt, 10)]);
    let kept_tags: Vec<i64> = reread.tags.iter().map(|t| t.id).collect();
    assert_eq!(kept_tags, vec![dinner]);

    let by_author = recipe_service::list_recipes(
        &state,
        MaybeAuthUser(None),
        RecipeQuery {
            author: Some(alice.user_id),
            ..RecipeQuery::default()
        },
    )
    .await?
    .data
    .expect("recipes")
    .items;
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0].id, pancakes.id);

    // Favorites: add once, second add and second remove fail.
    membership_service::add(&state, &alice, Membership::Favorite, stew.id).await?;
    let again = membership_service::add(&state, &alice, Membership::Favorite, stew.id).await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));
    let missing = membership_service::add(&state, &alice, Membership::Favorite, 9_999).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    let favorited = recipe_service::list_recipes(
        &state,
        MaybeAuthUser(Some(alice)),
        RecipeQuery {
            is_favorited: Some("1".into()),
            ..RecipeQuery::default()
        },
    )
    .await?;
    assert_eq!(favorited.meta.as_ref().and_then(|m| m.total), Some(1));
    let favorited = favorited.data.expect("recipes").items;
    assert_eq!(favorited.len(), 1);
    assert!(favorited[0].is_favorited);

    // Anonymous viewers ignore user-scoped filters.
    let anonymous = recipe_service::list_recipes(
        &state,
        MaybeAuthUser(None),
        RecipeQuery {
            is_favorited: Some("1".into()),
            ..RecipeQuery::default()
        },
    )
    .await?
    .data
    .expect("recipes")
    .items;
    assert_eq!(anonymous.len(), 2);
    assert_eq!(anonymous[0].id, stew.id, "newest first");

    let by_tag = recipe_service::list_recipes(
        &state,
        MaybeAuthUser(None),
        RecipeQuery {
            tags: vec!["breakfast".into()],
            ..RecipeQuery::default()
        },
    )
    .await?
    .data
    .expect("recipes")
    .items;
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].id, pancakes.id);

    membership_service::remove(&state, &alice, Membership::Favorite, stew.id).await?;
    let gone = membership_service::remove(&state, &alice, Membership::Favorite, stew.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    // Shopping cart aggregation across recipes.
    membership_service::add(&state, &alice, Membership::ShoppingCart, pancakes.id).await?;
    let in_cart = recipe_service::list_recipes(
        &state,
        MaybeAuthUser(Some(alice)),
        RecipeQuery {
            is_in_shopping_cart: Some("true".into()),
            ..RecipeQuery::default()
        },
    )
    .await?
    .data
    .expect("recipes")
    .items;
    assert_eq!(in_cart.len(), 1);
    assert_eq!(in_cart[0].id, pancakes.id);
    assert!(in_cart[0].is_in_shopping_cart);

    membership_service::add(&state, &alice, Membership::ShoppingCart, stew.id).await?;
    let items = shopping_list::shopping_list(&state, &alice).await?;
    let lines: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| item.line(i + 1))
        .collect();
    assert_eq!(lines, vec!["1. Flour - 200 g", "2. Salt - 15 g"]);

    let pdf = shopping_list::download_shopping_cart(&state, &alice).await?;
    assert!(pdf.starts_with(b"%PDF"));

    // Follows
    let porridge = recipe_service::create_recipe(
        &state,
        &bob,
        recipe_payload("Porridge", vec![(sugar, 2)], vec![breakfast]),
    )
    .await?
    .data
    .expect("recipe");

    let own = follow_service::subscribe(&state, &alice, alice.user_id, None).await;
    assert!(matches!(own, Err(AppError::BadRequest(_))));
    let nobody = follow_service::subscribe(&state, &alice, 9_999, None).await;
    assert!(matches!(nobody, Err(AppError::NotFound)));

    let subscription = follow_service::subscribe(&state, &alice, bob.user_id, Some(0))
        .await?
        .data
        .expect("subscription");
    assert!(subscription.author.is_subscribed);
    assert!(subscription.recipes.is_empty());
    assert_eq!(subscription.recipes_count, 2);

    let twice = follow_service::subscribe(&state, &alice, bob.user_id, None).await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    let subscriptions = follow_service::list_subscriptions(
        &state,
        &alice,
        SubscriptionQuery::default(),
    )
    .await?
    .data
    .expect("subscriptions")
    .items;
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].author.id, bob.user_id);
    assert_eq!(subscriptions[0].recipes.len(), 2);
    assert_eq!(subscriptions[0].recipes_count, 2);

    let capped = follow_service::list_subscriptions(
        &state,
        &alice,
        SubscriptionQuery {
            recipes_limit: Some(1),
            ..SubscriptionQuery::default()
        },
    )
    .await?
    .data
    .expect("subscriptions")
    .items;
    let previews: Vec<i64> = capped[0].recipes.iter().map(|r| r.id).collect();
    assert_eq!(previews, vec![porridge.id], "newest recipe first");
    assert_eq!(capped[0].recipes_count, 2);

    follow_service::unsubscribe(&state, &alice, bob.user_id).await?;
    let not_following = follow_service::unsubscribe(&state, &alice, bob.user_id).await;
    assert!(matches!(not_following, Err(AppError::NotFound)));

    // Deleting a recipe removes it from carts.
    recipe_service::delete_recipe(&state, &bob, stew.id).await?;
    let items = shopping_list::shopping_list(&state, &alice).await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].total, 5);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    sqlx::query(
        "TRUNCATE TABLE audit_logs, shopping_carts, favorites, recipe_ingredients, recipe_tags, recipes, follows, ingredients, tags, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        token_ttl_hours: 1,
        page_size: 6,
        shopping_list_font: None,
    };
    Ok(AppState::new(pool, config))
}

async fn register(state: &AppState, username: &str, email: &str) -> anyhow::Result<AuthUser> {
    let user = auth_service::register_user(
        state,
        RegisterRequest {
            email: email.into(),
            username: username.into(),
            first_name: username.into(),
            last_name: "Tester".into(),
            password: "password123".into(),
        },
    )
    .await?
    .data
    .expect("user");
    Ok(AuthUser { user_id: user.id })
}

async fn insert_tag(state: &AppState, name: &str, slug: &str) -> anyhow::Result<i64> {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, '#aabbcc', $2) RETURNING id")
            .bind(name)
            .bind(slug)
            .fetch_one(&state.pool)
            .await?;
    Ok(id)
}

async fn insert_ingredient(state: &AppState, name: &str, unit: &str) -> anyhow::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(unit)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

fn recipe_payload(name: &str, ingredients: Vec<(i64, i32)>, tags: Vec<i64>) -> CreateRecipeRequest {
    CreateRecipeRequest {
        ingredients: ingredients
            .into_iter()
            .map(|(id, amount)| IngredientAmount { id, amount })
            .collect(),
        tags,
        image: None,
        name: name.to_string(),
        text: format!("How to cook {name}."),
        cooking_time: 20,
    }
}
