use axum::{http::StatusCode, response::IntoResponse};
use foodgram_api::{
    dto::recipes::{CreateRecipeRequest, IngredientAmount, UpdateRecipeRequest},
    error::{AppError, AppResult},
    validation::{
        is_valid_slug, validate_create_recipe, validate_email, validate_password,
        validate_update_recipe, validate_username,
    },
};

fn recipe(ingredients: Vec<(i64, i32)>, tags: Vec<i64>, cooking_time: i32) -> CreateRecipeRequest {
    CreateRecipeRequest {
        ingredients: ingredients
            .into_iter()
            .map(|(id, amount)| IngredientAmount { id, amount })
            .collect(),
        tags,
        image: None,
        name: "Pancakes".to_string(),
        text: "Mix and fry.".to_string(),
        cooking_time,
    }
}

fn field_error(result: AppResult<()>) -> (String, String) {
    match result {
        Err(AppError::Validation(errors)) => {
            assert_eq!(errors.len(), 1, "one field per error");
            errors.into_iter().next().expect("field error")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn valid_recipe_passes() {
    assert!(validate_create_recipe(&recipe(vec![(1, 100), (2, 2)], vec![1, 2], 15)).is_ok());
}

#[test]
fn duplicate_tags_are_rejected() {
    let (field, message) = field_error(validate_create_recipe(&recipe(vec![(1, 10)], vec![1, 1], 10)));
    assert_eq!(field, "tags");
    assert_eq!(message, "tags must be unique");
}

#[test]
fn empty_and_duplicate_ingredients_are_rejected() {
    let (field, message) = field_error(validate_create_recipe(&recipe(vec![], vec![1], 10)));
    assert_eq!(field, "ingredients");
    assert_eq!(message, "at least one ingredient is required");

    let (field, message) =
        field_error(validate_create_recipe(&recipe(vec![(3, 1), (3, 2)], vec![1], 10)));
    assert_eq!(field, "ingredients");
    assert_eq!(message, "ingredients must be unique");
}

#[test]
fn non_positive_amount_is_rejected() {
    let (field, _) = field_error(validate_create_recipe(&recipe(vec![(1, 0)], vec![1], 10)));
    assert_eq!(field, "amount");
}

#[test]
fn ingredients_are_checked_before_tags_and_cooking_time() {
    let (field, _) = field_error(validate_create_recipe(&recipe(vec![], vec![], 0)));
    assert_eq!(field, "ingredients");

    let (field, _) = field_error(validate_create_recipe(&recipe(vec![(1, 1)], vec![], 0)));
    assert_eq!(field, "tags");

    let (field, message) = field_error(validate_create_recipe(&recipe(vec![(1, 1)], vec![1], 0)));
    assert_eq!(field, "cooking_time");
    assert_eq!(message, "cooking time must be greater than 0");
}

#[test]
fn blank_name_is_rejected() {
    let mut payload = recipe(vec![(1, 1)], vec![1], 5);
    payload.name = "   ".to_string();
    let (field, _) = field_error(validate_create_recipe(&payload));
    assert_eq!(field, "name");
}

#[test]
fn update_requires_full_ingredient_and_tag_sets() {
    let payload = UpdateRecipeRequest {
        ingredients: Vec::new(),
        tags: vec![1],
        image: None,
        name: Some("Renamed".to_string()),
        text: None,
        cooking_time: None,
    };
    let (field, _) = field_error(validate_update_recipe(&payload));
    assert_eq!(field, "ingredients");

    let payload = UpdateRecipeRequest {
        ingredients: vec![IngredientAmount { id: 1, amount: 2 }],
        tags: vec![1],
        image: None,
        name: None,
        text: None,
        cooking_time: Some(0),
    };
    let (field, _) = field_error(validate_update_recipe(&payload));
    assert_eq!(field, "cooking_time");
}

#[test]
fn username_rules() {
    assert!(validate_username("chef.bob+1@home-kitchen_2").is_ok());

    let (field, message) = field_error(validate_username("me"));
    assert_eq!(field, "username");
    assert_eq!(message, "\"me\" is not a valid username");

    let (_, message) = field_error(validate_username("bad name!"));
    assert_eq!(message, "invalid characters:  !");
}

#[test]
fn email_and_password_rules() {
    assert!(validate_email("cook@example.com").is_ok());
    assert_eq!(field_error(validate_email("cook.example.com")).0, "email");
    assert_eq!(field_error(validate_email("@example.com")).0, "email");

    assert!(validate_password("password", "longenough").is_ok());
    assert_eq!(
        field_error(validate_password("new_password", "short")).0,
        "new_password"
    );
}

#[test]
fn slug_format() {
    assert!(is_valid_slug("breakfast"));
    assert!(is_valid_slug("late-night_snack2"));
    assert!(!is_valid_slug(""));
    assert!(!is_valid_slug("with space"));
    assert!(!is_valid_slug("ужин"));
}

#[tokio::test]
async fn validation_errors_render_as_field_map() {
    let err = validate_create_recipe(&recipe(vec![(1, 10)], vec![1, 1], 10)).unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["data"], serde_json::json!({ "tags": "tags must be unique" }));
}

#[test]
fn error_statuses() {
    assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        AppError::BadRequest("already subscribed to this author".into()).status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::Internal(anyhow::anyhow!("boom")).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn integer_fields_accept_numeric_strings() {
    let payload: CreateRecipeRequest = serde_json::from_value(serde_json::json!({
        "ingredients": [{ "id": "3", "amount": " 5 " }],
        "tags": [1],
        "name": "Tea",
        "text": "Steep.",
        "cooking_time": "4"
    }))
    .expect("string integers");
    assert_eq!(payload.ingredients, vec![IngredientAmount { id: 3, amount: 5 }]);
    assert_eq!(payload.cooking_time, 4);

    let update: UpdateRecipeRequest = serde_json::from_value(serde_json::json!({
        "ingredients": [{ "id": 3, "amount": 5 }],
        "tags": [1],
        "cooking_time": null
    }))
    .expect("null cooking time");
    assert_eq!(update.cooking_time, None);

    let update: UpdateRecipeRequest = serde_json::from_value(serde_json::json!({
        "ingredients": [], "tags": [], "cooking_time": "12"
    }))
    .expect("string cooking time");
    assert_eq!(update.cooking_time, Some(12));

    assert!(serde_json::from_value::<CreateRecipeRequest>(serde_json::json!({
        "ingredients": [{ "id": 1, "amount": "lots" }]
    }))
    .is_err());
    assert!(serde_json::from_value::<CreateRecipeRequest>(serde_json::json!({
        "ingredients": [{ "id": 1, "amount": 3_000_000_000_i64 }]
    }))
    .is_err());
}
