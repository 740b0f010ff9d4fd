use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, RegisterRequest, SetPasswordRequest, TokenResponse},
        catalog::{IngredientList, TagList},
        recipes::{CreateRecipeRequest, IngredientAmount, RecipeList, UpdateRecipeRequest},
        users::{SubscriptionList, UserList},
    },
    models::{Ingredient, Recipe, RecipeIngredient, RecipeShort, Subscription, Tag, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, ingredients, params, recipes, tags, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        users::register,
        users::list_users,
        users::get_user,
        users::me,
        users::set_password,
        users::subscriptions,
        users::subscribe,
        users::unsubscribe,
        tags::list_tags,
        tags::get_tag,
        ingredients::list_ingredients,
        ingredients::get_ingredient,
        recipes::list_recipes,
        recipes::get_recipe,
        recipes::create_recipe,
        recipes::update_recipe,
        recipes::delete_recipe,
        recipes::add_favorite,
        recipes::remove_favorite,
        recipes::add_to_shopping_cart,
        recipes::remove_from_shopping_cart,
        recipes::download_shopping_cart
    ),
    components(
        schemas(
            User,
            Tag,
            Ingredient,
            RecipeIngredient,
            Recipe,
            RecipeShort,
            Subscription,
            RegisterRequest,
            LoginRequest,
            TokenResponse,
            SetPasswordRequest,
            IngredientAmount,
            CreateRecipeRequest,
            UpdateRecipeRequest,
            RecipeList,
            TagList,
            IngredientList,
            UserList,
            SubscriptionList,
            params::Pagination,
            params::RecipeQuery,
            params::SubscriptionQuery,
            Meta,
            ApiResponse<Recipe>,
            ApiResponse<RecipeList>,
            ApiResponse<SubscriptionList>,
            ApiResponse<User>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Token endpoints"),
        (name = "Users", description = "User endpoints"),
        (name = "Subscriptions", description = "Follow graph endpoints"),
        (name = "Tags", description = "Tag endpoints"),
        (name = "Ingredients", description = "Ingredient endpoints"),
        (name = "Recipes", description = "Recipe endpoints"),
        (name = "Favorites", description = "Favorite endpoints"),
        (name = "Shopping cart", description = "Shopping cart endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
