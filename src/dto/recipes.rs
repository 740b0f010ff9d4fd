use serde::{Deserialize, Deserializer, Serialize, de};
use utoipa::ToSchema;

use crate::models::Recipe;

/// Integer fields accept both `5` and `"5"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

impl IntOrString {
    fn into_int<T: TryFrom<i64>, E: de::Error>(self) -> Result<T, E> {
        let value = match self {
            IntOrString::Int(value) => value,
            IntOrString::Str(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| E::custom(format!("expected an integer, got {raw:?}")))?,
        };
        T::try_from(value).map_err(|_| E::custom(format!("integer {value} is out of range")))
    }
}

fn int_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    IntOrString::deserialize(deserializer)?.into_int()
}

fn opt_int_or_string<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    Option::<IntOrString>::deserialize(deserializer)?
        .map(IntOrString::into_int)
        .transpose()
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct IngredientAmount {
    #[serde(deserialize_with = "int_or_string")]
    pub id: i64,
    #[serde(deserialize_with = "int_or_string")]
    pub amount: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRecipeRequest {
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
    #[serde(default)]
    pub tags: Vec<i64>,
    pub image: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub cooking_time: i32,
}

/// Partial update; `ingredients` and `tags` always replace the full sets.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRecipeRequest {
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
    #[serde(default)]
    pub tags: Vec<i64>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    #[serde(default, deserialize_with = "opt_int_or_string")]
    pub cooking_time: Option<i32>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct RecipeList {
    #[schema(value_type = Vec<Recipe>)]
    pub items: Vec<Recipe>,
}
