use anyhow::Context;
use serde::Deserialize;

use foodgram_api::{
    db::{create_pool, run_migrations},
    services::auth_service::hash_password,
    validation::is_valid_slug,
};

const INGREDIENTS_FILE: &str = "data/ingredients.json";
const TAGS_FILE: &str = "data/tags.json";

#[derive(Deserialize)]
struct IngredientRecord {
    name: String,
    measurement_unit: String,
}

#[derive(Deserialize)]
struct TagRecord {
    name: String,
    color: String,
    slug: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let ingredients = seed_ingredients(&pool).await?;
    let tags = seed_tags(&pool).await?;
    let user_id = ensure_user(&pool, "chef@example.com", "chef", "chefpassword").await?;

    println!(
        "Seed completed. {ingredients} new ingredients, {tags} new tags, demo user ID: {user_id}"
    );
    Ok(())
}

fn read_records<T: for<'de> Deserialize<'de>>(path: &str) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
}

async fn seed_ingredients(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let records: Vec<IngredientRecord> = read_records(INGREDIENTS_FILE)?;
    let mut created = 0;

    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO ingredients (name, measurement_unit)
            VALUES ($1, $2)
            ON CONFLICT (name, measurement_unit) DO NOTHING
            "#,
        )
        .bind(record.name.trim())
        .bind(record.measurement_unit.trim())
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }

    println!("Seeded ingredients from {INGREDIENTS_FILE}");
    Ok(created)
}

async fn seed_tags(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let records: Vec<TagRecord> = read_records(TAGS_FILE)?;
    let mut created = 0;

    for record in records {
        if !is_valid_slug(&record.slug) {
            anyhow::bail!("invalid tag slug {:?} in {TAGS_FILE}", record.slug);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO tags (name, color, slug)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(&record.name)
        .bind(&record.color)
        .bind(&record.slug)
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }

    println!("Seeded tags from {TAGS_FILE}");
    Ok(created)
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<i64> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO users (email, username, first_name, last_name, password_hash)
        VALUES ($1, $2, 'Demo', 'Chef', $3)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .fetch_optional(pool)
    .await?;

    // Existing rows are left untouched.
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (i64,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email}");
    Ok(user_id)
}
