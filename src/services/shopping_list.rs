//! Shopping list export: sum ingredient amounts across the cart, lay the
//! lines out on A4 pages and render them as a PDF.

use std::{collections::HashMap, fs::File, io::BufReader};

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::{
    audit,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    state::AppState,
};

pub const FILENAME: &str = "cart.pdf";
pub const CONTENT_TYPE: &str = "application/pdf";
pub const DOCUMENT_TITLE: &str = "Shopping list";

// A4 portrait in points, origin bottom-left.
pub const PAGE_WIDTH_PT: f32 = 595.28;
pub const PAGE_HEIGHT_PT: f32 = 841.89;

pub const MARGIN_X: i32 = 40;
pub const TITLE_Y: i32 = 690;
pub const FIRST_LINE_Y: i32 = 650;
pub const CONTINUATION_Y: i32 = 700;
pub const BOTTOM_LIMIT: i32 = 100;
pub const LINE_STEP: i32 = 30;

pub const TITLE_FONT_SIZE: i32 = 36;
pub const ITEM_FONT_SIZE: i32 = 20;
pub const CONTINUATION_FONT_SIZE: i32 = 24;

/// One `(ingredient, amount)` pair reachable from a cart recipe.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

impl ShoppingListItem {
    pub fn line(&self, number: usize) -> String {
        format!(
            "{number}. {} - {} {}",
            self.name, self.total, self.measurement_unit
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font_size: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub lines: Vec<PlacedLine>,
}

/// Group rows by `(name, unit)`, sum the amounts and sort by name.
///
/// Groups keep first-seen order before the sort, and the sort is stable, so
/// equal names (different units) stay in aggregation order.
pub fn aggregate<I>(rows: I) -> Vec<ShoppingListItem>
where
    I: IntoIterator<Item = CartIngredientRow>,
{
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut items: Vec<ShoppingListItem> = Vec::new();

    for row in rows {
        let key = (row.name, row.measurement_unit);
        match index.get(&key) {
            Some(&position) => items[position].total += i64::from(row.amount),
            None => {
                index.insert(key.clone(), items.len());
                items.push(ShoppingListItem {
                    name: key.0,
                    measurement_unit: key.1,
                    total: i64::from(row.amount),
                });
            }
        }
    }

    items.sort_by(|a, b| a.name.cmp(&b.name));
    items
}

/// Place the title and one numbered line per item, breaking pages when the
/// cursor drops below [`BOTTOM_LIMIT`].
pub fn layout(items: &[ShoppingListItem]) -> Vec<Page> {
    let mut pages = vec![Page {
        lines: vec![PlacedLine {
            text: format!("{DOCUMENT_TITLE}:"),
            x: MARGIN_X,
            y: TITLE_Y,
            font_size: TITLE_FONT_SIZE,
        }],
    }];
    let mut y = FIRST_LINE_Y;
    let mut font_size = ITEM_FONT_SIZE;

    for (number, item) in items.iter().enumerate() {
        if y < BOTTOM_LIMIT {
            pages.push(Page::default());
            y = CONTINUATION_Y;
            font_size = CONTINUATION_FONT_SIZE;
        }
        if let Some(page) = pages.last_mut() {
            page.lines.push(PlacedLine {
                text: item.line(number + 1),
                x: MARGIN_X,
                y,
                font_size,
            });
        }
        y -= LINE_STEP;
    }

    pages
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

fn pdf_error<E: std::fmt::Debug>(err: E) -> anyhow::Error {
    anyhow::anyhow!("pdf rendering failed: {err:?}")
}

/// True when some line has characters outside Latin-1, which the builtin
/// Helvetica cannot draw.
pub fn needs_unicode_font(pages: &[Page]) -> bool {
    pages
        .iter()
        .flat_map(|page| &page.lines)
        .any(|line| line.text.chars().any(|c| u32::from(c) > 0xFF))
}

/// Render laid-out pages. `font_path` points at a TrueType font; the builtin
/// Helvetica only covers Latin-1.
pub fn render_pdf(pages: &[Page], font_path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    let width = pt_to_mm(PAGE_WIDTH_PT);
    let height = pt_to_mm(PAGE_HEIGHT_PT);
    let (doc, first_page, first_layer) = PdfDocument::new(DOCUMENT_TITLE, width, height, "Layer 1");

    let font: IndirectFontRef = match font_path {
        Some(path) => {
            let file = File::open(path)?;
            doc.add_external_font(BufReader::new(file))
                .map_err(pdf_error)?
        }
        None => {
            if needs_unicode_font(pages) {
                tracing::warn!(
                    "shopping list has non-Latin text but SHOPPING_LIST_FONT is not set; it will not render correctly"
                );
            }
            doc.add_builtin_font(BuiltinFont::Helvetica)
                .map_err(pdf_error)?
        }
    };

    for (index, page) in pages.iter().enumerate() {
        let (page_index, layer_index) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(width, height, "Layer 1")
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for line in &page.lines {
            layer.use_text(
                line.text.clone(),
                line.font_size as f32,
                pt_to_mm(line.x as f32),
                pt_to_mm(line.y as f32),
                &font,
            );
        }
    }

    doc.save_to_bytes().map_err(pdf_error)
}

/// Aggregated shopping list of the user's cart.
pub async fn shopping_list(state: &AppState, user: &AuthUser) -> AppResult<Vec<ShoppingListItem>> {
    let rows = sqlx::query_as::<_, CartIngredientRow>(
        r#"
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_carts sc
        JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        ORDER BY sc.created_at, sc.id, ri.id
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(aggregate(rows))
}

pub async fn download_shopping_cart(state: &AppState, user: &AuthUser) -> AppResult<Vec<u8>> {
    let items = shopping_list(state, user).await?;
    let item_count = items.len();
    let font_path = state.config.shopping_list_font.clone();

    let bytes = tokio::task::spawn_blocking(move || {
        let pages = layout(&items);
        render_pdf(&pages, font_path.as_deref())
    })
    .await
    .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))??;

    tracing::debug!(user_id = user.user_id, items = item_count, bytes = bytes.len(), "rendered shopping list");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "shopping_list_download",
        "shopping_carts",
        serde_json::json!({ "items": item_count }),
    )
    .await;

    Ok(bytes)
}
