use foodgram_api::services::shopping_list::{
    BOTTOM_LIMIT, CONTINUATION_FONT_SIZE, CONTINUATION_Y, CartIngredientRow, FIRST_LINE_Y,
    ITEM_FONT_SIZE, MARGIN_X, ShoppingListItem, TITLE_FONT_SIZE, TITLE_Y, aggregate, layout,
    needs_unicode_font, render_pdf,
};

fn row(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
    CartIngredientRow {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
        amount,
    }
}

fn item(name: &str, unit: &str, total: i64) -> ShoppingListItem {
    ShoppingListItem {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
        total,
    }
}

#[test]
fn same_ingredient_across_recipes_is_summed() {
    let items = aggregate(vec![row("Salt", "g", 5), row("Salt", "g", 3)]);

    assert_eq!(items, vec![item("Salt", "g", 8)]);
    assert_eq!(items[0].line(1), "1. Salt - 8 g");
}

#[test]
fn items_are_sorted_by_name() {
    let items = aggregate(vec![
        row("Sugar", "g", 10),
        row("Eggs", "pcs", 2),
        row("Milk", "ml", 200),
        row("Eggs", "pcs", 1),
    ]);

    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Eggs", "Milk", "Sugar"]);
    assert_eq!(items[0].total, 3);
}

#[test]
fn same_name_with_different_units_stays_separate_in_first_seen_order() {
    let items = aggregate(vec![
        row("Butter", "tbsp", 2),
        row("Butter", "g", 50),
        row("Butter", "tbsp", 1),
    ]);

    assert_eq!(
        items,
        vec![item("Butter", "tbsp", 3), item("Butter", "g", 50)]
    );
}

#[test]
fn empty_cart_produces_title_only_page() {
    let pages = layout(&aggregate(Vec::new()));

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].lines.len(), 1);
    let title = &pages[0].lines[0];
    assert_eq!(title.text, "Shopping list:");
    assert_eq!((title.x, title.y), (MARGIN_X, TITLE_Y));
    assert_eq!(title.font_size, TITLE_FONT_SIZE);
}

#[test]
fn long_lists_continue_on_new_pages() {
    let items: Vec<ShoppingListItem> = (0..40)
        .map(|n| item(&format!("Ingredient {n:02}"), "g", 1))
        .collect();
    let pages = layout(&items);

    assert_eq!(pages.len(), 2);

    // Title plus 19 items: 650, 620, ..., 110.
    let first = &pages[0].lines;
    assert_eq!(first.len(), 20);
    assert_eq!(first[1].y, FIRST_LINE_Y);
    assert_eq!(first[1].font_size, ITEM_FONT_SIZE);
    assert_eq!(first[1].text, "1. Ingredient 00 - 1 g");
    assert_eq!(first[19].y, 110);

    let second = &pages[1].lines;
    assert_eq!(second.len(), 21);
    assert_eq!(second[0].y, CONTINUATION_Y);
    assert_eq!(second[0].font_size, CONTINUATION_FONT_SIZE);
    assert_eq!(second[0].text, "20. Ingredient 19 - 1 g");
    assert_eq!(second[20].y, BOTTOM_LIMIT);
    assert!(second.iter().all(|line| line.x == MARGIN_X));
}

#[test]
fn rendered_document_is_a_pdf() {
    let pages = layout(&[item("Flour", "g", 500), item("Salt", "g", 8)]);
    let bytes = render_pdf(&pages, None).expect("render pdf");

    assert!(bytes.starts_with(b"%PDF"));
}

#[test]
fn missing_font_file_is_an_error() {
    let pages = layout(&[]);
    assert!(render_pdf(&pages, Some("/nonexistent/font.ttf")).is_err());
}

#[test]
fn non_latin_names_need_a_unicode_font() {
    assert!(!needs_unicode_font(&layout(&[item("Crème fraîche", "g", 100)])));
    assert!(needs_unicode_font(&layout(&[item("Соль", "г", 8)])));
}
