use axum::extract::FromRequestParts;
use axum_extra::extract::Query;
use foodgram_api::{
    response::Meta,
    routes::params::{MAX_PAGE_SIZE, Pagination, RecipeQuery, flag_is_set},
    services::{catalog_service::prefix_pattern, recipe_service::RecipeFilter},
};

#[test]
fn flags_accept_one_and_true() {
    assert!(flag_is_set(Some("1")));
    assert!(flag_is_set(Some("true")));
    assert!(!flag_is_set(Some("0")));
    assert!(!flag_is_set(Some("yes")));
    assert!(!flag_is_set(None));
}

#[test]
fn pagination_defaults_and_bounds() {
    assert_eq!(Pagination::default().normalize(6), (1, 6, 0));

    let page = Pagination {
        page: Some(3),
        per_page: Some(10),
    };
    assert_eq!(page.normalize(6), (3, 10, 20));

    let oversized = Pagination {
        page: Some(0),
        per_page: Some(10_000),
    };
    assert_eq!(oversized.normalize(6), (1, MAX_PAGE_SIZE, 0));
}

#[test]
fn huge_page_numbers_saturate_instead_of_overflowing() {
    let far = Pagination {
        page: Some(i64::MAX),
        per_page: Some(10),
    };
    let (page, per_page, offset) = far.normalize(6);
    assert_eq!((page, per_page), (i64::MAX, 10));
    assert_eq!(offset, i64::MAX);
    assert!(Meta::new(page, per_page, 5).has_next == Some(false));
}

#[test]
fn meta_reports_next_page() {
    assert_eq!(Meta::new(1, 6, 13).has_next, Some(true));
    assert_eq!(Meta::new(3, 6, 13).has_next, Some(false));
    assert_eq!(Meta::new(2, 6, 12).has_next, Some(false));
    assert_eq!(Meta::empty().has_next, None);
}

#[tokio::test]
async fn recipe_query_parses_repeated_tags() {
    let query = parse_recipe_query("tags=breakfast&tags=lunch&author=7&limit=3").await;
    assert_eq!(query.tags, vec!["breakfast", "lunch"]);
    assert_eq!(query.author, Some(7));
    assert_eq!(query.pagination().normalize(6), (1, 3, 0));
}

#[test]
fn user_scoped_filters_need_a_viewer() {
    let query = RecipeQuery {
        is_favorited: Some("1".into()),
        is_in_shopping_cart: Some("true".into()),
        ..RecipeQuery::default()
    };

    let anonymous = RecipeFilter::from_query(&query, None);
    assert_eq!(anonymous, RecipeFilter::default());

    let signed_in = RecipeFilter::from_query(&query, Some(42));
    assert_eq!(signed_in.favorited_by, Some(42));
    assert_eq!(signed_in.in_cart_of, Some(42));
}

#[test]
fn blank_tag_slugs_are_ignored() {
    let query = RecipeQuery {
        tags: vec!["dinner".into(), " ".into()],
        ..RecipeQuery::default()
    };
    assert_eq!(RecipeFilter::from_query(&query, None).tags, vec!["dinner"]);
}

#[test]
fn prefix_search_escapes_wildcards() {
    assert_eq!(prefix_pattern("sug"), "sug%");
    assert_eq!(prefix_pattern("100%_"), "100\\%\\_%");
    assert_eq!(prefix_pattern(""), "%");
}

async fn parse_recipe_query(raw: &str) -> RecipeQuery {
    let request = axum::http::Request::builder()
        .uri(format!("/api/recipes?{raw}"))
        .body(())
        .expect("request");
    let (mut parts, _) = request.into_parts();
    let Query(query) = Query::<RecipeQuery>::from_request_parts(&mut parts, &())
        .await
        .expect("query");
    query
}
