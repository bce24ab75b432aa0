use crate::{
    error::AppResult,
    search::{self, SearchResults},
    DbPool,
};
use axum::{extract::Query, routing::get, Extension, Json, Router};
use serde::Deserialize;

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn find(
    Query(query): Query<SearchQuery>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<SearchResults>> {
    // blank terms are rejected before a connection is taken
    search::like_pattern(&query.q)?;
    let conn = &mut pool.get().await?;
    Ok(Json(search::search(conn, &query.q).await?))
}

pub fn app() -> Router {
    Router::new().route("/search", get(find))
}
