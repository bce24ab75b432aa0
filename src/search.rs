use crate::{
    error::{AppError, AppResult},
    models::{Announcement, Club},
    queries::{self, events::EventListing},
};
use diesel_async::AsyncPgConnection;
use serde::Serialize;

pub const RESULTS_PER_KIND: i64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub term: String,
    pub events: Vec<EventListing>,
    pub clubs: Vec<Club>,
    pub announcements: Vec<Announcement>,
    pub no_results: bool,
}

impl SearchResults {
    fn new(
        term: String,
        events: Vec<EventListing>,
        clubs: Vec<Club>,
        announcements: Vec<Announcement>,
    ) -> SearchResults {
        let no_results = events.is_empty() && clubs.is_empty() && announcements.is_empty();
        SearchResults {
            term,
            events,
            clubs,
            announcements,
            no_results,
        }
    }
}

/// Turns a user search term into a substring ILIKE pattern. Wildcards typed by
/// the user match literally.
pub fn like_pattern(term: &str) -> AppResult<String> {
    let term = term.trim();
    if term.is_empty() {
        return Err(AppError::bad_request("search term is required"));
    }

    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Ok(pattern)
}

/// Searches events, clubs and announcements. A failing announcement lookup
/// only empties that section.
pub async fn search(conn: &mut AsyncPgConnection, term: &str) -> AppResult<SearchResults> {
    let pattern = like_pattern(term)?;

    let events = queries::events::search(conn, &pattern, RESULTS_PER_KIND).await?;
    let clubs = queries::clubs::search(conn, &pattern, RESULTS_PER_KIND).await?;
    let announcements =
        match queries::announcements::search(conn, &pattern, RESULTS_PER_KIND).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("announcement search failed: {e}");
                Vec::new()
            }
        };

    Ok(SearchResults::new(
        term.trim().to_string(),
        events,
        clubs,
        announcements,
    ))
}
