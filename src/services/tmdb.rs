//! TMDB (The Movie Database) API client for poster lookups
//!
//! Base URL: https://api.themoviedb.org/3
//! Authenticates with an API read access token sent as a bearer credential.
//!
//! The client makes exactly one attempt per call; retry policy belongs to the
//! caller. The poster fetcher job deliberately never retries a failed lookup.

use std::time::Duration;

use reqwest::Client;
use reqwest::header;
use serde::Deserialize;
use tracing::debug;

pub const BASE_URL: &str = "https://api.themoviedb.org/3";
pub const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Upper bound on a single lookup, so a stalled TMDB connection cannot
/// hold up worker shutdown
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A poster lookup failure.
///
/// `NoPosterFound` (the catalog has nothing usable) and the transport/decode
/// variants (the catalog was unreachable or unintelligible) must stay
/// distinguishable for logging, even though the poster fetcher treats them
/// identically when recording the outcome.
#[derive(Debug, thiserror::Error)]
pub enum TmdbError {
    #[error("TMDB request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("TMDB returned status {0}")]
    Status(u16),
    #[error("failed to decode TMDB response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("no poster found")]
    NoPosterFound,
}

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    poster_path: Option<String>,
}

impl TmdbClient {
    /// Create a new TMDB client with the given API read access token
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key,
        }
    }

    /// Look up the poster image URL for a movie by title and release year.
    ///
    /// Takes the first search result; a result without a poster path counts
    /// as not found.
    pub async fn search_poster(&self, title: &str, year: i32) -> Result<String, TmdbError> {
        debug!(title = %title, year = year, "Searching TMDB for poster");

        let url = format!("{}/search/movie", self.base_url);
        let year = year.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("query", title), ("year", year.as_str())])
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TmdbError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let poster_path = first_poster_path(&body)?;

        Ok(format!("{}{}", IMAGE_BASE_URL, poster_path))
    }
}

/// Extract the first result's poster path from a search response body
fn first_poster_path(body: &str) -> Result<String, TmdbError> {
    let search: SearchResponse = serde_json::from_str(body).map_err(TmdbError::Decode)?;

    let first = search
        .results
        .into_iter()
        .next()
        .ok_or(TmdbError::NoPosterFound)?;

    match first.poster_path {
        Some(path) if !path.is_empty() => Ok(path),
        _ => Err(TmdbError::NoPosterFound),
    }
}
