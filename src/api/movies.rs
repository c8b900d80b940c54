//! Movie-of-the-day and search REST endpoints
//!
//! Poster URLs come straight from the database cache; these handlers never
//! call TMDB. A movie whose poster lookup failed (or hasn't run yet) is
//! served with an empty `poster_url`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;
use crate::api::{ErrorResponse, error_response};
use crate::db::{FeaturedMovieRecord, MovieSummary};

#[derive(Debug, Serialize)]
pub struct MovieOfTheDayResponse {
    pub title: String,
    pub tagline: String,
    pub genres: String,
    pub director: String,
    pub actor1: String,
    pub actor2: String,
    pub year: String,
    pub poster_url: String,
}

impl From<FeaturedMovieRecord> for MovieOfTheDayResponse {
    fn from(record: FeaturedMovieRecord) -> Self {
        Self {
            title: record.title,
            tagline: record.tagline,
            genres: record.genres,
            director: record.director,
            actor1: record.actor1,
            actor2: record.actor2,
            year: record.year.to_string(),
            poster_url: record.poster.url().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct MovieSearchItem {
    pub title: String,
    pub year: String,
}

impl From<MovieSummary> for MovieSearchItem {
    fn from(summary: MovieSummary) -> Self {
        Self {
            title: summary.title,
            year: summary.year.to_string(),
        }
    }
}

/// Get the featured movie. Only the literal date `today` is accepted.
async fn movie_of_the_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<MovieOfTheDayResponse>, (StatusCode, Json<ErrorResponse>)> {
    if date != "today" {
        error!(date = %date, "Request for movie of a date other than 'today'");
        return Err(error_response(StatusCode::BAD_REQUEST, "Failed to get movie"));
    }

    let today = Utc::now().date_naive();
    match state.db.featured_movies().get_by_date(today).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => {
            error!(date = %today, "No featured movie assigned for today");
            Err(error_response(StatusCode::BAD_REQUEST, "Failed to get movie"))
        }
        Err(e) => {
            error!(date = %today, error = %e, "Failed to load featured movie");
            Err(error_response(StatusCode::BAD_REQUEST, "Failed to get movie"))
        }
    }
}

/// Search movies by title
async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<MovieSearchItem>>, (StatusCode, Json<ErrorResponse>)> {
    match state.db.featured_movies().search(&params.q).await {
        Ok(movies) => Ok(Json(movies.into_iter().map(Into::into).collect())),
        Err(e) => {
            error!(query = %params.q, error = %e, "Movie search failed");
            Err(error_response(StatusCode::BAD_REQUEST, "Failed to get movies"))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/movie_of_the_day/{date}", get(movie_of_the_day))
        .route("/movies", get(search_movies))
}
