//! Featured movie database repository
//!
//! One row per calendar date; the row's descriptive fields are assigned when
//! the movie is scheduled and never change afterwards. Only the poster column
//! is mutated, by the poster fetcher job.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

/// Poster resolution state for a featured movie.
///
/// Stored as a nullable text column: NULL means no lookup has happened yet,
/// an empty string means a lookup was attempted and failed (terminal, never
/// retried), and non-empty text is the resolved image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PosterRef {
    /// No poster lookup has been attempted for this movie
    Unresolved,
    /// A lookup was attempted and failed; do not try again
    Missing,
    /// Resolved poster image URL
    Resolved(String),
}

impl PosterRef {
    /// Decode from the nullable `poster_url` column
    pub fn from_column(value: Option<String>) -> Self {
        match value {
            None => Self::Unresolved,
            Some(s) if s.is_empty() => Self::Missing,
            Some(s) => Self::Resolved(s),
        }
    }

    /// Encode for the nullable `poster_url` column
    pub fn to_column(&self) -> Option<&str> {
        match self {
            Self::Unresolved => None,
            Self::Missing => Some(""),
            Self::Resolved(url) => Some(url),
        }
    }

    /// Whether a lookup outcome has been recorded (successful or not)
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// The resolved URL, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Resolved(url) => Some(url),
            _ => None,
        }
    }
}

/// Featured movie record from database
#[derive(Debug, Clone)]
pub struct FeaturedMovieRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub title: String,
    pub year: i32,
    pub tagline: String,
    pub genres: String,
    pub director: String,
    pub actor1: String,
    pub actor2: String,
    pub poster: PosterRef,
}

/// Raw row shape; `poster_url` is decoded into [`PosterRef`]
#[derive(sqlx::FromRow)]
struct FeaturedMovieRow {
    id: Uuid,
    date: NaiveDate,
    title: String,
    year: i32,
    tagline: String,
    genres: String,
    director: String,
    actor1: String,
    actor2: String,
    poster_url: Option<String>,
}

impl From<FeaturedMovieRow> for FeaturedMovieRecord {
    fn from(row: FeaturedMovieRow) -> Self {
        Self {
            id: row.id,
            date: row.date,
            title: row.title,
            year: row.year,
            tagline: row.tagline,
            genres: row.genres,
            director: row.director,
            actor1: row.actor1,
            actor2: row.actor2,
            poster: PosterRef::from_column(row.poster_url),
        }
    }
}

/// Slim search result for the movie search endpoint
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovieSummary {
    pub title: String,
    pub year: i32,
}

pub struct FeaturedMovieRepository {
    pool: PgPool,
}

impl FeaturedMovieRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the featured movie for a calendar date, if one is assigned
    pub async fn get_by_date(&self, date: NaiveDate) -> Result<Option<FeaturedMovieRecord>> {
        let row = sqlx::query_as::<_, FeaturedMovieRow>(
            r#"
            SELECT id, date, title, year, tagline, genres, director, actor1, actor2, poster_url
            FROM featured_movies
            WHERE date = $1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Record the poster lookup outcome for a movie
    pub async fn update_poster(&self, id: Uuid, poster: &PosterRef) -> Result<()> {
        sqlx::query("UPDATE featured_movies SET poster_url = $1 WHERE id = $2")
            .bind(poster.to_column())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Search movies by title, matching all words of the query in order
    pub async fn search(&self, query: &str) -> Result<Vec<MovieSummary>> {
        let records = sqlx::query_as::<_, MovieSummary>(
            r#"
            SELECT title, year
            FROM featured_movies
            WHERE title ILIKE $1
            ORDER BY title
            "#,
        )
        .bind(search_pattern(query))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Build an ILIKE pattern that matches the query's words in order,
/// with anything in between ("dark knight" -> "%dark%knight%")
fn search_pattern(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    format!("%{}%", words.join("%"))
}
