//! Database connection and operations

pub mod movies;

use anyhow::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use movies::{FeaturedMovieRecord, FeaturedMovieRepository, MovieSummary, PosterRef};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Access the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Featured movie repository
    pub fn featured_movies(&self) -> FeaturedMovieRepository {
        FeaturedMovieRepository::new(self.pool.clone())
    }
}
