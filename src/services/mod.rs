//! External service integrations

pub mod tmdb;

pub use tmdb::{TmdbClient, TmdbError};
