//! Background job workers

pub mod poster_fetcher;

pub use poster_fetcher::PosterFetcher;
