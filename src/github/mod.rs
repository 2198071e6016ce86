pub mod client;
pub mod fetch;

pub use client::GithubClient;
pub use fetch::{FetchOutcome, FetchSpec, Fetcher};
