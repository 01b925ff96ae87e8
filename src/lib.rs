//! Reading intake — the branching questionnaire behind a psychic-reading
//! funnel, with progressive persistence and reading generation.

pub mod config;
pub mod error;
pub mod intake;
pub mod reading;
pub mod reviews;
pub mod routes;
pub mod store;
