//! Container abstractions for reading and writing movies.
//!
//! This crate defines the [`MovieReader`] and [`MovieWriter`] contracts that
//! container implementations such as `framecap-avi` fulfil, and a [`Movie`]
//! model with a playhead and selection for front ends.

pub mod movie;
pub mod traits;

pub use movie::{Movie, MovieEvent, SubscriptionId};
pub use traits::{track_not_found, MovieReader, MovieWriter};
