//! Search cluster client and authentication.
//!
//! This module provides the [`SearchClient`] used by the search loader,
//! along with the [`Auth`] credentials it sends.

mod auth;
mod search;

pub use auth::Auth;
pub use search::SearchClient;
