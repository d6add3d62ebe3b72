//! HTTP surface for logcollect
//!
//! - `GET /filter?q=<substring>` searches the most recent lines
//! - `GET /stream` pushes every drained batch as a Server-Sent Event

mod encoding;
mod error;
mod handlers;
mod query;
mod server;

pub use encoding::{accepts_gzip, gzip};
pub use error::HttpError;
pub use query::{decode_component, query_param};
pub use server::{AppState, bind, router, serve};
