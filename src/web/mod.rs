//! Browser-facing session transport
//!
//! - `GET /` and `/site.js`: the picking page
//! - `GET /api/cache`: paginated cached results
//! - `POST /api/save`: submission
//! - `GET /ws`: liveness and selection notifications

pub mod messages;
pub mod page;
pub mod server;

pub use messages::{ClientMessage, ServerMessage};
pub use page::PageRenderer;
pub use server::{paginate, CachePage, StartReport, WebServer};
