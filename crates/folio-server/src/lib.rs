//! Folio server — HTTP and SSE surface for the site's consent flow.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
