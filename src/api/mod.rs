//! REST surface (C9 ambient addition, SPEC_FULL §6.1): the synchronous
//! counterpart to the Subscription Hub's duplex protocol.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
