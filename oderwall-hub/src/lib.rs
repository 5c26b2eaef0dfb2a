//! OderWall Hub - the push server transport
//!
//! A central process holding the authoritative live order list in
//! memory and on disk. Clients connect over framed TCP; each incoming
//! write is applied as one atomic critical section, then the updated
//! full list is broadcast to every connected client - including the
//! writer, which therefore observes its own echo.

pub mod config;
pub mod handler;
pub mod logger;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::HubServer;
pub use state::{HubError, HubResult, HubState};
