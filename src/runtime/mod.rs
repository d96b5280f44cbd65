//! # Runtime Module
//!
//! Process wiring for the controller: initialization, the watch loop, the
//! error policy and the metrics/probe HTTP server.

pub mod error_policy;
pub mod initialization;
pub mod server;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use server::{start_server, ServerState};
pub use watch_loop::*;
