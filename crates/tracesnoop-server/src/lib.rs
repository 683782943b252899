//! Tracesnoop server library: configuration, logging, the local terminal and
//! the panel hub. Kept apart from main.rs for integration testing.

pub mod config;
pub mod logging;
pub mod panel;
pub mod routes;
pub mod state;
pub mod terminal;
pub mod websocket;
