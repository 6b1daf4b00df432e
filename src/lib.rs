//! Move legality for a chess board and a client for UCI engines running as
//! child processes.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod models;
