//! Web terminal exec server
//!
//! HTTP surface over `exec-lib`: configuration loading, authentication
//! middleware, request handlers and error mapping.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
