//! Tienda checkout API library.
//!
//! This crate provides the checkout service as a library,
//! allowing it to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
