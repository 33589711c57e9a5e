//! GateKit Backend Library
//!
//! Authentication and request-authorization core: dual-secret JWT issuance
//! with rotation-based refresh revocation, fixed-window rate limiting, RBAC,
//! and the request pipeline composing them.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
