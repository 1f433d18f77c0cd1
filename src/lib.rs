//! Lifepoint: session and authorization service.
//!
//! Derives a live "who is signed in and what may they see" view from an
//! identity feed and the profile store, gates routes on it, and hosts the
//! onboarding writer and the generative-text proxy.

pub mod assist;
pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod onboarding;
pub mod profile;
pub mod server;
pub mod session;
