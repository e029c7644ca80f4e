//! HTTP surface of the Marquee services: configuration, wiring and routes.

pub mod app;
pub mod config;
