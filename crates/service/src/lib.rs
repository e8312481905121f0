//! ML analytics HTTP service
//!
//! Exposes the analytics engine's train/validate operations over HTTP
//! together with health probes and Prometheus metrics.

pub mod api;
pub mod config;
