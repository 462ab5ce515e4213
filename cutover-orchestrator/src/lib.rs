//! Blue/green deployment orchestrator
//!
//! Builds a service from source, provisions the new revision next to the
//! serving one, shifts traffic, watches health and rolls back on failure.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
