//! Core domain types
//!
//! This module contains the core domain structures used across Cutover crates.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (which owns and persists them) and the operator client.

pub mod artifact;
pub mod deployment;
pub mod health;
pub mod outcome;
pub mod pipeline;
pub mod retry;
pub mod spec;
pub mod traffic;
