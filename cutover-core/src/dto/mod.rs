//! Data Transfer Objects for the operator API
//!
//! This module contains DTOs exchanged between the orchestrator's HTTP API
//! and its clients (CLI, automation). DTOs are lightweight representations
//! of domain entities optimized for listing and network transfer.

pub mod deployment;
pub mod run;
pub mod service;
