//! Cutover Core
//!
//! Core types and abstractions for the Cutover deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineRun, Deployment, etc.)
//! - DTOs: Data transfer objects for the operator API

pub mod domain;
pub mod dto;
