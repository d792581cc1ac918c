//! chirp feedback gateway library
//!
//! This library provides the core functionality for the chirp feedback
//! gateway: the HTTP server, the conversation orchestrator, the AI
//! completion adapter, and the GitHub issue submission pipeline.

pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod issues;
pub mod logging;
pub mod server;
pub mod sessions;
pub mod validation;
