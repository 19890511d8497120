//! sitemill - an asset build pipeline for static websites
//!
//! Wires glob-based source discovery, file transforms (stylesheets,
//! templates, scripts, responsive images, fonts), an in-memory change
//! cache, and a watch controller into named tasks grouped as "develop"
//! and "production" pipelines.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod watch;
