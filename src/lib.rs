//! Assetflow - front-end asset pipeline
//!
//! This library provides:
//! - Environment selection from `--env` or `NODE_ENV`
//! - Asset tasks: Sass, CSS minification, script bundling, templates,
//!   images and JSON
//! - Series and parallel composition of tasks
//! - A watch loop and a live-reload dev server

pub mod build;
pub mod cli;
pub mod config;
pub mod env;
pub mod logging;
pub mod server;
pub mod tasks;
pub mod watch;
