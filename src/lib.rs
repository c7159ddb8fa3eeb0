//! Linecraft turns a CSV of recipients and an SVG layout into
//! handwriting-style plotter documents, then walks them through a pen
//! plotter one card at a time with ink accounting and crash recovery.

pub mod batch;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod glyph;
pub mod inventory;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod template;
pub mod ui;
