//! Tauri command handlers
//!
//! This module contains all the IPC command handlers that can be called
//! from the widget via Tauri's invoke system.

pub mod capture;
pub mod export;
pub mod recording;
