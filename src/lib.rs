//! VFX Launcher - pipeline launcher for Houdini and Nuke
//!
//! This library provides the headless "Get Node" bridge: listing nodes and
//! parameters of a .hip file, reading and writing parameter values, all by
//! running one-shot `hython` scripts. The launcher's smaller tools (folder
//! generator, batch render setup, app launch) live alongside it.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod process_manager;

// Node bridge and its hython transport
pub mod bridge;
pub mod hython;
pub mod session;

// Launcher tools
pub mod app_launcher;
pub mod batch_render;
pub mod folder_generator;
