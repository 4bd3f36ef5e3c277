//! Offline-first data layer for Hydra: cached resto menus, Schamper articles
//! and student associations, refreshed in the background when stale.

pub mod app;
pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod hydra;
pub mod logging;
pub mod preferences;

#[cfg(test)]
pub(crate) mod testing;

pub use error::StoreError;
