//! Loopwall: a looping video as desktop wallpaper, kept beneath every application
//! window, with a small control panel and a tray icon.
//!
//! Everything except [`shell`] is platform independent and driven through the
//! [`engine::MediaEngine`] and [`surface::SurfaceWindow`] traits.

mod macros;

pub mod controller;
pub mod engine;
pub mod error;
pub mod hotkey;
pub mod settings;
pub mod surface;
pub mod tasks;

#[cfg(windows)]
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;
