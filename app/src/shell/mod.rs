//! Win32 shell: the desktop window, the control panel, the tray icon and the
//! message loop tying them together.
//!
//! Everything here runs on the thread that called [`run`]. The only other
//! thread is the hotkey listener, which reaches this one through the task queue
//! and a `WM_APP_TASKS` wake-up posted to the panel.

mod desktop;
mod panel;
mod tray;

pub use self::desktop::DesktopWindow;

use crate::controller::Controller;
use crate::engine::{self, MediaEngine};
use crate::error::WallpaperError;
use crate::hotkey::{Hotkey, HotkeyListener};
use crate::settings::SettingsStore;
use crate::tasks;
use anyhow::{Context, Result};
use std::ffi::c_void;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, MSG, PostMessageW, TranslateMessage, WM_APP,
};

/// Posted to the panel when UI tasks are waiting.
pub(crate) const WM_APP_TASKS: u32 = WM_APP + 1;

/// Tray icon callback message.
pub(crate) const WM_APP_TRAY: u32 = WM_APP + 2;

pub(crate) const APP_NAME: &str = "Loopwall";

type AppController = Controller<Box<dyn MediaEngine>, DesktopWindow>;

/// Create the windows, restore the saved video and pump messages until Quit.
pub fn run() -> Result<()> {
    // SAFETY: querying the handle of our own executable.
    let instance: HINSTANCE = unsafe { GetModuleHandleW(None) }
        .context("Failed to get module handle")?
        .into();

    let desktop = DesktopWindow::create(instance).context("Failed to create desktop window")?;

    let store = SettingsStore::at_default_location();
    log::info!("Settings file: {}", store.path().display());

    let mut controller: AppController = Controller::new(engine::create_engine(), desktop, store);
    if !controller.realize() {
        log::warn!("Video output is not attached to the desktop window");
    }

    let (sender, receiver) = tasks::channel();
    let panel = panel::Panel::create(instance, controller, receiver, Hotkey::TOGGLE_ASPECT)
        .context("Failed to create control panel")?;

    let panel_raw = panel.hwnd().0 as isize;
    let sender = sender.with_waker(move || {
        // SAFETY: PostMessageW is thread-safe; a stale handle only makes it fail.
        let _ = unsafe {
            PostMessageW(
                Some(HWND(panel_raw as *mut c_void)),
                WM_APP_TASKS,
                WPARAM(0),
                LPARAM(0),
            )
        };
    });

    match HotkeyListener::spawn(Hotkey::TOGGLE_ASPECT, sender) {
        Ok(listener) => panel.attach_hotkey(listener),
        Err(e) => log::warn!("{}. Aspect hotkey unavailable.", WallpaperError::from(e)),
    }

    panel.start();

    message_loop()
}

fn message_loop() -> Result<()> {
    let mut msg = MSG::default();
    loop {
        // SAFETY: standard message pump on the thread owning all our windows.
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match result.0 {
            0 => return Ok(()),
            -1 => anyhow::bail!("GetMessageW failed"),
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }
}

/// Copy `text` into a fixed-size UTF-16 buffer, truncated and NUL-terminated.
pub(crate) fn copy_wide(dst: &mut [u16], text: &str) {
    let Some(max) = dst.len().checked_sub(1) else {
        return;
    };
    let mut len = 0;
    for (slot, unit) in dst.iter_mut().zip(text.encode_utf16().take(max)) {
        *slot = unit;
        len += 1;
    }
    dst[len] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_wide_terminates() {
        let mut buf = [0xFFFFu16; 8];
        copy_wide(&mut buf, "tray");
        assert_eq!(&buf[..5], &[b't' as u16, b'r' as u16, b'a' as u16, b'y' as u16, 0]);
    }

    #[test]
    fn test_copy_wide_truncates() {
        let mut buf = [0u16; 4];
        copy_wide(&mut buf, "Loopwall");
        assert_eq!(buf, [b'L' as u16, b'o' as u16, b'o' as u16, 0]);
    }
}
