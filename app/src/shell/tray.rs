//! Notification area icon, its context menu and balloon notices.

use super::{APP_NAME, WM_APP_TRAY, copy_wide};
use crate::tasks::{MenuEntry, UiTask};
use windows::Win32::Foundation::{HWND, POINT};
use windows::Win32::UI::Shell::{
    NIF_ICON, NIF_INFO, NIF_MESSAGE, NIF_TIP, NIIF_INFO, NIM_ADD, NIM_DELETE, NIM_MODIFY,
    NOTIFYICONDATAW, Shell_NotifyIconW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, DestroyMenu, GetCursorPos, IDI_APPLICATION, LoadIconW,
    MF_SEPARATOR, MF_STRING, SetForegroundWindow, TPM_BOTTOMALIGN, TPM_NONOTIFY,
    TPM_RETURNCMD, TPM_RIGHTALIGN, TPM_RIGHTBUTTON, TrackPopupMenu,
};
use windows::core::{HSTRING, PCWSTR};

const TRAY_ID: u32 = 1;
const MENU_BASE: usize = 1000;

pub struct Tray {
    hwnd: HWND,
    menu: Vec<MenuEntry>,
    added: bool,
}

impl Tray {
    /// Tray icon whose callbacks go to `hwnd` as `WM_APP_TRAY`.
    pub fn new(hwnd: HWND, menu: Vec<MenuEntry>) -> Self {
        let mut tray = Self {
            hwnd,
            menu,
            added: false,
        };
        tray.add();
        tray
    }

    fn data(&self) -> NOTIFYICONDATAW {
        NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ID,
            ..Default::default()
        }
    }

    /// (Re-)add the icon. Also used after Explorer restarts and drops it.
    pub fn add(&mut self) {
        let mut data = self.data();
        data.uFlags = NIF_ICON | NIF_MESSAGE | NIF_TIP;
        data.uCallbackMessage = WM_APP_TRAY;
        // SAFETY: stock icon, no module handle needed.
        data.hIcon = unsafe { LoadIconW(None, IDI_APPLICATION) }.unwrap_or_default();
        copy_wide(&mut data.szTip, APP_NAME);

        // SAFETY: `data` is fully initialised and outlives the call.
        self.added = unsafe { Shell_NotifyIconW(NIM_ADD, &data) }.as_bool();
        if self.added {
            log::info!("Tray icon added");
        } else {
            log::warn!("Failed to add tray icon");
        }
    }

    /// Balloon notice next to the icon.
    pub fn notify(&self, message: &str) {
        if !self.added {
            log::info!("{}", message);
            return;
        }
        let mut data = self.data();
        data.uFlags = NIF_INFO;
        data.dwInfoFlags = NIIF_INFO;
        copy_wide(&mut data.szInfoTitle, APP_NAME);
        copy_wide(&mut data.szInfo, message);

        // SAFETY: as in `add`.
        if !unsafe { Shell_NotifyIconW(NIM_MODIFY, &data) }.as_bool() {
            log::debug!("Failed to show tray notice: {}", message);
        }
    }

    pub fn remove(&mut self) {
        if !self.added {
            return;
        }
        let data = self.data();
        // SAFETY: as in `add`.
        let _ = unsafe { Shell_NotifyIconW(NIM_DELETE, &data) };
        self.added = false;
        log::info!("Tray icon removed");
    }

    pub fn menu(&self) -> &[MenuEntry] {
        &self.menu
    }
}

impl Drop for Tray {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Show the context menu at the cursor and return the chosen task.
///
/// Runs a modal loop; call it without holding any application state.
pub fn show_menu(hwnd: HWND, entries: &[MenuEntry]) -> Option<UiTask> {
    // SAFETY: the menu is created, tracked and destroyed within this call; the
    // label strings outlive `AppendMenuW`, which copies them.
    unsafe {
        let menu = match CreatePopupMenu() {
            Ok(menu) => menu,
            Err(e) => {
                log::warn!("Failed to create tray menu: {}", e);
                return None;
            }
        };

        for (index, entry) in entries.iter().enumerate() {
            let appended = match entry {
                MenuEntry::Item { label, .. } => AppendMenuW(
                    menu,
                    MF_STRING,
                    MENU_BASE + index,
                    &HSTRING::from(label.as_str()),
                ),
                MenuEntry::Separator => AppendMenuW(menu, MF_SEPARATOR, 0, PCWSTR::null()),
            };
            if let Err(e) = appended {
                log::debug!("Failed to add tray menu entry: {}", e);
            }
        }

        let mut cursor = POINT::default();
        let _ = GetCursorPos(&mut cursor);

        // Without this the menu does not close when clicking elsewhere.
        let _ = SetForegroundWindow(hwnd);
        let chosen = TrackPopupMenu(
            menu,
            TPM_RETURNCMD | TPM_NONOTIFY | TPM_RIGHTBUTTON | TPM_RIGHTALIGN | TPM_BOTTOMALIGN,
            cursor.x,
            cursor.y,
            None,
            hwnd,
            None,
        );
        let _ = DestroyMenu(menu);

        task_for_command(entries, chosen.0 as usize)
    }
}

fn task_for_command(entries: &[MenuEntry], command: usize) -> Option<UiTask> {
    let index = command.checked_sub(MENU_BASE)?;
    match entries.get(index)? {
        MenuEntry::Item { task, .. } => Some(*task),
        MenuEntry::Separator => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::Hotkey;
    use crate::tasks::tray_menu;

    #[test]
    fn test_menu_commands_map_to_tasks() {
        let menu = tray_menu(Hotkey::TOGGLE_ASPECT);
        assert_eq!(task_for_command(&menu, MENU_BASE), Some(UiTask::ShowPanel));
        assert_eq!(
            task_for_command(&menu, MENU_BASE + 3),
            Some(UiTask::ToggleAspect)
        );
        assert_eq!(task_for_command(&menu, MENU_BASE + 5), Some(UiTask::Quit));
    }

    #[test]
    fn test_dismissed_menu_maps_to_nothing() {
        let menu = tray_menu(Hotkey::TOGGLE_ASPECT);
        assert_eq!(task_for_command(&menu, 0), None);
        assert_eq!(task_for_command(&menu, MENU_BASE + 4), None);
        assert_eq!(task_for_command(&menu, MENU_BASE + 99), None);
    }
}
