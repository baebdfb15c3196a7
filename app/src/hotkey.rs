//! System-wide hotkey
//!
//! Presses are observed by a low-level keyboard hook on a dedicated listener
//! thread. The hook never consumes the key, so the focused application still
//! receives it. Presses are never handled there: the listener only forwards a
//! [`UiTask`] through the [`TaskSender`](crate::tasks::TaskSender), which wakes
//! the UI thread.

use crate::tasks::UiTask;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("failed to install hotkey {hotkey}: {reason}")]
    Registration { hotkey: Hotkey, reason: String },

    #[error("hotkey listener thread failed: {0}")]
    Listener(String),
}

/// Modifier keys plus one letter or digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub key: char,
}

impl Hotkey {
    /// Ctrl+R
    pub const TOGGLE_ASPECT: Hotkey = Hotkey {
        ctrl: true,
        alt: false,
        shift: false,
        key: 'R',
    };

    /// Virtual-key code. Letters and digits map to their uppercase ASCII value.
    pub fn virtual_key(&self) -> Option<u32> {
        let key = self.key.to_ascii_uppercase();
        key.is_ascii_alphanumeric().then_some(key as u32)
    }

    /// Task sent when the hotkey is pressed.
    pub fn task(&self) -> UiTask {
        UiTask::ToggleAspect
    }

    /// Whether `vk` with exactly the `held` modifiers is this hotkey.
    pub fn matches(&self, vk: u32, held: Modifiers) -> bool {
        self.virtual_key() == Some(vk)
            && held.ctrl == self.ctrl
            && held.alt == self.alt
            && held.shift == self.shift
    }
}

/// Modifier keys held down when a key event arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// Turns raw key-down/key-up events into hotkey presses. Auto-repeat while the
/// key stays down counts as one press.
#[derive(Debug)]
pub struct PressDetector {
    hotkey: Hotkey,
    down: bool,
}

impl PressDetector {
    pub fn new(hotkey: Hotkey) -> Self {
        Self {
            hotkey,
            down: false,
        }
    }

    pub fn hotkey(&self) -> Hotkey {
        self.hotkey
    }

    /// Feed a key-down; returns `true` when it starts a new press of the hotkey.
    pub fn key_down(&mut self, vk: u32, held: Modifiers) -> bool {
        if self.hotkey.virtual_key() != Some(vk) || self.down {
            return false;
        }
        self.down = true;
        self.hotkey.matches(vk, held)
    }

    pub fn key_up(&mut self, vk: u32) {
        if self.hotkey.virtual_key() == Some(vk) {
            self.down = false;
        }
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key.to_ascii_uppercase())
    }
}

#[cfg(windows)]
pub use listener::HotkeyListener;

#[cfg(windows)]
mod listener {
    use super::{Hotkey, HotkeyError, Modifiers, PressDetector};
    use crate::tasks::TaskSender;
    use std::cell::RefCell;
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_MENU, VK_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, GetMessageW, KBDLLHOOKSTRUCT, MSG, PM_NOREMOVE, PeekMessageW,
        PostQuitMessage, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
        WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_USER,
    };

    struct HookState {
        detector: PressDetector,
        sender: TaskSender,
    }

    thread_local! {
        // Only the listener thread installs the hook, so only it ever sets this.
        static HOOK_STATE: RefCell<Option<HookState>> = const { RefCell::new(None) };
    }

    /// Installed keyboard hook and its listener thread. Dropping it removes the
    /// hook and joins the thread.
    pub struct HotkeyListener {
        hotkey: Hotkey,
        thread_id: u32,
        handle: Option<JoinHandle<()>>,
    }

    impl HotkeyListener {
        pub fn spawn(hotkey: Hotkey, sender: TaskSender) -> Result<Self, HotkeyError> {
            if hotkey.virtual_key().is_none() {
                return Err(HotkeyError::Registration {
                    hotkey,
                    reason: format!("'{}' has no virtual-key code", hotkey.key),
                });
            }

            let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();

            let handle = thread::Builder::new()
                .name("hotkey-listener".to_string())
                .spawn(move || listen(hotkey, sender, ready_tx))
                .map_err(|e| HotkeyError::Listener(e.to_string()))?;

            match ready_rx.recv() {
                Ok(Ok(thread_id)) => {
                    log::info!("Listening for global hotkey {}", hotkey);
                    Ok(Self {
                        hotkey,
                        thread_id,
                        handle: Some(handle),
                    })
                }
                Ok(Err(reason)) => {
                    let _ = handle.join();
                    Err(HotkeyError::Registration { hotkey, reason })
                }
                Err(_) => {
                    let _ = handle.join();
                    Err(HotkeyError::Listener(
                        "exited before registering".to_string(),
                    ))
                }
            }
        }

        pub fn hotkey(&self) -> Hotkey {
            self.hotkey
        }
    }

    fn listen(hotkey: Hotkey, sender: TaskSender, ready: mpsc::Sender<Result<u32, String>>) {
        HOOK_STATE.with(|state| {
            *state.borrow_mut() = Some(HookState {
                detector: PressDetector::new(hotkey),
                sender,
            });
        });

        let mut msg = MSG::default();

        // SAFETY: plain Win32 calls on this thread's own message queue; the hook
        // is removed before the thread exits.
        unsafe {
            // Create the queue before anyone can post to it.
            let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);

            let module: Option<HINSTANCE> = GetModuleHandleW(None).ok().map(Into::into);
            let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), module, 0) {
                Ok(hook) => hook,
                Err(e) => {
                    let _ = ready.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = ready.send(Ok(GetCurrentThreadId()));

            // Hook callbacks run on this thread while it waits for messages.
            loop {
                match GetMessageW(&mut msg, None, 0, 0).0 {
                    -1 => {
                        log::error!(
                            "Hotkey listener message loop failed: {}",
                            windows::core::Error::from_thread()
                        );
                        break;
                    }
                    0 => break,
                    _ => {}
                }
            }

            if let Err(e) = UnhookWindowsHookEx(hook) {
                log::debug!("Failed to remove keyboard hook: {}", e);
            }
        }

        HOOK_STATE.with(|state| state.borrow_mut().take());
        log::debug!("Hotkey listener stopped");
    }

    fn held_modifiers() -> Modifiers {
        // SAFETY: read-only key state query.
        let down = |key: VIRTUAL_KEY| unsafe { GetAsyncKeyState(i32::from(key.0)) } < 0;
        Modifiers {
            ctrl: down(VK_CONTROL),
            alt: down(VK_MENU),
            shift: down(VK_SHIFT),
        }
    }

    fn handle_key(message: u32, vk: u32) {
        HOOK_STATE.with(|state| {
            let Ok(mut state) = state.try_borrow_mut() else {
                return;
            };
            let Some(state) = state.as_mut() else {
                return;
            };

            match message {
                WM_KEYDOWN | WM_SYSKEYDOWN => {
                    if state.detector.key_down(vk, held_modifiers()) {
                        let hotkey = state.detector.hotkey();
                        log::debug!("Hotkey {} pressed", hotkey);
                        if !state.sender.send(hotkey.task()) {
                            // SAFETY: ends this thread's own message loop.
                            unsafe { PostQuitMessage(0) };
                        }
                    }
                }
                WM_KEYUP | WM_SYSKEYUP => state.detector.key_up(vk),
                _ => {}
            }
        });
    }

    unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code >= 0 {
            // SAFETY: for non-negative codes, lparam points to a KBDLLHOOKSTRUCT.
            let event = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
            handle_key(wparam.0 as u32, event.vkCode);
        }
        // The key always continues to the focused application.
        // SAFETY: forwarding the unchanged hook arguments.
        unsafe { CallNextHookEx(None, code, wparam, lparam) }
    }

    impl Drop for HotkeyListener {
        fn drop(&mut self) {
            // SAFETY: posting to a thread id we obtained from that thread.
            let posted =
                unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(e) = posted {
                log::warn!("Failed to stop hotkey listener: {}", e);
                return;
            }
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            log::info!("Released global hotkey {}", self.hotkey);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_aspect_hotkey() {
        let hotkey = Hotkey::TOGGLE_ASPECT;
        assert_eq!(hotkey.to_string(), "Ctrl+R");
        assert_eq!(hotkey.virtual_key(), Some(0x52));
        assert_eq!(hotkey.task(), UiTask::ToggleAspect);
    }

    #[test]
    fn test_display_lists_modifiers_in_order() {
        let hotkey = Hotkey {
            ctrl: true,
            alt: true,
            shift: true,
            key: 'w',
        };
        assert_eq!(hotkey.to_string(), "Ctrl+Alt+Shift+W");
        assert_eq!(hotkey.virtual_key(), Some('W' as u32));
    }

    #[test]
    fn test_matches_requires_exact_modifiers() {
        let hotkey = Hotkey::TOGGLE_ASPECT;
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        assert!(hotkey.matches(0x52, ctrl));
        assert!(!hotkey.matches(0x52, Modifiers::default()));
        assert!(!hotkey.matches(
            0x52,
            Modifiers {
                shift: true,
                ..ctrl
            }
        ));
        assert!(!hotkey.matches(0x54, ctrl));
    }

    #[test]
    fn test_held_key_counts_once() {
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        let mut detector = PressDetector::new(Hotkey::TOGGLE_ASPECT);

        assert!(detector.key_down(0x52, ctrl));
        // Auto-repeat.
        assert!(!detector.key_down(0x52, ctrl));
        assert!(!detector.key_down(0x52, ctrl));

        detector.key_up(0x52);
        assert!(detector.key_down(0x52, ctrl));
    }

    #[test]
    fn test_plain_key_is_not_a_press() {
        let mut detector = PressDetector::new(Hotkey::TOGGLE_ASPECT);

        assert!(!detector.key_down(0x52, Modifiers::default()));
        detector.key_up(0x52);

        // Other keys do not disturb the state.
        detector.key_up(0x11);
        assert!(detector.key_down(
            0x52,
            Modifiers {
                ctrl: true,
                ..Modifiers::default()
            }
        ));
    }

    #[test]
    fn test_virtual_key_rejects_symbols() {
        let hotkey = Hotkey {
            key: '#',
            ..Hotkey::TOGGLE_ASPECT
        };
        assert_eq!(hotkey.virtual_key(), None);
    }
}
