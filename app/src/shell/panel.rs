//! Control panel window.
//!
//! Application state lives in a `RefCell<PanelState>` owned by the panel window
//! (`GWLP_USERDATA`) and is only touched through [`with_state`]. Modal loops
//! (file dialog, message box, tray menu) pump messages that re-enter
//! `panel_proc`, so they are always run between two `with_state` calls, never
//! inside one.

use super::tray::{self, Tray};
use super::{APP_NAME, AppController, WM_APP_TASKS, WM_APP_TRAY};
use crate::controller::NoticeLevel;
use crate::hotkey::{Hotkey, HotkeyListener};
use crate::tasks::{self, TaskReceiver, UiTask};
use common::PlaybackSpeed;
use std::cell::RefCell;
use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::OnceLock;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{COLOR_BTNFACE, DEFAULT_GUI_FONT, GetStockObject, GetSysColorBrush};
use windows::Win32::UI::Input::KeyboardAndMouse::EnableWindow;
use windows::Win32::UI::WindowsAndMessaging::{
    BS_PUSHBUTTON, CB_ADDSTRING, CB_GETCURSEL, CB_SETCURSEL, CBN_SELCHANGE, CBS_DROPDOWNLIST,
    CW_USEDEFAULT, CreateWindowExW, DefWindowProcW, DestroyWindow, GWLP_USERDATA,
    GetWindowLongPtrW, HMENU, IDC_ARROW, IDI_APPLICATION, KillTimer, LoadCursorW, LoadIconW,
    MB_ICONERROR, MB_OK, MessageBoxW, PostQuitMessage, RegisterClassExW, RegisterWindowMessageW,
    SW_HIDE, SW_RESTORE, SW_SHOW, SendMessageW, SetForegroundWindow, SetTimer,
    SetWindowLongPtrW, SetWindowTextW, ShowWindow, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE,
    WM_COMMAND, WM_DESTROY, WM_LBUTTONUP, WM_NCDESTROY, WM_RBUTTONUP, WM_SETFONT, WM_TIMER,
    WNDCLASSEXW, WS_CAPTION, WS_CHILD, WS_EX_TOPMOST, WS_MINIMIZEBOX, WS_OVERLAPPED, WS_SYSMENU,
    WS_TABSTOP, WS_VISIBLE, WS_VSCROLL,
};
use windows::core::{HSTRING, PCWSTR, Result, w};

const PANEL_WIDTH: i32 = 490;
const PANEL_HEIGHT: i32 = 160;

const ID_LOAD: u16 = 101;
const ID_PLAY_PAUSE: u16 = 102;
const ID_SET_DEFAULT: u16 = 103;
const ID_HIDE: u16 = 104;
const ID_SPEED: u16 = 105;
const ID_ASPECT: u16 = 106;

const KEEP_BOTTOM_TIMER: usize = 1;
const KEEP_BOTTOM_INTERVAL_MS: u32 = 1000;

/// Extensions offered by the file picker.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi"];

#[derive(Clone, Copy)]
struct Controls {
    play_pause: HWND,
    set_default: HWND,
    speed: HWND,
    aspect: HWND,
    status: HWND,
}

struct PanelState {
    controller: AppController,
    tasks: TaskReceiver,
    tray: Tray,
    hotkey: Option<HotkeyListener>,
    controls: Controls,
}

/// What the controls should currently show.
struct View {
    status: String,
    aspect: &'static str,
    speed: PlaybackSpeed,
    playback: &'static str,
    has_media: bool,
}

impl PanelState {
    fn view(&self) -> View {
        View {
            status: self.controller.status().to_string(),
            aspect: self.controller.aspect().label(),
            speed: self.controller.speed(),
            playback: self.controller.playback_label(),
            has_media: self.controller.has_media(),
        }
    }
}

pub struct Panel {
    hwnd: HWND,
}

impl Panel {
    /// Create the (hidden) panel, its controls and the tray icon. The panel
    /// takes ownership of the controller.
    pub fn create(
        instance: HINSTANCE,
        controller: AppController,
        tasks: TaskReceiver,
        hotkey: Hotkey,
    ) -> Result<Self> {
        let class_name = w!("LoopwallPanel");

        // SAFETY: class registration and window creation with valid arguments on
        // the UI thread.
        let hwnd = unsafe {
            let class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(panel_proc),
                hInstance: instance,
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                hIcon: LoadIconW(None, IDI_APPLICATION).unwrap_or_default(),
                hbrBackground: GetSysColorBrush(COLOR_BTNFACE),
                lpszClassName: class_name,
                ..Default::default()
            };
            if RegisterClassExW(&class) == 0 {
                return Err(windows::core::Error::from_thread());
            }

            CreateWindowExW(
                WS_EX_TOPMOST,
                class_name,
                &HSTRING::from(APP_NAME),
                WS_OVERLAPPED | WS_CAPTION | WS_SYSMENU | WS_MINIMIZEBOX,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                PANEL_WIDTH,
                PANEL_HEIGHT,
                None,
                None,
                Some(instance),
                None,
            )?
        };

        let controls = match create_controls(hwnd, instance) {
            Ok(controls) => controls,
            Err(e) => {
                // SAFETY: our own, state-less window.
                let _ = unsafe { DestroyWindow(hwnd) };
                return Err(e);
            }
        };
        populate_speeds(controls.speed);

        let state = Box::new(RefCell::new(PanelState {
            controller,
            tasks,
            tray: Tray::new(hwnd, tasks::tray_menu(hotkey)),
            hotkey: None,
            controls,
        }));

        // SAFETY: ownership moves into the window and is reclaimed in WM_NCDESTROY.
        unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, Box::into_raw(state) as isize) };

        Ok(Self { hwnd })
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    /// Keep the hotkey registered until Quit.
    pub fn attach_hotkey(&self, listener: HotkeyListener) {
        with_state(self.hwnd, |state| state.hotkey = Some(listener));
    }

    /// Restore the saved video, start the keep-bottom tick and show the panel.
    pub fn start(&self) {
        with_state(self.hwnd, |state| state.controller.start());
        refresh(self.hwnd);

        // SAFETY: timer and visibility of our own window.
        unsafe {
            if SetTimer(
                Some(self.hwnd),
                KEEP_BOTTOM_TIMER,
                KEEP_BOTTOM_INTERVAL_MS,
                None,
            ) == 0
            {
                log::warn!("Failed to start keep-bottom timer");
            }
            let _ = ShowWindow(self.hwnd, SW_SHOW);
        }
        show_notices(self.hwnd);
    }
}

fn create_controls(parent: HWND, instance: HINSTANCE) -> Result<Controls> {
    // SAFETY: stock objects are never freed.
    let font = unsafe { GetStockObject(DEFAULT_GUI_FONT) };

    let child = |class: PCWSTR,
                 text: &str,
                 style: WINDOW_STYLE,
                 id: u16,
                 (x, y, width, height): (i32, i32, i32, i32)|
     -> Result<HWND> {
        // SAFETY: child window of `parent` on the same thread.
        unsafe {
            let control = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                class,
                &HSTRING::from(text),
                WS_CHILD | WS_VISIBLE | style,
                x,
                y,
                width,
                height,
                Some(parent),
                Some(HMENU(id as usize as *mut c_void)),
                Some(instance),
                None,
            )?;
            SendMessageW(
                control,
                WM_SETFONT,
                Some(WPARAM(font.0 as usize)),
                Some(LPARAM(1)),
            );
            Ok(control)
        }
    };

    let button = WS_TABSTOP | WINDOW_STYLE(BS_PUSHBUTTON as u32);
    let label = WINDOW_STYLE(0);

    child(w!("BUTTON"), "Load Video", button, ID_LOAD, (10, 10, 105, 28))?;
    let play_pause = child(w!("BUTTON"), "Play", button, ID_PLAY_PAUSE, (120, 10, 105, 28))?;
    let set_default = child(w!("BUTTON"), "Set as Default", button, ID_SET_DEFAULT, (230, 10, 105, 28))?;
    child(w!("BUTTON"), "Minimize to Tray", button, ID_HIDE, (340, 10, 125, 28))?;

    child(w!("STATIC"), "Speed:", label, 0, (10, 52, 45, 20))?;
    let speed = child(
        w!("COMBOBOX"),
        "",
        WS_TABSTOP | WS_VSCROLL | WINDOW_STYLE(CBS_DROPDOWNLIST as u32),
        ID_SPEED,
        (60, 48, 80, 200),
    )?;
    child(w!("STATIC"), "Aspect:", label, 0, (160, 52, 50, 20))?;
    let aspect = child(w!("BUTTON"), "", button, ID_ASPECT, (215, 46, 120, 28))?;

    let status = child(w!("STATIC"), "", label, 0, (10, 88, 455, 20))?;

    Ok(Controls {
        play_pause,
        set_default,
        speed,
        aspect,
        status,
    })
}

fn populate_speeds(combo: HWND) {
    for speed in PlaybackSpeed::ALL {
        let label = HSTRING::from(speed.label());
        // SAFETY: the combo box copies the string before returning.
        unsafe {
            SendMessageW(
                combo,
                CB_ADDSTRING,
                None,
                Some(LPARAM(label.as_ptr() as isize)),
            );
        }
    }
}

/// Run `f` on the panel state, or return `None` if the window has no state (not
/// created yet, or already destroyed) or it is already borrowed further up the
/// stack.
fn with_state<T>(hwnd: HWND, f: impl FnOnce(&mut PanelState) -> T) -> Option<T> {
    // SAFETY: the pointer is null or the box installed by `Panel::create`, which
    // lives until WM_NCDESTROY on this thread.
    let cell = unsafe {
        (GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const RefCell<PanelState>).as_ref()
    }?;
    match cell.try_borrow_mut() {
        Ok(mut state) => Some(f(&mut state)),
        Err(_) => {
            log::debug!("Panel state busy, dropping re-entrant call");
            None
        }
    }
}

fn refresh(hwnd: HWND) {
    let Some((controls, view)) = with_state(hwnd, |state| (state.controls, state.view())) else {
        return;
    };

    // SAFETY: plain control updates; none of them call back into panel_proc.
    unsafe {
        let _ = SetWindowTextW(controls.status, &HSTRING::from(view.status.as_str()));
        let _ = SetWindowTextW(controls.aspect, &HSTRING::from(view.aspect));
        let _ = SetWindowTextW(controls.play_pause, &HSTRING::from(view.playback));
        let _ = EnableWindow(controls.play_pause, view.has_media);
        let _ = EnableWindow(controls.set_default, view.has_media);
        SendMessageW(
            controls.speed,
            CB_SETCURSEL,
            Some(WPARAM(view.speed.index())),
            None,
        );
    }
}

fn show_notices(hwnd: HWND) {
    let notices = with_state(hwnd, |state| state.controller.take_notices()).unwrap_or_default();
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => {
                with_state(hwnd, |state| state.tray.notify(&notice.message));
            }
            NoticeLevel::Error => {
                // SAFETY: modal box owned by the panel; no state is borrowed here.
                unsafe {
                    MessageBoxW(
                        Some(hwnd),
                        &HSTRING::from(notice.message.as_str()),
                        w!("Error"),
                        MB_OK | MB_ICONERROR,
                    );
                }
            }
        }
    }
}

fn dispatch(hwnd: HWND, task: UiTask) {
    log::debug!("UI task: {:?}", task);
    match task {
        UiTask::ShowPanel => show(hwnd),
        UiTask::HidePanel => hide(hwnd),
        UiTask::LoadVideo => {
            if let Some(path) = pick_video() {
                with_state(hwnd, |state| state.controller.load_video(&path));
            }
        }
        UiTask::TogglePlayback => {
            with_state(hwnd, |state| state.controller.toggle_playback());
        }
        UiTask::ToggleAspect => {
            with_state(hwnd, |state| state.controller.toggle_aspect());
        }
        UiTask::SetAsDefault => {
            with_state(hwnd, |state| state.controller.set_as_default());
        }
        UiTask::Quit => {
            quit(hwnd);
            return;
        }
    }
    refresh(hwnd);
    show_notices(hwnd);
}

fn show(hwnd: HWND) {
    // SAFETY: visibility of our own window.
    unsafe {
        let _ = ShowWindow(hwnd, SW_RESTORE);
        let _ = SetForegroundWindow(hwnd);
    }
}

fn hide(hwnd: HWND) {
    // SAFETY: visibility of our own window.
    let _ = unsafe { ShowWindow(hwnd, SW_HIDE) };
    with_state(hwnd, |state| state.controller.hidden_to_tray());
}

fn pick_video() -> Option<PathBuf> {
    let mut dialog = rfd::FileDialog::new()
        .set_title("Select a video")
        .add_filter("Video files", VIDEO_EXTENSIONS)
        .add_filter("All files", &["*"]);
    if let Some(home) = dirs::home_dir() {
        dialog = dialog.set_directory(home);
    }
    dialog.pick_file()
}

fn quit(hwnd: HWND) {
    log::info!("Quitting");
    with_state(hwnd, |state| {
        state.controller.shutdown();
        drop(state.hotkey.take());
        state.tray.remove();
    });

    // SAFETY: destroying our own window outside of any state borrow.
    if let Err(e) = unsafe { DestroyWindow(hwnd) } {
        log::warn!("Failed to destroy control panel: {}", e);
        // SAFETY: ends the message loop on this thread.
        unsafe { PostQuitMessage(0) };
    }
}

fn select_speed(hwnd: HWND, combo: HWND) {
    // SAFETY: read-only query on our own combo box.
    let index = unsafe { SendMessageW(combo, CB_GETCURSEL, None, None) }.0;
    let Some(speed) = usize::try_from(index)
        .ok()
        .and_then(PlaybackSpeed::from_index)
    else {
        return;
    };
    with_state(hwnd, |state| state.controller.set_speed(speed));
    refresh(hwnd);
}

fn on_command(hwnd: HWND, wparam: WPARAM, lparam: LPARAM) {
    let id = (wparam.0 & 0xFFFF) as u16;
    let code = ((wparam.0 >> 16) & 0xFFFF) as u32;

    let task = match id {
        ID_LOAD => UiTask::LoadVideo,
        ID_PLAY_PAUSE => UiTask::TogglePlayback,
        ID_SET_DEFAULT => UiTask::SetAsDefault,
        ID_HIDE => UiTask::HidePanel,
        ID_ASPECT => UiTask::ToggleAspect,
        ID_SPEED if code == CBN_SELCHANGE => {
            select_speed(hwnd, HWND(lparam.0 as *mut c_void));
            return;
        }
        _ => return,
    };
    dispatch(hwnd, task);
}

fn on_tray(hwnd: HWND, lparam: LPARAM) {
    match (lparam.0 & 0xFFFF) as u32 {
        WM_LBUTTONUP => dispatch(hwnd, UiTask::ShowPanel),
        WM_RBUTTONUP => {
            let Some(entries) = with_state(hwnd, |state| state.tray.menu().to_vec()) else {
                return;
            };
            if let Some(task) = tray::show_menu(hwnd, &entries) {
                dispatch(hwnd, task);
            }
        }
        _ => {}
    }
}

fn drain_tasks(hwnd: HWND) {
    let pending = with_state(hwnd, |state| state.tasks.drain()).unwrap_or_default();
    for task in pending {
        dispatch(hwnd, task);
    }
}

/// Broadcast by Explorer when the taskbar is (re)created.
fn taskbar_created() -> u32 {
    static MESSAGE: OnceLock<u32> = OnceLock::new();
    // SAFETY: registers (or looks up) a system-wide message id.
    *MESSAGE.get_or_init(|| unsafe { RegisterWindowMessageW(w!("TaskbarCreated")) })
}

unsafe extern "system" fn panel_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_COMMAND => on_command(hwnd, wparam, lparam),
        WM_APP_TRAY => on_tray(hwnd, lparam),
        WM_APP_TASKS => drain_tasks(hwnd),
        WM_TIMER if wparam.0 == KEEP_BOTTOM_TIMER => {
            with_state(hwnd, |state| state.controller.maintain());
            // The engine may have stopped on its own.
            refresh(hwnd);
        }
        WM_CLOSE => dispatch(hwnd, UiTask::HidePanel),
        WM_DESTROY => {
            // SAFETY: our own timer and message loop.
            unsafe {
                let _ = KillTimer(Some(hwnd), KEEP_BOTTOM_TIMER);
                PostQuitMessage(0);
            }
        }
        WM_NCDESTROY => {
            // SAFETY: takes back the box installed by `Panel::create`; the slot
            // is cleared first so later lookups find nothing.
            unsafe {
                let raw = SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) as *mut RefCell<PanelState>;
                if !raw.is_null() {
                    drop(Box::from_raw(raw));
                }
                return DefWindowProcW(hwnd, msg, wparam, lparam);
            }
        }
        _ if msg == taskbar_created() => {
            with_state(hwnd, |state| state.tray.add());
        }
        // SAFETY: default handling for everything else.
        _ => return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
    LRESULT(0)
}
