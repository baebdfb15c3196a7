//! Borderless window covering the primary screen, kept under every other
//! window and invisible to the mouse. The video engine renders into it.

use crate::engine::WindowHandle;
use crate::surface::{SurfaceWindow, WindowError};
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{BLACK_BRUSH, GetStockObject, HBRUSH};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, GWL_EXSTYLE, GetSystemMetrics,
    GetWindowLongPtrW, HTTRANSPARENT, HWND_BOTTOM, IsWindowVisible, LWA_ALPHA, MA_NOACTIVATE,
    RegisterClassExW, SM_CXSCREEN, SM_CYSCREEN, SW_SHOWNOACTIVATE, SWP_NOACTIVATE, SWP_NOMOVE,
    SWP_NOSIZE, SetCursor, SetLayeredWindowAttributes, SetWindowLongPtrW, SetWindowPos,
    ShowWindow, WINDOW_EX_STYLE, WM_MOUSEACTIVATE, WM_NCHITTEST, WM_SETCURSOR, WNDCLASSEXW,
    WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TRANSPARENT, WS_POPUP,
};
use windows::core::{Result, w};

/// Extended styles that keep the window out of the taskbar, out of focus and
/// out of the way of the mouse.
const CLICK_THROUGH: WINDOW_EX_STYLE = WINDOW_EX_STYLE(
    WS_EX_TOOLWINDOW.0 | WS_EX_NOACTIVATE.0 | WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0,
);

#[derive(Debug)]
pub struct DesktopWindow {
    hwnd: HWND,
}

impl DesktopWindow {
    /// Create and show the window over the whole primary screen.
    pub fn create(instance: HINSTANCE) -> Result<Self> {
        let class_name = w!("LoopwallDesktop");

        // SAFETY: class and window creation with valid, static arguments; the
        // window is owned by this thread for its whole life.
        unsafe {
            let class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(desktop_proc),
                hInstance: instance,
                hbrBackground: HBRUSH(GetStockObject(BLACK_BRUSH).0),
                lpszClassName: class_name,
                ..Default::default()
            };
            if RegisterClassExW(&class) == 0 {
                return Err(windows::core::Error::from_thread());
            }

            let width = GetSystemMetrics(SM_CXSCREEN);
            let height = GetSystemMetrics(SM_CYSCREEN);

            let hwnd = CreateWindowExW(
                CLICK_THROUGH,
                class_name,
                w!("Loopwall Desktop"),
                WS_POPUP,
                0,
                0,
                width,
                height,
                None,
                None,
                Some(instance),
                None,
            )?;

            // Layered windows stay invisible until their attributes are set.
            SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA)?;
            let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);

            log::info!("Desktop window created ({}x{})", width, height);

            let window = Self { hwnd };
            if let Err(e) = window.send_to_bottom() {
                log::warn!("{}", e);
            }
            Ok(window)
        }
    }
}

impl SurfaceWindow for DesktopWindow {
    fn is_realized(&self) -> bool {
        // SAFETY: read-only query on our own window.
        unsafe { IsWindowVisible(self.hwnd).as_bool() }
    }

    fn native_handle(&self) -> WindowHandle {
        WindowHandle(self.hwnd.0 as usize)
    }

    fn apply_click_through(&self) -> std::result::Result<(), WindowError> {
        // SAFETY: style read/write on our own window.
        unsafe {
            let current = GetWindowLongPtrW(self.hwnd, GWL_EXSTYLE);
            let wanted = current | CLICK_THROUGH.0 as isize;
            if current == wanted {
                return Ok(());
            }
            SetWindowLongPtrW(self.hwnd, GWL_EXSTYLE, wanted);
            if GetWindowLongPtrW(self.hwnd, GWL_EXSTYLE) != wanted {
                return Err(WindowError(
                    "click-through styles were not applied".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn send_to_bottom(&self) -> std::result::Result<(), WindowError> {
        // SAFETY: z-order change only, no move, no resize, no activation.
        unsafe {
            SetWindowPos(
                self.hwnd,
                Some(HWND_BOTTOM),
                0,
                0,
                0,
                0,
                SWP_NOACTIVATE | SWP_NOMOVE | SWP_NOSIZE,
            )
        }
        .map_err(|e| WindowError(e.to_string()))
    }
}

impl Drop for DesktopWindow {
    fn drop(&mut self) {
        // SAFETY: destroying the window we created, on its own thread.
        if let Err(e) = unsafe { DestroyWindow(self.hwnd) } {
            log::debug!("Desktop window already gone: {}", e);
        }
    }
}

unsafe extern "system" fn desktop_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        // Let clicks fall through to whatever is below.
        WM_NCHITTEST => LRESULT(HTTRANSPARENT as isize),
        WM_MOUSEACTIVATE => LRESULT(MA_NOACTIVATE as isize),
        WM_SETCURSOR => {
            // SAFETY: hides the cursor while it is over this window.
            unsafe { SetCursor(None) };
            LRESULT(1)
        }
        // SAFETY: default handling for everything else.
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}
