//! Overlay window visibility: state queries and minimize/restore calls.
//!
//! The overlay window itself belongs to the companion GUI; the daemon only
//! drives its visibility through the window-chrome seam defined here.  On
//! Windows the real implementation resolves the window by title on every
//! call.  On other platforms the code compiles but reports the window as
//! closed, which makes every toggle a logged no-op.

use crate::error::ChromeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVisibility {
    Normal,
    Maximized,
    Minimized,
    /// Terminal: once the window is closed, chrome calls are no-op failures.
    Closed,
}

/// Seam to the external window chrome.  Implementations must not cache
/// state; `current_state` always reflects the live window.
pub trait WindowChrome: Send + Sync {
    fn current_state(&self) -> Result<WindowVisibility, ChromeError>;
    fn minimize(&self) -> Result<(), ChromeError>;
    fn restore(&self) -> Result<(), ChromeError>;
}

/// Synchronous, uncached read of the overlay window's visibility.
#[derive(Clone)]
pub struct WindowStateQuery {
    chrome: std::sync::Arc<dyn WindowChrome>,
}

impl WindowStateQuery {
    pub fn new(chrome: std::sync::Arc<dyn WindowChrome>) -> Self {
        Self { chrome }
    }

    pub fn current(&self) -> Result<WindowVisibility, ChromeError> {
        self.chrome.current_state()
    }
}

/// The companion overlay window, looked up by its title bar text.
pub struct OverlayWindow {
    title: String,
}

impl OverlayWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

#[cfg(windows)]
impl WindowChrome for OverlayWindow {
    fn current_state(&self) -> Result<WindowVisibility, ChromeError> {
        imp::current_state(&self.title)
    }

    fn minimize(&self) -> Result<(), ChromeError> {
        imp::show(&self.title, imp::ShowOp::Minimize)
    }

    fn restore(&self) -> Result<(), ChromeError> {
        imp::show(&self.title, imp::ShowOp::Restore)
    }
}

#[cfg(not(windows))]
impl WindowChrome for OverlayWindow {
    fn current_state(&self) -> Result<WindowVisibility, ChromeError> {
        // No overlay window exists off Windows; report it closed so the
        // toggle controller treats triggers as no-ops.
        let _ = &self.title;
        Ok(WindowVisibility::Closed)
    }

    fn minimize(&self) -> Result<(), ChromeError> {
        Err(ChromeError::Unsupported)
    }

    fn restore(&self) -> Result<(), ChromeError> {
        Err(ChromeError::Unsupported)
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        FindWindowW, IsIconic, IsWindowVisible, IsZoomed, ShowWindow, SW_MINIMIZE, SW_RESTORE,
    };

    use super::WindowVisibility;
    use crate::error::ChromeError;

    pub enum ShowOp {
        Minimize,
        Restore,
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn find_window(title: &str) -> Result<HWND, ChromeError> {
        let wide = to_wide(title);
        let hwnd = unsafe { FindWindowW(PCWSTR::null(), PCWSTR(wide.as_ptr())) };
        if hwnd.0 == 0 {
            Err(ChromeError::WindowNotFound)
        } else {
            Ok(hwnd)
        }
    }

    pub fn current_state(title: &str) -> Result<WindowVisibility, ChromeError> {
        let hwnd = match find_window(title) {
            Ok(hwnd) => hwnd,
            // A window that no longer exists reads as closed, not as an error.
            Err(ChromeError::WindowNotFound) => return Ok(WindowVisibility::Closed),
            Err(err) => return Err(err),
        };
        let state = unsafe {
            if !IsWindowVisible(hwnd).as_bool() || IsIconic(hwnd).as_bool() {
                WindowVisibility::Minimized
            } else if IsZoomed(hwnd).as_bool() {
                WindowVisibility::Maximized
            } else {
                WindowVisibility::Normal
            }
        };
        Ok(state)
    }

    pub fn show(title: &str, op: ShowOp) -> Result<(), ChromeError> {
        let hwnd = find_window(title)?;
        let cmd = match op {
            ShowOp::Minimize => SW_MINIMIZE,
            ShowOp::Restore => SW_RESTORE,
        };
        // ShowWindow's BOOL reports the previous visibility, not success.
        unsafe {
            let _ = ShowWindow(hwnd, cmd);
        }
        Ok(())
    }
}
