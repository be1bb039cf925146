//! Global show/hide hotkey via a low-level Windows keyboard hook
//! (`WH_KEYBOARD_LL`).
//!
//! The hook lives on its own OS thread with a Windows message pump, so it
//! fires even while a full-screen game has focus.  A matching key press
//! sends [`DaemonEvent::ToggleRequested`] to the main loop with a
//! non-blocking `try_send`; the toggle controller's in-flight guard handles
//! anything arriving faster than the chrome can keep up with.
//!
//! On non-Windows platforms the public API compiles but is a no-op at
//! runtime.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;

const MOD_CTRL: u8 = 0b001;
const MOD_ALT: u8 = 0b010;
const MOD_SHIFT: u8 = 0b100;

/// Virtual-key code the hook is watching (0 = hotkey disabled).
static WATCH_VK: AtomicU32 = AtomicU32::new(0);
/// Modifier mask that must be held together with the key.
static WATCH_MODS: AtomicU8 = AtomicU8::new(0);
/// Channel into the main event loop.  Set once by [`start`].
static HOOK_TX: OnceLock<mpsc::Sender<DaemonEvent>> = OnceLock::new();

/// A parsed hotkey binding such as `F8`, `Ctrl+F` or `Ctrl+Shift+T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCombo {
    pub vk: u32,
    mods: u8,
}

impl KeyCombo {
    pub fn ctrl(&self) -> bool {
        self.mods & MOD_CTRL != 0
    }

    pub fn alt(&self) -> bool {
        self.mods & MOD_ALT != 0
    }

    pub fn shift(&self) -> bool {
        self.mods & MOD_SHIFT != 0
    }
}

/// Parses a binding of the form `[Mod+...]Key`.
///
/// Modifiers: `Ctrl`, `Alt`, `Shift` (case-insensitive, any order).  Keys:
/// `F1`–`F12`, letters and digits.  Returns `None` for anything else, which
/// callers treat as "hotkey disabled".
pub fn parse_combo(binding: &str) -> Option<KeyCombo> {
    let mut mods = 0u8;
    let mut vk = None;

    for part in binding.split('+') {
        let part = part.trim();
        match part.to_ascii_uppercase().as_str() {
            "CTRL" | "CONTROL" => mods |= MOD_CTRL,
            "ALT" => mods |= MOD_ALT,
            "SHIFT" => mods |= MOD_SHIFT,
            key => {
                // At most one non-modifier part is allowed.
                if vk.is_some() {
                    return None;
                }
                vk = Some(parse_key(key)?);
            }
        }
    }

    Some(KeyCombo { vk: vk?, mods })
}

/// Maps a bare key name (already uppercased) to its Windows virtual-key
/// code: `F1`–`F12`, `A`–`Z`, `0`–`9`.
fn parse_key(key: &str) -> Option<u32> {
    if let Some(n) = key.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        // F1 = 0x70 … F12 = 0x7B.
        return (1..=12).contains(&n).then(|| 0x6F + n);
    }
    if key.len() == 1 {
        let c = key.chars().next()?;
        if c.is_ascii_alphanumeric() {
            // Letter and digit VK codes equal their ASCII uppercase values.
            return Some(c as u32);
        }
    }
    None
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Handle to the running keyboard hook: rebinding on config reload and
/// stopping the hook thread on shutdown.
pub struct HotkeyHandle {
    #[cfg(windows)]
    _thread: std::thread::JoinHandle<()>,
    #[cfg(windows)]
    thread_id: u32,
}

impl HotkeyHandle {
    /// Rebinds the hotkey.  An unparseable binding disables it without
    /// stopping the hook thread.
    pub fn update_binding(&self, binding: &str) {
        match parse_combo(binding) {
            Some(combo) => {
                WATCH_MODS.store(combo.mods, Ordering::Relaxed);
                WATCH_VK.store(combo.vk, Ordering::Relaxed);
            }
            None => {
                WATCH_MODS.store(0, Ordering::Relaxed);
                WATCH_VK.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Signals the hook thread to stop and blocks until it exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self._thread.join();
        }
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Installs the keyboard hook on a dedicated OS thread.
///
/// # Windows
/// Panics if `SetWindowsHookExW` fails.
///
/// # Non-Windows
/// Returns a stub handle; all methods compile and run but do nothing.
pub fn start(initial_binding: &str, tx: mpsc::Sender<DaemonEvent>) -> HotkeyHandle {
    // Ignore a second registration (e.g. in test binaries).
    let _ = HOOK_TX.set(tx);

    #[cfg(windows)]
    let handle = {
        let (id_tx, id_rx) = std::sync::mpsc::sync_channel::<u32>(1);
        let thread = std::thread::Builder::new()
            .name("hotkey-pump".into())
            .spawn(move || imp::run_message_pump(id_tx))
            .expect("failed to spawn hotkey thread");
        let thread_id = id_rx.recv().expect("hotkey thread did not send its ID");
        HotkeyHandle { _thread: thread, thread_id }
    };

    #[cfg(not(windows))]
    let handle = HotkeyHandle {};

    handle.update_binding(initial_binding);
    handle
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc as std_mpsc;

    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetKeyState, VK_CONTROL, VK_MENU, VK_SHIFT};
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
        UnhookWindowsHookEx, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT,
        WM_SYSKEYDOWN,
    };

    use super::{HOOK_TX, MOD_ALT, MOD_CTRL, MOD_SHIFT, WATCH_MODS, WATCH_VK};
    use crate::event::DaemonEvent;

    /// Reads the live modifier state from the keyboard, so a combo matches
    /// regardless of the order the keys went down in.
    fn held_modifiers() -> u8 {
        let mut mods = 0u8;
        unsafe {
            if GetKeyState(VK_CONTROL.0 as i32) < 0 {
                mods |= MOD_CTRL;
            }
            if GetKeyState(VK_MENU.0 as i32) < 0 {
                mods |= MOD_ALT;
            }
            if GetKeyState(VK_SHIFT.0 as i32) < 0 {
                mods |= MOD_SHIFT;
            }
        }
        mods
    }

    /// Hook procedure called by Windows on every keyboard event system-wide.
    /// `WM_SYSKEYDOWN` is included so Alt-combos are seen too.
    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        let msg = w_param.0 as u32;
        if n_code >= 0 && (msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN) {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let target_vk = WATCH_VK.load(Ordering::Relaxed);
            if target_vk != 0
                && kb.vkCode == target_vk
                && held_modifiers() == WATCH_MODS.load(Ordering::Relaxed)
            {
                if let Some(tx) = HOOK_TX.get() {
                    // Non-blocking: a full channel drops this press.
                    let _ = tx.try_send(DaemonEvent::ToggleRequested);
                }
            }
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// Installs `WH_KEYBOARD_LL`, pumps messages until `WM_QUIT`, then
    /// uninstalls the hook.
    pub fn run_message_pump(id_tx: std_mpsc::SyncSender<u32>) {
        unsafe {
            let _ = id_tx.send(GetCurrentThreadId());
            drop(id_tx);

            let hook =
                SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::default(), 0)
                    .expect("SetWindowsHookExW failed");

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
        }
        tracing::debug!("hotkey hook thread exited");
    }

    /// Posts `WM_QUIT` to `thread_id`, ending its message pump.
    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_combo: bare keys ────────────────────────────────────────────────

    #[test]
    fn bare_function_key_parses() {
        let combo = parse_combo("F8").unwrap();
        assert_eq!(combo.vk, 0x77);
        assert!(!combo.ctrl() && !combo.alt() && !combo.shift());
    }

    #[test]
    fn function_keys_are_contiguous_from_0x70() {
        for n in 1u32..=12 {
            let combo = parse_combo(&format!("F{n}")).unwrap();
            assert_eq!(combo.vk, 0x6F + n, "wrong VK for F{n}");
        }
    }

    #[test]
    fn letters_and_digits_use_ascii_uppercase_codes() {
        assert_eq!(parse_combo("f").unwrap().vk, 'F' as u32);
        assert_eq!(parse_combo("Z").unwrap().vk, 'Z' as u32);
        assert_eq!(parse_combo("7").unwrap().vk, '7' as u32);
    }

    // ── parse_combo: modifiers ────────────────────────────────────────────────

    #[test]
    fn ctrl_combo_parses() {
        let combo = parse_combo("Ctrl+F").unwrap();
        assert_eq!(combo.vk, 'F' as u32);
        assert!(combo.ctrl());
        assert!(!combo.alt());
        assert!(!combo.shift());
    }

    #[test]
    fn modifiers_are_case_insensitive_and_order_free() {
        let a = parse_combo("ctrl+shift+T").unwrap();
        let b = parse_combo("SHIFT+CTRL+t").unwrap();
        assert_eq!(a, b);
        assert!(a.ctrl() && a.shift() && !a.alt());
    }

    #[test]
    fn control_is_an_alias_for_ctrl() {
        assert_eq!(parse_combo("Control+F"), parse_combo("Ctrl+F"));
    }

    #[test]
    fn alt_combo_parses() {
        let combo = parse_combo("Alt+F4").unwrap();
        assert_eq!(combo.vk, 0x73);
        assert!(combo.alt());
    }

    #[test]
    fn whitespace_around_parts_is_tolerated() {
        assert_eq!(parse_combo(" Ctrl + F "), parse_combo("Ctrl+F"));
    }

    // ── parse_combo: rejects ──────────────────────────────────────────────────

    #[test]
    fn empty_binding_is_rejected() {
        assert_eq!(parse_combo(""), None);
    }

    #[test]
    fn modifiers_without_a_key_are_rejected() {
        assert_eq!(parse_combo("Ctrl"), None);
        assert_eq!(parse_combo("Ctrl+Shift"), None);
    }

    #[test]
    fn two_non_modifier_keys_are_rejected() {
        assert_eq!(parse_combo("F+G"), None);
        assert_eq!(parse_combo("Ctrl+F+G"), None);
    }

    #[test]
    fn unknown_key_names_are_rejected() {
        assert_eq!(parse_combo("Escape"), None);
        assert_eq!(parse_combo("Space"), None);
        assert_eq!(parse_combo("F0"), None);
        assert_eq!(parse_combo("F13"), None);
        assert_eq!(parse_combo("!"), None);
    }

    // ── binding updates ───────────────────────────────────────────────────────

    /// Only one test drives `start()`/`update_binding` because they write
    /// process-wide statics.
    #[test]
    fn start_and_update_binding_write_the_watch_atomics() {
        let (tx, _rx) = tokio::sync::mpsc::channel::<DaemonEvent>(8);
        let handle = start("Ctrl+F", tx);
        assert_eq!(WATCH_VK.load(Ordering::Relaxed), 'F' as u32);
        assert_eq!(WATCH_MODS.load(Ordering::Relaxed), MOD_CTRL);

        handle.update_binding("F9");
        assert_eq!(WATCH_VK.load(Ordering::Relaxed), 0x78);
        assert_eq!(WATCH_MODS.load(Ordering::Relaxed), 0);

        // An unparseable binding disables the hotkey.
        handle.update_binding("NotAKey");
        assert_eq!(WATCH_VK.load(Ordering::Relaxed), 0);

        handle.stop();
    }
}
