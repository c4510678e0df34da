use crate::input::Input;
use crate::keys::VirtualKey;
use crate::pipeline;
use crate::state::RemapState;
use crate::types::{HookDecision, KeyEdge, KeyEvent, KeyInput, WindowHandle};
use parking_lot::RwLock;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, warn};
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, HINSTANCE, LPARAM, LRESULT, MAX_PATH, WPARAM};
use windows::Win32::System::Threading::{
    GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, MapVirtualKeyW, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT,
    KEYBD_EVENT_FLAGS, KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MAPVK_VK_TO_VSC, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetForegroundWindow, GetMessageW, GetWindowThreadProcessId,
    PeekMessageW, PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx,
    HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG, PEEK_MESSAGE_REMOVE_TYPE, WH_KEYBOARD_LL,
    WM_KEYUP, WM_QUIT, WM_SYSKEYUP,
};

lazy_static::lazy_static! {
    /// State the OS callback runs against. The callback gets no user data, so
    /// this is the one place the engine is reachable through a static.
    static ref HOOK_STATE: RwLock<Option<Arc<RemapState>>> = RwLock::new(None);
}

static HOOK_HANDLE: Mutex<Option<HHOOK>> = Mutex::new(None);

/// [`Input`] backed by `SendInput` and the Win32 window APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsInput;

fn is_extended_key(vk: VirtualKey) -> bool {
    matches!(
        vk.code(),
        0x21..=0x28 // PgUp, PgDn, End, Home, arrows
            | 0x2C..=0x2E // PrtScn, Insert, Delete
            | 0x5B..=0x5D // Win keys, Apps
            | 0x6F // Numpad divide
            | 0x90 // Num Lock
            | 0xA3 // Right Ctrl
            | 0xA5 // Right Alt
    )
}

impl Input for WindowsInput {
    fn send_virtual_input(&self, inputs: &[KeyInput]) {
        let events: Vec<INPUT> = inputs
            .iter()
            .map(|input| {
                let mut flags = KEYBD_EVENT_FLAGS(0);
                if input.edge == KeyEdge::Up {
                    flags |= KEYEVENTF_KEYUP;
                }
                if is_extended_key(input.vk) {
                    flags |= KEYEVENTF_EXTENDEDKEY;
                }
                let scan = unsafe { MapVirtualKeyW(input.vk.code(), MAPVK_VK_TO_VSC) };
                INPUT {
                    r#type: INPUT_KEYBOARD,
                    Anonymous: INPUT_0 {
                        ki: KEYBDINPUT {
                            wVk: VIRTUAL_KEY(input.vk.code() as u16),
                            wScan: scan as u16,
                            dwFlags: flags,
                            time: 0,
                            dwExtraInfo: input.extra_info,
                        },
                    },
                }
            })
            .collect();

        let sent = unsafe { SendInput(&events, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != events.len() {
            warn!(sent, expected = events.len(), "SendInput was partially blocked");
        }
    }

    fn get_virtual_key_state(&self, vk: VirtualKey) -> bool {
        let vk = vk.filter_artificial();
        unsafe { GetAsyncKeyState(vk.code() as i32) as u16 & 0x8000 != 0 }
    }

    fn get_foreground_process(&self) -> Option<String> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.0 == 0 {
                return None;
            }

            let mut process_id: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut process_id as *mut u32));
            if process_id == 0 {
                return None;
            }

            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
            let mut buffer = [0u16; MAX_PATH as usize];
            let mut size = buffer.len() as u32;
            let result = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buffer.as_mut_ptr()),
                &mut size,
            );
            let _ = CloseHandle(process);

            result.ok()?;
            let path = String::from_utf16_lossy(&buffer[..size as usize]);
            path.rsplit('\\').next().map(str::to_lowercase)
        }
    }

    fn get_foreground_window(&self) -> WindowHandle {
        WindowHandle(unsafe { GetForegroundWindow() }.0)
    }
}

/// Installs the low-level keyboard hook on the calling thread.
/// This must be called from a thread that pumps messages (GetMessage/PeekMessage).
pub fn install_hook() -> anyhow::Result<()> {
    info!("Installing keyboard hook...");

    // Low-level hooks take no module handle when hooking every thread.
    let hook_id =
        unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), HINSTANCE::default(), 0) }?;

    if hook_id.is_invalid() {
        return Err(anyhow::anyhow!("Failed to install hook"));
    }

    let mut handle = HOOK_HANDLE
        .lock()
        .map_err(|_| anyhow::anyhow!("hook handle lock poisoned"))?;
    *handle = Some(hook_id);
    info!("Keyboard hook installed. Handle: {:?}", hook_id);
    Ok(())
}

pub fn uninstall_hook() {
    let Ok(mut handle) = HOOK_HANDLE.lock() else {
        error!("hook handle lock poisoned, hook left installed");
        return;
    };
    if let Some(h) = handle.take() {
        unsafe {
            let _ = UnhookWindowsHookEx(h);
        };
        info!("Keyboard hook uninstalled.");
    }
}

fn force_message_queue() {
    let mut msg = MSG::default();
    unsafe {
        let _ = PeekMessageW(&mut msg, None, 0, 0, PEEK_MESSAGE_REMOVE_TYPE(0));
    }
}

/// Runs a blocking message loop until `WM_QUIT`.
pub fn run_event_loop() {
    info!("Starting message loop...");
    force_message_queue();
    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    info!("Message loop exited.");
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code < 0 {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    let kbd = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
    let msg = wparam.0 as u32;
    let up = msg == WM_KEYUP || msg == WM_SYSKEYUP;
    let event = KeyEvent {
        vk: VirtualKey(kbd.vkCode),
        edge: if up { KeyEdge::Up } else { KeyEdge::Down },
        extra_info: kbd.dwExtraInfo,
        injected: kbd.flags.0 & LLKHF_INJECTED.0 != 0,
    };

    // Never wait here: a writer means the hook is being torn down.
    let state = HOOK_STATE.try_read().and_then(|guard| guard.clone());
    let decision = match state {
        Some(state) => pipeline::handle_keyboard_hook_event(&state, &WindowsInput, &event),
        None => HookDecision::PassThrough,
    };

    match decision {
        HookDecision::PassThrough => CallNextHookEx(None, code, wparam, lparam),
        HookDecision::Suppress => LRESULT(1),
    }
}

/// The hook thread: installs the hook, pumps messages, and uninstalls on stop.
pub struct HookThread {
    thread_id: u32,
    handle: Option<JoinHandle<()>>,
}

impl HookThread {
    pub fn start(state: Arc<RemapState>) -> anyhow::Result<Self> {
        {
            let mut slot = HOOK_STATE.write();
            if slot.is_some() {
                anyhow::bail!("keyboard hook is already running");
            }
            *slot = Some(state);
        }

        let (tx, rx) = crossbeam_channel::bounded::<anyhow::Result<u32>>(1);
        let spawned = std::thread::Builder::new()
            .name("keyboard-hook".to_string())
            .spawn(move || {
                force_message_queue();
                match install_hook() {
                    Ok(()) => {
                        let _ = tx.send(Ok(unsafe { GetCurrentThreadId() }));
                        run_event_loop();
                        uninstall_hook();
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                    }
                }
            });

        let started = spawned
            .map_err(anyhow::Error::from)
            .and_then(|handle| {
                let thread_id = rx
                    .recv()
                    .map_err(|_| anyhow::anyhow!("hook thread exited before reporting"))??;
                Ok(Self {
                    thread_id,
                    handle: Some(handle),
                })
            });
        if started.is_err() {
            *HOOK_STATE.write() = None;
        }
        started
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe {
                let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            if handle.join().is_err() {
                error!("keyboard hook thread panicked");
            }
            *HOOK_STATE.write() = None;
        }
    }
}

impl Drop for HookThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
