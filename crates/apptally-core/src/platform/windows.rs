use std::collections::HashMap;
use std::path::Path;

use windows_sys::Win32::Foundation::{CloseHandle, BOOL, FILETIME, HANDLE, HWND, LPARAM, RECT};
use windows_sys::Win32::System::Threading::{
    GetProcessTimes, OpenProcess, QueryFullProcessImageNameW, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
    IsWindowVisible,
};

use crate::window_source::{RawWindow, WindowSource};

const PROCESS_CACHE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct ProcessKey {
    pid: u32,
    creation_time: u64,
}

/// Enumerates top-level windows through `EnumWindows`. Executable names are
/// cached per (pid, creation time) so a recycled pid is never misnamed.
#[derive(Default)]
pub struct NativeWindowSource {
    process_cache: HashMap<ProcessKey, String>,
}

impl NativeWindowSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(&mut self, hwnd: HWND) -> RawWindow {
        let visible = unsafe { IsWindowVisible(hwnd) } != 0;
        if !visible {
            return RawWindow {
                process_name: None,
                title: String::new(),
                visible,
                width: 0,
                height: 0,
            };
        }

        let title = window_title(hwnd);
        let (width, height) = window_size(hwnd).unwrap_or((0, 0));
        let process_name = if title.is_empty() {
            None
        } else {
            window_pid(hwnd).and_then(|pid| self.resolve_process(pid))
        };

        RawWindow {
            process_name,
            title,
            visible,
            width,
            height,
        }
    }

    /// One handle serves both the cache key and, on a miss, the image path.
    fn resolve_process(&mut self, pid: u32) -> Option<String> {
        let process = ProcessHandle::open(pid)?;
        let Some(creation_time) = process.creation_time() else {
            return process.exe_name();
        };

        let key = ProcessKey { pid, creation_time };
        if let Some(name) = self.process_cache.get(&key) {
            return Some(name.clone());
        }

        let exe_name = process.exe_name()?;
        if self.process_cache.len() >= PROCESS_CACHE_LIMIT {
            self.process_cache.clear();
        }
        self.process_cache.insert(key, exe_name.clone());
        Some(exe_name)
    }
}

impl WindowSource for NativeWindowSource {
    fn top_level_windows(&mut self) -> Vec<RawWindow> {
        enumerate_windows()
            .into_iter()
            .map(|hwnd| self.describe(hwnd))
            .collect()
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam as *mut Vec<HWND>);
    handles.push(hwnd);
    1
}

fn enumerate_windows() -> Vec<HWND> {
    let mut handles: Vec<HWND> = Vec::new();
    let ok = unsafe {
        EnumWindows(
            Some(collect_window),
            &mut handles as *mut Vec<HWND> as LPARAM,
        )
    };
    if ok == 0 {
        log::debug!("EnumWindows stopped early after {} windows", handles.len());
    }
    handles
}

fn window_pid(hwnd: HWND) -> Option<u32> {
    let mut pid: u32 = 0;
    unsafe {
        GetWindowThreadProcessId(hwnd, &mut pid);
    }
    if pid == 0 {
        None
    } else {
        Some(pid)
    }
}

fn window_size(hwnd: HWND) -> Option<(i32, i32)> {
    let mut rect = RECT {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };
    let ok = unsafe { GetWindowRect(hwnd, &mut rect) };
    if ok == 0 {
        return None;
    }
    Some((rect.right - rect.left, rect.bottom - rect.top))
}

/// Title with surrounding whitespace stripped; whitespace-only titles
/// come back empty.
fn window_title(hwnd: HWND) -> String {
    let len = match usize::try_from(unsafe { GetWindowTextLengthW(hwnd) }) {
        Ok(len) if len > 0 => len,
        _ => return String::new(),
    };
    let mut buffer = vec![0u16; len + 1];
    let copied = unsafe { GetWindowTextW(hwnd, buffer.as_mut_ptr(), buffer.len() as i32) };
    let copied = usize::try_from(copied).unwrap_or(0).min(len);
    String::from_utf16_lossy(&buffer[..copied]).trim().to_owned()
}

/// Query-limited process handle, closed on drop.
struct ProcessHandle {
    pid: u32,
    raw: HANDLE,
}

impl ProcessHandle {
    fn open(pid: u32) -> Option<Self> {
        let raw = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        (!raw.is_null()).then_some(Self { pid, raw })
    }

    /// 100 ns intervals since 1601, as reported by `GetProcessTimes`.
    fn creation_time(&self) -> Option<u64> {
        let mut times = [FILETIME {
            dwLowDateTime: 0,
            dwHighDateTime: 0,
        }; 4];
        let [creation, exit, kernel, user] = &mut times;
        let ok = unsafe { GetProcessTimes(self.raw, creation, exit, kernel, user) };
        if ok == 0 {
            return None;
        }
        let created = times[0];
        Some(u64::from(created.dwHighDateTime) << 32 | u64::from(created.dwLowDateTime))
    }

    /// File name of the executable, or `pid-<n>` when the path has none.
    fn exe_name(&self) -> Option<String> {
        let mut buffer = [0u16; 4096];
        let mut size = buffer.len() as u32;
        let ok = unsafe { QueryFullProcessImageNameW(self.raw, 0, buffer.as_mut_ptr(), &mut size) };
        if ok == 0 || size == 0 {
            return None;
        }
        let path = String::from_utf16_lossy(&buffer[..size as usize]);
        let name = Path::new(&path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("pid-{}", self.pid));
        Some(name)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.raw);
        }
    }
}
