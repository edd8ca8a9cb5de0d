use anyhow::{bail, Result};
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
use windows_sys::Win32::System::Threading::CreateMutexW;

const MUTEX_NAME: &str = "Local\\AppTallySingleton";

/// Owns the named mutex that marks this process as the running tracker.
/// Released when dropped.
pub struct InstanceGuard(HANDLE);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// `Ok(None)` when another tracker already owns the mutex; two trackers
/// would overwrite each other's documents.
pub fn acquire_single_instance_guard() -> Result<Option<InstanceGuard>> {
    let name: Vec<u16> = MUTEX_NAME.encode_utf16().chain([0]).collect();
    let handle = unsafe { CreateMutexW(std::ptr::null(), 0, name.as_ptr()) };
    if handle.is_null() {
        bail!(
            "could not create {MUTEX_NAME}: {}",
            std::io::Error::last_os_error()
        );
    }

    // The handle is valid either way; only ownership differs.
    let guard = InstanceGuard(handle);
    if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
        return Ok(None);
    }
    Ok(Some(guard))
}
