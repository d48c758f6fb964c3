use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::{error, instrument, warn};
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, HANDLE, HWND},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
    },
};

use crate::daemon::storage::entities::Platform;

use super::{
    names::{executable_display_name, window_display_name, WELL_KNOWN_EXECUTABLES},
    FocusSampler,
};

struct ForegroundWindow {
    executable: String,
    title: String,
}

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    String::from_utf16_lossy(&message_buffer[0..size as usize])
}

#[instrument]
fn get_foreground() -> Result<ForegroundWindow> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!(
            "Failed to get foreground process {}",
            last_error_message()
        ));
    }
    let process_handle =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) }
            .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let executable = unsafe { get_process_path(process_handle, &mut text) };
    let title = unsafe { get_window_title(window, &mut text) };

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    Ok(ForegroundWindow {
        executable: executable?,
        title,
    })
}

unsafe fn get_process_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len as usize])
}

/// Coarse guess used when the foreground window is unreachable: the first running well known
/// executable.
fn scan_well_known_processes() -> Option<String> {
    let mut system = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()),
    );
    system.refresh_processes(ProcessesToUpdate::All, true);
    WELL_KNOWN_EXECUTABLES
        .iter()
        .find(|executable| {
            system.processes().values().any(|process| {
                process
                    .name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(executable)
            })
        })
        .map(|executable| executable_display_name(executable))
}

pub struct WindowsFocusSampler {}

impl WindowsFocusSampler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsFocusSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FocusSampler for WindowsFocusSampler {
    async fn sample(&mut self) -> Result<Option<String>> {
        match get_foreground() {
            Ok(window) => Ok(Some(window_display_name(&window.executable, &window.title))),
            Err(e) => {
                warn!("Foreground window unavailable, scanning processes {e:?}");
                Ok(scan_well_known_processes())
            }
        }
    }

    fn platform(&self) -> Platform {
        Platform::Windows
    }
}
