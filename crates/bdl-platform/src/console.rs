/// Hide the console window the process was started with, if any.
#[cfg(windows)]
pub fn hide_console_window() {
    use windows_sys::Win32::System::Console::GetConsoleWindow;
    use windows_sys::Win32::UI::WindowsAndMessaging::{SW_HIDE, ShowWindow};

    // SAFETY: `GetConsoleWindow` returns null when there is no console; the
    // handle is only passed to `ShowWindow` otherwise.
    unsafe {
        let hwnd = GetConsoleWindow();
        if !hwnd.is_null() {
            ShowWindow(hwnd, SW_HIDE);
        }
    }
}

#[cfg(not(windows))]
pub fn hide_console_window() {}
