use anyhow::{anyhow, Result};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
};

use super::InputProbe;

pub fn get_idle_time() -> Result<u32> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    // dwTime wraps after 49 days, so only the low 32 bits of the tick count are comparable.
    let duration = (tick_count as u32).wrapping_sub(last.dwTime);
    Ok(duration)
}

#[derive(Default)]
pub struct WindowsInputProbe {}

impl WindowsInputProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl InputProbe for WindowsInputProbe {
    fn get_idle_time(&mut self) -> Result<u32> {
        get_idle_time().inspect_err(|e| error!("Failed to get idle time {e:?}"))
    }
}
