//! Platform probes that tell how long the user hasn't touched keyboard or pointer.
//! [GenericInputProbe] picks the backend enabled at build time.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait InputProbe {
    /// Retrieve amount of time user has been inactive in milliseconds
    fn get_idle_time(&mut self) -> Result<u32>;
}

/// Serves as a cross-compatible InputProbe implementation.
pub struct GenericInputProbe {
    inner: Box<dyn InputProbe + Send>,
}

impl GenericInputProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsInputProbe;
                Ok(Self {
                    inner: Box::new(WindowsInputProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11InputProbe;
                Ok(Self {
                    inner: Box::new(X11InputProbe::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!("Built without an input probe, enable the x11 or win feature"))
            }
        }
    }
}

impl InputProbe for GenericInputProbe {
    fn get_idle_time(&mut self) -> Result<u32> {
        self.inner.get_idle_time()
    }
}
