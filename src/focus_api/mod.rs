//! Contains logic for finding out which application holds the focus on different platforms.
//! [GenericFocusSampler] is the main artifact of this module that abstracts the operations.

#[cfg(target_os = "macos")]
pub mod macos;
pub mod names;
#[cfg(feature = "win")]
pub mod win;

#[cfg(feature = "win")]
extern crate windows;

use anyhow::Result;
use async_trait::async_trait;

use crate::daemon::storage::entities::Platform;

/// Contract every platform sampler implements.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FocusSampler: Send {
    /// Display name of the focused application. `Ok(None)` means no app can be attributed right
    /// now, the tick is skipped.
    async fn sample(&mut self) -> Result<Option<String>>;

    fn platform(&self) -> Platform;
}

/// Serves as a cross-compatible [FocusSampler] implementation.
pub struct GenericFocusSampler {
    inner: Box<dyn FocusSampler>,
}

impl GenericFocusSampler {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "macos")] {
                Ok(Self {
                    inner: Box::new(macos::MacosFocusSampler::new()),
                })
            }
            else if #[cfg(feature = "win")] {
                Ok(Self {
                    inner: Box::new(win::WindowsFocusSampler::new()),
                })
            }
            else {
                Err(anyhow::anyhow!("No focus sampler is available on this platform"))
            }
        }
    }
}

#[async_trait]
impl FocusSampler for GenericFocusSampler {
    async fn sample(&mut self) -> Result<Option<String>> {
        self.inner.sample().await
    }

    fn platform(&self) -> Platform {
        self.inner.platform()
    }
}
