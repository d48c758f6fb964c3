use anyhow::Result;

use crate::daemon::storage::entities::FocusSample;

/// Represents an event processor. It consumes samples one by one and is periodically asked to
/// persist whatever it accumulated.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        message: FocusSample,
    ) -> impl std::future::Future<Output = Result<()>>;

    /// Called on every backup tick.
    fn persist(&mut self) -> impl std::future::Future<Output = Result<()>>;

    /// Called once after the last sample. Nothing accumulated may be lost past this point.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
