use std::time::Duration;

use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, trace};

use crate::utils::clock::Clock;

use super::storage::entities::FocusSample;

pub mod aggregator;
pub mod backup;
pub mod module;
pub mod tracker;

/// Represents the consumer of focus samples. This module receives samples, hands them to the
/// processor and asks it to persist on every backup tick. Running everything on this one loop
/// keeps a single writer for the live cache.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<FocusSample>,
    processor: Processor,
    backup_interval: Duration,
    clock: Box<dyn Clock>,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(
        receiver: Receiver<FocusSample>,
        processor: P,
        backup_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            receiver,
            processor,
            backup_interval,
            clock,
        }
    }

    /// Runs until the sending side is closed, then finalizes the processor.
    pub async fn run(mut self) -> Result<()> {
        let mut backup_point = self.clock.instant() + self.backup_interval;
        loop {
            tokio::select! {
                sample = self.receiver.recv() => {
                    let Some(sample) = sample else {
                        break;
                    };
                    trace!("Processing sample {:?}", sample);
                    if let Err(e) = self.processor.process_next(sample.clone()).await {
                        error!("Error processing sample {:?}: {e:?}", sample)
                    }
                }
                _ = self.clock.sleep_until(backup_point) => {
                    backup_point += self.backup_interval;
                    debug!("Running periodic backup");
                    match self.processor.persist().await {
                        Ok(()) => info!("Periodic backup finished"),
                        Err(e) => error!("Periodic backup failed {e:?}"),
                    }
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use crate::{
        daemon::storage::entities::{FocusSample, Platform},
        utils::clock::test_clock::ManualClock,
    };

    use super::{module::EventProcessor, ProcessingModule};

    #[derive(Default, Clone)]
    struct Calls {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EventProcessor for Calls {
        async fn process_next(&mut self, message: FocusSample) -> Result<()> {
            self.log.lock().unwrap().push(message.app_name.to_string());
            Ok(())
        }

        async fn persist(&mut self) -> Result<()> {
            self.log.lock().unwrap().push("persist".into());
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            self.log.lock().unwrap().push("finalize".into());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persists_on_interval_and_finalizes_last() -> Result<()> {
        let (sender, receiver) = mpsc::channel(10);
        let calls = Calls::default();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap());
        let module =
            ProcessingModule::new(receiver, calls.clone(), Duration::from_secs(10), Box::new(clock));

        let (result, _) = tokio::join!(module.run(), async move {
            for name in ["Chrome", "Safari"] {
                sender
                    .send(FocusSample {
                        app_name: name.into(),
                        platform: Platform::Macos,
                        timestamp: Utc::now(),
                    })
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_secs(11)).await;
            }
        });
        result?;

        assert_eq!(
            *calls.log.lock().unwrap(),
            vec!["Chrome", "persist", "Safari", "persist", "finalize"]
        );
        Ok(())
    }
}
