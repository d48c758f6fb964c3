use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, trace, warn, Instrument};

use crate::{
    daemon::storage::entities::FocusSample, focus_api::FocusSampler, utils::clock::Clock,
};

pub struct DataCollectionModule {
    next: mpsc::Sender<FocusSample>,
    producer: Box<dyn FocusSampler>,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<FocusSample>,
        producer: Box<dyn FocusSampler>,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            collection_frequency,
            time_provider,
            shutdown,
        }
    }

    /// `None` means nothing can be attributed this tick.
    async fn collect_data(&mut self) -> Result<Option<FocusSample>> {
        let Some(app_name) = self.producer.sample().await? else {
            return Ok(None);
        };

        Ok(Some(FocusSample {
            app_name: app_name.into(),
            platform: self.producer.platform(),
            timestamp: self.time_provider.time(),
        }))
    }

    /// Executes the collector event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            match self.collect_data().await {
                Ok(Some(sample)) => {
                    let span = info_span!("Processing collected sample");
                    trace!("Sending sample {:?}", sample);
                    self.next
                        .send(sample)
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Ok(None) => debug!("No focused application this tick"),
                Err(e) => {
                    warn!("Encountered an error during collection {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation stops the event loop, dropping the sender closes the processing
                // module as well.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::storage::entities::Platform,
        focus_api::MockFocusSampler,
        utils::clock::test_clock::ManualClock,
    };

    use super::DataCollectionModule;

    #[tokio::test(start_paused = true)]
    async fn test_skips_empty_and_failed_ticks() -> Result<()> {
        let mut sampler = MockFocusSampler::new();
        let mut results = vec![
            Ok(Some("Safari".to_string())),
            Ok(None),
            Err(anyhow!("osascript failed")),
            Ok(Some("Finder".to_string())),
        ]
        .into_iter();
        sampler
            .expect_sample()
            .returning(move || results.next().unwrap_or(Ok(None)));
        sampler.expect_platform().return_const(Platform::Macos);

        let (sender, mut receiver) = mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap());
        let collector = DataCollectionModule::new(
            sender,
            Box::new(sampler),
            shutdown.clone(),
            Duration::from_secs(1),
            Box::new(clock),
        );

        let (result, _) = tokio::join!(collector.run(), async {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            shutdown.cancel();
        });
        result?;

        let mut names = vec![];
        while let Some(sample) = receiver.recv().await {
            assert_eq!(sample.platform, Platform::Macos);
            names.push(sample.app_name.to_string());
        }
        assert_eq!(names, vec!["Safari", "Finder"]);
        Ok(())
    }
}
