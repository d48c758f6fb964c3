use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, instrument};

use crate::utils::clock::Clock;

use super::{
    entities::{DailySnapshot, StructuredRemoteDocument},
    gist::GistApi,
};

/// Daily snapshots stored in one remote multi-date document. Reads only ever extract a single
/// date, summing the history into today would count past days again on every restart.
///
/// Errors are returned as is and never retried here, the backup cycle decides how to degrade.
pub struct RemoteSnapshotStore<G> {
    api: G,
    clock: Box<dyn Clock>,
}

impl<G: GistApi> RemoteSnapshotStore<G> {
    pub fn new(api: G, clock: Box<dyn Clock>) -> Self {
        Self { api, clock }
    }

    pub fn gist_id(&self) -> Option<String> {
        self.api.gist_id()
    }

    /// Fetches and parses the whole document. A missing document is an empty one.
    pub async fn load_document(&self) -> Result<StructuredRemoteDocument> {
        match self.api.fetch_document().await? {
            Some(content) => Ok(StructuredRemoteDocument::from_json(&content)?),
            None => Ok(StructuredRemoteDocument::default()),
        }
    }

    pub async fn load_date(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let mut document = self.load_document().await?;
        Ok(document.days.remove(&date))
    }

    /// Snapshot for today. Absence gives an explicitly empty snapshot dated today.
    #[instrument(skip(self))]
    pub async fn load_today(&self) -> Result<DailySnapshot> {
        let today = self.clock.today();
        match self.load_date(today).await? {
            Some(snapshot) => Ok(snapshot),
            None => {
                debug!("Remote document has no entry for {today}");
                Ok(DailySnapshot::empty(today, self.clock.time()))
            }
        }
    }

    /// Replaces the entry of the snapshot's date, keeping every other date of the document.
    #[instrument(skip_all, fields(date = %snapshot.date))]
    pub async fn save_today(&mut self, snapshot: &DailySnapshot) -> Result<()> {
        let mut document = self.load_document().await?;
        document.upsert(snapshot.clone(), self.clock.time());
        self.api.write_document(document.to_json()?).await?;
        Ok(())
    }
}
