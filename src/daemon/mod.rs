use anyhow::Result;
use collection::{collector::DataCollectionModule, ignore::IgnoreList};
use context::AppContext;
use processing::{
    aggregator::UsageAggregator, backup::BackupService, tracker::UsageTracker, ProcessingModule,
};
use reconcile::{reconcile, Reconciliation};
use status::LogStatusSink;
use storage::{
    entities::FocusSample,
    gist::{GistApi, GistClient},
    remote_storage::RemoteSnapshotStore,
    snapshot_storage::{SnapshotStorage, SnapshotStorageImpl},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    focus_api::{FocusSampler, GenericFocusSampler},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod config;
pub mod context;
pub mod processing;
pub mod reconcile;
pub mod shutdown;
pub mod status;
pub mod storage;

const SAMPLE_CHANNEL_SIZE: usize = 10;

/// Represents the starting point for the daemon
pub async fn start_daemon(context: AppContext) -> Result<()> {
    std::env::set_current_dir("/")?;
    info!("Starting daemon with {context:?}");

    let sampler = GenericFocusSampler::new()?;
    run_tracker(&context, sampler, CancellationToken::new(), DefaultClock).await
}

/// Reconciles today's cache, sweeps old snapshots and then tracks until `shutdown` is cancelled
/// or a signal arrives. The last samples are flushed and saved before returning.
async fn run_tracker(
    context: &AppContext,
    sampler: impl FocusSampler + 'static,
    shutdown: CancellationToken,
    clock: impl Clock + Clone,
) -> Result<()> {
    let mut local = SnapshotStorageImpl::new(context.snapshot_dir(), Box::new(clock.clone()))?;
    let remote = create_remote(context, &local, clock.clone()).await?;

    let reconciliation = reconcile(&mut local, remote.as_ref(), &clock).await?;

    match local.cleanup(context.config.retention_days).await {
        Ok(deleted) => info!("Retention sweep removed {deleted} snapshots"),
        Err(e) => warn!("Retention sweep failed {e:?}"),
    }

    let (sender, receiver) = mpsc::channel::<FocusSample>(SAMPLE_CHANNEL_SIZE);
    let processor =
        create_processor(context, local, remote, reconciliation, receiver, clock.clone());
    let collector = create_collector(sender, sampler, &shutdown, context, clock);

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown.clone()),
        async {
            let result = collector.run().await;
            // Without a collector there is nothing left to wait for.
            shutdown.cancel();
            result
        },
        processor.run(),
    );

    if let Err(collection_result) = &collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = &processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    collection_result.and(processing_result)
}

/// Gist id given explicitly, or the one remembered from an earlier backup.
pub async fn resolve_gist_id(context: &AppContext, local: &impl SnapshotStorage) -> Option<String> {
    if let Some(gist_id) = &context.gist_id {
        return Some(gist_id.clone());
    }
    match local.load_meta().await {
        Ok(meta) => meta.and_then(|v| v.gist_id),
        Err(e) => {
            warn!("Can't read remembered gist id {e:?}");
            None
        }
    }
}

/// Remote store for backups. Backups need a token, without one there is no remote at all.
async fn create_remote(
    context: &AppContext,
    local: &impl SnapshotStorage,
    clock: impl Clock,
) -> Result<Option<RemoteSnapshotStore<GistClient>>> {
    let Some(token) = context.github_token.clone() else {
        return Ok(None);
    };
    let gist_id = resolve_gist_id(context, local).await;
    let client = GistClient::new(
        Some(token),
        gist_id,
        context.config.gist_file_name.clone(),
        context.config.remote_timeout(),
    )?;
    Ok(Some(RemoteSnapshotStore::new(client, Box::new(clock))))
}

fn create_collector(
    sender: mpsc::Sender<FocusSample>,
    sampler: impl FocusSampler + 'static,
    shutdown_token: &CancellationToken,
    context: &AppContext,
    clock: impl Clock,
) -> DataCollectionModule {
    DataCollectionModule::new(
        sender,
        Box::new(sampler),
        shutdown_token.clone(),
        context.config.sampling_interval(),
        Box::new(clock),
    )
}

fn create_processor<S: SnapshotStorage, G: GistApi>(
    context: &AppContext,
    local: S,
    remote: Option<RemoteSnapshotStore<G>>,
    reconciliation: Reconciliation,
    receiver: mpsc::Receiver<FocusSample>,
    clock: impl Clock + Clone,
) -> ProcessingModule<UsageTracker<S, G>> {
    let mut aggregator = UsageAggregator::new(
        context.config.flush_threshold,
        IgnoreList::new(context.config.ignored_apps.iter().cloned()),
        Box::new(clock.clone()),
    )
    .with_sample_seconds(context.config.sampling_interval().as_secs());
    aggregator.set_cache(reconciliation.cache);

    let backup = BackupService::new(
        local,
        remote,
        reconciliation.offline,
        Box::new(LogStatusSink),
        Box::new(clock.clone()),
    );

    ProcessingModule::new(
        receiver,
        UsageTracker::new(aggregator, backup),
        context.config.backup_interval(),
        Box::new(clock),
    )
}
