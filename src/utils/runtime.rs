use anyhow::Result;

/// The tracker runs sampling, aggregation and backups on one cooperative thread.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
