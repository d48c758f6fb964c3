use std::{io::ErrorKind, path::Path};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Reads a whole file under a shared lock. A missing file is `None`.
pub async fn read_locked(path: &Path) -> Result<Option<String>, io::Error> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut content = String::new();
    let result = file.read_to_string(&mut content).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(content))
}

/// Replaces the content of an already opened file.
pub async fn overwrite(file: &mut File, content: &[u8]) -> Result<(), io::Error> {
    file.rewind().await?;
    file.set_len(0).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Writes into a sibling temporary file first and renames it over `path`, so readers never see a
/// half written file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), io::Error> {
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = Path::new(&temporary);

    let mut file = File::create(temporary).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_data().await?;
    drop(file);

    tokio::fs::rename(temporary, path).await
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::{tempdir, tempfile};
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_read_locked_missing_file() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(read_locked(&dir.path().join("absent.json")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_truncates_longer_content() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(b"a much longer previous content")?;
        let mut file = tokio::fs::File::from_std(file);

        overwrite(&mut file, b"short").await?;

        file.rewind().await?;
        let mut s = String::new();
        file.read_to_string(&mut s).await?;
        assert_eq!(s, "short");
        Ok(())
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("meta.json");
        write_atomic(&path, b"first").await?;
        write_atomic(&path, b"second").await?;

        assert_eq!(read_locked(&path).await?.as_deref(), Some("second"));
        assert!(!dir.path().join("meta.json.tmp").exists());
        Ok(())
    }
}
