//! Download-once file cache for remote datasets.

use crate::error::DatavalError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Download `url` into `cache_dir/file_name` unless it is already present.
///
/// `file_name` defaults to the last path segment of the URL. With
/// `force_download` the file is fetched again even when cached.
pub async fn cache(
    url: &str,
    cache_dir: &Path,
    file_name: Option<&str>,
    force_download: bool,
) -> Result<PathBuf, DatavalError> {
    let file_name = match file_name {
        Some(name) => name.to_string(),
        None => url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DatavalError::invalid_input(format!("URL has no file name: {url}")))?
            .to_string(),
    };

    tokio::fs::create_dir_all(cache_dir).await?;
    let path = cache_dir.join(&file_name);

    if path.is_file() && !force_download {
        tracing::debug!(path = %path.display(), "Using cached file");
        return Ok(path);
    }

    tracing::info!(url, path = %path.display(), "Downloading dataset file");
    let client = reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
    let response = client.get(url).send().await?.error_for_status()?;

    let tmp = path.with_extension("part");
    let mut file = tokio::fs::File::create(&tmp).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp, &path).await?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cached_file_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "1,2\n").unwrap();

        // Unroutable URL: any network access would fail.
        let got = cache("http://127.0.0.1:9/train.csv", dir.path(), None, false)
            .await
            .unwrap();
        assert_eq!(got, path);
        assert_eq!(std::fs::read_to_string(got).unwrap(), "1,2\n");
    }

    #[tokio::test]
    async fn test_url_without_file_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = cache("http://127.0.0.1:9/", dir.path(), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DatavalError::InvalidInput(_)));
    }
}
