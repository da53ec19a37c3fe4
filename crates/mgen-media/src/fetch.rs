//! Materialize content references as local files.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use url::Url;

use mgen_models::ContentRef;

use crate::error::{MediaError, MediaResult};

/// Make `content` available as a file, writing into `dir` as `{stem}.{ext}`.
///
/// Local files are returned as-is after an existence check.
pub async fn materialize(
    client: &reqwest::Client,
    content: &ContentRef,
    dir: &Path,
    stem: &str,
) -> MediaResult<PathBuf> {
    match content {
        ContentRef::File { path } => {
            if tokio::fs::try_exists(path).await? {
                Ok(path.clone())
            } else {
                Err(MediaError::FileNotFound(path.clone()))
            }
        }
        ContentRef::Bytes { data, .. } => {
            let target = dir.join(format!("{}.{}", stem, content.extension_hint()));
            tokio::fs::write(&target, data).await?;
            Ok(target)
        }
        ContentRef::Url { url } if url.starts_with("data:") => {
            let bytes = decode_data_url(url)?;
            let target = dir.join(format!("{}.{}", stem, content.extension_hint()));
            tokio::fs::write(&target, bytes).await?;
            Ok(target)
        }
        ContentRef::Url { url } => {
            let target = dir.join(format!("{}.{}", stem, content.extension_hint()));
            download(client, url, &target).await?;
            Ok(target)
        }
    }
}

/// Decode a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> MediaResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| MediaError::fetch_failed("not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::fetch_failed("malformed data URL"))?;
    if !meta.ends_with(";base64") {
        return Err(MediaError::fetch_failed("only base64 data URLs are supported"));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| MediaError::fetch_failed(format!("invalid base64 payload: {}", e)))
}

async fn download(client: &reqwest::Client, url: &str, target: &Path) -> MediaResult<()> {
    let parsed = Url::parse(url).map_err(|e| MediaError::fetch_failed(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MediaError::fetch_failed(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| MediaError::fetch_failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::fetch_failed(format!("GET {} returned {}", url, status)));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MediaError::fetch_failed(e.to_string()))?;
    debug!(url = %url, bytes = bytes.len(), "Downloaded content");

    tokio::fs::write(target, &bytes).await?;
    Ok(())
}
