//! Media asset resolution: local paths under the media root, cloud asset
//! URLs, and the bounded-retry fetch used for cloud-hosted text assets.

use crate::config::AssetSettings;
use anyhow::{bail, Result};
use reqwest::StatusCode;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;

/// A query value is only usable as a path segment if it is exactly one
/// normal component: no separators, no `..`, no absolute paths.
fn is_single_component(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Resolves `<root>/<album>/<file>` while rejecting traversal attempts.
pub fn resolve_media_file(root: &Path, album: &str, file_name: &str) -> Option<PathBuf> {
    if !is_single_component(album) || !is_single_component(file_name) {
        return None;
    }
    Some(root.join(album).join(file_name))
}

/// `<base>/<prefix>/<album>/<file>` with every segment percent-encoded.
pub fn build_cloud_asset_url(
    assets: &AssetSettings,
    album: &str,
    file_name: &str,
) -> Option<String> {
    let base_url = assets.base_url.as_deref()?;
    let mut segments: Vec<String> = assets
        .prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    segments.push(urlencoding::encode(album).into_owned());
    segments.push(urlencoding::encode(file_name).into_owned());
    Some(format!("{}/{}", base_url, segments.join("/")))
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 429 | 500 | 502 | 503 | 504 | 520 | 522 | 524
    )
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Fetches a small text asset from the cloud store. Returns Ok(None) for a
/// 404. Retries up to three times with a growing delay, but only for
/// retryable statuses (408/429/5xx-class) and timeout/connect errors.
pub async fn fetch_text_with_retry(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<String>> {
    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        match client.get(url).send().await {
            Ok(response) => {
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if response.status().is_success() {
                    return Ok(Some(response.text().await?));
                }
                if is_retryable_status(response.status()) && attempt < MAX_FETCH_ATTEMPTS {
                    sleep(Duration::from_millis(attempt as u64 * RETRY_BASE_DELAY_MS)).await;
                    continue;
                }
                bail!("Failed to fetch cloud asset: {}", response.status());
            }
            Err(err) => {
                if is_retryable_network_error(&err) && attempt < MAX_FETCH_ATTEMPTS {
                    sleep(Duration::from_millis(attempt as u64 * RETRY_BASE_DELAY_MS)).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
    Ok(None)
}
