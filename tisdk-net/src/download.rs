// tisdk-net/src/download.rs
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use tisdk_common::error::{Result, TiError};
use tisdk_common::progress::ProgressTracker;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::http::get_checked;

/// Streams `url` into `download_dir` (the system temp dir when `None`) and returns the
/// path of the downloaded file.
///
/// The body is written to a temporary `tisdk-<uuid>.zip` name first. Once the stream
/// completes, the file is renamed to the name suggested by `Content-Disposition`, or to
/// the URL's last path segment when that ends in `.zip`, replacing any existing file
/// of that name.
pub async fn download_file(
    client: &Client,
    url: &str,
    download_dir: Option<&Path>,
    tracker: &mut ProgressTracker,
) -> Result<PathBuf> {
    let download_dir = match download_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir(),
    };
    fs::create_dir_all(&download_dir).await.map_err(|e| {
        TiError::IoError(format!(
            "Failed to create download directory {}: {}",
            download_dir.display(),
            e
        ))
    })?;

    let temp_path = download_dir.join(format!("tisdk-{}.zip", Uuid::new_v4()));
    debug!("Downloading {} => {}", url, temp_path.display());

    let response = get_checked(client, url).await?;

    let suggested = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_content_disposition)
        .or_else(|| zip_name_from_url(url));
    let total = response.content_length();

    let mut out = File::create(&temp_path).await.map_err(|e| {
        TiError::IoError(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    if let Err(e) = stream_body(response, &mut out, total, tracker).await {
        drop(out);
        if let Err(remove_err) = fs::remove_file(&temp_path).await {
            warn!(
                "Failed to remove partial download {}: {}",
                temp_path.display(),
                remove_err
            );
        }
        return Err(e);
    }
    drop(out);

    let final_path = match suggested {
        Some(name) if temp_path.file_name().is_some_and(|f| f != name.as_str()) => {
            let target = download_dir.join(&name);
            debug!("Renaming {} => {}", temp_path.display(), target.display());
            fs::rename(&temp_path, &target).await.map_err(|e| {
                TiError::IoError(format!(
                    "Failed to move temp file {} to {}: {}",
                    temp_path.display(),
                    target.display(),
                    e
                ))
            })?;
            target
        }
        _ => temp_path,
    };

    debug!("Finished download: {}", final_path.display());
    Ok(final_path)
}

async fn stream_body(
    response: reqwest::Response,
    out: &mut File,
    total: Option<u64>,
    tracker: &mut ProgressTracker,
) -> Result<()> {
    let mut received: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| TiError::Transport(format!("Failed to read download stream: {e}")))?;
        out.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            tracker.progress(received as f64 / total as f64);
        }
    }
    out.flush().await?;
    Ok(())
}

/// Extracts a bare file name from a `Content-Disposition` header value.
///
/// `filename*=` (RFC 5987) takes precedence over `filename=`. Any directory part is
/// dropped.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(header) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.split_once("''").map_or(value, |(_, v)| v);
                extended = Some(percent_decode(encoded.trim_matches('"')));
            }
            "filename" => plain = Some(value.trim_matches('"').to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .and_then(|name| {
            Path::new(&name.replace('\\', "/"))
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

/// Splits header parameters on `;`, ignoring separators inside quoted strings.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(header[start..].trim());
    params
}

/// Decodes `%XX` escapes. Malformed escapes are kept as written.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escape = bytes
            .get(i + 1..i + 3)
            .filter(|_| bytes[i] == b'%')
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escape {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn zip_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    name.ends_with(".zip").then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use httpmock::prelude::*;
    use tempfile::TempDir;
    use tisdk_common::config::NetworkConfig;
    use tisdk_common::progress::ProgressEvent;

    use super::*;
    use crate::http::build_http_client;

    fn tracker() -> (ProgressTracker, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut tracker = ProgressTracker::new(
            Some(Box::new(move |e| sink.lock().unwrap().push(e))),
            vec!["Downloading".into()],
        );
        tracker.start_task(true);
        (tracker, events)
    }

    #[test]
    fn parses_content_disposition() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="sdk.zip""#).as_deref(),
            Some("sdk.zip")
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename=plain.zip").as_deref(),
            Some("plain.zip")
        );
        assert_eq!(
            filename_from_content_disposition(
                r#"attachment; filename="fallback.zip"; filename*=UTF-8''my%20sdk.zip"#
            )
            .as_deref(),
            Some("my sdk.zip")
        );
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="../../etc/evil.zip""#)
                .as_deref(),
            Some("evil.zip")
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn content_disposition_keeps_quoted_separators() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="a;b.zip"; size=10"#)
                .as_deref(),
            Some("a;b.zip")
        );
        assert_eq!(
            filename_from_content_disposition(
                r#"attachment; filename="say \"hi\"; now.zip"; filename*=UTF-8''a%3Bb.zip"#
            )
            .as_deref(),
            Some("a;b.zip")
        );
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename*=UTF-8''100%zz%41.zip")
                .as_deref(),
            Some("100%zzA.zip")
        );
        assert_eq!(percent_decode("end%4"), "end%4");
        assert_eq!(percent_decode("end%41"), "endA");
    }

    #[test]
    fn url_fallback_requires_zip() {
        assert_eq!(
            zip_name_from_url("http://host/a/mobilesdk-8.0.0.GA-osx.zip?x=1").as_deref(),
            Some("mobilesdk-8.0.0.GA-osx.zip")
        );
        assert_eq!(zip_name_from_url("http://host/download"), None);
    }

    #[tokio::test]
    async fn downloads_and_renames_from_url() {
        let server = MockServer::start_async().await;
        let body = vec![7u8; 64 * 1024];
        server
            .mock_async(|when, then| {
                when.method(GET).path("/files/sdk-1.0.0.zip");
                then.status(200).body(&body);
            })
            .await;

        let dir = TempDir::new().unwrap();
        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let (mut tracker, events) = tracker();

        let path = download_file(
            &client,
            &server.url("/files/sdk-1.0.0.zip"),
            Some(dir.path()),
            &mut tracker,
        )
        .await
        .unwrap();
        tracker.end_task();

        assert_eq!(path, dir.path().join("sdk-1.0.0.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), body);

        let progress: Vec<f64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::TaskProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn prefers_content_disposition_name() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/download");
                then.status(200)
                    .header("Content-Disposition", r#"attachment; filename="named.zip""#)
                    .body("zipdata");
            })
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("named.zip"), b"stale").unwrap();
        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let (mut tracker, _) = tracker();

        let path = download_file(&client, &server.url("/download"), Some(dir.path()), &mut tracker)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("named.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"zipdata");
    }

    #[tokio::test]
    async fn keeps_temp_name_without_suggestion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/download");
                then.status(200).body("zipdata");
            })
            .await;

        let dir = TempDir::new().unwrap();
        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let (mut tracker, _) = tracker();

        let path = download_file(&client, &server.url("/download"), Some(dir.path()), &mut tracker)
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tisdk-") && name.ends_with(".zip"));
    }

    #[tokio::test]
    async fn http_error_carries_status_and_leaves_no_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.zip");
                then.status(404);
            })
            .await;

        let dir = TempDir::new().unwrap();
        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let (mut tracker, _) = tracker();

        let err = download_file(&client, &server.url("/missing.zip"), Some(dir.path()), &mut tracker)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "404 Not Found");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let dir = TempDir::new().unwrap();
        let (mut tracker, _) = tracker();
        let err = download_file(&client, "http://127.0.0.1:9/sdk.zip", Some(dir.path()), &mut tracker)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENETWORK");
    }
}
