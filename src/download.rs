// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model asset resolution and download.
//!
//! The pose model is fetched from a pinned release so the landmark layout and
//! topology stay stable across runs. Files are cached under
//! `<cache dir>/pose-overlay/<version>/`.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{PoseError, Result};
use crate::{info, verbose};

/// Release host for pose model assets.
pub const DEFAULT_BASE_URL: &str = "https://github.com/ultralytics/assets/releases/download";

/// Pinned release version of the default model.
pub const DEFAULT_MODEL_VERSION: &str = "v8.3.0";

/// Default pose model file name.
pub const DEFAULT_POSE_MODEL: &str = "yolo11n-pose.onnx";

/// Cache subdirectory name.
const CACHE_DIR_NAME: &str = "pose-overlay";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// A downloadable model pinned to a release version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    /// Release host, without a trailing slash.
    pub base_url: String,
    /// Release tag.
    pub version: String,
    /// File name within the release.
    pub file: String,
}

impl Default for ModelAsset {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_MODEL_VERSION.to_string(),
            file: DEFAULT_POSE_MODEL.to_string(),
        }
    }
}

impl ModelAsset {
    /// Default pose model at the pinned version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different release version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Use a different file from the release.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Full download URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.version,
            self.file
        )
    }

    /// Location of this asset inside `dir`.
    #[must_use]
    pub fn local_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.version).join(&self.file)
    }
}

/// Default cache directory for downloaded models.
///
/// # Errors
///
/// Returns an error if the platform has no cache directory.
pub fn default_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME))
        .ok_or_else(|| PoseError::Download("No cache directory on this platform".to_string()))
}

/// Return the local copy of `asset` under `dir`, downloading it if missing.
///
/// # Errors
///
/// Returns an error if the directory can't be created or the download fails.
pub fn ensure_model(asset: &ModelAsset, dir: &Path) -> Result<PathBuf> {
    let dest = asset.local_path(dir);
    if dest.exists() {
        verbose!("Using cached model {}", dest.display());
        return Ok(dest);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    download_file(&asset.url(), &dest)?;
    Ok(dest)
}

/// Resolve a `--model` argument to a local file.
///
/// An existing path is used as is. A bare file name that isn't on disk is
/// fetched from the pinned release into the cache directory.
///
/// # Errors
///
/// Returns an error if the file is missing and can't be downloaded.
pub fn resolve_model(model: &str) -> Result<PathBuf> {
    let path = Path::new(model);
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    let is_bare_onnx = path.components().count() == 1
        && path.extension().is_some_and(|e| e.eq_ignore_ascii_case("onnx"));
    if !is_bare_onnx {
        return Err(PoseError::ModelLoad(format!(
            "Model file not found: {model}"
        )));
    }

    let asset = ModelAsset::new().with_file(model);
    ensure_model(&asset, &default_cache_dir()?)
}

/// Format bytes as a short human-readable string (e.g. "6.1MB").
#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Stream `url` into `dest` through a `.part` file renamed on success.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    info!("Downloading {url} to '{}'", dest.display());

    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_recv_body(Some(READ_TIMEOUT))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Timeout(_) => PoseError::Download(format!("Timed out downloading {url}")),
        ureq::Error::StatusCode(code) => {
            PoseError::Download(format!("Server returned {code} for {url}"))
        }
        other => PoseError::Download(format!("Failed to download {url}: {other}")),
    })?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let written = File::create(&temp_path)
        .map_err(PoseError::from)
        .and_then(|file| stream_body(response.into_body().into_reader(), file, total));

    let downloaded = match written {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    fs::rename(&temp_path, dest).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        PoseError::Download(format!("Failed to move download to {}: {e}", dest.display()))
    })?;

    eprintln!("\r\x1b[K  {} done", format_bytes(downloaded));
    Ok(())
}

/// Copy the response body into `file`, printing progress. Returns bytes written.
fn stream_body(mut reader: impl Read, file: File, total: Option<u64>) -> Result<u64> {
    const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

    let mut writer = BufWriter::new(file);
    let mut buffer = [0u8; 65536];
    let mut downloaded: u64 = 0;
    let mut last_update = Instant::now();

    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| PoseError::Download(format!("Failed to read from network: {e}")))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
        downloaded += n as u64;

        if last_update.elapsed() < MIN_UPDATE_INTERVAL {
            continue;
        }
        last_update = Instant::now();
        match total {
            Some(total) if total > 0 => eprint!(
                "\r\x1b[K  {}% {}/{}",
                downloaded.saturating_mul(100) / total,
                format_bytes(downloaded),
                format_bytes(total)
            ),
            _ => eprint!("\r\x1b[K  {}", format_bytes(downloaded)),
        }
        std::io::stderr().flush().ok();
    }

    writer.flush()?;
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_asset_is_pinned() {
        let asset = ModelAsset::default();
        assert_eq!(asset.version, DEFAULT_MODEL_VERSION);
        assert_eq!(
            asset.url(),
            "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n-pose.onnx"
        );
    }

    #[test]
    fn test_asset_overrides() {
        let asset = ModelAsset::new().with_version("v8.4.0").with_file("yolo11s-pose.onnx");
        assert!(asset.url().ends_with("/v8.4.0/yolo11s-pose.onnx"));
        assert_eq!(
            asset.local_path(Path::new("/tmp/cache")),
            PathBuf::from("/tmp/cache/v8.4.0/yolo11s-pose.onnx")
        );
    }

    #[test]
    fn test_ensure_model_uses_cached_file() {
        let dir = std::env::temp_dir().join(format!("pose-overlay-cache-{}", std::process::id()));
        let asset = ModelAsset::new();
        let path = asset.local_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"onnx").unwrap();

        assert_eq!(ensure_model(&asset, &dir).unwrap(), path);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolve_model_rejects_missing_path() {
        let result = resolve_model("some/dir/missing-pose.onnx");
        assert!(matches!(result, Err(PoseError::ModelLoad(_))));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500B");
        assert_eq!(format_bytes(1024), "1.0KB");
        assert_eq!(format_bytes(6 * 1024 * 1024), "6.0MB");
    }
}
