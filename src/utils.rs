use crate::ScrapeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Parse an absolute http(s) URL.
pub fn validate_url(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ScrapeError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url, scheme
        ))),
    }
}

pub fn sanitize_filename(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    cleaned.trim().trim_matches('.').to_string()
}

/// File name for a capture of `url` when the caller did not pick one.
pub fn capture_file_name(url: Option<&str>, extension: &str) -> String {
    let stem = url
        .and_then(|u| Url::parse(u).ok())
        .map(|u| {
            let host = u.host_str().unwrap_or("page").to_string();
            match u.path().trim_matches('/') {
                "" => host,
                path => format!("{}_{}", host, path),
            }
        })
        .map(|stem| sanitize_filename(&stem))
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "capture".to_string());

    format!("{}.{}", stem, extension)
}

/// Where a capture is written: a caller-chosen file that is kept, or a file
/// in a fresh temp directory that goes away with the target.
#[derive(Debug)]
pub enum CaptureTarget {
    Requested(PathBuf),
    Temporary { dir: TempDir, path: PathBuf },
}

impl CaptureTarget {
    pub fn new(file: Option<&Path>, extension: &str) -> Result<Self, ScrapeError> {
        match file {
            Some(path) => Ok(Self::Requested(path.to_path_buf())),
            None => {
                let dir = tempfile::Builder::new().prefix("block-scraper-").tempdir()?;
                let path = dir.path().join(format!("capture.{}", extension));
                Ok(Self::Temporary { dir, path })
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Requested(path) => path,
            Self::Temporary { path, .. } => path,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    /// Create the parent directory of a caller-chosen file.
    pub async fn prepare(&self) -> Result<(), ScrapeError> {
        if let Self::Requested(path) = self {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    pub async fn read(&self) -> Result<Vec<u8>, ScrapeError> {
        Ok(tokio::fs::read(self.path()).await?)
    }

    /// Remove the temp directory now, reporting a failed removal.
    pub fn close(self) -> Result<(), ScrapeError> {
        match self {
            Self::Requested(_) => Ok(()),
            Self::Temporary { dir, .. } => Ok(dir.close()?),
        }
    }
}

/// Write capture bytes, creating missing parent directories.
pub async fn write_capture(path: &Path, data: &[u8]) -> Result<PathBuf, ScrapeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(path.to_path_buf())
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
