//! Source acquisition: remote downloads and local files.
//!
//! Downloads for one run land in
//! `{data_dir}/downloads/execution_{timestamp}/temp_{index}_{timestamp}.xlsx`
//! and are renamed after the branch once extraction has identified it.

use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AcquisitionError;
use crate::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::transform::pipeline::{FileReport, SourceFile};

/// `fetch` config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Downloads in flight at once.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 60,
        }
    }
}

const ONEDRIVE_HOSTS: [&str; 2] = ["onedrive.live.com", "1drv.ms"];

/// Rewrite OneDrive sharing links into direct-download links.
///
/// `/edit` becomes `/download` and `download=1` is added unless a
/// `download` parameter is already there. Other URLs pass through.
pub fn direct_download_url(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if !ONEDRIVE_HOSTS.iter().any(|host| lower.contains(host)) {
        return url.to_string();
    }

    let rewritten = url.replace("/edit", "/download");
    let Ok(mut parsed) = Url::parse(&rewritten) else {
        return rewritten;
    };
    if !parsed.query_pairs().any(|(key, _)| key == "download") {
        parsed.query_pairs_mut().append_pair("download", "1");
    }
    parsed.to_string()
}

/// Downloads the configured workbooks for one run.
pub struct Downloader {
    client: Client,
    dir: PathBuf,
    timestamp: String,
    concurrency: usize,
}

impl Downloader {
    /// Prepare the run's download folder.
    pub fn new(
        data_dir: &Path,
        config: &FetchConfig,
        timestamp: &str,
    ) -> Result<Self, AcquisitionError> {
        let dir = data_dir
            .join("downloads")
            .join(format!("execution_{}", timestamp));
        std::fs::create_dir_all(&dir).map_err(|source| AcquisitionError::Io {
            path: dir.clone(),
            source,
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AcquisitionError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            dir,
            timestamp: timestamp.to_string(),
            concurrency: config.concurrency.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch one URL. `index` is 1-based and becomes the file id.
    pub async fn download(&self, url: &str, index: usize) -> Result<SourceFile, AcquisitionError> {
        let target = direct_download_url(url);
        let path = self
            .dir
            .join(format!("temp_{}_{}.xlsx", index, self.timestamp));
        log_info_indent(format!("⬇️  [{}] {}", index, url), 1);

        let request_error = |e: reqwest::Error| AcquisitionError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(&target).send().await.map_err(request_error)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AcquisitionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        if let Err(source) = tokio::fs::write(&path, &bytes).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AcquisitionError::Io { path, source });
        }

        log_success(format!("Downloaded [{}] as {}", index, path.display()));
        Ok(SourceFile::new(index.to_string(), bytes.to_vec()).with_path(path))
    }

    /// Fetch every URL with bounded concurrency, results in input order.
    pub async fn download_all(&self, urls: &[String]) -> Vec<Result<SourceFile, AcquisitionError>> {
        log_info(format!(
            "🌐 Downloading {} file(s) into {}",
            urls.len(),
            self.dir.display()
        ));
        stream::iter(urls.iter().enumerate())
            .map(|(i, url)| self.download(url, i + 1))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Rename a downloaded file after its branch.
    ///
    /// Returns the new path. Failures are logged and leave the file where it is.
    pub fn archive(&self, report: &FileReport) -> Option<PathBuf> {
        let (Some(path), Some(slug)) = (&report.path, &report.branch_slug) else {
            return None;
        };
        if !path.starts_with(&self.dir) {
            return None;
        }

        let target = self.dir.join(format!(
            "archivo_{}_{}_{}.xlsx",
            slug, report.file_id, self.timestamp
        ));
        match std::fs::rename(path, &target) {
            Ok(()) => {
                log_info_indent(format!("Renamed {} → {}", path.display(), target.display()), 1);
                Some(target)
            }
            Err(e) => {
                log_warning(format!("Could not rename {}: {}", path.display(), e));
                None
            }
        }
    }

    /// Archive every successfully extracted download.
    pub fn archive_all(&self, reports: &[FileReport]) {
        for report in reports.iter().filter(|r| r.succeeded()) {
            self.archive(report);
        }
    }
}

/// Read a workbook from disk; the file name becomes the file id.
pub fn read_local(path: &Path) -> Result<SourceFile, AcquisitionError> {
    let bytes = std::fs::read(path).map_err(|source| AcquisitionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let id = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceFile::new(id, bytes).with_path(path))
}
