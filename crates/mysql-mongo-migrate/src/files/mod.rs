//! Dump-file handling and hosting-platform transfer.
//!
//! The pipeline starts from a MySQL dump file hosted on a data platform:
//! the prepare step downloads it into a per-resource cache directory, and
//! the upload steps push converted output and validation reports back.

use std::path::{Path, PathBuf};

use reqwest::multipart;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::PlatformConfig;
use crate::error::{MigrateError, Result};

/// The only accepted dump-file extension.
const DUMP_EXTENSION: &str = "sql";

/// Header carrying the platform API key.
const API_KEY_HEADER: &str = "Authorization";

/// Reject any input file that is not a `.sql` dump.
pub fn check_file_extension(file_name: &str) -> Result<()> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if !ext.eq_ignore_ascii_case(DUMP_EXTENSION) {
        return Err(MigrateError::InvalidFileExtension(file_name.to_string()));
    }
    Ok(())
}

/// Per-resource working directory under the configured cache root.
#[must_use]
pub fn resource_cache_dir(config: &PlatformConfig, resource_id: &str) -> PathBuf {
    Path::new(&config.cache_dir).join(resource_id)
}

/// Create a working directory, succeeding if it already exists.
pub async fn create_temp_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(MigrateError::TempDirNotCreated(String::new()));
    }
    fs::create_dir_all(path)
        .await
        .map_err(|e| MigrateError::TempDirNotCreated(format!("{}: {}", path.display(), e)))?;
    debug!("Working directory ready: {}", path.display());
    Ok(())
}

/// Remove a resource working directory and everything under it.
///
/// A directory that never got created is not an error; partial runs clean up
/// with the same call.
pub async fn clear_cache_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Removed working directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Download a hosted resource file to `dest`.
pub async fn download_file(
    client: &reqwest::Client,
    config: &PlatformConfig,
    url: &str,
    dest: &Path,
) -> Result<()> {
    let response = client
        .get(url)
        .header(API_KEY_HEADER, &config.api_key)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(MigrateError::UnavailableResource(format!(
            "{} ({})",
            url,
            response.status()
        )));
    }

    let bytes = response.bytes().await?;
    let mut file = fs::File::create(dest).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;

    info!("Downloaded {} ({} bytes)", dest.display(), bytes.len());
    Ok(())
}

/// Upload a local file to the platform as a resource attachment.
pub async fn upload_file(
    client: &reqwest::Client,
    config: &PlatformConfig,
    resource_id: &str,
    path: &Path,
) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();

    let bytes = fs::read(path).await?;
    let size = bytes.len();
    let part = multipart::Part::bytes(bytes).file_name(file_name.clone());

    let form = multipart::Form::new()
        .text("id", resource_id.to_string())
        .part("upload", part);

    let response = client
        .post(&config.upload_url)
        .header(API_KEY_HEADER, &config.api_key)
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(MigrateError::UploadResource(format!(
            "{} ({})",
            file_name,
            response.status()
        )));
    }

    info!("Uploaded {} ({} bytes)", file_name, size);
    Ok(())
}
