use chrono::NaiveDate;
use reqwest::Response;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::fritz::FritzClient;
use crate::paths;
use crate::util::*;

/// Saves the finding chart of `ztf_id` to `<base>/<date>/<ztf_id>_finder.pdf`
pub async fn download(
    client: &FritzClient,
    base_dir: &Path,
    ztf_id: &str,
    date: NaiveDate,
) -> Result<PathBuf> {
    let response = client.finding_chart(ztf_id).await?;
    info!("Finding chart for {}: HTTP {}", ztf_id, response.status());

    let path = paths::date_dir(base_dir, date)?.join(format!("{}_finder.pdf", ztf_id));
    match save(response, &path).await {
        Ok(bytes) => {
            info!("Saved finding chart to {} ({} bytes)", path.display(), bytes);
            Ok(path)
        }
        Err(e) => {
            // Partial downloads are never left behind
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

async fn save(mut response: Response, path: &Path) -> Result<u64> {
    let mut file = File::create(path).await?;
    let mut written = 0;
    while let Some(chunk) = response.chunk().await? {
        debug!("Received {} bytes", chunk.len());
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
