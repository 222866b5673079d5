use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::Result;

/// `base/<YYYY-MM-DD>`, created if missing
pub fn date_dir(base: &Path, date: NaiveDate) -> Result<PathBuf> {
    let directory = base.join(date.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&directory)?;
    Ok(directory)
}
