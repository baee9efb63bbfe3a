use std::path::PathBuf;

use anyhow::{Context, Result};

fn data_home() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("streamtrack"))
}

pub fn default_database_path() -> Result<PathBuf> {
    Ok(data_home()?.join("streamtrack.db"))
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(data_home()?.join("streamtrack.log"))
}
