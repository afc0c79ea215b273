use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use reqwest::blocking::Client;
use tracing::{debug, info};
use url::Url;
use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::loader::Location;

const CHUNK_SIZE: usize = 8 * 1024;

/// Downloads `url` to `dest`, reporting progress and checking for cancellation after every chunk.
///
/// `file://` URLs are copied from disk the same way. On any failure the partial file is removed.
///
/// # Errors
///
/// Returns [`Error::Network`] if the artifact cannot be fetched or read,
/// [`Error::Cancelled`] if `hooks.cancel` fires, and [`Error::Io`] if `dest` cannot be written.
pub fn download(client: &Client, url: &Url, dest: &Path, hooks: &Hooks) -> Result<u64> {
    info!(%url, dest = %dest.display(), "Downloading");
    let (mut source, total) = open(client, url)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut output = File::create(dest)?;
    let result = copy_chunks(&mut source, &mut output, total, url, hooks);
    drop(output);
    match result {
        Ok(bytes) => {
            info!(%url, bytes, "Download finished");
            Ok(bytes)
        }
        Err(e) => {
            if let Err(remove) = std::fs::remove_file(dest) {
                debug!(dest = %dest.display(), error = %remove, "Could not remove partial download");
            }
            Err(e)
        }
    }
}

fn open(client: &Client, url: &Url) -> Result<(Box<dyn Read>, Option<u64>)> {
    let location = Location::from_url(url).map_err(|e| Error::network(url.as_str(), e))?;
    match location {
        Location::Remote(url) => {
            let response = client
                .get(url.clone())
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(|e| Error::network(url.as_str(), e))?;
            let total = response.content_length();
            Ok((Box::new(response), total))
        }
        Location::Local(path) => {
            let file = File::open(&path).map_err(|e| Error::network(url.as_str(), e))?;
            let total = file.metadata().ok().map(|metadata| metadata.len());
            Ok((Box::new(file), total))
        }
    }
}

fn copy_chunks(
    source: &mut dyn Read,
    output: &mut File,
    total: Option<u64>,
    url: &Url,
    hooks: &Hooks,
) -> Result<u64> {
    let cancelled = || Error::Cancelled {
        url: url.to_string(),
    };
    if hooks.is_cancelled() {
        return Err(cancelled());
    }
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut accumulated = 0u64;
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::network(url.as_str(), e)),
        };
        output.write_all(&buffer[..read])?;
        accumulated += read as u64;
        if let Some(total) = total.filter(|total| *total > 0) {
            hooks.progress.report(accumulated as f64 / total as f64);
        }
        if hooks.is_cancelled() {
            return Err(cancelled());
        }
    }
    output.flush()?;
    Ok(accumulated)
}
