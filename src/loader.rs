use std::fmt;
use std::path::{Path, PathBuf};
use reqwest::blocking::Client;
use tracing::debug;
use url::Url;
use crate::descriptor::ToolDescriptor;
use crate::error::{Error, Result};

/// Where a descriptor or artifact lives: on an HTTP(S) server or on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// An `http://` or `https://` URL.
    Remote(Url),
    /// A `file://` URL or a bare path.
    Local(PathBuf),
}

impl Location {
    /// Parses a URL or a filesystem path.
    ///
    /// Strings that do not parse as a URL, or whose scheme is a single letter
    /// (a Windows drive), are treated as paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] for URLs with schemes other than `http`, `https` and `file`.
    pub fn parse(location: &str) -> Result<Location> {
        match Url::parse(location) {
            Ok(url) if url.scheme().len() > 1 => Location::from_url(&url),
            _ => Ok(Location::Local(PathBuf::from(location))),
        }
    }

    /// Converts an already parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] for unsupported schemes or `file://` URLs without a valid path.
    pub fn from_url(url: &Url) -> Result<Location> {
        match url.scheme() {
            "http" | "https" => Ok(Location::Remote(url.clone())),
            "file" => url
                .to_file_path()
                .map(Location::Local)
                .map_err(|_| Error::descriptor(url.as_str(), "not a valid file path")),
            scheme => Err(Error::descriptor(
                url.as_str(),
                format!("unsupported URL scheme '{scheme}'"),
            )),
        }
    }

    fn is_json(&self) -> bool {
        let path = match self {
            Location::Remote(url) => Path::new(url.path()),
            Location::Local(path) => path.as_path(),
        };
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Remote(url) => write!(f, "{url}"),
            Location::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetches and parses a tools descriptor.
///
/// `location` is an `http(s)://` URL, a `file://` URL or a path. Documents whose
/// name ends in `.json` are parsed as JSON, everything else as YAML.
///
/// # Errors
///
/// Returns [`Error::Descriptor`] if the document cannot be fetched or parsed.
/// There are no retries.
pub fn load_descriptor(location: &str, client: &Client) -> Result<ToolDescriptor> {
    let parsed = Location::parse(location)?;
    debug!(%location, "Loading tools descriptor");
    let body = match &parsed {
        Location::Remote(url) => {
            let response = client
                .get(url.clone())
                .send()
                .map_err(|e| Error::descriptor(location, e))?;
            if !response.status().is_success() {
                return Err(Error::descriptor(
                    location,
                    format!("server returned {}", response.status()),
                ));
            }
            response.text().map_err(|e| Error::descriptor(location, e))?
        }
        Location::Local(path) => {
            std::fs::read_to_string(path).map_err(|e| Error::descriptor(location, e))?
        }
    };
    parse_descriptor(&body, location, parsed.is_json())
}

/// Parses descriptor text. Unknown fields are ignored.
///
/// # Errors
///
/// Returns [`Error::Descriptor`] if the text is not a valid descriptor.
pub fn parse_descriptor(text: &str, location: &str, json: bool) -> Result<ToolDescriptor> {
    let mut descriptor: ToolDescriptor = if json {
        serde_json::from_str(text).map_err(|e| Error::descriptor(location, e))?
    } else {
        serde_yaml::from_str(text).map_err(|e| Error::descriptor(location, e))?
    };
    descriptor.location = location.to_string();
    Ok(descriptor)
}
