use std::collections::HashMap;
use std::fmt;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use url::Url;
use crate::error::{Error, Result};
use crate::loader::Location;

/// A tools descriptor: every tool the embedding application may need, keyed by name.
///
/// Descriptors are parsed fresh on every acquisition and never mutated afterwards.
#[derive(Debug, Deserialize, Default)]
pub struct ToolDescriptor {
    /// Tool name to tool metadata.
    #[serde(default)]
    pub tools: HashMap<String, Tool>,
    /// Where this descriptor was loaded from, used in error messages.
    #[serde(skip)]
    pub location: String,
}

impl ToolDescriptor {
    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] if the descriptor does not list `name`.
    pub fn tool(&self, name: &str) -> Result<&Tool> {
        self.tools.get(name).ok_or_else(|| Error::UnknownTool {
            tool: name.to_string(),
            location: self.location.clone(),
        })
    }
}

/// A tool as defined in the descriptor.
#[derive(Debug, Deserialize)]
pub struct Tool {
    /// The version to download when no compatible version is installed.
    #[serde(rename = "version", deserialize_with = "version_string")]
    pub required_version: String,
    /// Arguments passed to the command to print its version, e.g. `"version --client"`.
    #[serde(rename = "versionCmd", default)]
    pub version_cmd: String,
    /// Extracts the version from one line of the version command output.
    #[serde(
        rename = "versionExtractRegExp",
        default,
        deserialize_with = "extract_pattern"
    )]
    pub version_extract: Option<VersionPattern>,
    /// Decides whether an installed version is acceptable. `None` accepts any detected version.
    #[serde(
        rename = "versionMatchRegExpr",
        default,
        deserialize_with = "match_pattern"
    )]
    pub version_match: Option<VersionPattern>,
    /// Install root; may start with the `$HOME` placeholder.
    #[serde(rename = "baseDir", default)]
    pub base_dir: String,
    /// Download without asking for approval.
    #[serde(rename = "silentMode", default)]
    pub silent_mode: bool,
    /// Platform key (`lnx`, `osx-arm64`, ...) to download entry.
    #[serde(default)]
    pub platforms: HashMap<String, Platform>,
}

impl Tool {
    /// The version command split into process arguments.
    pub fn version_args(&self) -> Vec<String> {
        self.version_cmd.split_whitespace().map(String::from).collect()
    }
}

/// A platform-specific download entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    /// Where to download the artifact from. Bare paths are stored as `file://` URLs.
    #[serde(deserialize_with = "artifact_url")]
    pub url: Url,
    /// The executable name, as found on `PATH` and as stored in the cache.
    #[serde(rename = "cmdFileName")]
    pub cmd_file_name: String,
    /// Name of the downloaded file; its extensions select the decoders.
    #[serde(rename = "dlFileName", default)]
    pub dl_file_name: String,
    /// Expected SHA-256 of the downloaded file, hex encoded.
    #[serde(default)]
    pub sha256: Option<String>,
}

impl Platform {
    /// The download file name, falling back to the last segment of the URL.
    pub fn download_file_name(&self) -> &str {
        if !self.dl_file_name.is_empty() {
            return &self.dl_file_name;
        }
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or(&self.cmd_file_name)
    }

    /// The expected checksum, if one is configured.
    pub fn checksum(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .map(str::trim)
            .filter(|sha| !sha.is_empty())
    }
}

/// A regular expression that must match a whole line or version string.
#[derive(Clone)]
pub struct VersionPattern {
    source: String,
    regex: Regex,
}

impl VersionPattern {
    /// Compiles `source`, anchored at both ends.
    pub fn new(source: &str) -> std::result::Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as written in the descriptor.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of capture groups, not counting the implicit whole match.
    pub fn group_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Whether `text` matches the pattern entirely.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The first capture group if `text` matches entirely.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)?
            .get(1)
            .map(|group| group.as_str())
    }
}

impl fmt::Debug for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VersionPattern").field(&self.source).finish()
    }
}

/// YAML reads `version: 4` as a number; integers are taken as their text.
///
/// Floats are rejected: `1.0` and `4.10` parse to the same values as `1` and `4.1`,
/// so the written version cannot be recovered.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => Ok(text),
        Scalar::Unsigned(n) => Ok(n.to_string()),
        Scalar::Signed(n) => Ok(n.to_string()),
        Scalar::Float(_) => Err(serde::de::Error::custom(
            "version is a number, quote it (version: \"1.0\")",
        )),
    }
}

fn artifact_url<'de, D>(deserializer: D) -> std::result::Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let path = match Location::parse(text.trim()).map_err(serde::de::Error::custom)? {
        Location::Remote(url) => return Ok(url),
        Location::Local(path) => path,
    };
    // Relative paths resolve against the working directory.
    let path = std::path::absolute(&path).map_err(serde::de::Error::custom)?;
    Url::from_file_path(&path).map_err(|_| {
        serde::de::Error::custom(format!("'{}' is not a valid file path", path.display()))
    })
}

fn optional_pattern<'de, D>(deserializer: D) -> std::result::Result<Option<VersionPattern>, D::Error>
where
    D: Deserializer<'de>,
{
    let source = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if source.trim().is_empty() {
        return Ok(None);
    }
    VersionPattern::new(&source)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

fn extract_pattern<'de, D>(deserializer: D) -> std::result::Result<Option<VersionPattern>, D::Error>
where
    D: Deserializer<'de>,
{
    let pattern = optional_pattern(deserializer)?;
    if let Some(pattern) = &pattern {
        if pattern.group_count() != 1 {
            return Err(serde::de::Error::custom(format!(
                "versionExtractRegExp '{}' must have exactly one capture group, found {}",
                pattern.as_str(),
                pattern.group_count()
            )));
        }
    }
    Ok(pattern)
}

fn match_pattern<'de, D>(deserializer: D) -> std::result::Result<Option<VersionPattern>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_pattern(deserializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(url: &str, dl_file_name: &str) -> Platform {
        Platform {
            url: Url::parse(url).unwrap(),
            cmd_file_name: "tkn".to_string(),
            dl_file_name: dl_file_name.to_string(),
            sha256: None,
        }
    }

    #[test]
    fn test_pattern_matches_whole_string_only() {
        let pattern = VersionPattern::new(r"0\..*").unwrap();
        assert!(pattern.is_match("0.5.0"));
        assert!(!pattern.is_match("10.5.0"));
    }

    #[test]
    fn test_pattern_extracts_first_group() {
        let pattern = VersionPattern::new(r"Client version: (\d+[\.\d+]*)\s.*").unwrap();
        assert_eq!(pattern.extract("Client version: 0.5.0 (linux)"), Some("0.5.0"));
        assert_eq!(pattern.extract("Server version: 0.5.0 (linux)"), None);
    }

    #[test]
    fn test_pattern_alternation_is_anchored_as_a_whole() {
        let pattern = VersionPattern::new("1.2|1.3").unwrap();
        assert!(pattern.is_match("1.3"));
        assert!(!pattern.is_match("1.33"));
    }

    #[test]
    fn test_download_file_name_falls_back_to_url() {
        let p = platform("https://example.com/releases/tkn_0.5.0_Linux_x86_64.tar.gz", "");
        assert_eq!(p.download_file_name(), "tkn_0.5.0_Linux_x86_64.tar.gz");
        let p = platform("https://example.com/releases/x.tar.gz", "tkn.tar.gz");
        assert_eq!(p.download_file_name(), "tkn.tar.gz");
    }

    #[test]
    fn test_empty_checksum_is_none() {
        let mut p = platform("https://example.com/tkn", "tkn");
        p.sha256 = Some("  ".to_string());
        assert_eq!(p.checksum(), None);
        p.sha256 = Some("abc".to_string());
        assert_eq!(p.checksum(), Some("abc"));
    }

    #[test]
    fn test_integer_yaml_version_is_kept_as_text() {
        let descriptor: ToolDescriptor =
            serde_yaml::from_str("tools:\n  oc:\n    version: 4\n").unwrap();
        assert_eq!(descriptor.tools["oc"].required_version, "4");
    }

    #[test]
    fn test_float_yaml_version_must_be_quoted() {
        for version in ["1.0", "4.10", "0.20"] {
            let yaml = format!("tools:\n  oc:\n    version: {version}\n");
            let err = serde_yaml::from_str::<ToolDescriptor>(&yaml).unwrap_err();
            assert!(err.to_string().contains("quote it"), "{version}: {err}");

            let yaml = format!("tools:\n  oc:\n    version: \"{version}\"\n");
            let descriptor: ToolDescriptor = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(descriptor.tools["oc"].required_version, version);
        }
    }

    #[test]
    fn test_bare_path_artifact_becomes_file_url() {
        let artifact = std::env::temp_dir().join("kn-linux-amd64");
        let yaml = format!(
            "tools:\n  kn:\n    version: \"1.1\"\n    platforms:\n      lnx:\n        url: '{}'\n        cmdFileName: kn\n",
            artifact.display()
        );
        let descriptor: ToolDescriptor = serde_yaml::from_str(&yaml).unwrap();
        let url = &descriptor.tools["kn"].platforms["lnx"].url;
        assert_eq!(url.scheme(), "file");
        assert_eq!(url.to_file_path().unwrap(), artifact);
        assert_eq!(descriptor.tools["kn"].platforms["lnx"].download_file_name(), "kn-linux-amd64");
    }

    #[test]
    fn test_unsupported_artifact_scheme_is_rejected() {
        let yaml = "tools:\n  kn:\n    version: \"1.1\"\n    platforms:\n      lnx:\n        url: ftp://example.com/kn\n        cmdFileName: kn\n";
        assert!(serde_yaml::from_str::<ToolDescriptor>(yaml).is_err());
    }

    #[test]
    fn test_unknown_tool() {
        let descriptor = ToolDescriptor {
            tools: HashMap::new(),
            location: "file:///tmp/tools.json".to_string(),
        };
        let err = descriptor.tool("oc").unwrap_err();
        assert!(matches!(err, Error::UnknownTool { ref tool, .. } if tool == "oc"));
    }
}
