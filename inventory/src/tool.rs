use serde::{Deserialize, Serialize};

/// A declared external binary.
///
/// The user-supplied fields describe where the payload comes from; the
/// tracking fields (hash, serve_url, filestore_path) are filled in by the
/// store when the tool is materialized. A tool with an empty hash is
/// untracked.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tool {
    pub name: String,
    /// Upstream download location. May be empty for tools uploaded to the
    /// filestore by hand.
    pub url: String,
    /// `owner/repo` of a github project to resolve the download from.
    pub github_project: String,
    /// Selector picking the release asset when `github_project` is set.
    pub github_asset_regex: String,
    pub filename: String,
    /// Serve the payload from this deployment instead of the upstream url.
    pub serve_locally: bool,

    /// Hex SHA-256 of the payload. Empty means untracked.
    pub hash: String,
    /// Where consumers are directed to download the tool from.
    pub serve_url: String,
    /// Obfuscated name under the root org's public directory.
    pub filestore_path: String,
    /// Set by an explicit admin replacement; lowered only by another one.
    pub admin_override: bool,

    /// The artifact whose definition this version came from.
    pub artifact: String,
    /// All declared variants under this name. Derived on read, never
    /// authoritative in storage.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<Tool>,
}

/// The full set of tools declared for one org, persisted as a single
/// datastore subject.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolInventory {
    pub tools: Vec<Tool>,
    /// Nanosecond stamp of the last write. Strictly increasing within a
    /// process.
    pub version: u64,
}

/// Flags controlling [crate::ToolStore::add_tool].
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolOptions {
    /// The definition comes from a loaded artifact; keep its pristine copy
    /// in the version map so it can be recovered after mutation.
    pub artifact_definition: bool,
    /// Keep the existing definition when it is preferable to this one.
    pub upgrade: bool,
    /// The admin explicitly set this definition.
    pub admin_override: bool,
}

/// Basename of a URL path, used to default a tool's filename.
pub(crate) fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
