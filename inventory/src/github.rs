use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::instrument;

use crate::http::HttpClient;
use crate::tool::Tool;
use crate::Error;

#[derive(Debug, Default, Deserialize)]
struct ReleasesResponse {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Resolves the concrete download URL for a tool pinned to a github project
/// by matching the latest release's assets against the tool's selector. The
/// first matching asset wins; the selector is expected to disambiguate
/// between platform builds.
#[instrument(skip_all, fields(project = %tool.github_project))]
pub async fn resolve_github_release(
    client: &dyn HttpClient,
    tool: &Tool,
) -> Result<String, Error> {
    let fail = |reason: String| Error::Resolution {
        project: tool.github_project.clone(),
        reason,
    };

    let selector = Regex::new(&tool.github_asset_regex)
        .map_err(|e| fail(format!("invalid asset selector: {e}")))?;

    let api_url = format!(
        "https://api.github.com/repos/{}/releases/latest",
        tool.github_project
    );
    let mut response = client
        .get(&api_url)
        .await
        .map_err(|e| fail(e.to_string()))?;
    if response.status != 200 {
        return Err(fail(format!(
            "release listing returned status {}",
            response.status
        )));
    }

    let mut body = Vec::new();
    response
        .body
        .read_to_end(&mut body)
        .await
        .map_err(|e| fail(e.to_string()))?;
    let releases: ReleasesResponse =
        serde_json::from_slice(&body).map_err(|e| fail(e.to_string()))?;

    releases
        .assets
        .iter()
        .find(|asset| selector.is_match(&asset.name))
        .map(|asset| asset.browser_download_url.clone())
        .ok_or_else(|| fail("no release asset matched the selector".to_string()))
}
