use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::github::resolve_github_release;
use crate::hashing_reader::Sha256HashingReader;
use crate::orgs::ROOT_ORG_ID;
use crate::tool::{url_basename, Tool};
use crate::Error;

use super::ToolStore;

impl ToolStore {
    /// Download the tool and fill in its tracking fields.
    ///
    /// Called with the store lock held. Every payload is written to the
    /// root org's public directory, the only one mapped for external
    /// download; the obfuscated name keys in the requesting org, so equal
    /// tool names from different orgs never clash there.
    #[instrument(skip_all, fields(tool.name = %tool.name))]
    pub(super) async fn materialize_tool(
        &self,
        tool: &mut Tool,
        token: &CancellationToken,
    ) -> Result<(), Error> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Config("no HTTP client configured".to_string()))?;

        // A github-pinned tool needs its concrete asset URL resolved first.
        if !tool.github_project.is_empty() {
            tool.url = resolve_github_release(client.as_ref(), tool).await?;

            if tool.filename.is_empty() {
                let source = if tool.url.is_empty() {
                    &tool.serve_url
                } else {
                    &tool.url
                };
                if let Some(base) = url_basename(source) {
                    tool.filename = base;
                }
            }
        }

        let fetch_url = if !tool.url.is_empty() {
            tool.url.clone()
        } else if !tool.serve_url.is_empty() {
            tool.serve_url.clone()
        } else {
            return Err(Error::NoSource(tool.name.clone()));
        };

        let root_config = self.org_manager.get_org_config(ROOT_ORG_ID)?;
        let file_store = self.org_manager.get_file_store(&root_config)?;

        let path = format!("public/{}", tool.filestore_path);
        let mut writer = file_store
            .write_file(&path)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        writer
            .truncate()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(url = %fetch_url, "downloading tool");

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            response = client.get(&fetch_url) => response?,
        };
        if response.status != 200 {
            return Err(Error::Transport {
                url: fetch_url,
                reason: format!("status {}", response.status),
            });
        }

        let mut body = Sha256HashingReader::new(response.body);
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            copied = tokio::io::copy(&mut body, &mut writer) => {
                copied.map_err(|e| Error::Transport {
                    url: fetch_url.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        writer
            .complete()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        tool.hash = body.hex_digest();

        if tool.serve_locally {
            match self.server_url_base() {
                Some(base) => tool.serve_url = format!("{}public/{}", base, tool.filestore_path),
                None => return Err(Error::Config("no server URLs configured".to_string())),
            }
        } else if !tool.url.is_empty() {
            tool.serve_url = tool.url.clone();
        }

        Ok(())
    }
}
