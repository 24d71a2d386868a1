use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::datastore::Datastore;
use crate::http::HttpClient;
use crate::notifier::Notifier;
use crate::obfuscate::obfuscated_store_name;
use crate::orgs::{OrgConfig, OrgManager};
use crate::tool::{url_basename, Tool, ToolInventory, ToolOptions};
use crate::Error;

mod materialize;


/// Datastore subject holding the serialized inventory, one blob per org.
pub const INVENTORY_PATH: &str = "config/inventory.json";

/// Channel the store reloads on when a sibling mutates the inventory.
pub const INVENTORY_NOTIFICATION: &str = "Server.Internal.Inventory";

/// How long the reload loop waits before reloading unconditionally.
const RELOAD_INTERVAL: Duration = Duration::from_secs(600);

struct StoreState {
    inventory: ToolInventory,
    /// Pristine artifact-declared definitions per tool name, kept so the
    /// clean definitions can always be recovered after mutation.
    versions: HashMap<String, Vec<Tool>>,
}

impl StoreState {
    fn find(&self, name: &str) -> Option<&Tool> {
        self.inventory.tools.iter().find(|t| t.name == name)
    }

    /// Clone the tool enriched with all declared variants under its name.
    fn with_versions(&self, tool: &Tool) -> Tool {
        let mut result = tool.clone();
        result.versions = self.versions.get(&tool.name).cloned().unwrap_or_default();
        result
    }

    /// Record an artifact-declared definition, replacing any prior record
    /// from the same artifact.
    fn update_version(&mut self, request: &Tool) {
        let versions = self.versions.entry(request.name.clone()).or_default();
        match versions.iter_mut().find(|v| v.artifact == request.artifact) {
            Some(existing) => *existing = request.clone(),
            None => versions.push(request.clone()),
        }
    }
}

/// The per-org third-party tool inventory.
///
/// All state is guarded by one async mutex, which is deliberately held
/// across materialization: concurrent first touches of the same untracked
/// tool collapse into a single download.
pub struct ToolStore {
    config: Arc<OrgConfig>,
    clock: Arc<dyn Clock>,
    client: Option<Arc<dyn HttpClient>>,
    datastore: Arc<dyn Datastore>,
    org_manager: Arc<dyn OrgManager>,
    /// The root org's store. Unknown names are delegated to it; the root
    /// itself has no parent, so the hierarchy cannot cycle.
    parent: Option<Arc<ToolStore>>,
    state: Mutex<StoreState>,
}

impl ToolStore {
    pub fn new(
        config: Arc<OrgConfig>,
        clock: Arc<dyn Clock>,
        client: Option<Arc<dyn HttpClient>>,
        datastore: Arc<dyn Datastore>,
        org_manager: Arc<dyn OrgManager>,
        parent: Option<Arc<ToolStore>>,
    ) -> Arc<Self> {
        // The root org's inventory is the delegation target for everyone
        // else; it must never have a parent of its own.
        debug_assert!(
            !config.is_root() || parent.is_none(),
            "the root org inventory delegates to no parent"
        );

        Arc::new(Self {
            config,
            clock,
            client,
            datastore,
            org_manager,
            parent,
            state: Mutex::new(StoreState {
                inventory: ToolInventory::default(),
                versions: HashMap::new(),
            }),
        })
    }

    /// Loads the persisted inventory and spawns the reload loop, which wakes
    /// on inventory notifications or every [RELOAD_INTERVAL], whichever
    /// comes first, until the token is cancelled.
    pub async fn start(
        self: Arc<Self>,
        notifier: Arc<dyn Notifier>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        self.load_from_file().await;

        tokio::spawn(async move {
            loop {
                let mut notification = notifier.listen(INVENTORY_NOTIFICATION);
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = notification.recv() => self.load_from_file().await,
                    _ = tokio::time::sleep(RELOAD_INTERVAL) => self.load_from_file().await,
                }
            }
        })
    }

    /// A deep copy of the current inventory.
    pub async fn get(&self) -> ToolInventory {
        self.state.lock().await.inventory.clone()
    }

    /// Declare or replace a tool definition.
    ///
    /// Persistence failures are not surfaced here: the store keeps serving
    /// the in-memory inventory and writes again on the next mutation.
    #[instrument(skip_all, fields(org_id = %self.config.org_id, tool.name = %request.name))]
    pub async fn add_tool(&self, request: &Tool, opts: ToolOptions) -> Result<(), Error> {
        let mut request = request.clone();
        request.versions.clear();

        if opts.artifact_definition {
            self.state.lock().await.update_version(&request);
        }

        if opts.upgrade {
            if let Ok(existing) = self.probe_tool_info(&request.name).await {
                if is_definition_better(&existing, &request) {
                    return Ok(());
                }
            }
        }

        if opts.admin_override {
            request.admin_override = true;
        }

        let mut state = self.state.lock().await;

        let mut tool = request;
        tool.filestore_path = obfuscated_store_name(&self.config.org_id, &tool.name);

        // Endpoints carry no client section and cannot serve anything.
        if tool.serve_locally && self.config.client.is_none() {
            tool.serve_locally = false;
        }

        if tool.serve_locally {
            match self.server_url_base() {
                Some(base) => tool.serve_url = format!("{}public/{}", base, tool.filestore_path),
                None => return Err(Error::Config("no server URLs configured".to_string())),
            }
        }

        if tool.filename.is_empty() && !tool.url.is_empty() {
            if let Some(base) = url_basename(&tool.url) {
                tool.filename = base;
            }
        }

        let name = tool.name.clone();
        match state.inventory.tools.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = tool,
            None => state.inventory.tools.push(tool),
        }

        // Strictly increasing even when the clock is coarse or pinned.
        state.inventory.version =
            std::cmp::max(self.clock.now_nanos(), state.inventory.version + 1);

        if let Err(e) = self.persist(&state.inventory).await {
            warn!(%e, "unable to store inventory - running with the in-memory copy");
        }
        Ok(())
    }

    /// Drop a tool definition. Unlike [ToolStore::add_tool], persistence
    /// failures are surfaced.
    pub async fn remove_tool(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.inventory.tools.retain(|t| t.name != name);
        self.persist(&state.inventory).await
    }

    /// Look a tool up without materializing it, delegating unknown names to
    /// the parent inventory. A successful delegation ingests the parent's
    /// declared variants into this store, then resolves locally.
    pub fn probe_tool_info<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Tool, Error>> {
        async move {
            let local = {
                let state = self.state.lock().await;
                state.find(name).map(|tool| state.with_versions(tool))
            };
            if let Some(tool) = local {
                return Ok(tool);
            }

            if let Some(parent) = &self.parent {
                if let Ok(parent_tool) = parent.probe_tool_info(name).await {
                    for variant in &parent_tool.versions {
                        self.add_tool(
                            variant,
                            ToolOptions {
                                artifact_definition: true,
                                ..Default::default()
                            },
                        )
                        .await?;
                    }

                    // Try again with the ingested definitions.
                    let state = self.state.lock().await;
                    if let Some(tool) = state.find(name) {
                        return Ok(state.with_versions(tool));
                    }
                }
            }

            Err(Error::NotFound(name.to_string()))
        }
        .boxed()
    }

    /// Fetch the tool record, materializing it first if it was never
    /// downloaded. The lock is held for the duration of the download so at
    /// most one materialization per inventory runs at a time.
    #[instrument(skip_all, fields(org_id = %self.config.org_id, tool.name = %name))]
    pub async fn get_tool_info(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<Tool, Error> {
        let mut state = self.state.lock().await;

        let Some(idx) = state.inventory.tools.iter().position(|t| t.name == name) else {
            return Err(Error::NotFound(name.to_string()));
        };

        // A tool without a hash is untracked; materialize it now.
        if state.inventory.tools[idx].hash.is_empty() {
            let mut tool = state.inventory.tools[idx].clone();
            self.materialize_tool(&mut tool, token).await?;
            state.inventory.tools[idx] = tool;
            self.persist(&state.inventory).await?;
        }

        let tool = &state.inventory.tools[idx];
        Ok(state.with_versions(tool))
    }

    /// Replace the in-memory inventory with the persisted copy. A missing or
    /// unreadable subject is not an error - run with an empty inventory and
    /// try again on the next reload.
    pub async fn load_from_file(&self) {
        let mut state = self.state.lock().await;

        state.inventory = match self.datastore.get_subject(INVENTORY_PATH).await {
            Ok(Some(blob)) => serde_json::from_slice(&blob).unwrap_or_else(|e| {
                debug!(%e, "discarding unreadable inventory");
                ToolInventory::default()
            }),
            Ok(None) => ToolInventory::default(),
            Err(e) => {
                debug!(%e, "inventory not loadable");
                ToolInventory::default()
            }
        };
    }

    /// Nothing to release beyond the reload loop, which is drained by
    /// cancelling the token handed to [ToolStore::start] and awaiting the
    /// returned handle.
    pub fn close(&self) {}

    #[cfg(test)]
    pub(crate) async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.inventory = ToolInventory::default();
        state.versions.clear();
    }

    /// First configured frontend base URL, if any.
    fn server_url_base(&self) -> Option<&str> {
        self.config
            .client
            .as_ref()
            .and_then(|c| c.server_urls.first())
            .map(String::as_str)
    }

    async fn persist(&self, inventory: &ToolInventory) -> Result<(), Error> {
        let blob = serde_json::to_vec(inventory).map_err(|e| Error::Storage(e.to_string()))?;
        self.datastore
            .set_subject(INVENTORY_PATH, Bytes::from(blob))
            .await
    }
}

/// Whether the existing definition should be kept over the new request.
///
/// The admin is always right: an admin-set definition is never displaced
/// except by another admin override. Otherwise a definition with no source
/// at all loses to anything, and the incumbent wins ties.
pub fn is_definition_better(old: &Tool, new: &Tool) -> bool {
    if new.admin_override {
        return false;
    }

    if old.admin_override {
        return true;
    }

    if old.url.is_empty() && old.github_project.is_empty() && old.serve_url.is_empty() {
        return false;
    }

    true
}
