use std::sync::Arc;

use crate::filestore::FileStore;
use crate::Error;

/// The designated parent org. Its filestore hosts every tool payload and its
/// inventory is the delegation target for all other orgs.
pub const ROOT_ORG_ID: &str = "root";

/// Client-facing connectivity settings of one org.
#[derive(Debug, Default, Clone)]
pub struct ClientConfig {
    /// Frontend base URLs, trailing slash included.
    pub server_urls: Vec<String>,
}

/// Per-org configuration handed to the inventory service.
///
/// Endpoints run without a client section; servers carry one.
#[derive(Debug, Default, Clone)]
pub struct OrgConfig {
    pub org_id: String,
    pub client: Option<ClientConfig>,
}

impl OrgConfig {
    pub fn is_root(&self) -> bool {
        self.org_id == ROOT_ORG_ID
    }
}

/// Lookup of org configuration and filestore backends.
///
/// Injected rather than looked up globally so tests can substitute fakes.
pub trait OrgManager: Send + Sync {
    fn get_org_config(&self, org_id: &str) -> Result<Arc<OrgConfig>, Error>;

    /// The filestore backing the given org's public directory.
    fn get_file_store(&self, config: &OrgConfig) -> Result<Arc<dyn FileStore>, Error>;
}
