//! Third-party tool inventory for the argus endpoint-monitoring platform.
//!
//! Investigative artifacts may depend on external binaries. Artifact loading
//! declares them here with [ToolStore::add_tool], which only records the
//! definition; the tool is not fetched until something asks for it with
//! [ToolStore::get_tool_info], at which point it is materialized: downloaded,
//! written into the root org's public filestore and its tracking fields
//! (hash, serve URL) filled in.
//!
//! A definition is split into user-supplied fields (name, url,
//! github_project, ...) and system-derived tracking fields (hash, serve_url,
//! filestore_path). A tool without a hash is untracked. An admin can pin a
//! specific payload by uploading it manually and adding the definition with
//! the admin-override flag, which no automatic upgrade may displace.
//!
//! Each org owns one [ToolStore]. Stores of non-root orgs delegate unknown
//! names to the root org's store and ingest whatever variants it declares.

mod clock;
mod errors;
mod hashing_reader;
mod obfuscate;
mod tool;

pub mod datastore;
pub mod filestore;
pub mod github;
pub mod http;
pub mod notifier;
pub mod orgs;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::Error;
pub use hashing_reader::{HashingReader, Sha256HashingReader};
pub use obfuscate::obfuscated_store_name;
pub use store::{ToolStore, INVENTORY_NOTIFICATION, INVENTORY_PATH};
pub use tool::{Tool, ToolInventory, ToolOptions};
