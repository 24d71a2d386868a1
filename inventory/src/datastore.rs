use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::Error;

/// Subject store the inventory persists into, one opaque blob per path.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get_subject(&self, path: &str) -> Result<Option<Bytes>, Error>;

    async fn set_subject(&self, path: &str, data: Bytes) -> Result<(), Error>;
}

/// Datastore keeping subjects in memory, for endpoints and tests.
#[derive(Default, Clone)]
pub struct MemoryDatastore {
    db: Arc<RwLock<HashMap<String, Bytes>>>,
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get_subject(&self, path: &str) -> Result<Option<Bytes>, Error> {
        let db = self.db.read().unwrap();
        Ok(db.get(path).cloned())
    }

    async fn set_subject(&self, path: &str, data: Bytes) -> Result<(), Error> {
        let mut db = self.db.write().unwrap();
        db.insert(path.to_string(), data);
        Ok(())
    }
}
