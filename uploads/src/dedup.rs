use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Summary of a finished upload, handed back into the collection scope.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    pub stored_name: String,
    pub components: Vec<String>,
    pub accessor: String,
    /// Size of the original file.
    pub size: u64,
    /// Bytes actually transmitted.
    pub stored_size: u64,
    pub sha256: String,
    pub md5: String,
}

/// Per-scope cache preventing the same store-as name being uploaded twice
/// within one collection. Only finished uploads are cached; failures leave
/// no entry behind.
#[derive(Default)]
pub struct UploadCache {
    cached: Mutex<HashMap<String, UploadResponse>>,
}

impl UploadCache {
    /// The cached response for this store-as name, if the scope has already
    /// uploaded it.
    pub fn get(&self, stored_name: &str) -> Option<UploadResponse> {
        self.cached.lock().unwrap().get(stored_name).cloned()
    }

    pub fn put(&self, stored_name: &str, response: &UploadResponse) {
        self.cached
            .lock()
            .unwrap()
            .insert(stored_name.to_string(), response.clone());
    }
}
