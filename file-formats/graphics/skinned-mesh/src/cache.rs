//! Caller-owned registry of loaded meshes
//!
//! Meshes are stored behind [`Arc`] so any number of
//! [`AnimatedMeshController`](crate::controller::AnimatedMeshController)s can
//! play the same asset. The cache never evicts on its own.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};

use crate::error::Result;
use crate::loader::{LoaderOptions, load_mesh};
use crate::mesh::SkinnedMesh;

/// Name → mesh table with explicit lifetime management
#[derive(Debug, Default, Clone)]
pub struct MeshCache {
    meshes: HashMap<String, Arc<SkinnedMesh>>,
}

/// Cache key for a name or path; path separators are unified
fn normalize(name: &str) -> String {
    name.replace('\\', "/")
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mesh under `name`, returning the mesh it replaced
    pub fn insert(&mut self, name: impl AsRef<str>, mesh: Arc<SkinnedMesh>) -> Option<Arc<SkinnedMesh>> {
        self.meshes.insert(normalize(name.as_ref()), mesh)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SkinnedMesh>> {
        self.meshes.get(&normalize(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.meshes.contains_key(&normalize(name))
    }

    /// Remove a mesh; instances still holding it keep it alive
    pub fn evict(&mut self, name: &str) -> Option<Arc<SkinnedMesh>> {
        let removed = self.meshes.remove(&normalize(name));
        if removed.is_some() {
            debug!("Evicted mesh '{}'", name);
        }
        removed
    }

    pub fn clear(&mut self) {
        debug!("Clearing {} cached meshes", self.meshes.len());
        self.meshes.clear();
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Cached names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.meshes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return the cached mesh for `path`, loading it on first use
    ///
    /// A failed load is not cached, so a later call retries.
    pub fn get_or_load<P: AsRef<Path>>(&mut self, path: P, options: &LoaderOptions) -> Result<Arc<SkinnedMesh>> {
        let path = path.as_ref();
        let key = normalize(&path.to_string_lossy());
        if let Some(mesh) = self.meshes.get(&key) {
            trace!("Mesh cache hit for '{}'", key);
            return Ok(Arc::clone(mesh));
        }

        let mesh = Arc::new(load_mesh(path, options)?);
        self.meshes.insert(key, Arc::clone(&mesh));
        Ok(mesh)
    }
}
