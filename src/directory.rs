use std::io;
use std::path::Path;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::Resource;

/// The resource catalog. Loaded once at startup and read-only from then on;
/// catalog CRUD and the approval workflow live outside this service.
#[derive(Debug)]
pub struct ResourceDirectory {
    entries: DashMap<Ulid, Resource>,
}

impl Default for ResourceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceDirectory {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Load the catalog from a JSON array of resources. The whole file is
    /// refused on the first invalid entry so a typo can't silently drop a
    /// listing.
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let resources: Vec<Resource> = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let dir = Self::new();
        for resource in resources {
            let id = resource.id;
            dir.insert(resource).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("resource {id}: {e}"))
            })?;
        }
        Ok(dir)
    }

    pub fn insert(&self, resource: Resource) -> Result<(), &'static str> {
        resource.validate()?;
        self.entries.insert(resource.id, resource);
        Ok(())
    }

    pub fn get(&self, id: &Ulid) -> Option<Resource> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Ids of every resource owned by `owner_id`. Backs the host-view filter.
    pub fn owned_by(&self, owner_id: &Ulid) -> Vec<Ulid> {
        self.entries
            .iter()
            .filter(|e| e.value().owner_id == *owner_id)
            .map(|e| *e.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
