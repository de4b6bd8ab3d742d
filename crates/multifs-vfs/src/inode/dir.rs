//! Directory inode implementation.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::types::{Attrs, INode, INodeId, INodeType};

/// Directory inode holding named child entries.
#[derive(Debug)]
pub struct INodeDir {
    /// Inode ID.
    id: INodeId,
    /// Parent directory inode ID.
    parent_id: RwLock<INodeId>,
    /// Directory name.
    name: RwLock<String>,
    /// POSIX attributes.
    attrs: RwLock<Attrs>,
    /// Child entries: name → inode ID, ordered for stable readdir.
    children: RwLock<BTreeMap<String, INodeId>>,
}

impl INodeDir {
    /// Create a new empty directory inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    /// * `parent_id` - Parent directory inode ID
    /// * `name` - Directory name
    /// * `attrs` - Initial attributes
    pub fn new(id: INodeId, parent_id: INodeId, name: String, attrs: Attrs) -> Self {
        Self {
            id,
            parent_id: RwLock::new(parent_id),
            name: RwLock::new(name),
            attrs: RwLock::new(attrs),
            children: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a child entry to this directory.
    pub fn add_child(&self, name: String, id: INodeId) {
        self.children.write().unwrap().insert(name, id);
    }

    /// Get a child inode ID by name.
    pub fn get_child(&self, name: &str) -> Option<INodeId> {
        self.children.read().unwrap().get(name).copied()
    }

    /// Get all children as (name, inode_id) pairs in name order.
    pub fn children(&self) -> Vec<(String, INodeId)> {
        self.children
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Get the number of children.
    pub fn child_count(&self) -> usize {
        self.children.read().unwrap().len()
    }

    /// Remove a child entry from this directory.
    ///
    /// # Returns
    /// The removed child inode ID, or None if not found.
    pub fn remove_child(&self, name: &str) -> Option<INodeId> {
        self.children.write().unwrap().remove(name)
    }
}

impl INode for INodeDir {
    fn id(&self) -> INodeId {
        self.id
    }

    fn parent_id(&self) -> INodeId {
        *self.parent_id.read().unwrap()
    }

    fn set_parent(&self, parent: INodeId) {
        *self.parent_id.write().unwrap() = parent;
    }

    fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    fn set_name(&self, name: String) {
        *self.name.write().unwrap() = name;
    }

    fn inode_type(&self) -> INodeType {
        INodeType::Directory
    }

    fn attrs(&self) -> &RwLock<Attrs> {
        &self.attrs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_arc_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
