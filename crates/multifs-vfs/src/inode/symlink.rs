//! Symlink inode implementation.

use std::any::Any;
use std::sync::{Arc, RwLock};

use super::types::{Attrs, INode, INodeId, INodeType};

/// Symlink inode pointing at a target path.
#[derive(Debug)]
pub struct INodeSymlink {
    /// Inode ID.
    id: INodeId,
    /// Parent directory inode ID.
    parent_id: RwLock<INodeId>,
    /// Symlink name.
    name: RwLock<String>,
    /// POSIX attributes; size is the target length.
    attrs: RwLock<Attrs>,
    /// Target path, stored verbatim.
    target: String,
}

impl INodeSymlink {
    /// Create a new symlink inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    /// * `parent_id` - Parent directory inode ID
    /// * `name` - Symlink name
    /// * `target` - Target path
    /// * `attrs` - Initial attributes (size is overwritten with the target length)
    pub fn new(id: INodeId, parent_id: INodeId, name: String, target: String, mut attrs: Attrs) -> Self {
        attrs.size = target.len() as u64;
        Self {
            id,
            parent_id: RwLock::new(parent_id),
            name: RwLock::new(name),
            attrs: RwLock::new(attrs),
            target,
        }
    }

    /// Target path of the symlink.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl INode for INodeSymlink {
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
        INodeType::Symlink
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
