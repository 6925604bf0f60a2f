//! A minimal in-simulation filesystem.
//!
//! The tree is an arena of nodes addressed by [`NodeId`]; parent and child
//! links are ids, never pointers. Only the operations the hosts need exist:
//! path resolution, file creation and reading, and wiping temporary mounts
//! on power-off.

use crate::clock::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Clone)]
pub struct DirectoryData {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Temporary mounts lose their contents on power-off.
    pub temporary_mount: bool,
}

#[derive(Debug, Clone)]
pub struct FileData {
    pub name: String,
    pub parent: NodeId,
    pub created_at: SimTime,
    pub edited_at: SimTime,
    pub content: String,
}

#[derive(Debug, Clone)]
pub enum Node {
    Directory(DirectoryData),
    File(FileData),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.name,
            Node::File(file) => &file.name,
        }
    }
}

#[derive(Debug)]
pub struct Filesystem {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Filesystem {
    /// A fresh filesystem with `/` and a temporary `/tmp`.
    pub fn new() -> Self {
        let mut fs = Self {
            nodes: vec![Some(Node::Directory(DirectoryData {
                name: "/".to_string(),
                parent: None,
                children: Vec::new(),
                temporary_mount: false,
            }))],
            root: NodeId(0),
        };
        if let Ok(tmp) = fs.mkdir("/tmp") {
            if let Some(Node::Directory(dir)) = fs.nodes[tmp.0].as_mut() {
                dir.temporary_mount = true;
            }
        }
        fs
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    fn child_by_name(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        match self.node(dir)? {
            Node::Directory(data) => data
                .children
                .iter()
                .copied()
                .find(|&child| self.node(child).map(Node::name) == Some(name)),
            Node::File(_) => None,
        }
    }

    /// Resolves an absolute path to a node.
    pub fn resolve(&self, path: &str) -> Result<NodeId, FsError> {
        let mut current = self.root;
        for part in path.split('/').filter(|part| !part.is_empty()) {
            match self.node(current) {
                Some(Node::Directory(_)) => {
                    current = self
                        .child_by_name(current, part)
                        .ok_or_else(|| FsError::NotFound(path.to_string()))?;
                }
                _ => return Err(FsError::NotADirectory(path.to_string())),
            }
        }
        Ok(current)
    }

    fn split_parent(path: &str) -> (&str, &str) {
        match path.rfind('/') {
            Some(0) => ("/", &path[1..]),
            Some(index) => (&path[..index], &path[index + 1..]),
            None => ("/", path),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> Result<NodeId, FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent = self.resolve(parent_path)?;
        if self.child_by_name(parent, name).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let id = self.alloc(Node::Directory(DirectoryData {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            temporary_mount: false,
        }));
        match self.nodes[parent.0].as_mut() {
            Some(Node::Directory(dir)) => dir.children.push(id),
            _ => return Err(FsError::NotADirectory(parent_path.to_string())),
        }
        Ok(id)
    }

    pub fn create_file(
        &mut self,
        path: &str,
        content: impl Into<String>,
        now: SimTime,
    ) -> Result<NodeId, FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent = self.resolve(parent_path)?;
        if let Some(existing) = self.child_by_name(parent, name) {
            return match self.nodes[existing.0].as_mut() {
                Some(Node::File(file)) => {
                    file.content = content.into();
                    file.edited_at = now;
                    Ok(existing)
                }
                _ => Err(FsError::IsADirectory(path.to_string())),
            };
        }
        let id = self.alloc(Node::File(FileData {
            name: name.to_string(),
            parent,
            created_at: now,
            edited_at: now,
            content: content.into(),
        }));
        match self.nodes[parent.0].as_mut() {
            Some(Node::Directory(dir)) => dir.children.push(id),
            _ => return Err(FsError::NotADirectory(parent_path.to_string())),
        }
        Ok(id)
    }

    pub fn read_file(&self, path: &str) -> Result<&str, FsError> {
        match self.node(self.resolve(path)?) {
            Some(Node::File(file)) => Ok(&file.content),
            Some(Node::Directory(_)) => Err(FsError::IsADirectory(path.to_string())),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Empties every directory marked as a temporary mount. Runs on
    /// power-off.
    pub fn wipe_temporary_mounts(&mut self) {
        let temporary: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Some(Node::Directory(dir)) if dir.temporary_mount => Some(NodeId(index)),
                _ => None,
            })
            .collect();
        for dir in temporary {
            self.remove_children(dir);
        }
    }

    fn remove_children(&mut self, dir: NodeId) {
        let children = match self.nodes[dir.0].as_mut() {
            Some(Node::Directory(data)) => std::mem::take(&mut data.children),
            _ => return,
        };
        for child in children {
            self.remove_children(child);
            self.nodes[child.0] = None;
        }
    }
}

impl Default for Filesystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_read() {
        let mut fs = Filesystem::new();
        fs.mkdir("/home").unwrap();
        fs.create_file("/home/notes.txt", "hello", SimTime::ZERO)
            .unwrap();
        assert_eq!(fs.read_file("/home/notes.txt").unwrap(), "hello");
        assert_eq!(
            fs.read_file("/home/missing.txt"),
            Err(FsError::NotFound("/home/missing.txt".to_string()))
        );
    }

    #[test]
    fn overwrite_updates_edit_time() {
        let mut fs = Filesystem::new();
        let id = fs.create_file("/a.txt", "v1", SimTime::ZERO).unwrap();
        fs.create_file("/a.txt", "v2", SimTime::from_millis(5))
            .unwrap();
        match fs.node(id) {
            Some(Node::File(file)) => {
                assert_eq!(file.content, "v2");
                assert_eq!(file.created_at, SimTime::ZERO);
                assert_eq!(file.edited_at, SimTime::from_millis(5));
            }
            _ => panic!("expected a file"),
        }
    }

    #[test]
    fn wipe_clears_tmp_only() {
        let mut fs = Filesystem::new();
        fs.create_file("/tmp/scratch", "x", SimTime::ZERO).unwrap();
        fs.create_file("/kept", "y", SimTime::ZERO).unwrap();
        fs.wipe_temporary_mounts();
        assert!(fs.read_file("/tmp/scratch").is_err());
        assert_eq!(fs.read_file("/kept").unwrap(), "y");
    }
}
