//! Plain-data snapshots of host configuration.
//!
//! A save captures what survives outside a running simulation: names,
//! addresses, and durable files. Runtime state (caches, sockets, processes,
//! packets in flight) is deliberately not part of it.

use crate::addresses::IpAddress;
use crate::clock::SimTime;
use crate::filesystem::{Filesystem, Node, NodeId};
use crate::host::{HostData, HostKind};

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceSave {
    pub name: String,
    pub ip: Option<IpAddress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSave {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostSave {
    pub name: String,
    pub kind: HostKind,
    pub interfaces: Vec<InterfaceSave>,
    pub files: Vec<FileSave>,
}

fn collect_files(fs: &Filesystem, node: NodeId, prefix: &str, out: &mut Vec<FileSave>) {
    match fs.node(node) {
        Some(Node::Directory(dir)) => {
            for &child in &dir.children {
                let Some(child_node) = fs.node(child) else {
                    continue;
                };
                let path = if prefix == "/" {
                    format!("/{}", child_node.name())
                } else {
                    format!("{}/{}", prefix, child_node.name())
                };
                collect_files(fs, child, &path, out);
            }
        }
        Some(Node::File(file)) => out.push(FileSave {
            path: prefix.to_string(),
            content: file.content.clone(),
        }),
        None => {}
    }
}

/// Snapshots a host's durable configuration.
pub fn to_save(host: &HostData) -> HostSave {
    let mut files = Vec::new();
    collect_files(&host.filesystem, host.filesystem.root(), "/", &mut files);
    HostSave {
        name: host.name.clone(),
        kind: host.kind,
        interfaces: host
            .interfaces
            .iter()
            .map(|interface| InterfaceSave {
                name: interface.name.clone(),
                ip: interface.ip,
            })
            .collect(),
        files,
    }
}

/// Applies a saved configuration back onto a host: addresses by interface
/// name, files by path. Interfaces the save does not mention are left
/// alone; missing parent directories are created.
pub fn apply(host: &mut HostData, save: &HostSave, now: SimTime) {
    for saved in &save.interfaces {
        if let Ok(index) = host.interface_index_by_name(&saved.name) {
            host.set_interface_ip(index, saved.ip);
        }
    }
    for file in &save.files {
        let mut built = String::new();
        let parts: Vec<&str> = file.path.split('/').filter(|part| !part.is_empty()).collect();
        for part in parts.iter().take(parts.len().saturating_sub(1)) {
            built.push('/');
            built.push_str(part);
            let _ = host.filesystem.mkdir(&built);
        }
        let _ = host
            .filesystem
            .create_file(&file.path, file.content.clone(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_restores_addresses_and_files() {
        let mut host = HostData::new("original", HostKind::Computer);
        host.interfaces.push(crate::interface::Interface::new(
            "eth0",
            crate::addresses::MacAddress::new([1; 6]),
        ));
        host.set_interface_ip(0, Some("10.0.0.1/24".parse().unwrap()));
        host.filesystem.mkdir("/srv").unwrap();
        host.filesystem
            .create_file("/srv/motd", "hello", SimTime::ZERO)
            .unwrap();

        let save = to_save(&host);
        assert_eq!(save.kind, HostKind::Computer);
        assert!(save
            .files
            .iter()
            .any(|file| file.path == "/srv/motd" && file.content == "hello"));

        let mut restored = HostData::new("restored", HostKind::Computer);
        restored.interfaces.push(crate::interface::Interface::new(
            "eth0",
            crate::addresses::MacAddress::new([2; 6]),
        ));
        apply(&mut restored, &save, SimTime::ZERO);
        assert_eq!(
            restored.interfaces[0].ip,
            Some("10.0.0.1/24".parse().unwrap())
        );
        assert_eq!(restored.filesystem.read_file("/srv/motd").unwrap(), "hello");
        // The restored routing table knows the interface subnet.
        assert!(restored
            .routing_table
            .lookup("10.0.0.9".parse().unwrap())
            .is_ok());
    }
}
