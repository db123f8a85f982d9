// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Server topology: groups of mirrors of shards.
//!
//! # Structure
//!
//! ```text
//! Topology
//! ├── MirrorGroup "dc-east" (ReadWrite)    ← read group
//! │   ├── Mirror 0: [shard 0, shard 1, shard 2]
//! │   └── Mirror 1: [shard 0, shard 1, shard 2]
//! └── MirrorGroup "dc-west" (WriteOnly)
//!     └── Mirror 0: [shard 0, shard 1]
//! ```
//!
//! A key lives on one shard of every mirror, chosen by
//! [`shard_index`]. Writes reach that shard on every mirror of every group;
//! reads go to the read group only, first mirror first.
//!
//! The topology is built once, validated, and never mutated. It is shared
//! read-only by the router, so it needs no synchronization.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Destination of a datagram.
pub type ServerAddress = SocketAddr;

/// Role of a group in the read/write topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupRole {
    /// Receives writes and may serve reads.
    ReadWrite,
    /// Pure replica: receives writes only.
    WriteOnly,
}

impl GroupRole {
    pub fn is_readable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadWrite => write!(f, "read-write"),
            Self::WriteOnly => write!(f, "write-only"),
        }
    }
}

/// 32-bit FNV-1a over the key's UTF-8 bytes.
///
/// Fixed so that every client, in any language, shards a key identically.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, &b| (hash ^ b as u32).wrapping_mul(PRIME))
}

/// Shard of `key` among `shard_count` shards.
///
/// # Panics
/// If `shard_count` is zero. A validated [`Mirror`] never has zero shards.
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    fnv1a32(key.as_bytes()) as usize % shard_count
}

/// Interchangeable shards of one logical server. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    shards: Vec<ServerAddress>,
}

impl Mirror {
    pub fn new(shards: Vec<ServerAddress>) -> Result<Self> {
        if shards.is_empty() {
            return Err(ClientError::Config("mirror has no servers".to_string()));
        }
        Ok(Self { shards })
    }

    pub fn shards(&self) -> &[ServerAddress] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Whether the mirror has no shards. `Mirror::new` rejects that.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// The shard holding `key`.
    pub fn shard_for(&self, key: &str) -> ServerAddress {
        self.shards[shard_index(key, self.shards.len())]
    }
}

/// A named set of mirrors with a role (a datacenter, typically).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorGroup {
    name: String,
    role: GroupRole,
    mirrors: Vec<Mirror>,
}

impl MirrorGroup {
    pub fn new(name: impl Into<String>, role: GroupRole, mirrors: Vec<Mirror>) -> Result<Self> {
        let name = name.into();
        if mirrors.is_empty() {
            return Err(ClientError::Config(format!("group '{}' has no mirrors", name)));
        }
        Ok(Self { name, role, mirrors })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> GroupRole {
        self.role
    }

    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }
}

/// Validated, immutable topology.
#[derive(Debug, Clone)]
pub struct Topology {
    groups: Vec<MirrorGroup>,
    read_group: usize,
    mirror_count: usize,
}

impl Topology {
    /// Build a topology, reading from `read_group` if given, else from the
    /// first read-write group.
    pub fn new(groups: Vec<MirrorGroup>, read_group: Option<&str>) -> Result<Self> {
        if groups.is_empty() {
            return Err(ClientError::Config("no server groups configured".to_string()));
        }
        for (i, group) in groups.iter().enumerate() {
            if groups[..i].iter().any(|g| g.name == group.name) {
                return Err(ClientError::Config(format!("duplicate group name '{}'", group.name)));
            }
        }

        let read_group = match read_group {
            Some(name) => {
                let index = groups
                    .iter()
                    .position(|g| g.name == name)
                    .ok_or_else(|| ClientError::Config(format!("read group '{}' not found", name)))?;
                if !groups[index].role.is_readable() {
                    return Err(ClientError::Config(format!(
                        "read group '{}' is write-only",
                        name
                    )));
                }
                index
            }
            None => groups
                .iter()
                .position(|g| g.role.is_readable())
                .ok_or_else(|| ClientError::Config("no read-write group configured".to_string()))?,
        };

        let mirror_count = groups.iter().map(|g| g.mirrors.len()).sum();
        Ok(Self {
            groups,
            read_group,
            mirror_count,
        })
    }

    pub fn groups(&self) -> &[MirrorGroup] {
        &self.groups
    }

    /// The group serving reads.
    pub fn read_group(&self) -> &MirrorGroup {
        &self.groups[self.read_group]
    }

    /// Mirrors reads rotate through.
    pub fn read_mirrors(&self) -> &[Mirror] {
        self.read_group().mirrors()
    }

    /// Number of datagrams one write fans out to.
    pub fn write_fan_out(&self) -> usize {
        self.mirror_count
    }

    /// Destination of `key` on every mirror of every group, tagged with the
    /// group's role. Groups are visited in configuration order.
    pub fn write_targets<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = (GroupRole, ServerAddress)> + 'a {
        self.groups.iter().flat_map(move |group| {
            group
                .mirrors
                .iter()
                .map(move |mirror| (group.role, mirror.shard_for(key)))
        })
    }

    /// Check whether any group is write-only.
    pub fn has_write_only_groups(&self) -> bool {
        self.groups.iter().any(|g| g.role == GroupRole::WriteOnly)
    }
}
