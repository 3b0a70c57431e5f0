// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted state of all collected data, encoded in [CBOR].
//!
//! Snapshots start with a schema version. Decoding reads that version first and refuses to
//! interpret the rest of a snapshot written with another one.
//!
//! [CBOR]: https://cbor.io/
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::loaded_or_empty;
use crate::project::Project;
use crate::world::WorldPermissions;

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Collected data of all services at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    services: BTreeMap<String, ServiceSnapshot>,
}

/// Collected data of one service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub kind: String,
    pub url: Option<String>,
    pub projects: BTreeMap<String, Project>,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    version: u32,
}

impl Snapshot {
    pub fn new(services: BTreeMap<String, ServiceSnapshot>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            services,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceSnapshot> {
        &self.services
    }

    pub fn into_services(self) -> BTreeMap<String, ServiceSnapshot> {
        self.services
    }

    /// The canonical permission tree captured in this snapshot.
    pub fn permissions(&self) -> WorldPermissions {
        self.services
            .iter()
            .map(|(name, service)| {
                let projects = service
                    .projects
                    .iter()
                    .map(|(key, project)| (key.clone(), loaded_or_empty(project)))
                    .collect();
                (name.clone(), projects)
            })
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        encode_cbor(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let header: SnapshotHeader = decode_cbor(bytes)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::IncompatibleVersion {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        decode_cbor(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let bytes = self.encode()?;
        fs::write(path.as_ref(), &bytes)?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "saved snapshot");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path.as_ref())?;
        Self::decode(&bytes)
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

fn decode_cbor<T: for<'a> Deserialize<'a>, R: Read>(reader: R) -> Result<T, SnapshotError> {
    let value = ciborium::from_reader::<T, R>(reader)?;
    Ok(value)
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not access snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode snapshot: {0}")]
    Encode(String),

    #[error("could not decode snapshot: {0}")]
    Decode(String),

    #[error("snapshot was written with schema version {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
}

impl From<SerializeError<std::io::Error>> for SnapshotError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => SnapshotError::Io(err),
            SerializeError::Value(err) => SnapshotError::Encode(err),
        }
    }
}

impl From<DeserializeError<std::io::Error>> for SnapshotError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            // Snapshots are decoded from memory, a read error means truncated data.
            DeserializeError::Io(err) => SnapshotError::Decode(err.to_string()),
            DeserializeError::Syntax(offset) => {
                SnapshotError::Decode(format!("syntax error at byte {offset}"))
            }
            DeserializeError::Semantic(offset, description) => match offset {
                Some(offset) => SnapshotError::Decode(format!("{description} at byte {offset}")),
                None => SnapshotError::Decode(description),
            },
            DeserializeError::RecursionLimitExceeded => {
                SnapshotError::Decode("recursion limit exceeded".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Serialize;
    use serde_json::json;

    use crate::permission::PermissionSet;
    use crate::project::{Project, ProjectInfo};

    use super::{SNAPSHOT_VERSION, ServiceSnapshot, Snapshot, SnapshotError, encode_cbor};

    fn snapshot() -> Snapshot {
        let info = ProjectInfo::from_metadata(json!({
            "key": "DEMO",
            "name": "Demonstration Space",
            "id": 98304,
        }));
        let mut permissions = PermissionSet::new();
        permissions.add_permission("VIEWSPACE", ["alice"], ["confluence-users"]);
        let project = Project::with_permissions(info, permissions);

        let mut services = BTreeMap::new();
        services.insert(
            "Confluence".to_string(),
            ServiceSnapshot {
                kind: "Confluence".into(),
                url: Some("https://wiki.example.org/".into()),
                projects: BTreeMap::from([("DEMO".to_string(), project)]),
            },
        );
        Snapshot::new(services)
    }

    #[test]
    fn encode_decode() {
        let snapshot = snapshot();
        let bytes = snapshot.encode().unwrap();
        let again = Snapshot::decode(&bytes).unwrap();

        assert_eq!(again, snapshot);
        assert_eq!(again.permissions(), snapshot.permissions());
        assert_eq!(
            again.permissions()["Confluence"]["DEMO"]
                .get("VIEWSPACE")
                .unwrap()
                .users()
                .len(),
            1
        );
    }

    #[test]
    fn other_versions_are_rejected() {
        #[derive(Serialize)]
        struct FutureSnapshot {
            version: u32,
            services: Vec<String>,
        }

        let bytes = encode_cbor(&FutureSnapshot {
            version: SNAPSHOT_VERSION + 1,
            services: vec!["anything".into()],
        })
        .unwrap();

        assert!(matches!(
            Snapshot::decode(&bytes),
            Err(SnapshotError::IncompatibleVersion { found, .. }) if found == SNAPSHOT_VERSION + 1
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Snapshot::decode(b"definitely not cbor"),
            Err(SnapshotError::Decode(_) | SnapshotError::Io(_))
        ));
    }
}
