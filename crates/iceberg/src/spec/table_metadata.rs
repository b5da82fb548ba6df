// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! In-memory table metadata: the view of a table a commit is produced against.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

use super::{
    PartitionSpec, PartitionSpecRef, Schema, SchemaRef, Snapshot, SnapshotRef, TableProperties,
};
use crate::error::Result;
use crate::{Error, ErrorKind};

/// Sequence number of v1 tables and of the first v2 snapshot's parent.
pub const INITIAL_SEQUENCE_NUMBER: i64 = 0;

/// Placeholder sequence number of manifests and entries that are not
/// committed yet.
pub const UNASSIGNED_SEQUENCE_NUMBER: i64 = -1;

/// Reference to [`TableMetadata`].
pub type TableMetadataRef = Arc<TableMetadata>;

/// Iceberg format version
#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    /// Iceberg spec version 1
    V1 = 1u8,
    /// Iceberg spec version 2
    V2 = 2u8,
    /// Iceberg spec version 3
    V3 = 3u8,
}

impl PartialOrd for FormatVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FormatVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl Display for FormatVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", *self as u8)
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            3 => Ok(FormatVersion::V3),
            _ => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!("Unsupported format version: {value}"),
            )),
        }
    }
}

/// Table metadata: schema, partition specs, snapshots and properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    format_version: FormatVersion,
    table_uuid: Uuid,
    location: String,
    last_sequence_number: i64,
    last_updated_ms: i64,
    current_schema: SchemaRef,
    partition_specs: HashMap<i32, PartitionSpecRef>,
    default_spec_id: i32,
    properties: HashMap<String, String>,
    current_snapshot_id: Option<i64>,
    snapshots: HashMap<i64, SnapshotRef>,
}

impl TableMetadata {
    /// Create a builder for the metadata of a new table.
    pub fn builder(
        location: impl ToString,
        schema: Schema,
        format_version: FormatVersion,
    ) -> TableMetadataBuilder {
        TableMetadataBuilder {
            location: location.to_string(),
            schema,
            format_version,
            partition_specs: vec![],
            default_spec_id: None,
            properties: HashMap::new(),
        }
    }

    /// Returns format version of this metadata.
    #[inline]
    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    /// Returns uuid of current table.
    #[inline]
    pub fn uuid(&self) -> Uuid {
        self.table_uuid
    }

    /// Returns table location.
    #[inline]
    pub fn location(&self) -> &str {
        self.location.as_str()
    }

    /// Returns last sequence number.
    #[inline]
    pub fn last_sequence_number(&self) -> i64 {
        self.last_sequence_number
    }

    /// Sequence number the next snapshot will be committed with.
    ///
    /// Always [`INITIAL_SEQUENCE_NUMBER`] for v1 tables.
    #[inline]
    pub fn next_sequence_number(&self) -> i64 {
        match self.format_version {
            FormatVersion::V1 => INITIAL_SEQUENCE_NUMBER,
            _ => self.last_sequence_number + 1,
        }
    }

    /// Returns last updated time in milliseconds.
    #[inline]
    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    /// Get current schema
    #[inline]
    pub fn current_schema(&self) -> &SchemaRef {
        &self.current_schema
    }

    /// Returns all partition specs.
    #[inline]
    pub fn partition_specs_iter(&self) -> impl ExactSizeIterator<Item = &PartitionSpecRef> {
        self.partition_specs.values()
    }

    /// Partition specs keyed by spec id.
    #[inline]
    pub fn specs_by_id(&self) -> &HashMap<i32, PartitionSpecRef> {
        &self.partition_specs
    }

    /// Lookup partition spec by id.
    #[inline]
    pub fn partition_spec_by_id(&self, spec_id: i32) -> Option<&PartitionSpecRef> {
        self.partition_specs.get(&spec_id)
    }

    /// Get default partition spec
    #[inline]
    pub fn default_partition_spec(&self) -> &PartitionSpecRef {
        // Presence of the default spec is checked when building.
        &self.partition_specs[&self.default_spec_id]
    }

    /// Returns all snapshots
    #[inline]
    pub fn snapshots(&self) -> impl ExactSizeIterator<Item = &SnapshotRef> {
        self.snapshots.values()
    }

    /// Lookup snapshot by id.
    #[inline]
    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&SnapshotRef> {
        self.snapshots.get(&snapshot_id)
    }

    /// Get current snapshot id of the main branch.
    #[inline]
    pub fn current_snapshot_id(&self) -> Option<i64> {
        self.current_snapshot_id
    }

    /// Get current snapshot of the main branch.
    #[inline]
    pub fn current_snapshot(&self) -> Option<&SnapshotRef> {
        self.current_snapshot_id
            .and_then(|id| self.snapshots.get(&id))
    }

    /// Returns properties of table.
    #[inline]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Typed view of the table properties.
    pub fn table_properties(&self) -> Result<TableProperties> {
        TableProperties::try_from(&self.properties)
    }

    /// Whether manifests appended to this table may leave the snapshot id of
    /// their entries to be inherited from the manifest list.
    pub fn can_inherit_snapshot_id(&self) -> Result<bool> {
        Ok(self.format_version > FormatVersion::V1
            || self.table_properties()?.snapshot_id_inheritance_enabled)
    }

    /// Add a snapshot and make it the current snapshot of the main branch.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        if self.snapshots.contains_key(&snapshot.snapshot_id()) {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!("Snapshot already exists for: {}", snapshot.snapshot_id()),
            ));
        }

        if self.format_version != FormatVersion::V1
            && snapshot.sequence_number() <= self.last_sequence_number
            && snapshot.parent_snapshot_id().is_some()
        {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!(
                    "Cannot add snapshot with sequence number {} older than last sequence number {}",
                    snapshot.sequence_number(),
                    self.last_sequence_number
                ),
            ));
        }

        self.last_updated_ms = snapshot.timestamp_ms();
        self.last_sequence_number = self.last_sequence_number.max(snapshot.sequence_number());
        self.current_snapshot_id = Some(snapshot.snapshot_id());
        self.snapshots
            .insert(snapshot.snapshot_id(), Arc::new(snapshot));
        Ok(())
    }

    /// Remove snapshots from the table, e.g. once they have expired.
    pub fn remove_snapshots(&mut self, snapshot_ids: &[i64]) -> Result<()> {
        if let Some(current) = self.current_snapshot_id {
            if snapshot_ids.contains(&current) {
                return Err(Error::new(
                    ErrorKind::PreconditionFailed,
                    format!("Cannot remove current snapshot {current}"),
                ));
            }
        }
        for id in snapshot_ids {
            self.snapshots.remove(id);
        }
        Ok(())
    }
}

/// Builder of [`TableMetadata`] for a new table.
#[derive(Debug)]
pub struct TableMetadataBuilder {
    location: String,
    schema: Schema,
    format_version: FormatVersion,
    partition_specs: Vec<PartitionSpec>,
    default_spec_id: Option<i32>,
    properties: HashMap<String, String>,
}

impl TableMetadataBuilder {
    /// Add a partition spec. The first spec added becomes the default spec.
    pub fn add_partition_spec(mut self, spec: PartitionSpec) -> Self {
        self.default_spec_id.get_or_insert(spec.spec_id());
        self.partition_specs.push(spec);
        self
    }

    /// Set the default partition spec.
    pub fn with_default_spec_id(mut self, spec_id: i32) -> Self {
        self.default_spec_id = Some(spec_id);
        self
    }

    /// Set table properties.
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Build the metadata.
    ///
    /// Partition spec ids must be unique and every partition field must be
    /// sourced from a column of the schema.
    pub fn build(self) -> Result<TableMetadata> {
        let mut partition_specs = HashMap::new();
        let specs = if self.partition_specs.is_empty() {
            vec![PartitionSpec::unpartition_spec()]
        } else {
            self.partition_specs
        };

        for spec in specs {
            if let Some(field) = spec
                .fields()
                .iter()
                .find(|f| self.schema.field_by_id(f.source_id).is_none())
            {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    format!(
                        "Cannot find source column {} for partition field {} of spec {}",
                        field.source_id,
                        field.name,
                        spec.spec_id()
                    ),
                ));
            }
            let spec_id = spec.spec_id();
            if partition_specs.insert(spec_id, Arc::new(spec)).is_some() {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    format!("Duplicate partition spec id {spec_id}"),
                ));
            }
        }

        let default_spec_id = self.default_spec_id.unwrap_or_default();
        if !partition_specs.contains_key(&default_spec_id) {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!("Cannot find default partition spec {default_spec_id}"),
            ));
        }

        // Reject unparseable properties up front.
        TableProperties::try_from(&self.properties)?;

        Ok(TableMetadata {
            format_version: self.format_version,
            table_uuid: Uuid::now_v7(),
            location: self.location.trim_end_matches('/').to_string(),
            last_sequence_number: INITIAL_SEQUENCE_NUMBER,
            last_updated_ms: chrono::Utc::now().timestamp_millis(),
            current_schema: Arc::new(self.schema),
            partition_specs,
            default_spec_id,
            properties: self.properties,
            current_snapshot_id: None,
            snapshots: HashMap::new(),
        })
    }
}
