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

/*!
 * Partitioning
 */
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use super::{Datum, SchemaRef, Struct};
use crate::{Error, ErrorKind, Result};

/// Reference to [`PartitionSpec`].
pub type PartitionSpecRef = Arc<PartitionSpec>;

/// Id of the first partition field, field ids are assigned incrementally.
pub const PARTITION_DATA_ID_START: i32 = 1000;

/// Spec id of the unpartitioned spec.
pub const DEFAULT_PARTITION_SPEC_ID: i32 = 0;

/// Transform applied to a source column to produce a partition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Source value, unmodified.
    Identity,
    /// Always produces null, used for dropped partition fields.
    Void,
}

/// Partition fields capture the transform from table data to partition values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionField {
    /// A source column id from the table’s schema
    pub source_id: i32,
    /// A partition field id that is used to identify a partition field and is unique within a partition spec.
    pub field_id: i32,
    /// A partition name.
    pub name: String,
    /// A transform that is applied to the source column to produce a partition value.
    pub transform: Transform,
}

/// Partition spec that defines how to produce a tuple of partition values from a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    spec_id: i32,
    fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// Create a new partition spec builder bound to `schema`.
    pub fn builder(schema: SchemaRef) -> PartitionSpecBuilder {
        PartitionSpecBuilder {
            spec_id: DEFAULT_PARTITION_SPEC_ID,
            fields: vec![],
            schema,
        }
    }

    /// The unpartitioned spec with id 0.
    pub fn unpartition_spec() -> Self {
        Self {
            spec_id: DEFAULT_PARTITION_SPEC_ID,
            fields: vec![],
        }
    }

    /// Spec id of the partition spec
    pub fn spec_id(&self) -> i32 {
        self.spec_id
    }

    /// Fields of the partition spec
    pub fn fields(&self) -> &[PartitionField] {
        &self.fields
    }

    /// Returns if the partition spec is unpartitioned.
    ///
    /// A [`PartitionSpec`] is unpartitioned if it has no fields or all fields are [`Transform::Void`] transform.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.iter().all(|f| f.transform == Transform::Void)
    }

    /// Value of the identity partition field sourced from `source_id`.
    ///
    /// Returns `None` when no identity field uses that column, and
    /// `Some(None)` when the partition value is null.
    pub fn identity_value<'a>(
        &self,
        partition: &'a Struct,
        source_id: i32,
    ) -> Option<Option<&'a Datum>> {
        let idx = self
            .fields
            .iter()
            .position(|f| f.source_id == source_id && f.transform == Transform::Identity)?;
        if idx >= partition.len() {
            return None;
        }
        Some(partition.get(idx))
    }

    /// Human readable path of a partition tuple, such as `region=us/day=2024-01-01`.
    pub fn partition_to_path(&self, data: &Struct) -> String {
        self.fields
            .iter()
            .enumerate()
            .map(|(idx, field)| match data.get(idx) {
                Some(value) => format!("{}={}", field.name, value),
                None => format!("{}=null", field.name),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Builder of [`PartitionSpec`], resolving source columns against a schema.
#[derive(Debug)]
pub struct PartitionSpecBuilder {
    spec_id: i32,
    fields: Vec<PartitionField>,
    schema: SchemaRef,
}

impl PartitionSpecBuilder {
    /// Set the spec id.
    pub fn with_spec_id(mut self, spec_id: i32) -> Self {
        self.spec_id = spec_id;
        self
    }

    /// Add a partition field on the column `source_name`.
    pub fn add_partition_field(
        mut self,
        source_name: impl AsRef<str>,
        target_name: impl ToString,
        transform: Transform,
    ) -> Result<Self> {
        let source_name = source_name.as_ref();
        let target_name = target_name.to_string();
        let source = self.schema.field_by_name(source_name, true).ok_or_else(|| {
            Error::new(
                ErrorKind::DataInvalid,
                format!("Cannot find source column {source_name} in schema"),
            )
        })?;
        if self.fields.iter().any(|f| f.name == target_name) {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!("Cannot use partition name more than once: {target_name}"),
            ));
        }

        let field_id = PARTITION_DATA_ID_START + self.fields.len() as i32;
        self.fields.push(PartitionField {
            source_id: source.id,
            field_id,
            name: target_name,
            transform,
        });
        Ok(self)
    }

    /// Build the partition spec.
    pub fn build(self) -> PartitionSpec {
        PartitionSpec {
            spec_id: self.spec_id,
            fields: self.fields,
        }
    }
}

/// A set of `(spec id, partition)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    partitions: HashMap<i32, HashSet<Struct>>,
    ordered: Vec<(i32, Struct)>,
}

impl PartitionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition, returns false if it was already present.
    pub fn add(&mut self, spec_id: i32, partition: Struct) -> bool {
        let inserted = self
            .partitions
            .entry(spec_id)
            .or_default()
            .insert(partition.clone());
        if inserted {
            self.ordered.push((spec_id, partition));
        }
        inserted
    }

    /// Check whether a partition is in the set.
    pub fn contains(&self, spec_id: i32, partition: &Struct) -> bool {
        self.partitions
            .get(&spec_id)
            .is_some_and(|partitions| partitions.contains(partition))
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Number of partitions in the set.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Iterate partitions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Struct)> {
        self.ordered.iter().map(|(spec_id, p)| (*spec_id, p))
    }
}

impl Display for PartitionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (spec_id, partition)) in self.ordered.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{spec_id}:{partition}")?;
        }
        write!(f, "]")
    }
}
