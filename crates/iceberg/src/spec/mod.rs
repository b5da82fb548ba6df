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

//! Spec for Iceberg: the table metadata model a commit reads and writes.

mod manifest;
pub use manifest::*;

mod manifest_list;
pub use manifest_list::*;
mod partition;
pub use partition::*;
mod schema;
pub use schema::*;
mod snapshot;
pub use snapshot::*;
mod snapshot_summary;
pub use snapshot_summary::SnapshotSummaryCollector;
pub(crate) use snapshot_summary::update_snapshot_summaries;
mod table_metadata;
pub use table_metadata::*;
mod table_properties;
pub use table_properties::*;
mod values;
pub use values::*;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Metadata of a v2 table holding the given `(snapshot id, parent id)`
    /// chain, oldest first.
    pub(crate) fn metadata_with_snapshot_chain(chain: &[(i64, Option<i64>)]) -> TableMetadata {
        let schema = Schema::builder()
            .with_fields(vec![
                NestedField::required(1, "id", PrimitiveType::Long).into(),
            ])
            .build()
            .unwrap();
        let mut metadata = TableMetadata::builder("memory://t", schema, FormatVersion::V2)
            .build()
            .unwrap();
        for (seq, (id, parent)) in chain.iter().enumerate() {
            metadata
                .add_snapshot(
                    Snapshot::builder()
                        .with_snapshot_id(*id)
                        .with_parent_snapshot_id(*parent)
                        .with_sequence_number(seq as i64 + 1)
                        .with_timestamp_ms(0)
                        .with_manifest_list(format!("memory://t/metadata/snap-{id}.json"))
                        .with_summary(Summary::new(Operation::Append))
                        .build(),
                )
                .unwrap();
        }
        metadata
    }
}
