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

//! Shared fixture for the commit tests: an in-memory table that publishes
//! the manifests produced by a [`MergingSnapshotProducer`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Once};

use iceberg_commit::io::FileIO;
use iceberg_commit::runtime::WorkerPool;
use iceberg_commit::spec::{
    DataContentType, DataFile, DataFileBuilder, DataFileFormat, Datum, FormatVersion,
    ManifestFile, ManifestListWriter, ManifestStatus, NestedField, Operation, PartitionSpec,
    PrimitiveType, Schema, Snapshot, Struct, TableMetadata, Transform,
};
use iceberg_commit::transaction::{MergingSnapshotProducer, generate_unique_snapshot_id};

pub const TABLE_LOCATION: &str = "memory://warehouse/db/events";

static INIT: Once = Once::new();

/// Install a log subscriber once per test binary, filtered by `RUST_LOG`.
pub fn set_up() {
    INIT.call_once(tracing_subscriber::fmt::init);
}

/// Table with an `id` column and an identity partition on `region`.
pub struct TestTable {
    pub file_io: FileIO,
    pub metadata: TableMetadata,
}

impl TestTable {
    pub fn new(format_version: FormatVersion) -> Self {
        Self::with_properties(format_version, HashMap::new())
    }

    pub fn with_properties(
        format_version: FormatVersion,
        properties: HashMap<String, String>,
    ) -> Self {
        set_up();
        let schema = Schema::builder()
            .with_fields(vec![
                NestedField::required(1, "id", PrimitiveType::Long).into(),
                NestedField::optional(2, "region", PrimitiveType::String).into(),
            ])
            .build()
            .unwrap();
        let spec = PartitionSpec::builder(Arc::new(schema.clone()))
            .add_partition_field("region", "region", Transform::Identity)
            .unwrap()
            .build();
        let metadata = TableMetadata::builder(TABLE_LOCATION, schema, format_version)
            .add_partition_spec(spec)
            .with_properties(properties)
            .build()
            .unwrap();
        Self {
            file_io: FileIO::new_with_memory(),
            metadata,
        }
    }

    pub fn producer(&self, operation: Operation) -> MergingSnapshotProducer {
        MergingSnapshotProducer::builder(&self.metadata, self.file_io.clone(), operation)
            .with_snapshot_id(generate_unique_snapshot_id(&self.metadata))
            .with_worker_pool(WorkerPool::in_process())
            .build()
            .unwrap()
    }

    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.metadata.current_snapshot().map(|s| s.as_ref())
    }

    /// Applies `producer` on the current snapshot, writes the manifest list
    /// and makes the new snapshot current.
    pub async fn commit(
        &mut self,
        producer: &mut MergingSnapshotProducer,
    ) -> iceberg_commit::Result<i64> {
        self.commit_attempt(producer, 0).await
    }

    pub async fn commit_attempt(
        &mut self,
        producer: &mut MergingSnapshotProducer,
        attempt: u32,
    ) -> iceberg_commit::Result<i64> {
        let parent = self.metadata.current_snapshot().cloned();
        let manifests = producer.apply(&self.metadata, parent.as_deref()).await?;

        let sequence_number = self.metadata.next_sequence_number();
        let manifest_list = producer.manifest_list_path(attempt);
        let mut writer = ManifestListWriter::new(
            self.file_io.new_output(&manifest_list)?,
            producer.snapshot_id(),
            parent.as_ref().map(|s| s.snapshot_id()),
            sequence_number,
        );
        writer.add_manifests(manifests.iter().cloned())?;
        writer.close().await?;

        let summary = producer.build_snapshot_summary(parent.as_ref().map(|s| s.summary()))?;
        self.metadata.add_snapshot(
            Snapshot::builder()
                .with_snapshot_id(producer.snapshot_id())
                .with_parent_snapshot_id(parent.as_ref().map(|s| s.snapshot_id()))
                .with_sequence_number(sequence_number)
                .with_timestamp_ms(chrono::Utc::now().timestamp_millis())
                .with_manifest_list(manifest_list)
                .with_summary(summary)
                .build(),
        )?;

        let committed: HashSet<String> = manifests.into_iter().map(|m| m.manifest_path).collect();
        producer.clean_uncommitted(&committed).await;
        Ok(producer.snapshot_id())
    }

    /// Manifests of the current snapshot.
    pub async fn manifests(&self) -> Vec<ManifestFile> {
        match self.current_snapshot() {
            Some(snapshot) => snapshot
                .load_manifest_list(&self.file_io)
                .await
                .unwrap()
                .entries()
                .to_vec(),
            None => vec![],
        }
    }

    /// `(path, status, data sequence number)` of every entry in the current
    /// snapshot, sorted by path.
    pub async fn entries(&self) -> Vec<(String, ManifestStatus, Option<i64>)> {
        let mut entries = vec![];
        for manifest in self.manifests().await {
            let manifest = manifest.load_manifest(&self.file_io).await.unwrap();
            for entry in manifest.entries() {
                entries.push((
                    entry.file_path().to_string(),
                    entry.status(),
                    entry.sequence_number(),
                ));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

pub fn partition(region: &str) -> Struct {
    Struct::from_iter([Some(Datum::string(region))])
}

pub fn data_file(name: &str, region: &str) -> DataFile {
    DataFileBuilder::default()
        .content(DataContentType::Data)
        .file_path(format!("{TABLE_LOCATION}/data/{name}.parquet"))
        .file_format(DataFileFormat::Parquet)
        .partition(partition(region))
        .record_count(100)
        .file_size_in_bytes(4096)
        .build()
        .unwrap()
}

pub fn position_delete(name: &str, region: &str) -> DataFile {
    DataFileBuilder::default()
        .content(DataContentType::PositionDeletes)
        .file_path(format!("{TABLE_LOCATION}/data/{name}-deletes.parquet"))
        .file_format(DataFileFormat::Parquet)
        .partition(partition(region))
        .record_count(3)
        .file_size_in_bytes(512)
        .build()
        .unwrap()
}

pub fn dv(name: &str, referenced: &DataFile) -> DataFile {
    DataFileBuilder::default()
        .content(DataContentType::PositionDeletes)
        .file_path(format!("{TABLE_LOCATION}/data/{name}.puffin"))
        .file_format(DataFileFormat::Puffin)
        .partition(referenced.partition().clone())
        .record_count(1)
        .file_size_in_bytes(64)
        .referenced_data_file(referenced.file_path())
        .content_offset(4)
        .content_size_in_bytes(40)
        .build()
        .unwrap()
}
