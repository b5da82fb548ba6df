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

//! Manifests: immutable files listing data or delete files.
//!
//! Manifests are encoded as json documents holding a small metadata header
//! and the list of entries.

mod data_file;
pub use data_file::*;
mod entry;
pub use entry::*;
mod writer;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
pub use writer::*;

use super::{
    FormatVersion, ManifestContentType, ManifestFile, PartitionSpec, SnapshotSummaryCollector,
};
use crate::error::Result;
use crate::io::FileIO;
use crate::{Error, ErrorKind};

/// Meta data of a manifest that is stored in its header.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// ID of the partition spec used to write the manifest.
    pub partition_spec_id: i32,
    /// Type of content files tracked by the manifest: "data" or "deletes"
    pub content: ManifestContentType,
    /// Table format version number of the manifest
    pub format_version: FormatVersion,
}

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    metadata: ManifestMetadata,
    entries: Vec<ManifestEntry>,
}

/// A manifest contains metadata and a list of entries.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Manifest {
    metadata: ManifestMetadata,
    entries: Vec<ManifestEntryRef>,
}

impl Manifest {
    /// Parse manifest from its json encoding.
    pub fn parse_json(bs: &[u8]) -> Result<Self> {
        let document: ManifestDocument = serde_json::from_slice(bs)?;
        Ok(Self::new(document.metadata, document.entries))
    }

    pub(crate) fn to_json(
        metadata: &ManifestMetadata,
        entries: &[ManifestEntry],
    ) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct ManifestDocumentRef<'a> {
            metadata: &'a ManifestMetadata,
            entries: &'a [ManifestEntry],
        }
        Ok(serde_json::to_vec(&ManifestDocumentRef { metadata, entries })?)
    }

    /// Entries slice.
    pub fn entries(&self) -> &[ManifestEntryRef] {
        &self.entries
    }

    /// Get metadata.
    pub fn metadata(&self) -> &ManifestMetadata {
        &self.metadata
    }

    /// Consume this Manifest, returning its constituent parts
    pub fn into_parts(self) -> (Vec<ManifestEntryRef>, ManifestMetadata) {
        let Self { entries, metadata } = self;
        (entries, metadata)
    }

    /// Constructor from [`ManifestMetadata`] and [`ManifestEntry`]s.
    pub fn new(metadata: ManifestMetadata, entries: Vec<ManifestEntry>) -> Self {
        Self {
            metadata,
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub(crate) fn inherit_data(&mut self, manifest_file: &ManifestFile) {
        for entry in &mut self.entries {
            Arc::make_mut(entry).inherit_data(manifest_file);
        }
    }
}

/// Copies an appended manifest into a new manifest owned by the writer's
/// snapshot.
///
/// Every entry of the source manifest must be ADDED. Entries are rewritten
/// with the writer's snapshot id and without row lineage ids, and each copied
/// file is recorded in `summary`.
pub async fn copy_append_manifest(
    file_io: &FileIO,
    manifest_file: &ManifestFile,
    mut writer: ManifestWriter,
    partition_spec: &PartitionSpec,
    summary: &mut SnapshotSummaryCollector,
) -> Result<ManifestFile> {
    let manifest = manifest_file.load_manifest(file_io).await?;
    for entry in manifest.entries() {
        if entry.status() != ManifestStatus::Added {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!(
                    "Cannot append manifest {}: all entries must be ADDED, found {:?} entry for {}",
                    manifest_file.manifest_path,
                    entry.status(),
                    entry.file_path()
                ),
            ));
        }

        let mut entry = entry.as_ref().clone();
        entry.data_file = entry.data_file.with_first_row_id(None);
        summary.add_file(&entry.data_file, partition_spec);
        writer.add_entry(entry)?;
    }

    writer.write_manifest_file().await
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::{Datum, Struct, UNASSIGNED_SEQUENCE_NUMBER};

    fn data_file(path: &str) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::Data)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .partition(Struct::from_iter([Some(Datum::int(1))]))
            .record_count(5)
            .file_size_in_bytes(50)
            .first_row_id(100)
            .build()
            .unwrap()
    }

    async fn write_manifest(
        file_io: &FileIO,
        path: &str,
        snapshot_id: Option<i64>,
        files: Vec<DataFile>,
    ) -> ManifestFile {
        let mut writer = ManifestWriterBuilder::new(
            file_io.new_output(path).unwrap(),
            snapshot_id,
            0,
            FormatVersion::V2,
        )
        .build_data();
        for file in files {
            writer.add_file(file, None).unwrap();
        }
        writer.write_manifest_file().await.unwrap()
    }

    #[tokio::test]
    async fn test_load_manifest_inherits_snapshot_id() {
        let file_io = FileIO::new_with_memory();
        let mut manifest_file = write_manifest(
            &file_io,
            "memory://t/metadata/m0.json",
            None,
            vec![data_file("memory://t/data/a.parquet")],
        )
        .await;
        assert_eq!(manifest_file.sequence_number, UNASSIGNED_SEQUENCE_NUMBER);

        manifest_file.added_snapshot_id = Some(9);
        manifest_file.sequence_number = 3;
        let manifest = manifest_file.load_manifest(&file_io).await.unwrap();

        assert_eq!(manifest.metadata().content, ManifestContentType::Data);
        assert_eq!(manifest.entries()[0].snapshot_id(), Some(9));
        assert_eq!(manifest.entries()[0].sequence_number(), Some(3));
    }

    #[tokio::test]
    async fn test_copy_append_manifest() {
        let file_io = FileIO::new_with_memory();
        let source = write_manifest(
            &file_io,
            "memory://t/staging/m0.json",
            None,
            vec![
                data_file("memory://t/data/a.parquet"),
                data_file("memory://t/data/b.parquet"),
            ],
        )
        .await;
        let writer = ManifestWriterBuilder::new(
            file_io.new_output("memory://t/metadata/copy.json").unwrap(),
            Some(42),
            0,
            FormatVersion::V2,
        )
        .build_data();
        let mut summary = SnapshotSummaryCollector::default();

        let copied = copy_append_manifest(
            &file_io,
            &source,
            writer,
            &PartitionSpec::unpartition_spec(),
            &mut summary,
        )
        .await
        .unwrap();

        assert_eq!(copied.added_snapshot_id, Some(42));
        assert_eq!(copied.added_files_count, Some(2));
        let manifest = copied.load_manifest(&file_io).await.unwrap();
        assert!(manifest.entries().iter().all(|e| {
            e.snapshot_id() == Some(42) && e.data_file().first_row_id().is_none()
        }));
        assert_eq!(summary.build()["added-data-files"], "2");
    }

    #[tokio::test]
    async fn test_copy_append_manifest_rejects_existing_entries() {
        let file_io = FileIO::new_with_memory();
        let mut writer = ManifestWriterBuilder::new(
            file_io.new_output("memory://t/staging/m1.json").unwrap(),
            Some(1),
            0,
            FormatVersion::V2,
        )
        .build_data();
        writer
            .add_existing_entry(
                ManifestEntry::builder()
                    .status(ManifestStatus::Existing)
                    .snapshot_id(1)
                    .sequence_number(1)
                    .file_sequence_number(1)
                    .data_file(data_file("memory://t/data/a.parquet"))
                    .build(),
            )
            .unwrap();
        let source = writer.write_manifest_file().await.unwrap();

        let err = copy_append_manifest(
            &file_io,
            &source,
            ManifestWriterBuilder::new(
                file_io.new_output("memory://t/metadata/copy.json").unwrap(),
                Some(2),
                0,
                FormatVersion::V2,
            )
            .build_data(),
            &PartitionSpec::unpartition_spec(),
            &mut SnapshotSummaryCollector::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DataInvalid);
    }
}
