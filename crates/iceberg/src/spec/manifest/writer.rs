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

use std::cmp::min;

use bytes::Bytes;

use super::{Manifest, ManifestMetadata};
use crate::error::Result;
use crate::io::OutputFile;
use crate::spec::{
    DataContentType, DataFile, FormatVersion, ManifestContentType, ManifestEntry, ManifestFile,
    ManifestStatus, UNASSIGNED_SEQUENCE_NUMBER,
};
use crate::{Error, ErrorKind};

/// The builder used to create a [`ManifestWriter`].
pub struct ManifestWriterBuilder {
    output: OutputFile,
    snapshot_id: Option<i64>,
    partition_spec_id: i32,
    format_version: FormatVersion,
}

impl ManifestWriterBuilder {
    /// Create a new builder.
    pub fn new(
        output: OutputFile,
        snapshot_id: Option<i64>,
        partition_spec_id: i32,
        format_version: FormatVersion,
    ) -> Self {
        Self {
            output,
            snapshot_id,
            partition_spec_id,
            format_version,
        }
    }

    /// Build a [`ManifestWriter`] for data content.
    pub fn build_data(self) -> ManifestWriter {
        self.build(ManifestContentType::Data)
    }

    /// Build a [`ManifestWriter`] for deletes content.
    pub fn build_deletes(self) -> ManifestWriter {
        self.build(ManifestContentType::Deletes)
    }

    /// Build a [`ManifestWriter`] for `content`.
    pub fn build(self, content: ManifestContentType) -> ManifestWriter {
        let metadata = ManifestMetadata {
            partition_spec_id: self.partition_spec_id,
            content,
            format_version: self.format_version,
        };
        ManifestWriter::new(self.output, self.snapshot_id, metadata)
    }
}

/// A manifest writer.
pub struct ManifestWriter {
    output: OutputFile,

    snapshot_id: Option<i64>,

    added_files: u32,
    added_rows: u64,
    existing_files: u32,
    existing_rows: u64,
    deleted_files: u32,
    deleted_rows: u64,

    min_seq_num: Option<i64>,

    manifest_entries: Vec<ManifestEntry>,

    metadata: ManifestMetadata,
}

impl ManifestWriter {
    /// Create a new manifest writer.
    pub(crate) fn new(
        output: OutputFile,
        snapshot_id: Option<i64>,
        metadata: ManifestMetadata,
    ) -> Self {
        Self {
            output,
            snapshot_id,
            added_files: 0,
            added_rows: 0,
            existing_files: 0,
            existing_rows: 0,
            deleted_files: 0,
            deleted_rows: 0,
            min_seq_num: None,
            manifest_entries: Vec::new(),
            metadata,
        }
    }

    /// Location the manifest is written to.
    pub fn location(&self) -> &str {
        self.output.location()
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.manifest_entries.len()
    }

    /// Returns true if no entry has been written.
    pub fn is_empty(&self) -> bool {
        self.manifest_entries.is_empty()
    }

    fn check_data_file(&self, data_file: &DataFile) -> Result<()> {
        let expected = match data_file.content {
            DataContentType::Data => ManifestContentType::Data,
            DataContentType::PositionDeletes | DataContentType::EqualityDeletes => {
                ManifestContentType::Deletes
            }
        };
        if expected != self.metadata.content {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!(
                    "Content file {} of type {:?} can't be written to a manifest with content type `{}`",
                    data_file.file_path(),
                    data_file.content,
                    self.metadata.content
                ),
            ));
        }
        Ok(())
    }

    /// Add a new manifest entry. This method will update following status of the entry:
    /// - Update the entry status to `Added`
    /// - Set the snapshot id to the current snapshot id
    /// - Set the sequence number to `None` if it is invalid(smaller than 0)
    /// - Set the file sequence number to `None`
    pub fn add_entry(&mut self, mut entry: ManifestEntry) -> Result<()> {
        self.check_data_file(&entry.data_file)?;
        entry.status = ManifestStatus::Added;
        entry.snapshot_id = self.snapshot_id;
        entry.sequence_number = entry.sequence_number.filter(|n| *n >= 0);
        entry.file_sequence_number = None;
        self.add_entry_inner(entry)
    }

    /// Add file as an added entry. The data sequence number is assigned at
    /// commit unless `data_sequence_number` is given.
    pub fn add_file(
        &mut self,
        data_file: DataFile,
        data_sequence_number: Option<i64>,
    ) -> Result<()> {
        self.check_data_file(&data_file)?;
        let entry = ManifestEntry {
            status: ManifestStatus::Added,
            snapshot_id: self.snapshot_id,
            sequence_number: data_sequence_number.filter(|n| *n >= 0),
            file_sequence_number: None,
            data_file,
        };
        self.add_entry_inner(entry)
    }

    /// Add a delete manifest entry. This method will update following status of the entry:
    /// - Update the entry status to `Deleted`
    /// - Set the snapshot id to the current snapshot id
    ///
    /// Sequence numbers of the entry are kept.
    pub fn add_delete_entry(&mut self, mut entry: ManifestEntry) -> Result<()> {
        self.check_data_file(&entry.data_file)?;
        entry.status = ManifestStatus::Deleted;
        entry.snapshot_id = self.snapshot_id;
        self.add_entry_inner(entry)
    }

    /// Add an existing manifest entry. This method will update following status of the entry:
    /// - Update the entry status to `Existing`
    ///
    /// Snapshot id and sequence numbers of the entry are kept.
    pub fn add_existing_entry(&mut self, mut entry: ManifestEntry) -> Result<()> {
        self.check_data_file(&entry.data_file)?;
        entry.status = ManifestStatus::Existing;
        self.add_entry_inner(entry)
    }

    fn add_entry_inner(&mut self, entry: ManifestEntry) -> Result<()> {
        // Existing and deleted entries were committed before, their sequence
        // number must be known.
        if entry.status != ManifestStatus::Added && entry.sequence_number.is_none() {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                format!(
                    "Manifest entry with status {:?} should have sequence number: {}",
                    entry.status,
                    entry.file_path()
                ),
            ));
        }

        match entry.status {
            ManifestStatus::Added => {
                self.added_files += 1;
                self.added_rows += entry.data_file.record_count;
            }
            ManifestStatus::Deleted => {
                self.deleted_files += 1;
                self.deleted_rows += entry.data_file.record_count;
            }
            ManifestStatus::Existing => {
                self.existing_files += 1;
                self.existing_rows += entry.data_file.record_count;
            }
        }
        if entry.is_alive() {
            if let Some(seq_num) = entry.sequence_number {
                self.min_seq_num = Some(self.min_seq_num.map_or(seq_num, |v| min(v, seq_num)));
            }
        }
        self.manifest_entries.push(entry);
        Ok(())
    }

    /// Write manifest file and return it.
    ///
    /// The returned manifest has an unassigned sequence number, it is
    /// replaced with the commit's sequence number by
    /// [`ManifestListWriter`](crate::spec::ManifestListWriter).
    pub async fn write_manifest_file(self) -> Result<ManifestFile> {
        let content = Manifest::to_json(&self.metadata, &self.manifest_entries)?;
        let length = content.len();
        self.output.write(Bytes::from(content)).await?;

        Ok(ManifestFile {
            manifest_path: self.output.location().to_string(),
            manifest_length: length as i64,
            partition_spec_id: self.metadata.partition_spec_id,
            content: self.metadata.content,
            sequence_number: UNASSIGNED_SEQUENCE_NUMBER,
            min_sequence_number: self.min_seq_num.unwrap_or(UNASSIGNED_SEQUENCE_NUMBER),
            added_snapshot_id: self.snapshot_id,
            added_files_count: Some(self.added_files),
            existing_files_count: Some(self.existing_files),
            deleted_files_count: Some(self.deleted_files),
            added_rows_count: Some(self.added_rows),
            existing_rows_count: Some(self.existing_rows),
            deleted_rows_count: Some(self.deleted_rows),
            first_row_id: None,
        })
    }
}
