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

//! Conflict detection against snapshots committed concurrently.
//!
//! Every check walks the ancestry of the branch tip back to the snapshot the
//! operation started from, and only looks at manifests written by the
//! snapshots in between.

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::delete_file_index::DeleteFileIndex;
use crate::error::Result;
use crate::expr::Predicate;
use crate::expr::visitors::inclusive_metrics_evaluator::InclusiveMetricsEvaluator;
use crate::io::FileIO;
use crate::runtime::WorkerPool;
use crate::spec::{
    DataContentType, DataFile, FormatVersion, INITIAL_SEQUENCE_NUMBER, ManifestContentType,
    ManifestEntry, ManifestEntryRef, ManifestFile, ManifestStatus, Operation, PartitionSet,
    Snapshot, TableMetadata,
};
use crate::util::snapshot::ancestors_between;
use crate::{Error, ErrorKind};

static VALIDATE_ADDED_FILES_OPERATIONS: Lazy<HashSet<Operation>> =
    Lazy::new(|| HashSet::from([Operation::Append, Operation::Overwrite]));

static VALIDATE_ADDED_DELETE_FILES_OPERATIONS: Lazy<HashSet<Operation>> =
    Lazy::new(|| HashSet::from([Operation::Overwrite, Operation::Delete]));

static VALIDATE_DATA_FILES_EXIST_OPERATIONS: Lazy<HashSet<Operation>> = Lazy::new(|| {
    HashSet::from([Operation::Overwrite, Operation::Replace, Operation::Delete])
});

static VALIDATE_DATA_FILES_EXIST_SKIP_DELETE_OPERATIONS: Lazy<HashSet<Operation>> =
    Lazy::new(|| HashSet::from([Operation::Overwrite, Operation::Replace]));

static VALIDATE_ADDED_DVS_OPERATIONS: Lazy<HashSet<Operation>> = Lazy::new(|| {
    HashSet::from([Operation::Overwrite, Operation::Delete, Operation::Replace])
});

/// Short description of a deletion vector for error messages.
pub(crate) fn dv_desc(file: &DataFile) -> String {
    format!(
        "DV{{location={}, offset={:?}, length={:?}, referencedDataFile={:?}}}",
        file.file_path(),
        file.content_offset(),
        file.content_size_in_bytes(),
        file.referenced_data_file()
    )
}

/// Checks that snapshots committed after an operation started don't
/// conflict with it.
///
/// `starting_snapshot_id` is the snapshot the operation read, `parent` the
/// current tip of the branch being committed to. A missing parent means the
/// table has no snapshot and nothing can conflict.
#[derive(Debug, Clone)]
pub struct SnapshotValidator {
    file_io: FileIO,
    worker_pool: WorkerPool,
    case_sensitive: bool,
}

impl SnapshotValidator {
    /// Create a validator reading manifests with `file_io`.
    pub fn new(file_io: FileIO, worker_pool: WorkerPool) -> Self {
        Self {
            file_io,
            worker_pool,
            case_sensitive: true,
        }
    }

    /// Whether column names of conflict filters are case sensitive.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Walk from `parent` back to `starting_snapshot_id` and collect the
    /// manifests of `content` written by snapshots whose operation is one of
    /// `matching_operations`, along with the ids of those snapshots.
    ///
    /// Fails if the walk doesn't end right after the starting snapshot, e.g.
    /// because part of the history has expired.
    pub async fn validation_history(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        matching_operations: &HashSet<Operation>,
        content: ManifestContentType,
        parent: &Snapshot,
    ) -> Result<(Vec<ManifestFile>, HashSet<i64>)> {
        let mut manifests = vec![];
        let mut new_snapshots = HashSet::new();
        let mut last_snapshot = None;

        for snapshot in ancestors_between(base, parent.snapshot_id(), starting_snapshot_id) {
            if matching_operations.contains(&snapshot.operation()) {
                new_snapshots.insert(snapshot.snapshot_id());
                let list = snapshot.load_manifest_list(&self.file_io).await?;
                manifests.extend(list.consume_entries().into_iter().filter(|m| {
                    m.content == content && m.added_snapshot_id == Some(snapshot.snapshot_id())
                }));
            }
            last_snapshot = Some(snapshot);
        }

        if let Some(last) = &last_snapshot {
            if last.parent_snapshot_id() != starting_snapshot_id {
                return Err(Error::validation(format!(
                    "Cannot determine history between starting snapshot {} and the last known ancestor {}",
                    starting_snapshot_id.map_or("null".to_string(), |id| id.to_string()),
                    last.snapshot_id()
                )));
            }
        }

        debug!(
            starting_snapshot_id,
            parent = parent.snapshot_id(),
            snapshots = new_snapshots.len(),
            manifests = manifests.len(),
            "Collected validation history"
        );
        Ok((manifests, new_snapshots))
    }

    fn starting_sequence_number(base: &TableMetadata, starting_snapshot_id: Option<i64>) -> i64 {
        starting_snapshot_id
            .and_then(|id| base.snapshot_by_id(id))
            .map_or(INITIAL_SEQUENCE_NUMBER, |s| s.sequence_number())
    }

    /// Read the entries of `manifests` accepted by `keep` that may hold rows
    /// matching `filter` and live in one of `partitions`.
    async fn matching_entries(
        &self,
        base: &TableMetadata,
        manifests: Vec<ManifestFile>,
        filter: Option<&Predicate>,
        partitions: Option<&PartitionSet>,
        keep: impl Fn(&ManifestEntry) -> bool,
    ) -> Result<Vec<ManifestEntryRef>> {
        let filter = filter
            .map(|f| f.bind(base.current_schema(), self.case_sensitive))
            .transpose()?;

        let file_io = self.file_io.clone();
        let loaded = self
            .worker_pool
            .run(manifests, |manifest| {
                let file_io = file_io.clone();
                async move { manifest.load_manifest(&file_io).await }
            })
            .await?;

        let mut matches = vec![];
        for entry in loaded.iter().flat_map(|m| m.entries()) {
            if !keep(entry.as_ref()) {
                continue;
            }
            let file = entry.data_file();
            if partitions.is_some_and(|p| !p.contains(file.partition_spec_id(), file.partition())) {
                continue;
            }
            if let Some(filter) = &filter {
                let spec = base
                    .partition_spec_by_id(file.partition_spec_id())
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::PreconditionFailed,
                            format!(
                                "Cannot find partition spec {} for file {}",
                                file.partition_spec_id(),
                                file.file_path()
                            ),
                        )
                    })?;
                if !InclusiveMetricsEvaluator::eval(filter, file, spec)? {
                    continue;
                }
            }
            matches.push(entry.clone());
        }
        Ok(matches)
    }

    async fn added_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        partitions: Option<&PartitionSet>,
        parent: Option<&Snapshot>,
    ) -> Result<Vec<ManifestEntryRef>> {
        let Some(parent) = parent else {
            return Ok(vec![]);
        };

        let (manifests, new_snapshots) = self
            .validation_history(
                base,
                starting_snapshot_id,
                &VALIDATE_ADDED_FILES_OPERATIONS,
                ManifestContentType::Data,
                parent,
            )
            .await?;

        self.matching_entries(base, manifests, filter, partitions, |entry| {
            entry.status() == ManifestStatus::Added
                && entry
                    .snapshot_id()
                    .is_some_and(|id| new_snapshots.contains(&id))
        })
        .await
    }

    /// Fail if a data file that may contain rows matching `filter` was added
    /// since the starting snapshot.
    pub async fn validate_added_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: &Predicate,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let conflicts = self
            .added_data_files(base, starting_snapshot_id, Some(filter), None, parent)
            .await?;
        if !conflicts.is_empty() {
            return Err(Error::validation(format!(
                "Found conflicting files that can contain records matching {filter}: [{}]",
                conflicts.iter().map(|e| e.file_path()).join(", ")
            )));
        }
        Ok(())
    }

    /// Fail if a data file was added to one of `partitions` since the
    /// starting snapshot.
    pub async fn validate_added_data_files_in_partitions(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        partitions: &PartitionSet,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let conflicts = self
            .added_data_files(base, starting_snapshot_id, None, Some(partitions), parent)
            .await?;
        if !conflicts.is_empty() {
            return Err(Error::validation(format!(
                "Found conflicting files that can contain records matching partitions {partitions}: [{}]",
                conflicts.iter().map(|e| e.file_path()).join(", ")
            )));
        }
        Ok(())
    }

    /// Index of the delete files added since the starting snapshot that
    /// may apply to rows matching `filter` or to files in `partitions`.
    ///
    /// The index is empty when there is no parent and for v1 tables, which
    /// can't hold delete files.
    pub async fn added_delete_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        partitions: Option<&PartitionSet>,
        parent: Option<&Snapshot>,
    ) -> Result<DeleteFileIndex> {
        let Some(parent) = parent else {
            return Ok(DeleteFileIndex::default());
        };
        if base.format_version() == FormatVersion::V1 {
            return Ok(DeleteFileIndex::default());
        }

        let (manifests, _) = self
            .validation_history(
                base,
                starting_snapshot_id,
                &VALIDATE_ADDED_DELETE_FILES_OPERATIONS,
                ManifestContentType::Deletes,
                parent,
            )
            .await?;

        let mut builder = DeleteFileIndex::builder(self.file_io.clone(), manifests)
            .after_sequence_number(Self::starting_sequence_number(base, starting_snapshot_id))
            .case_sensitive(self.case_sensitive)
            .specs_by_id(base.specs_by_id().clone())
            .schema(base.current_schema().clone())
            .worker_pool(self.worker_pool);
        if let Some(filter) = filter {
            builder = builder.filter_data(filter.clone());
        }
        if let Some(partitions) = partitions {
            builder = builder.filter_partitions(partitions.clone());
        }
        builder.build().await
    }

    /// Fail if a delete file added since the starting snapshot applies to
    /// one of `data_files`.
    ///
    /// With `ignore_equality_deletes` only position deletes count. This is
    /// meant for operations that rewrite data files keeping their data
    /// sequence number: equality deletes added concurrently still apply to
    /// the rewritten files.
    pub async fn validate_no_new_deletes_for_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        data_files: &[DataFile],
        ignore_equality_deletes: bool,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        if parent.is_none() || base.format_version() == FormatVersion::V1 {
            return Ok(());
        }

        let deletes = self
            .added_delete_files(base, starting_snapshot_id, filter, None, parent)
            .await?;
        let starting_sequence_number = Self::starting_sequence_number(base, starting_snapshot_id);

        for data_file in data_files {
            let applying = deletes.for_data_file(starting_sequence_number, data_file);
            if ignore_equality_deletes {
                if applying
                    .iter()
                    .any(|d| d.content_type() == DataContentType::PositionDeletes)
                {
                    return Err(Error::validation(format!(
                        "Cannot commit, found new position delete for replaced data file: {}",
                        data_file.file_path()
                    )));
                }
            } else if !applying.is_empty() {
                return Err(Error::validation(format!(
                    "Cannot commit, found new delete for replaced data file: {}",
                    data_file.file_path()
                )));
            }
        }
        Ok(())
    }

    /// Fail if a delete file that may apply to rows matching `filter` was
    /// added since the starting snapshot.
    pub async fn validate_no_new_delete_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: &Predicate,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let deletes = self
            .added_delete_files(base, starting_snapshot_id, Some(filter), None, parent)
            .await?;
        if !deletes.is_empty() {
            return Err(Error::validation(format!(
                "Found new conflicting delete files that can apply to records matching {filter}: [{}]",
                deletes
                    .referenced_delete_files()
                    .iter()
                    .map(|f| f.file_path())
                    .join(", ")
            )));
        }
        Ok(())
    }

    /// Fail if a delete file was added to one of `partitions` since the
    /// starting snapshot.
    pub async fn validate_no_new_delete_files_in_partitions(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        partitions: &PartitionSet,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let deletes = self
            .added_delete_files(base, starting_snapshot_id, None, Some(partitions), parent)
            .await?;
        if !deletes.is_empty() {
            return Err(Error::validation(format!(
                "Found new conflicting delete files that can apply to records matching {partitions}: [{}]",
                deletes
                    .referenced_delete_files()
                    .iter()
                    .map(|f| f.file_path())
                    .join(", ")
            )));
        }
        Ok(())
    }

    async fn deleted_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        partitions: Option<&PartitionSet>,
        parent: Option<&Snapshot>,
    ) -> Result<Vec<ManifestEntryRef>> {
        let Some(parent) = parent else {
            return Ok(vec![]);
        };

        let (manifests, new_snapshots) = self
            .validation_history(
                base,
                starting_snapshot_id,
                &VALIDATE_DATA_FILES_EXIST_OPERATIONS,
                ManifestContentType::Data,
                parent,
            )
            .await?;

        self.matching_entries(base, manifests, filter, partitions, |entry| {
            entry.status() == ManifestStatus::Deleted
                && entry
                    .snapshot_id()
                    .is_some_and(|id| new_snapshots.contains(&id))
        })
        .await
    }

    /// Fail if a data file that may contain rows matching `filter` was
    /// removed since the starting snapshot.
    pub async fn validate_deleted_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: &Predicate,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let conflicts = self
            .deleted_data_files(base, starting_snapshot_id, Some(filter), None, parent)
            .await?;
        if !conflicts.is_empty() {
            return Err(Error::validation(format!(
                "Found conflicting deleted files that can contain records matching {filter}: [{}]",
                conflicts.iter().map(|e| e.file_path()).join(", ")
            )));
        }
        Ok(())
    }

    /// Fail if a data file in one of `partitions` was removed since the
    /// starting snapshot.
    pub async fn validate_deleted_data_files_in_partitions(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        partitions: &PartitionSet,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let conflicts = self
            .deleted_data_files(base, starting_snapshot_id, None, Some(partitions), parent)
            .await?;
        if !conflicts.is_empty() {
            return Err(Error::validation(format!(
                "Found conflicting deleted files that can apply to records matching {partitions}: [{}]",
                conflicts.iter().map(|e| e.file_path()).join(", ")
            )));
        }
        Ok(())
    }

    /// Fail if one of the `required` data files was removed since the
    /// starting snapshot.
    ///
    /// With `skip_deletes`, removals by DELETE operations are ignored.
    pub async fn validate_data_files_exist(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        required: &HashSet<String>,
        skip_deletes: bool,
        filter: Option<&Predicate>,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if required.is_empty() {
            return Ok(());
        }

        let operations = if skip_deletes {
            &*VALIDATE_DATA_FILES_EXIST_SKIP_DELETE_OPERATIONS
        } else {
            &*VALIDATE_DATA_FILES_EXIST_OPERATIONS
        };
        let (manifests, new_snapshots) = self
            .validation_history(
                base,
                starting_snapshot_id,
                operations,
                ManifestContentType::Data,
                parent,
            )
            .await?;

        let missing = self
            .matching_entries(base, manifests, filter, None, |entry| {
                entry.status() == ManifestStatus::Deleted
                    && entry
                        .snapshot_id()
                        .is_some_and(|id| new_snapshots.contains(&id))
                    && required.contains(entry.file_path())
            })
            .await?;
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "Cannot commit, missing data files: [{}]",
                missing.iter().map(|e| e.file_path()).join(", ")
            )));
        }
        Ok(())
    }

    /// Fail if a deletion vector for one of the data files in
    /// `new_dv_refs` was added since the starting snapshot.
    ///
    /// At most one DV may reference a data file, two writers adding one
    /// concurrently can't both commit.
    pub async fn validate_added_dvs(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        new_dv_refs: &HashSet<String>,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if new_dv_refs.is_empty() {
            return Ok(());
        }

        let (manifests, new_snapshots) = self
            .validation_history(
                base,
                starting_snapshot_id,
                &VALIDATE_ADDED_DVS_OPERATIONS,
                ManifestContentType::Deletes,
                parent,
            )
            .await?;

        let filter = filter
            .map(|f| f.bind(base.current_schema(), self.case_sensitive))
            .transpose()?;
        let shared = Arc::new((
            new_dv_refs.clone(),
            new_snapshots,
            filter,
            base.specs_by_id().clone(),
        ));
        let file_io = self.file_io.clone();

        self.worker_pool
            .run(manifests, |manifest| {
                let shared = shared.clone();
                let file_io = file_io.clone();
                async move {
                    let (new_dv_refs, new_snapshots, filter, specs_by_id) = shared.as_ref();
                    let loaded = manifest.load_manifest(&file_io).await?;
                    for entry in loaded.entries() {
                        let file = entry.data_file();
                        if entry.status() != ManifestStatus::Added
                            || !file.is_dv()
                            || !entry
                                .snapshot_id()
                                .is_some_and(|id| new_snapshots.contains(&id))
                        {
                            continue;
                        }
                        if let (Some(filter), Some(spec)) =
                            (filter, specs_by_id.get(&file.partition_spec_id()))
                        {
                            if !InclusiveMetricsEvaluator::eval(filter, file, spec)? {
                                continue;
                            }
                        }
                        if let Some(referenced) = file
                            .referenced_data_file()
                            .filter(|path| new_dv_refs.contains(*path))
                        {
                            return Err(Error::validation(format!(
                                "Found concurrently added DV for {referenced}: {}",
                                dv_desc(file)
                            )));
                        }
                    }
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }
}
