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

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::expr::visitors::inclusive_metrics_evaluator::InclusiveMetricsEvaluator;
use crate::expr::visitors::strict_metrics_evaluator::StrictMetricsEvaluator;
use crate::expr::{BoundPredicate, Predicate};
use crate::io::FileIO;
use crate::runtime::WorkerPool;
use crate::spec::{
    DataFile, DataFileSet, FormatVersion, ManifestContentType, ManifestEntry, ManifestFile,
    ManifestWriter, ManifestWriterBuilder, PartitionSet, PartitionSpecRef, SnapshotSummaryCollector,
    Struct, TableMetadata,
};
use crate::transaction::content::{DataContent, DeleteContent, ManifestContentKind};
use crate::transaction::snapshot::new_manifest_path;
use crate::{Error, ErrorKind};

/// Context for creating the manifest writers of one commit.
///
/// Clones share the manifest counter, so every writer created from the same
/// context gets a distinct path.
#[derive(Debug, Clone)]
pub struct ManifestWriterContext {
    file_io: FileIO,
    table_location: String,
    commit_uuid: Uuid,
    manifest_counter: Arc<AtomicU64>,
    format_version: FormatVersion,
    snapshot_id: i64,
}

impl ManifestWriterContext {
    /// Create a new ManifestWriterContext
    pub fn new(
        file_io: FileIO,
        table_location: impl ToString,
        commit_uuid: Uuid,
        format_version: FormatVersion,
        snapshot_id: i64,
    ) -> Self {
        Self {
            file_io,
            table_location: table_location.to_string(),
            commit_uuid,
            manifest_counter: Arc::new(AtomicU64::new(0)),
            format_version,
            snapshot_id,
        }
    }

    /// FileIO used to read and write manifests.
    pub fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    /// Id of the snapshot the manifests are written for.
    pub fn snapshot_id(&self) -> i64 {
        self.snapshot_id
    }

    /// Format version of the table.
    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    /// Create a manifest writer for the specified content type
    pub fn new_manifest_writer(
        &self,
        content: ManifestContentType,
        partition_spec_id: i32,
    ) -> Result<ManifestWriter> {
        let path = new_manifest_path(
            &self.table_location,
            self.commit_uuid,
            self.manifest_counter.fetch_add(1, Ordering::SeqCst),
        );
        let output = self.file_io.new_output(path)?;
        Ok(ManifestWriterBuilder::new(
            output,
            Some(self.snapshot_id),
            partition_spec_id,
            self.format_version,
        )
        .build(content))
    }

    /// Delete a file written during this commit. Failures are logged and
    /// otherwise ignored, the file is garbage at this point.
    pub async fn delete_file(&self, path: &str) {
        if let Err(err) = self.file_io.delete(path).await {
            warn!(path, error = %err, "Failed to delete uncommitted manifest");
        }
    }
}

/// Files deleted by one filtered manifest.
#[derive(Debug, Clone, Default)]
struct DeletedFiles {
    files: Vec<DataFile>,
    duplicates: u64,
}

struct FilterOutcome {
    source_path: String,
    manifest: ManifestFile,
    deleted: Option<DeletedFiles>,
}

/// Snapshot of the delete criteria, shared by the tasks filtering manifests
/// in parallel.
struct FilterPlan {
    content: ManifestContentType,
    ctx: ManifestWriterContext,
    specs_by_id: HashMap<i32, PartitionSpecRef>,
    delete_paths: HashSet<String>,
    delete_files: DataFileSet,
    drop_partitions: PartitionSet,
    delete_expression: BoundPredicate,
    has_delete_expression: bool,
    expression_display: String,
    min_sequence_number: i64,
    removed_data_file_paths: HashSet<String>,
    fail_any_delete: bool,
}

impl FilterPlan {
    fn is_delete(&self) -> bool {
        self.content == ManifestContentType::Deletes
    }

    fn can_contain_deleted_files(&self, manifest: &ManifestFile) -> bool {
        if !manifest.has_added_files() && !manifest.has_existing_files() {
            return false;
        }

        !self.delete_paths.is_empty()
            || !self.delete_files.is_empty()
            || !self.drop_partitions.is_empty()
            || self.has_delete_expression
            || (self.is_delete()
                && manifest.min_sequence_number > 0
                && manifest.min_sequence_number < self.min_sequence_number)
            || (self.is_delete() && !self.removed_data_file_paths.is_empty())
    }

    fn is_dangling_dv(&self, file: &DataFile) -> bool {
        file.is_dv()
            && file
                .referenced_data_file()
                .is_some_and(|path| self.removed_data_file_paths.contains(path))
    }

    /// Decide whether a live entry must be removed.
    fn should_delete(&self, entry: &ManifestEntry, spec: &PartitionSpecRef) -> Result<bool> {
        let file = entry.data_file();
        let is_delete = self.is_delete();

        let marked_for_delete = self.delete_paths.contains(file.file_path())
            || self.delete_files.contains(file)
            || self
                .drop_partitions
                .contains(file.partition_spec_id(), file.partition())
            || (is_delete
                && entry
                    .sequence_number()
                    .is_some_and(|seq| seq > 0 && seq < self.min_sequence_number))
            || (is_delete && self.is_dangling_dv(file));

        if !marked_for_delete
            && !InclusiveMetricsEvaluator::eval(&self.delete_expression, file, spec)?
        {
            return Ok(false);
        }

        let all_rows_match =
            marked_for_delete || StrictMetricsEvaluator::eval(&self.delete_expression, file, spec)?;

        // Delete files only partially matching the filter are kept, rows
        // they delete may still be live.
        if !all_rows_match && !is_delete {
            return Err(Error::validation(format!(
                "Cannot delete file where some, but not all, rows match filter {}: {}",
                self.expression_display,
                file.file_path()
            )));
        }

        if all_rows_match && self.fail_any_delete {
            return Err(
                Error::validation("Operation would delete existing data")
                    .with_context("partition", spec.partition_to_path(file.partition())),
            );
        }

        Ok(all_rows_match)
    }

    fn spec(&self, spec_id: i32, manifest: &ManifestFile) -> Result<&PartitionSpecRef> {
        self.specs_by_id.get(&spec_id).ok_or_else(|| {
            Error::new(
                ErrorKind::PreconditionFailed,
                format!(
                    "Cannot find partition spec {spec_id} for manifest {}",
                    manifest.manifest_path
                ),
            )
        })
    }

    async fn filter_manifest(&self, manifest: ManifestFile) -> Result<FilterOutcome> {
        let unchanged = |manifest: ManifestFile| FilterOutcome {
            source_path: manifest.manifest_path.clone(),
            manifest,
            deleted: None,
        };

        if !self.can_contain_deleted_files(&manifest) {
            return Ok(unchanged(manifest));
        }

        let spec = self.spec(manifest.partition_spec_id, &manifest)?;
        let loaded = manifest.load_manifest(self.ctx.file_io()).await?;

        let mut to_delete = Vec::with_capacity(loaded.entries().len());
        for entry in loaded.entries() {
            to_delete.push(entry.is_alive() && self.should_delete(entry, spec)?);
        }
        if !to_delete.iter().any(|d| *d) {
            return Ok(unchanged(manifest));
        }

        let mut writer = self
            .ctx
            .new_manifest_writer(self.content, manifest.partition_spec_id)?;
        let mut seen = DataFileSet::new();
        let mut deleted = DeletedFiles::default();
        for (entry, delete) in loaded.entries().iter().zip(to_delete) {
            if !entry.is_alive() {
                continue;
            }
            if !delete {
                writer.add_existing_entry(entry.as_ref().clone())?;
                continue;
            }

            writer.add_delete_entry(entry.as_ref().clone())?;
            if seen.insert(entry.data_file().clone()) {
                deleted.files.push(entry.data_file().clone());
            } else {
                warn!(
                    manifest = manifest.manifest_path,
                    path = entry.file_path(),
                    "Deleting a duplicate path from manifest"
                );
                deleted.duplicates += 1;
            }
        }

        let filtered = writer.write_manifest_file().await?;
        debug!(
            source = manifest.manifest_path,
            filtered = filtered.manifest_path,
            deleted = deleted.files.len(),
            "Rewrote manifest without deleted files"
        );
        Ok(FilterOutcome {
            source_path: manifest.manifest_path,
            manifest: filtered,
            deleted: Some(deleted),
        })
    }
}

/// Removes files from the manifests of a base snapshot.
///
/// Files can be removed by path, by file, by partition or by a row filter.
/// Manifests that lose a file are rewritten with a DELETED entry for it,
/// other manifests are returned unchanged. Results are cached by source
/// manifest path until the delete criteria change, so a retried commit only
/// rewrites manifests it has not seen yet.
#[derive(Debug)]
pub struct ManifestFilterManager<C: ManifestContentKind> {
    ctx: ManifestWriterContext,
    specs_by_id: HashMap<i32, PartitionSpecRef>,
    worker_pool: WorkerPool,

    delete_paths: HashSet<String>,
    delete_files: DataFileSet,
    drop_partitions: PartitionSet,
    delete_expression: Predicate,
    /// Live delete files below this data sequence number are dropped.
    min_sequence_number: i64,
    /// DVs referencing one of these data files are dropped.
    removed_data_file_paths: HashSet<String>,
    fail_any_delete: bool,
    fail_missing_delete_paths: bool,
    case_sensitive: bool,

    /// source manifest path -> filtered manifest
    filtered_manifests: HashMap<String, ManifestFile>,
    /// filtered manifest path -> files it deletes
    filtered_manifest_to_deleted_files: HashMap<String, DeletedFiles>,
    /// Rewritten manifests invalidated by a change of the delete criteria.
    obsolete_manifests: Vec<String>,

    _kind: PhantomData<C>,
}

impl<C: ManifestContentKind> ManifestFilterManager<C> {
    /// Create a new ManifestFilterManager
    pub fn new(
        ctx: ManifestWriterContext,
        specs_by_id: HashMap<i32, PartitionSpecRef>,
        worker_pool: WorkerPool,
    ) -> Self {
        Self {
            ctx,
            specs_by_id,
            worker_pool,
            delete_paths: HashSet::new(),
            delete_files: DataFileSet::new(),
            drop_partitions: PartitionSet::new(),
            delete_expression: Predicate::AlwaysFalse,
            min_sequence_number: 0,
            removed_data_file_paths: HashSet::new(),
            fail_any_delete: false,
            fail_missing_delete_paths: false,
            case_sensitive: true,
            filtered_manifests: HashMap::new(),
            filtered_manifest_to_deleted_files: HashMap::new(),
            obsolete_manifests: vec![],
            _kind: PhantomData,
        }
    }

    /// Fail the commit if any file would be removed.
    pub fn fail_any_delete(&mut self) {
        self.fail_any_delete = true;
    }

    /// Fail the commit if a file or path given for deletion is not found.
    pub fn fail_missing_delete_paths(&mut self) {
        self.fail_missing_delete_paths = true;
    }

    /// Whether column names of the row filter are case sensitive.
    pub fn case_sensitive(&mut self, case_sensitive: bool) {
        if self.case_sensitive != case_sensitive {
            self.case_sensitive = case_sensitive;
            self.invalidate_filtered_cache();
        }
    }

    /// Remove files whose rows all match `expr`.
    ///
    /// Filters accumulate, a file is removed if it matches any of them.
    pub fn delete_by_row_filter(&mut self, expr: Predicate) {
        self.invalidate_filtered_cache();
        let current = std::mem::replace(&mut self.delete_expression, Predicate::AlwaysFalse);
        self.delete_expression = current.or(expr);
    }

    /// Remove every file of a partition.
    pub fn drop_partition(&mut self, spec_id: i32, partition: Struct) {
        self.invalidate_filtered_cache();
        self.drop_partitions.add(spec_id, partition);
    }

    /// Remove a specific file.
    pub fn delete_file(&mut self, file: DataFile) {
        self.invalidate_filtered_cache();
        self.delete_files.insert(file);
    }

    /// Check if this manager contains any delete operations
    pub fn contains_deletes(&self) -> bool {
        !self.delete_paths.is_empty()
            || !self.delete_files.is_empty()
            || self.delete_expression != Predicate::AlwaysFalse
            || !self.drop_partitions.is_empty()
    }

    /// The accumulated row filter.
    pub fn delete_expression(&self) -> &Predicate {
        &self.delete_expression
    }

    fn invalidate_filtered_cache(&mut self) {
        for (source, filtered) in self.filtered_manifests.drain() {
            if filtered.manifest_path != source {
                self.obsolete_manifests.push(filtered.manifest_path);
            }
        }
        self.filtered_manifest_to_deleted_files.clear();
    }

    async fn delete_obsolete_manifests(&mut self) {
        for path in std::mem::take(&mut self.obsolete_manifests) {
            self.ctx.delete_file(&path).await;
        }
    }

    fn plan(&self, base: &TableMetadata) -> Result<FilterPlan> {
        let schema = base.current_schema();
        Ok(FilterPlan {
            content: C::CONTENT,
            ctx: self.ctx.clone(),
            specs_by_id: self.specs_by_id.clone(),
            delete_paths: self.delete_paths.clone(),
            delete_files: self.delete_files.clone(),
            drop_partitions: self.drop_partitions.clone(),
            delete_expression: self.delete_expression.bind(schema, self.case_sensitive)?,
            has_delete_expression: self.delete_expression != Predicate::AlwaysFalse,
            expression_display: self.delete_expression.to_string(),
            min_sequence_number: self.min_sequence_number,
            removed_data_file_paths: self.removed_data_file_paths.clone(),
            fail_any_delete: self.fail_any_delete,
        })
    }

    /// Filter the manifests of a base snapshot, returning them in input
    /// order with files to delete marked DELETED.
    pub async fn filter_manifests(
        &mut self,
        base: &TableMetadata,
        manifests: Vec<ManifestFile>,
    ) -> Result<Vec<ManifestFile>> {
        self.delete_obsolete_manifests().await;
        self.specs_by_id = base.specs_by_id().clone();

        if manifests.is_empty() {
            self.validate_required_deletes(&[])?;
            return Ok(vec![]);
        }

        let mut results: Vec<Option<ManifestFile>> = manifests
            .iter()
            .map(|m| self.filtered_manifests.get(&m.manifest_path).cloned())
            .collect();
        let pending: Vec<(usize, ManifestFile)> = manifests
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| results[*idx].is_none())
            .collect();

        if !pending.is_empty() {
            let plan = Arc::new(self.plan(base)?);
            let outcomes = self
                .worker_pool
                .run(pending, |(idx, manifest)| {
                    let plan = plan.clone();
                    async move { Ok((idx, plan.filter_manifest(manifest).await?)) }
                })
                .await?;

            for (idx, outcome) in outcomes {
                if let Some(deleted) = outcome.deleted {
                    self.filtered_manifest_to_deleted_files
                        .insert(outcome.manifest.manifest_path.clone(), deleted);
                }
                self.filtered_manifests
                    .insert(outcome.source_path, outcome.manifest.clone());
                results[idx] = Some(outcome.manifest);
            }
        }

        let filtered: Vec<ManifestFile> = results.into_iter().flatten().collect();
        self.validate_required_deletes(&filtered)?;
        Ok(filtered)
    }

    /// Files removed by the given filtered manifests.
    pub fn removed_files(&self, manifests: &[ManifestFile]) -> Vec<&DataFile> {
        manifests
            .iter()
            .filter_map(|m| self.filtered_manifest_to_deleted_files.get(&m.manifest_path))
            .flat_map(|deleted| deleted.files.iter())
            .collect()
    }

    fn validate_required_deletes(&self, manifests: &[ManifestFile]) -> Result<()> {
        if !self.fail_missing_delete_paths {
            return Ok(());
        }

        let deleted: DataFileSet = self.removed_files(manifests).into_iter().cloned().collect();
        let missing_files = self
            .delete_files
            .iter()
            .filter(|f| !deleted.contains(f))
            .map(|f| f.file_path())
            .join(",");
        if !missing_files.is_empty() {
            return Err(Error::validation(format!(
                "Missing required files to delete: {missing_files}"
            )));
        }

        let deleted_paths: HashSet<&str> = deleted.iter().map(|f| f.file_path()).collect();
        let missing_paths = self
            .delete_paths
            .iter()
            .filter(|p| !deleted_paths.contains(p.as_str()))
            .sorted()
            .join(",");
        if !missing_paths.is_empty() {
            return Err(Error::validation(format!(
                "Missing required files to delete: {missing_paths}"
            )));
        }
        Ok(())
    }

    /// Summary of the files removed by the given filtered manifests.
    pub fn build_summary(&self, manifests: &[ManifestFile]) -> Result<SnapshotSummaryCollector> {
        let mut summary = SnapshotSummaryCollector::default();
        let mut duplicates = 0;
        for manifest in manifests {
            let Some(deleted) = self
                .filtered_manifest_to_deleted_files
                .get(&manifest.manifest_path)
            else {
                continue;
            };
            let spec = self
                .specs_by_id
                .get(&manifest.partition_spec_id)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::PreconditionFailed,
                        format!(
                            "Cannot find partition spec {} for manifest {}",
                            manifest.partition_spec_id, manifest.manifest_path
                        ),
                    )
                })?;
            for file in &deleted.files {
                summary.remove_file(file, spec);
            }
            duplicates += deleted.duplicates;
        }
        summary.increment_duplicate_deletes(duplicates);
        Ok(summary)
    }

    /// Delete rewritten manifests that did not make it into the committed
    /// manifest list, identified by path.
    pub async fn clean_uncommitted(&mut self, committed: &HashSet<String>) {
        self.delete_obsolete_manifests().await;

        let uncommitted: Vec<(String, String)> = self
            .filtered_manifests
            .iter()
            .filter(|(_, filtered)| !committed.contains(&filtered.manifest_path))
            .map(|(source, filtered)| (source.clone(), filtered.manifest_path.clone()))
            .collect();

        for (source, filtered) in uncommitted {
            if source != filtered {
                self.ctx.delete_file(&filtered).await;
            }
            self.filtered_manifests.remove(&source);
            self.filtered_manifest_to_deleted_files.remove(&filtered);
        }
    }
}

impl ManifestFilterManager<DataContent> {
    /// Remove the data file at `path`.
    pub fn delete_path(&mut self, path: impl Into<String>) {
        self.invalidate_filtered_cache();
        self.delete_paths.insert(path.into());
    }
}

impl ManifestFilterManager<DeleteContent> {
    /// Remove DVs that reference one of `paths`, the data files they apply
    /// to are removed by the same commit.
    pub fn remove_dangling_deletes_for(&mut self, paths: HashSet<String>) {
        if self.removed_data_file_paths != paths {
            self.invalidate_filtered_cache();
            self.removed_data_file_paths = paths;
        }
    }

    /// Remove delete files whose data sequence number is older than
    /// `sequence_number`: no live data file can be affected by them.
    pub fn drop_delete_files_older_than(&mut self, sequence_number: i64) -> Result<()> {
        if sequence_number < 0 {
            return Err(Error::new(
                ErrorKind::PreconditionFailed,
                format!("Invalid minimum data sequence number: {sequence_number}"),
            ));
        }
        if self.min_sequence_number != sequence_number {
            self.invalidate_filtered_cache();
            self.min_sequence_number = sequence_number;
        }
        Ok(())
    }
}
