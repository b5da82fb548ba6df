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

//! Accumulates the changes of one commit and turns them into the manifest
//! list of a new snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::expr::Predicate;
use crate::io::FileIO;
use crate::runtime::WorkerPool;
use crate::spec::{
    DataContentType, DataFile, DataFileSet, FormatVersion, ManifestContentType, ManifestFile,
    Operation, PartitionSpecRef, Snapshot, SnapshotSummaryCollector, Struct, Summary,
    TableMetadata, UNASSIGNED_SEQUENCE_NUMBER, copy_append_manifest, update_snapshot_summaries,
};
use crate::transaction::content::{DataContent, DeleteContent};
use crate::transaction::manifest_filter::{ManifestFilterManager, ManifestWriterContext};
use crate::transaction::manifest_merge::MergeManifestManager;
use crate::transaction::validate::{SnapshotValidator, dv_desc};
use crate::{Error, ErrorKind};

const META_ROOT_PATH: &str = "metadata";

/// Path of the `counter`-th manifest written by commit `commit_uuid`.
pub(crate) fn new_manifest_path(table_location: &str, commit_uuid: Uuid, counter: u64) -> String {
    format!(
        "{}/{}/{}-m{}.json",
        table_location.trim_end_matches('/'),
        META_ROOT_PATH,
        commit_uuid,
        counter
    )
}

/// Generate a positive snapshot id not used by any snapshot of `metadata`.
pub fn generate_unique_snapshot_id(metadata: &TableMetadata) -> i64 {
    let generate_random_id = || -> i64 {
        let (lhs, rhs) = Uuid::new_v4().as_u64_pair();
        ((lhs ^ rhs) as i64) & i64::MAX
    };
    let mut snapshot_id = generate_random_id();
    while metadata.snapshot_by_id(snapshot_id).is_some() {
        snapshot_id = generate_random_id();
    }
    snapshot_id
}

/// Delete files added to one partition spec, with the data sequence number
/// requested for each of them.
#[derive(Debug, Default)]
struct PendingDeleteFiles {
    files: DataFileSet,
    data_sequence_numbers: Vec<Option<i64>>,
}

impl PendingDeleteFiles {
    fn insert(&mut self, file: DataFile, data_sequence_number: Option<i64>) -> bool {
        if self.files.insert(file) {
            self.data_sequence_numbers.push(data_sequence_number);
            true
        } else {
            false
        }
    }
}

/// Builder of [`MergingSnapshotProducer`].
pub struct MergingSnapshotProducerBuilder<'a> {
    base: &'a TableMetadata,
    file_io: FileIO,
    operation: Operation,
    snapshot_id: Option<i64>,
    commit_uuid: Option<Uuid>,
    worker_pool: WorkerPool,
}

impl MergingSnapshotProducerBuilder<'_> {
    /// Id of the snapshot to produce. A random unused id is generated if
    /// not set.
    pub fn with_snapshot_id(mut self, snapshot_id: i64) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    /// Uuid used to name the files written by this commit.
    pub fn with_commit_uuid(mut self, commit_uuid: Uuid) -> Self {
        self.commit_uuid = Some(commit_uuid);
        self
    }

    /// Pool used to read and write manifests in parallel.
    pub fn with_worker_pool(mut self, worker_pool: WorkerPool) -> Self {
        self.worker_pool = worker_pool;
        self
    }

    /// Build the producer, reading the merge and summary settings from the
    /// table properties.
    pub fn build(self) -> Result<MergingSnapshotProducer> {
        let properties = self.base.table_properties()?;
        let snapshot_id = self
            .snapshot_id
            .unwrap_or_else(|| generate_unique_snapshot_id(self.base));
        let commit_uuid = self.commit_uuid.unwrap_or_else(Uuid::now_v7);
        let specs_by_id = self.base.specs_by_id().clone();

        let ctx = ManifestWriterContext::new(
            self.file_io.clone(),
            self.base.location(),
            commit_uuid,
            self.base.format_version(),
            snapshot_id,
        );

        let mut summary_builder = SnapshotSummaryCollector::default();
        summary_builder.set_partition_summary_limit(properties.write_summary_partition_limit);

        debug!(
            snapshot_id,
            operation = self.operation.as_str(),
            "Created snapshot producer"
        );

        Ok(MergingSnapshotProducer {
            operation: self.operation,
            snapshot_id,
            commit_uuid,
            table_location: self.base.location().to_string(),
            format_version: self.base.format_version(),
            can_inherit_snapshot_id: self.base.can_inherit_snapshot_id()?,
            file_io: self.file_io,
            worker_pool: self.worker_pool,
            case_sensitive: true,
            filter_manager: ManifestFilterManager::new(
                ctx.clone(),
                specs_by_id.clone(),
                self.worker_pool,
            ),
            delete_filter_manager: ManifestFilterManager::new(
                ctx.clone(),
                specs_by_id.clone(),
                self.worker_pool,
            ),
            merge_manager: MergeManifestManager::new(
                ctx.clone(),
                properties.manifest_target_size_bytes,
                properties.manifest_min_count_to_merge,
                properties.manifest_merge_enabled,
                self.worker_pool,
            ),
            delete_merge_manager: MergeManifestManager::new(
                ctx.clone(),
                properties.manifest_target_size_bytes,
                properties.manifest_min_count_to_merge,
                properties.manifest_merge_enabled,
                self.worker_pool,
            ),
            ctx,
            specs_by_id,
            summary_builder,
            added_files_summary: SnapshotSummaryCollector::default(),
            appended_manifests_summary: SnapshotSummaryCollector::default(),
            new_data_files_by_spec: BTreeMap::new(),
            new_data_files_data_sequence_number: None,
            new_delete_files_by_spec: BTreeMap::new(),
            new_dv_refs: HashSet::new(),
            append_manifests: vec![],
            rewritten_append_manifests: vec![],
            has_new_data_files: false,
            cached_new_data_manifests: vec![],
            has_new_delete_files: false,
            cached_new_delete_manifests: vec![],
        })
    }
}

/// Collects the files added and removed by one commit and produces the
/// manifests of the new snapshot.
///
/// Existing manifests are filtered to mark removed files as DELETED, new
/// files are written to new manifests, and everything is merged into
/// target-sized manifests, separately for data and delete files. The
/// manifests written by [`apply`](Self::apply) are cached so that a commit
/// retried against a newer base doesn't rewrite them.
#[derive(Debug)]
pub struct MergingSnapshotProducer {
    operation: Operation,
    snapshot_id: i64,
    commit_uuid: Uuid,
    table_location: String,
    format_version: FormatVersion,
    can_inherit_snapshot_id: bool,
    file_io: FileIO,
    worker_pool: WorkerPool,
    case_sensitive: bool,
    ctx: ManifestWriterContext,
    specs_by_id: HashMap<i32, PartitionSpecRef>,

    filter_manager: ManifestFilterManager<DataContent>,
    delete_filter_manager: ManifestFilterManager<DeleteContent>,
    merge_manager: MergeManifestManager<DataContent>,
    delete_merge_manager: MergeManifestManager<DeleteContent>,

    summary_builder: SnapshotSummaryCollector,
    added_files_summary: SnapshotSummaryCollector,
    appended_manifests_summary: SnapshotSummaryCollector,

    new_data_files_by_spec: BTreeMap<i32, DataFileSet>,
    new_data_files_data_sequence_number: Option<i64>,
    new_delete_files_by_spec: BTreeMap<i32, PendingDeleteFiles>,
    // data files referenced by the DVs added in this commit
    new_dv_refs: HashSet<String>,
    // manifests appended as-is
    append_manifests: Vec<ManifestFile>,
    // manifests copied with this commit's snapshot id
    rewritten_append_manifests: Vec<ManifestFile>,

    has_new_data_files: bool,
    cached_new_data_manifests: Vec<ManifestFile>,
    has_new_delete_files: bool,
    cached_new_delete_manifests: Vec<ManifestFile>,
}

impl MergingSnapshotProducer {
    /// Start building a producer of an `operation` snapshot for the table
    /// described by `base`.
    pub fn builder(
        base: &TableMetadata,
        file_io: FileIO,
        operation: Operation,
    ) -> MergingSnapshotProducerBuilder<'_> {
        MergingSnapshotProducerBuilder {
            base,
            file_io,
            operation,
            snapshot_id: None,
            commit_uuid: None,
            worker_pool: WorkerPool::default(),
        }
    }

    /// Id of the snapshot being produced.
    pub fn snapshot_id(&self) -> i64 {
        self.snapshot_id
    }

    /// Operation of the snapshot being produced.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Location of the manifest list of the `attempt`-th commit attempt.
    pub fn manifest_list_path(&self, attempt: u32) -> String {
        format!(
            "{}/{}/snap-{}-{}-{}.json",
            self.table_location.trim_end_matches('/'),
            META_ROOT_PATH,
            self.snapshot_id,
            attempt,
            self.commit_uuid
        )
    }

    fn spec(&self, spec_id: i32, file: &DataFile) -> Result<PartitionSpecRef> {
        self.specs_by_id.get(&spec_id).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::PreconditionFailed,
                format!(
                    "Cannot find partition spec {spec_id} for {} file: {}",
                    if file.is_delete_file() { "delete" } else { "data" },
                    file.file_path()
                ),
            )
        })
    }

    /// Add a custom property to the snapshot summary.
    pub fn set(&mut self, property: impl ToString, value: impl ToString) -> &mut Self {
        self.summary_builder.set(property, value);
        self
    }

    /// Whether column names of row filters are case sensitive.
    pub fn case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_sensitive = case_sensitive;
        self.filter_manager.case_sensitive(case_sensitive);
        self.delete_filter_manager.case_sensitive(case_sensitive);
        self
    }

    /// Fail the commit if it would remove any file.
    pub fn fail_any_delete(&mut self) -> &mut Self {
        self.filter_manager.fail_any_delete();
        self.delete_filter_manager.fail_any_delete();
        self
    }

    /// Fail the commit if a file or path explicitly requested for deletion
    /// is not found.
    pub fn fail_missing_delete_paths(&mut self) -> &mut Self {
        self.filter_manager.fail_missing_delete_paths();
        self.delete_filter_manager.fail_missing_delete_paths();
        self
    }

    /// Remove every file whose rows all match `expr`.
    ///
    /// Delete files are removed too when all their rows match: the rows they
    /// delete are gone anyway.
    pub fn delete_by_row_filter(&mut self, expr: Predicate) -> &mut Self {
        self.filter_manager.delete_by_row_filter(expr.clone());
        self.delete_filter_manager.delete_by_row_filter(expr);
        self
    }

    /// Remove every data and delete file of a partition.
    pub fn drop_partition(&mut self, spec_id: i32, partition: Struct) -> &mut Self {
        self.filter_manager.drop_partition(spec_id, partition.clone());
        self.delete_filter_manager.drop_partition(spec_id, partition);
        self
    }

    /// Remove a data file.
    pub fn delete_data_file(&mut self, file: DataFile) -> &mut Self {
        self.filter_manager.delete_file(file);
        self
    }

    /// Remove a delete file.
    pub fn delete_delete_file(&mut self, file: DataFile) -> &mut Self {
        self.delete_filter_manager.delete_file(file);
        self
    }

    /// Remove the data file at `path`. Delete files can't be removed by
    /// path.
    pub fn delete_by_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.filter_manager.delete_path(path);
        self
    }

    /// Add a data file.
    pub fn add_data_file(&mut self, file: DataFile) -> Result<&mut Self> {
        if file.content_type() != DataContentType::Data {
            return Err(Error::new(
                ErrorKind::PreconditionFailed,
                format!("Cannot add delete file as data file: {}", file.file_path()),
            ));
        }
        let spec = self.spec(file.partition_spec_id(), &file)?;

        let file = file.with_first_row_id(None);
        let files = self
            .new_data_files_by_spec
            .entry(spec.spec_id())
            .or_default();
        if files.insert(file.clone()) {
            self.added_files_summary.add_file(&file, &spec);
            self.has_new_data_files = true;
        }
        Ok(self)
    }

    /// Add a delete file. Its data sequence number is the one of the new
    /// snapshot.
    pub fn add_delete_file(&mut self, file: DataFile) -> Result<&mut Self> {
        self.add_delete_file_internal(file, None)
    }

    /// Add a delete file that applies to data files older than
    /// `data_sequence_number`.
    pub fn add_delete_file_with_sequence_number(
        &mut self,
        file: DataFile,
        data_sequence_number: i64,
    ) -> Result<&mut Self> {
        self.add_delete_file_internal(file, Some(data_sequence_number))
    }

    fn add_delete_file_internal(
        &mut self,
        file: DataFile,
        data_sequence_number: Option<i64>,
    ) -> Result<&mut Self> {
        self.validate_new_delete_file(&file)?;
        let spec = self.spec(file.partition_spec_id(), &file)?;

        let is_dv = file.is_dv();
        let referenced = file.referenced_data_file().map(str::to_string);
        if let (true, Some(referenced)) = (is_dv, &referenced) {
            let pending = self
                .new_delete_files_by_spec
                .values()
                .any(|files| files.files.contains(&file));
            if !pending && self.new_dv_refs.contains(referenced) {
                return Err(Error::new(
                    ErrorKind::PreconditionFailed,
                    format!(
                        "Cannot add a second DV for data file {referenced}: {}",
                        dv_desc(&file)
                    ),
                ));
            }
        }
        let files = self
            .new_delete_files_by_spec
            .entry(spec.spec_id())
            .or_default();
        if files.insert(file.clone(), data_sequence_number) {
            self.added_files_summary.add_file(&file, &spec);
            self.has_new_delete_files = true;
            if let (true, Some(referenced)) = (is_dv, referenced) {
                self.new_dv_refs.insert(referenced);
            }
        }
        Ok(self)
    }

    fn validate_new_delete_file(&self, file: &DataFile) -> Result<()> {
        match file.content_type() {
            DataContentType::Data => {
                return Err(Error::new(
                    ErrorKind::PreconditionFailed,
                    format!("Cannot add data file as delete file: {}", file.file_path()),
                ));
            }
            DataContentType::EqualityDeletes if self.format_version >= FormatVersion::V2 => {
                return Ok(());
            }
            _ => {}
        }

        match self.format_version {
            FormatVersion::V1 => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                "Deletes are supported in V2 and above",
            )),
            FormatVersion::V2 if file.is_dv() => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!(
                    "Must not use DVs for position deletes in V2: {}",
                    dv_desc(file)
                ),
            )),
            FormatVersion::V2 => Ok(()),
            FormatVersion::V3 if !file.is_dv() => Err(Error::new(
                ErrorKind::FeatureUnsupported,
                format!(
                    "Must use DVs for position deletes in V{}: {}",
                    self.format_version as u8,
                    file.file_path()
                ),
            )),
            FormatVersion::V3 => Ok(()),
        }
    }

    /// Add every file of a data manifest.
    ///
    /// A manifest without snapshot id and row ids is appended as is when
    /// the table inherits snapshot ids. Otherwise it is copied into a new
    /// manifest owned by this snapshot.
    pub async fn add_manifest(&mut self, manifest: ManifestFile) -> Result<&mut Self> {
        crate::ensure_precondition!(
            manifest.content == ManifestContentType::Data,
            "Cannot append delete manifest: {}",
            manifest.manifest_path
        );

        if self.can_inherit_snapshot_id
            && manifest.added_snapshot_id.is_none()
            && manifest.first_row_id.is_none()
        {
            self.appended_manifests_summary.add_manifest(&manifest);
            self.append_manifests.push(manifest);
            return Ok(self);
        }

        let spec = self
            .specs_by_id
            .get(&manifest.partition_spec_id)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::PreconditionFailed,
                    format!(
                        "Cannot find partition spec {} for manifest: {}",
                        manifest.partition_spec_id, manifest.manifest_path
                    ),
                )
            })?;
        let writer = self
            .ctx
            .new_manifest_writer(ManifestContentType::Data, manifest.partition_spec_id)?;
        let copied = copy_append_manifest(
            &self.file_io,
            &manifest,
            writer,
            &spec,
            &mut self.appended_manifests_summary,
        )
        .await?;
        debug!(
            source = manifest.manifest_path,
            copy = copied.manifest_path,
            "Copied appended manifest"
        );
        self.rewritten_append_manifests.push(copied);
        Ok(self)
    }

    /// Assign `sequence_number` as the data sequence number of the new data
    /// files instead of the sequence number of the new snapshot.
    ///
    /// Used when rewriting files: the new files keep the sequence number of
    /// the files they replace, so equality deletes committed concurrently
    /// still apply to them.
    pub fn set_new_data_files_data_sequence_number(&mut self, sequence_number: i64) -> &mut Self {
        if self.new_data_files_data_sequence_number != Some(sequence_number) {
            self.new_data_files_data_sequence_number = Some(sequence_number);
            self.has_new_data_files = true;
        }
        self
    }

    /// Row filter of the files to remove, the union of all filters passed
    /// to [`delete_by_row_filter`](Self::delete_by_row_filter).
    pub fn row_filter(&self) -> &Predicate {
        self.filter_manager.delete_expression()
    }

    /// Data files added so far.
    pub fn added_data_files(&self) -> Vec<&DataFile> {
        self.new_data_files_by_spec
            .values()
            .flat_map(|files| files.iter())
            .collect()
    }

    /// The single partition spec of the added data files.
    pub fn data_spec(&self) -> Result<&PartitionSpecRef> {
        let mut spec_ids = self.new_data_files_by_spec.keys();
        match (spec_ids.next(), spec_ids.next()) {
            (None, _) => Err(Error::new(
                ErrorKind::PreconditionFailed,
                "Cannot determine partition specs: no data files have been added",
            )),
            (Some(spec_id), None) => self.specs_by_id.get(spec_id).ok_or_else(|| {
                Error::new(
                    ErrorKind::PreconditionFailed,
                    format!("Cannot find partition spec {spec_id}"),
                )
            }),
            (Some(_), Some(_)) => Err(Error::new(
                ErrorKind::PreconditionFailed,
                "Cannot return a single partition spec: data files with different partition specs have been added",
            )),
        }
    }

    /// Whether the commit removes data files.
    pub fn deletes_data_files(&self) -> bool {
        self.filter_manager.contains_deletes()
    }

    /// Whether the commit removes delete files.
    pub fn deletes_delete_files(&self) -> bool {
        self.delete_filter_manager.contains_deletes()
    }

    /// Whether the commit adds data files.
    pub fn adds_data_files(&self) -> bool {
        !self.new_data_files_by_spec.is_empty()
    }

    /// Whether the commit adds delete files.
    pub fn adds_delete_files(&self) -> bool {
        !self.new_delete_files_by_spec.is_empty()
    }

    /// Data files referenced by the deletion vectors added so far.
    pub fn new_dv_refs(&self) -> &HashSet<String> {
        &self.new_dv_refs
    }

    /// Validator for checking this commit against concurrent commits.
    pub fn validator(&self) -> SnapshotValidator {
        SnapshotValidator::new(self.file_io.clone(), self.worker_pool)
            .with_case_sensitive(self.case_sensitive)
    }

    /// Fail if a delete file committed since `starting_snapshot_id` applies
    /// to one of `data_files`.
    ///
    /// Equality deletes are ignored when the new data files keep an
    /// explicit data sequence number.
    pub async fn validate_no_new_deletes_for_data_files(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        data_files: &[DataFile],
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        self.validator()
            .validate_no_new_deletes_for_data_files(
                base,
                starting_snapshot_id,
                filter,
                data_files,
                self.new_data_files_data_sequence_number.is_some(),
                parent,
            )
            .await
    }

    /// Fail if a deletion vector for a data file that this commit adds a
    /// deletion vector for was committed since `starting_snapshot_id`.
    pub async fn validate_added_dvs(
        &self,
        base: &TableMetadata,
        starting_snapshot_id: Option<i64>,
        filter: Option<&Predicate>,
        parent: Option<&Snapshot>,
    ) -> Result<()> {
        self.validator()
            .validate_added_dvs(base, starting_snapshot_id, filter, &self.new_dv_refs, parent)
            .await
    }

    async fn new_data_files_as_manifests(&mut self) -> Result<Vec<ManifestFile>> {
        if self.has_new_data_files && !self.cached_new_data_manifests.is_empty() {
            for manifest in std::mem::take(&mut self.cached_new_data_manifests) {
                self.ctx.delete_file(&manifest.manifest_path).await;
            }
        }

        if self.cached_new_data_manifests.is_empty() {
            for (spec_id, files) in &self.new_data_files_by_spec {
                let mut writer = self
                    .ctx
                    .new_manifest_writer(ManifestContentType::Data, *spec_id)?;
                for file in files.iter() {
                    writer.add_file(file.clone(), self.new_data_files_data_sequence_number)?;
                }
                self.cached_new_data_manifests
                    .push(writer.write_manifest_file().await?);
            }
            self.has_new_data_files = false;
        }

        Ok(self.cached_new_data_manifests.clone())
    }

    async fn prepare_new_data_manifests(&mut self) -> Result<Vec<ManifestFile>> {
        let mut manifests = if self.new_data_files_by_spec.is_empty() {
            vec![]
        } else {
            self.new_data_files_as_manifests().await?
        };
        manifests.extend(self.append_manifests.iter().cloned());
        manifests.extend(self.rewritten_append_manifests.iter().cloned());

        for manifest in &mut manifests {
            manifest.added_snapshot_id = Some(self.snapshot_id);
        }
        Ok(manifests)
    }

    async fn prepare_delete_manifests(&mut self) -> Result<Vec<ManifestFile>> {
        if self.new_delete_files_by_spec.is_empty() {
            return Ok(vec![]);
        }

        if self.has_new_delete_files && !self.cached_new_delete_manifests.is_empty() {
            for manifest in std::mem::take(&mut self.cached_new_delete_manifests) {
                self.ctx.delete_file(&manifest.manifest_path).await;
            }
        }

        if self.cached_new_delete_manifests.is_empty() {
            for (spec_id, pending) in &self.new_delete_files_by_spec {
                let mut writer = self
                    .ctx
                    .new_manifest_writer(ManifestContentType::Deletes, *spec_id)?;
                for (file, data_sequence_number) in
                    pending.files.iter().zip(&pending.data_sequence_numbers)
                {
                    writer.add_file(file.clone(), *data_sequence_number)?;
                }
                self.cached_new_delete_manifests
                    .push(writer.write_manifest_file().await?);
            }
            self.has_new_delete_files = false;
        }

        Ok(self.cached_new_delete_manifests.clone())
    }

    /// Produce the manifests of the new snapshot on top of `snapshot`, the
    /// current snapshot of `base`.
    ///
    /// Data manifests come first, then delete manifests. Calling this again
    /// after a failed commit reuses the manifests written before whenever
    /// their inputs didn't change.
    pub async fn apply(
        &mut self,
        base: &TableMetadata,
        snapshot: Option<&Snapshot>,
    ) -> Result<Vec<ManifestFile>> {
        let (data_manifests, delete_manifests) = match snapshot {
            Some(snapshot) => {
                let list = snapshot.load_manifest_list(&self.file_io).await?;
                list.consume_entries()
                    .into_iter()
                    .partition::<Vec<_>, _>(|m| m.content == ManifestContentType::Data)
            }
            None => (vec![], vec![]),
        };

        let filtered = self
            .filter_manager
            .filter_manifests(base, data_manifests)
            .await?;

        // Delete files older than every remaining data file can't apply to
        // anything.
        let min_data_sequence_number = filtered
            .iter()
            .map(|m| m.min_sequence_number)
            .filter(|seq| *seq != UNASSIGNED_SEQUENCE_NUMBER)
            .fold(base.last_sequence_number(), i64::min);
        self.delete_filter_manager
            .drop_delete_files_older_than(min_data_sequence_number)?;

        let removed_data_files: HashSet<String> = self
            .filter_manager
            .removed_files(&filtered)
            .into_iter()
            .map(|f| f.file_path().to_string())
            .collect();
        self.delete_filter_manager
            .remove_dangling_deletes_for(removed_data_files);

        let filtered_deletes = self
            .delete_filter_manager
            .filter_manifests(base, delete_manifests)
            .await?;

        let snapshot_id = self.snapshot_id;
        let should_keep = |m: &ManifestFile| {
            m.has_added_files()
                || m.has_existing_files()
                || m.added_snapshot_id == Some(snapshot_id)
        };
        let unmerged: Vec<ManifestFile> = self
            .prepare_new_data_manifests()
            .await?
            .into_iter()
            .chain(filtered.iter().cloned())
            .filter(|m| should_keep(m))
            .collect();
        let unmerged_deletes: Vec<ManifestFile> = self
            .prepare_delete_manifests()
            .await?
            .into_iter()
            .chain(filtered_deletes.iter().cloned())
            .filter(|m| should_keep(m))
            .collect();

        self.summary_builder.clear();
        self.summary_builder.merge(&self.added_files_summary);
        self.summary_builder.merge(&self.appended_manifests_summary);
        self.summary_builder
            .merge(&self.filter_manager.build_summary(&filtered)?);
        self.summary_builder
            .merge(&self.delete_filter_manager.build_summary(&filtered_deletes)?);

        let mut manifests = self.merge_manager.merge_manifests(unmerged).await?;
        manifests.extend(
            self.delete_merge_manager
                .merge_manifests(unmerged_deletes)
                .await?,
        );

        debug!(
            snapshot_id,
            manifests = manifests.len(),
            "Applied pending changes"
        );
        Ok(manifests)
    }

    /// Summary properties of the changes computed by the last
    /// [`apply`](Self::apply), plus the custom properties.
    pub fn summary(&self) -> HashMap<String, String> {
        self.summary_builder.build()
    }

    /// Summary of the new snapshot, with totals carried over from the
    /// summary of its parent.
    pub fn build_snapshot_summary(&self, previous_summary: Option<&Summary>) -> Result<Summary> {
        let summary = Summary {
            operation: self.operation,
            additional_properties: self.summary(),
        };
        update_snapshot_summaries(summary, previous_summary)
    }

    /// Delete the manifests written for this commit that are not part of
    /// the `committed` manifest list, identified by path.
    ///
    /// Manifests passed to [`add_manifest`](Self::add_manifest) and appended
    /// as is belong to the caller until a commit succeeds, they are only
    /// deleted if `committed` is not empty.
    pub async fn clean_uncommitted(&mut self, committed: &HashSet<String>) {
        self.merge_manager.clean_uncommitted(committed).await;
        self.filter_manager.clean_uncommitted(committed).await;
        self.delete_merge_manager.clean_uncommitted(committed).await;
        self.delete_filter_manager.clean_uncommitted(committed).await;

        for cache in [
            &mut self.cached_new_data_manifests,
            &mut self.cached_new_delete_manifests,
        ] {
            let mut has_deletes = false;
            for manifest in cache.iter() {
                if !committed.contains(&manifest.manifest_path) {
                    self.ctx.delete_file(&manifest.manifest_path).await;
                    has_deletes = true;
                }
            }
            if has_deletes {
                cache.clear();
            }
        }

        for manifest in &self.rewritten_append_manifests {
            if !committed.contains(&manifest.manifest_path) {
                self.ctx.delete_file(&manifest.manifest_path).await;
            }
        }

        if !committed.is_empty() {
            for manifest in &self.append_manifests {
                if !committed.contains(&manifest.manifest_path) {
                    self.ctx.delete_file(&manifest.manifest_path).await;
                }
            }
        }
    }
}
