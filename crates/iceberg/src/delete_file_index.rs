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

//! Index answering which delete files apply to a data file.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::expr::visitors::inclusive_metrics_evaluator::InclusiveMetricsEvaluator;
use crate::expr::{BoundPredicate, Predicate};
use crate::io::FileIO;
use crate::runtime::WorkerPool;
use crate::spec::{
    DataContentType, DataFile, ManifestContentType, ManifestEntryRef, ManifestFile,
    PartitionSet, PartitionSpecRef, SchemaRef, Struct,
};
use crate::{Error, ErrorKind, Result};

/// A live delete file together with its data sequence number.
#[derive(Debug)]
struct IndexedDeleteFile {
    sequence_number: i64,
    entry: ManifestEntryRef,
}

impl IndexedDeleteFile {
    fn file(&self) -> &DataFile {
        self.entry.data_file()
    }
}

type PartitionKey = (i32, Struct);

/// Delete files of a set of delete manifests, bucketed by where they apply.
///
/// A delete file applies to a data file only if its sequence number is
/// strictly greater than the data file's.
#[derive(Debug, Default)]
pub struct DeleteFileIndex {
    /// Equality deletes written with an unpartitioned spec apply to every
    /// data file.
    global_deletes: Vec<Arc<IndexedDeleteFile>>,
    eq_deletes_by_partition: HashMap<PartitionKey, Vec<Arc<IndexedDeleteFile>>>,
    pos_deletes_by_partition: HashMap<PartitionKey, Vec<Arc<IndexedDeleteFile>>>,
    /// Deletion vectors and position deletes naming a single data file.
    pos_deletes_by_path: HashMap<String, Vec<Arc<IndexedDeleteFile>>>,
    /// Every indexed delete file, in manifest order.
    all: Vec<Arc<IndexedDeleteFile>>,
}

impl DeleteFileIndex {
    /// Starts building an index over `delete_manifests`.
    pub fn builder(file_io: FileIO, delete_manifests: Vec<ManifestFile>) -> DeleteFileIndexBuilder {
        DeleteFileIndexBuilder {
            file_io,
            delete_manifests,
            min_sequence_number: None,
            data_filter: None,
            partition_set: None,
            case_sensitive: true,
            specs_by_id: HashMap::new(),
            schema: None,
            worker_pool: WorkerPool::default(),
        }
    }

    /// Returns true if no delete file was indexed.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// All indexed delete files.
    pub fn referenced_delete_files(&self) -> Vec<&DataFile> {
        self.all.iter().map(|d| d.file()).collect()
    }

    /// Delete files that apply to `data_file`, written at data sequence
    /// number `sequence_number`.
    pub fn for_data_file(&self, sequence_number: i64, data_file: &DataFile) -> Vec<&DataFile> {
        let key = (data_file.partition_spec_id(), data_file.partition().clone());
        let applies = |d: &&Arc<IndexedDeleteFile>| d.sequence_number > sequence_number;

        let global = self.global_deletes.iter();
        let eq = self.eq_deletes_by_partition.get(&key).into_iter().flatten();
        let pos = self.pos_deletes_by_partition.get(&key).into_iter().flatten();
        let by_path = self
            .pos_deletes_by_path
            .get(data_file.file_path())
            .into_iter()
            .flatten();

        global
            .chain(eq)
            .chain(pos)
            .chain(by_path)
            .filter(applies)
            .map(|d| d.file())
            .collect()
    }

    fn insert(&mut self, spec: &PartitionSpecRef, indexed: IndexedDeleteFile) {
        let indexed = Arc::new(indexed);
        let file = indexed.file();
        let key = (file.partition_spec_id(), file.partition().clone());

        match file.content_type() {
            DataContentType::EqualityDeletes if spec.is_unpartitioned() => {
                self.global_deletes.push(indexed.clone());
            }
            DataContentType::EqualityDeletes => {
                self.eq_deletes_by_partition
                    .entry(key)
                    .or_default()
                    .push(indexed.clone());
            }
            DataContentType::PositionDeletes => match file.referenced_data_file() {
                Some(path) => {
                    self.pos_deletes_by_path
                        .entry(path.to_string())
                        .or_default()
                        .push(indexed.clone());
                }
                None => {
                    self.pos_deletes_by_partition
                        .entry(key)
                        .or_default()
                        .push(indexed.clone());
                }
            },
            DataContentType::Data => return,
        }
        self.all.push(indexed);
    }
}

/// Builder of [`DeleteFileIndex`].
pub struct DeleteFileIndexBuilder {
    file_io: FileIO,
    delete_manifests: Vec<ManifestFile>,
    min_sequence_number: Option<i64>,
    data_filter: Option<Predicate>,
    partition_set: Option<PartitionSet>,
    case_sensitive: bool,
    specs_by_id: HashMap<i32, PartitionSpecRef>,
    schema: Option<SchemaRef>,
    worker_pool: WorkerPool,
}

impl DeleteFileIndexBuilder {
    /// Only index delete files with a sequence number greater than
    /// `sequence_number`.
    pub fn after_sequence_number(mut self, sequence_number: i64) -> Self {
        self.min_sequence_number = Some(sequence_number);
        self
    }

    /// Only index delete files that may delete rows matching `filter`.
    ///
    /// Requires a schema to bind the filter.
    pub fn filter_data(mut self, filter: Predicate) -> Self {
        self.data_filter = Some(filter);
        self
    }

    /// Only index delete files in one of `partitions`.
    pub fn filter_partitions(mut self, partitions: PartitionSet) -> Self {
        self.partition_set = Some(partitions);
        self
    }

    /// Whether column names of the data filter are case sensitive.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Partition specs of the table, by id.
    pub fn specs_by_id(mut self, specs_by_id: HashMap<i32, PartitionSpecRef>) -> Self {
        self.specs_by_id = specs_by_id;
        self
    }

    /// Schema the data filter is bound to.
    pub fn schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Pool used to read the delete manifests.
    pub fn worker_pool(mut self, worker_pool: WorkerPool) -> Self {
        self.worker_pool = worker_pool;
        self
    }

    /// Reads the delete manifests and builds the index.
    pub async fn build(self) -> Result<DeleteFileIndex> {
        let filter = self.bind_filter()?;

        let manifests: Vec<ManifestFile> = self
            .delete_manifests
            .into_iter()
            .filter(|m| m.content == ManifestContentType::Deletes)
            .filter(|m| m.has_added_files() || m.has_existing_files())
            .collect();
        debug!(manifests = manifests.len(), "Building delete file index");

        let file_io = self.file_io.clone();
        let loaded = self
            .worker_pool
            .run(manifests, |manifest| {
                let file_io = file_io.clone();
                async move { manifest.load_manifest(&file_io).await }
            })
            .await?;

        let mut index = DeleteFileIndex::default();
        for manifest in loaded {
            for entry in manifest.entries() {
                if !entry.is_alive() {
                    continue;
                }

                let file = entry.data_file();
                let spec = self.specs_by_id.get(&file.partition_spec_id()).ok_or_else(|| {
                    Error::new(
                        ErrorKind::PreconditionFailed,
                        format!(
                            "Cannot find partition spec {} for delete file {}",
                            file.partition_spec_id(),
                            file.file_path()
                        ),
                    )
                })?;

                let sequence_number = entry.sequence_number().ok_or_else(|| {
                    Error::new(
                        ErrorKind::DataInvalid,
                        format!("Delete file {} has no sequence number", file.file_path()),
                    )
                })?;
                if self
                    .min_sequence_number
                    .is_some_and(|min| sequence_number <= min)
                {
                    continue;
                }

                if let Some(partitions) = &self.partition_set {
                    if !partitions.contains(file.partition_spec_id(), file.partition()) {
                        continue;
                    }
                }

                if let Some(filter) = &filter {
                    if !InclusiveMetricsEvaluator::eval(filter, file, spec)? {
                        continue;
                    }
                }

                index.insert(spec, IndexedDeleteFile {
                    sequence_number,
                    entry: entry.clone(),
                });
            }
        }

        Ok(index)
    }

    fn bind_filter(&self) -> Result<Option<BoundPredicate>> {
        let Some(filter) = &self.data_filter else {
            return Ok(None);
        };
        let schema = self.schema.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::PreconditionFailed,
                "A schema is required to filter delete files by row filter",
            )
        })?;
        Ok(Some(filter.bind(schema, self.case_sensitive)?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::expr::Reference;
    use crate::spec::{
        DataFileBuilder, DataFileFormat, Datum, FormatVersion, ManifestWriterBuilder,
        NestedField, PartitionSpec, PrimitiveType, Schema, Transform,
    };

    struct Fixture {
        file_io: FileIO,
        schema: SchemaRef,
        specs: HashMap<i32, PartitionSpecRef>,
    }

    impl Fixture {
        fn new() -> Self {
            let schema = Arc::new(
                Schema::builder()
                    .with_fields(vec![
                        NestedField::required(1, "id", PrimitiveType::Long).into(),
                        NestedField::optional(2, "region", PrimitiveType::String).into(),
                    ])
                    .build()
                    .unwrap(),
            );
            let partitioned = PartitionSpec::builder(schema.clone())
                .with_spec_id(1)
                .add_partition_field("region", "region", Transform::Identity)
                .unwrap()
                .build();
            let specs = HashMap::from([
                (0, Arc::new(PartitionSpec::unpartition_spec())),
                (1, Arc::new(partitioned)),
            ]);
            Self {
                file_io: FileIO::new_with_memory(),
                schema,
                specs,
            }
        }

        async fn manifest(
            &self,
            name: &str,
            spec_id: i32,
            files: Vec<(DataFile, i64)>,
        ) -> ManifestFile {
            let output = self
                .file_io
                .new_output(format!("memory:///t/metadata/{name}.json"))
                .unwrap();
            let mut writer =
                ManifestWriterBuilder::new(output, Some(1), spec_id, FormatVersion::V3)
                    .build_deletes();
            for (file, seq) in files {
                writer.add_file(file, Some(seq)).unwrap();
            }
            writer.write_manifest_file().await.unwrap()
        }

        async fn index(&self, manifests: Vec<ManifestFile>) -> DeleteFileIndex {
            DeleteFileIndex::builder(self.file_io.clone(), manifests)
                .specs_by_id(self.specs.clone())
                .schema(self.schema.clone())
                .worker_pool(WorkerPool::in_process())
                .build()
                .await
                .unwrap()
        }
    }

    fn us() -> Struct {
        Struct::from_iter([Some(Datum::string("us"))])
    }

    fn eu() -> Struct {
        Struct::from_iter([Some(Datum::string("eu"))])
    }

    fn data_file(path: &str, partition: Struct) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::Data)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .partition(partition)
            .partition_spec_id(1)
            .record_count(10)
            .file_size_in_bytes(100)
            .build()
            .unwrap()
    }

    fn pos_delete(path: &str, partition: Struct) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::PositionDeletes)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .partition(partition)
            .partition_spec_id(1)
            .record_count(1)
            .file_size_in_bytes(10)
            .build()
            .unwrap()
    }

    fn eq_delete(path: &str, spec_id: i32, partition: Struct) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::EqualityDeletes)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .partition(partition)
            .partition_spec_id(spec_id)
            .equality_ids(Some(vec![1]))
            .record_count(1)
            .file_size_in_bytes(10)
            .build()
            .unwrap()
    }

    fn dv(path: &str, referenced: &str, partition: Struct) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::PositionDeletes)
            .file_path(path)
            .file_format(DataFileFormat::Puffin)
            .partition(partition)
            .partition_spec_id(1)
            .referenced_data_file(referenced)
            .content_offset(4)
            .content_size_in_bytes(40)
            .record_count(1)
            .file_size_in_bytes(10)
            .build()
            .unwrap()
    }

    fn paths(files: Vec<&DataFile>) -> Vec<&str> {
        let mut paths: Vec<&str> = files.into_iter().map(|f| f.file_path()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_only_strictly_newer_deletes_apply() {
        let fixture = Fixture::new();
        let manifest = fixture
            .manifest("deletes", 1, vec![
                (pos_delete("memory:///t/d-4.parquet", us()), 4),
                (pos_delete("memory:///t/d-5.parquet", us()), 5),
                (pos_delete("memory:///t/d-6.parquet", us()), 6),
            ])
            .await;
        let index = fixture.index(vec![manifest]).await;

        let data = data_file("memory:///t/data.parquet", us());
        assert_eq!(paths(index.for_data_file(5, &data)), vec![
            "memory:///t/d-6.parquet"
        ]);
        assert_eq!(index.referenced_delete_files().len(), 3);
    }

    #[tokio::test]
    async fn test_partition_scoping() {
        let fixture = Fixture::new();
        let manifest = fixture
            .manifest("deletes", 1, vec![
                (pos_delete("memory:///t/d-us.parquet", us()), 2),
                (eq_delete("memory:///t/eq-eu.parquet", 1, eu()), 2),
            ])
            .await;
        let global = fixture
            .manifest("global", 0, vec![(
                eq_delete("memory:///t/eq-all.parquet", 0, Struct::empty()),
                2,
            )])
            .await;
        let index = fixture.index(vec![manifest, global]).await;

        let data = data_file("memory:///t/data.parquet", us());
        assert_eq!(paths(index.for_data_file(1, &data)), vec![
            "memory:///t/d-us.parquet",
            "memory:///t/eq-all.parquet",
        ]);
    }

    #[tokio::test]
    async fn test_dv_applies_to_referenced_file_only() {
        let fixture = Fixture::new();
        let manifest = fixture
            .manifest("deletes", 1, vec![(
                dv("memory:///t/dv.puffin", "memory:///t/a.parquet", us()),
                3,
            )])
            .await;
        let index = fixture.index(vec![manifest]).await;

        let a = data_file("memory:///t/a.parquet", us());
        let b = data_file("memory:///t/b.parquet", us());
        assert_eq!(paths(index.for_data_file(1, &a)), vec!["memory:///t/dv.puffin"]);
        assert!(index.for_data_file(1, &b).is_empty());
    }

    #[tokio::test]
    async fn test_filters() {
        let fixture = Fixture::new();
        let manifest = fixture
            .manifest("deletes", 1, vec![
                (pos_delete("memory:///t/d-us.parquet", us()), 2),
                (pos_delete("memory:///t/d-eu.parquet", eu()), 3),
            ])
            .await;

        let index = DeleteFileIndex::builder(fixture.file_io.clone(), vec![manifest.clone()])
            .specs_by_id(fixture.specs.clone())
            .after_sequence_number(2)
            .worker_pool(WorkerPool::in_process())
            .build()
            .await
            .unwrap();
        assert_eq!(paths(index.referenced_delete_files()), vec![
            "memory:///t/d-eu.parquet"
        ]);

        let index = DeleteFileIndex::builder(fixture.file_io.clone(), vec![manifest.clone()])
            .specs_by_id(fixture.specs.clone())
            .schema(fixture.schema.clone())
            .filter_data(Reference::new("region").equal_to(Datum::string("us")))
            .worker_pool(WorkerPool::in_process())
            .build()
            .await
            .unwrap();
        assert_eq!(paths(index.referenced_delete_files()), vec![
            "memory:///t/d-us.parquet"
        ]);

        let mut partitions = PartitionSet::new();
        partitions.add(1, eu());
        let index = DeleteFileIndex::builder(fixture.file_io.clone(), vec![manifest])
            .specs_by_id(fixture.specs.clone())
            .filter_partitions(partitions)
            .worker_pool(WorkerPool::in_process())
            .build()
            .await
            .unwrap();
        assert_eq!(paths(index.referenced_delete_files()), vec![
            "memory:///t/d-eu.parquet"
        ]);
    }

    #[tokio::test]
    async fn test_unknown_spec_is_fatal() {
        let fixture = Fixture::new();
        let mut file = pos_delete("memory:///t/d.parquet", us());
        file.partition_spec_id = 7;
        let manifest = fixture.manifest("deletes", 7, vec![(file, 2)]).await;

        let err = DeleteFileIndex::builder(fixture.file_io.clone(), vec![manifest])
            .specs_by_id(fixture.specs.clone())
            .worker_pool(WorkerPool::in_process())
            .build()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let fixture = Fixture::new();
        let index = fixture.index(vec![]).await;
        assert!(index.is_empty());
        assert!(index
            .for_data_file(0, &data_file("memory:///t/a.parquet", us()))
            .is_empty());
    }
}
