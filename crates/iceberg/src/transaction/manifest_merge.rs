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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;

use tracing::debug;

use crate::error::Result;
use crate::runtime::WorkerPool;
use crate::spec::{ManifestFile, ManifestStatus};
use crate::transaction::content::ManifestContentKind;
use crate::transaction::manifest_filter::ManifestWriterContext;
use crate::utils::bin::ListPacker;

enum PackedBin {
    Keep(Vec<ManifestFile>),
    Merge(Vec<ManifestFile>),
}

/// Compacts small manifests of one content kind into target-sized ones.
///
/// Manifests are grouped by partition spec and packed into bins of at most
/// `target_size_bytes`. Every bin holding more than one manifest is
/// rewritten as a single manifest, except the bin holding the first
/// manifest, usually the one with this commit's new files, which is only
/// merged once it reaches `min_count_to_merge` manifests.
#[derive(Debug)]
pub struct MergeManifestManager<C: ManifestContentKind> {
    ctx: ManifestWriterContext,
    target_size_bytes: u64,
    min_count_to_merge: usize,
    merge_enabled: bool,
    worker_pool: WorkerPool,
    /// paths of a merged bin -> merged manifest
    merged_manifests: HashMap<Vec<String>, ManifestFile>,
    _kind: PhantomData<C>,
}

impl<C: ManifestContentKind> MergeManifestManager<C> {
    /// Create a new merge manager.
    pub fn new(
        ctx: ManifestWriterContext,
        target_size_bytes: u64,
        min_count_to_merge: usize,
        merge_enabled: bool,
        worker_pool: WorkerPool,
    ) -> Self {
        Self {
            ctx,
            target_size_bytes,
            min_count_to_merge,
            merge_enabled,
            worker_pool,
            merged_manifests: HashMap::new(),
            _kind: PhantomData,
        }
    }

    fn group_by_spec(manifests: Vec<ManifestFile>) -> BTreeMap<i32, Vec<ManifestFile>> {
        let mut grouped_manifests = BTreeMap::new();
        for manifest in manifests {
            grouped_manifests
                .entry(manifest.partition_spec_id)
                .or_insert_with(Vec::new)
                .push(manifest);
        }
        grouped_manifests
    }

    /// Merge `manifests`, returning the merged manifests of the newest
    /// partition spec first.
    pub async fn merge_manifests(
        &mut self,
        manifests: Vec<ManifestFile>,
    ) -> Result<Vec<ManifestFile>> {
        if !self.merge_enabled || manifests.is_empty() {
            return Ok(manifests);
        }

        let first_path = manifests[0].manifest_path.clone();
        let packer: ListPacker<ManifestFile> = ListPacker::new(self.target_size_bytes);

        let mut bins = vec![];
        for (spec_id, group) in Self::group_by_spec(manifests).into_iter().rev() {
            for bin in packer.pack_end(group, |m| m.manifest_length.max(0) as u64) {
                // Merging the bin of the first manifest is deferred until
                // enough manifests accumulate, so that large manifests don't
                // prevent merging older groups.
                let holds_first = bin.iter().any(|m| m.manifest_path == first_path);
                if bin.len() == 1 || (holds_first && bin.len() < self.min_count_to_merge) {
                    bins.push(PackedBin::Keep(bin));
                } else {
                    bins.push(PackedBin::Merge(bin));
                }
            }
            debug!(spec_id, "Packed manifests for merge");
        }

        let mut outputs: Vec<Vec<ManifestFile>> = Vec::with_capacity(bins.len());
        let mut to_merge = vec![];
        for (idx, bin) in bins.into_iter().enumerate() {
            match bin {
                PackedBin::Keep(bin) => outputs.push(bin),
                PackedBin::Merge(bin) => {
                    let key = Self::bin_key(&bin);
                    match self.merged_manifests.get(&key) {
                        Some(merged) => outputs.push(vec![merged.clone()]),
                        None => {
                            outputs.push(vec![]);
                            to_merge.push((idx, key, bin));
                        }
                    }
                }
            }
        }

        let ctx = self.ctx.clone();
        let merged = self
            .worker_pool
            .run(to_merge, |(idx, key, bin)| {
                let ctx = ctx.clone();
                async move { Ok((idx, key, Self::merge_bin(ctx, bin).await?)) }
            })
            .await?;
        for (idx, key, manifest) in merged {
            self.merged_manifests.insert(key, manifest.clone());
            outputs[idx].push(manifest);
        }

        Ok(outputs.into_iter().flatten().collect())
    }

    fn bin_key(bin: &[ManifestFile]) -> Vec<String> {
        bin.iter().map(|m| m.manifest_path.clone()).collect()
    }

    async fn merge_bin(ctx: ManifestWriterContext, bin: Vec<ManifestFile>) -> Result<ManifestFile> {
        let snapshot_id = ctx.snapshot_id();
        let spec_id = bin[0].partition_spec_id;
        let mut writer = ctx.new_manifest_writer(C::CONTENT, spec_id)?;

        for mut manifest_file in bin {
            manifest_file.added_snapshot_id.get_or_insert(snapshot_id);
            let manifest = manifest_file.load_manifest(ctx.file_io()).await?;
            for entry in manifest.entries() {
                let from_this_snapshot = entry.snapshot_id() == Some(snapshot_id);
                match entry.status() {
                    // Only files deleted by this snapshot are carried over.
                    ManifestStatus::Deleted if from_this_snapshot => {
                        writer.add_delete_entry(entry.as_ref().clone())?
                    }
                    ManifestStatus::Deleted => {}
                    ManifestStatus::Added if from_this_snapshot => {
                        writer.add_entry(entry.as_ref().clone())?
                    }
                    _ => writer.add_existing_entry(entry.as_ref().clone())?,
                }
            }
        }

        let merged = writer.write_manifest_file().await?;
        debug!(path = merged.manifest_path, "Wrote merged manifest");
        Ok(merged)
    }

    /// Delete merged manifests that did not make it into the committed
    /// manifest list.
    pub async fn clean_uncommitted(&mut self, committed: &HashSet<String>) {
        let uncommitted: Vec<Vec<String>> = self
            .merged_manifests
            .iter()
            .filter(|(_, merged)| !committed.contains(&merged.manifest_path))
            .map(|(key, _)| key.clone())
            .collect();

        for key in uncommitted {
            if let Some(merged) = self.merged_manifests.remove(&key) {
                self.ctx.delete_file(&merged.manifest_path).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::io::FileIO;
    use crate::spec::{
        DataContentType, DataFile, DataFileBuilder, DataFileFormat, FormatVersion, ManifestEntry,
        ManifestWriterBuilder,
    };
    use crate::transaction::content::DataContent;

    const SNAPSHOT_ID: i64 = 100;

    fn data_file(path: &str) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::Data)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .record_count(1)
            .file_size_in_bytes(10)
            .build()
            .unwrap()
    }

    fn manager(
        file_io: &FileIO,
        min_count_to_merge: usize,
        merge_enabled: bool,
    ) -> MergeManifestManager<DataContent> {
        let ctx = ManifestWriterContext::new(
            file_io.clone(),
            "memory://t",
            Uuid::nil(),
            FormatVersion::V2,
            SNAPSHOT_ID,
        );
        MergeManifestManager::new(
            ctx,
            8 * 1024 * 1024,
            min_count_to_merge,
            merge_enabled,
            WorkerPool::in_process(),
        )
    }

    /// A manifest committed by snapshot 1 at sequence number 1.
    async fn committed(
        file_io: &FileIO,
        name: &str,
        spec_id: i32,
        entries: Vec<ManifestEntry>,
    ) -> ManifestFile {
        let output = file_io.new_output(format!("memory://t/metadata/{name}.json")).unwrap();
        let mut writer =
            ManifestWriterBuilder::new(output, Some(1), spec_id, FormatVersion::V2).build_data();
        for entry in entries {
            match entry.status() {
                ManifestStatus::Added => writer.add_file(entry.data_file, Some(1)).unwrap(),
                ManifestStatus::Existing => writer.add_existing_entry(entry).unwrap(),
                ManifestStatus::Deleted => writer.add_delete_entry(entry).unwrap(),
            }
        }
        let mut manifest = writer.write_manifest_file().await.unwrap();
        manifest.sequence_number = 1;
        manifest.min_sequence_number = 1;
        manifest
    }

    /// A committed manifest holding one added file.
    async fn committed_file(
        file_io: &FileIO,
        name: &str,
        spec_id: i32,
        path: &str,
    ) -> ManifestFile {
        committed(file_io, name, spec_id, vec![entry(ManifestStatus::Added, path)]).await
    }

    fn entry(status: ManifestStatus, path: &str) -> ManifestEntry {
        ManifestEntry::builder()
            .status(status)
            .snapshot_id(1)
            .sequence_number(1)
            .file_sequence_number(1)
            .data_file(data_file(path))
            .build()
    }

    /// A manifest of new files written by this commit, not yet stamped.
    async fn new_files(file_io: &FileIO, name: &str, paths: &[&str]) -> ManifestFile {
        let output = file_io.new_output(format!("memory://t/metadata/{name}.json")).unwrap();
        let mut writer =
            ManifestWriterBuilder::new(output, None, 0, FormatVersion::V2).build_data();
        for path in paths {
            writer.add_file(data_file(path), None).unwrap();
        }
        writer.write_manifest_file().await.unwrap()
    }

    async fn statuses(file_io: &FileIO, manifest: &ManifestFile) -> Vec<(String, ManifestStatus)> {
        manifest
            .load_manifest(file_io)
            .await
            .unwrap()
            .entries()
            .iter()
            .map(|e| (e.file_path().to_string(), e.status()))
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_or_below_min_count_returns_input() {
        let file_io = FileIO::new_with_memory();
        let manifests = vec![
            new_files(&file_io, "new", &["memory://t/data/n.parquet"]).await,
            committed_file(&file_io, "m0", 0, "memory://t/data/a.parquet").await,
        ];

        let mut disabled = manager(&file_io, 2, false);
        assert_eq!(disabled.merge_manifests(manifests.clone()).await.unwrap(), manifests);

        let mut below_min_count = manager(&file_io, 3, true);
        assert_eq!(
            below_min_count.merge_manifests(manifests.clone()).await.unwrap(),
            manifests
        );

        let mut empty = manager(&file_io, 1, true);
        assert!(empty.merge_manifests(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_rewrites_statuses() {
        let file_io = FileIO::new_with_memory();
        let new = new_files(&file_io, "new", &["memory://t/data/n.parquet"]).await;
        let old = committed(&file_io, "m0", 0, vec![
            entry(ManifestStatus::Added, "memory://t/data/a.parquet"),
            entry(ManifestStatus::Deleted, "memory://t/data/gone.parquet"),
        ])
        .await;
        // Rewritten by a filter of this commit.
        let filtered = {
            let output = file_io.new_output("memory://t/metadata/filtered.json").unwrap();
            let mut writer =
                ManifestWriterBuilder::new(output, Some(SNAPSHOT_ID), 0, FormatVersion::V2)
                    .build_data();
            writer
                .add_delete_entry(entry(ManifestStatus::Existing, "memory://t/data/b.parquet"))
                .unwrap();
            writer
                .add_existing_entry(entry(ManifestStatus::Existing, "memory://t/data/c.parquet"))
                .unwrap();
            writer.write_manifest_file().await.unwrap()
        };

        let mut merger = manager(&file_io, 2, true);
        let merged = merger
            .merge_manifests(vec![new, old, filtered])
            .await
            .unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].added_snapshot_id, Some(SNAPSHOT_ID));
        assert_eq!(statuses(&file_io, &merged[0]).await, vec![
            ("memory://t/data/n.parquet".to_string(), ManifestStatus::Added),
            ("memory://t/data/a.parquet".to_string(), ManifestStatus::Existing),
            ("memory://t/data/b.parquet".to_string(), ManifestStatus::Deleted),
            ("memory://t/data/c.parquet".to_string(), ManifestStatus::Existing),
        ]);
    }

    #[tokio::test]
    async fn test_groups_by_spec_newest_first() {
        let file_io = FileIO::new_with_memory();
        let spec0 = vec![
            committed_file(&file_io, "a0", 0, "memory://t/data/a0.parquet").await,
            committed_file(&file_io, "a1", 0, "memory://t/data/a1.parquet").await,
        ];
        let spec1 = committed_file(&file_io, "b0", 1, "memory://t/data/b0.parquet").await;

        let mut merger = manager(&file_io, 1, true);
        let merged = merger
            .merge_manifests(vec![spec0[0].clone(), spec1.clone(), spec0[1].clone()])
            .await
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], spec1);
        assert_eq!(merged[1].partition_spec_id, 0);
        assert_eq!(merged[1].existing_files_count, Some(2));
    }

    #[tokio::test]
    async fn test_merged_manifests_are_reused_and_cleaned() {
        let file_io = FileIO::new_with_memory();
        let manifests = vec![
            committed_file(&file_io, "a0", 0, "memory://t/data/a0.parquet").await,
            committed_file(&file_io, "a1", 0, "memory://t/data/a1.parquet").await,
        ];

        let mut merger = manager(&file_io, 1, true);
        let first = merger.merge_manifests(manifests.clone()).await.unwrap();
        let retried = merger.merge_manifests(manifests.clone()).await.unwrap();
        assert_eq!(first, retried);

        merger.clean_uncommitted(&HashSet::new()).await;
        assert!(!file_io.exists(&first[0].manifest_path).await.unwrap());
        assert!(file_io.exists(&manifests[0].manifest_path).await.unwrap());
    }
}
