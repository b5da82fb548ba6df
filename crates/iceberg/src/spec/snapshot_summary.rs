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

use std::collections::HashMap;

use itertools::Itertools;

use super::{DataContentType, DataFile, PartitionSpec};
use crate::spec::{ManifestContentType, ManifestFile, Summary};
use crate::{Error, ErrorKind, Result};

pub(crate) const ADDED_DATA_FILES: &str = "added-data-files";
pub(crate) const ADDED_DELETE_FILES: &str = "added-delete-files";
const ADDED_EQUALITY_DELETES: &str = "added-equality-deletes";
const ADDED_FILE_SIZE: &str = "added-files-size";
const ADDED_POSITION_DELETES: &str = "added-position-deletes";
const ADDED_POSITION_DELETE_FILES: &str = "added-position-delete-files";
const ADDED_DVS: &str = "added-dvs";
pub(crate) const ADDED_RECORDS: &str = "added-records";
pub(crate) const DELETED_DATA_FILES: &str = "deleted-data-files";
pub(crate) const DELETED_RECORDS: &str = "deleted-records";
const ADDED_EQUALITY_DELETE_FILES: &str = "added-equality-delete-files";
pub(crate) const REMOVED_DELETE_FILES: &str = "removed-delete-files";
const REMOVED_EQUALITY_DELETES: &str = "removed-equality-deletes";
const REMOVED_EQUALITY_DELETE_FILES: &str = "removed-equality-delete-files";
const REMOVED_FILE_SIZE: &str = "removed-files-size";
const REMOVED_POSITION_DELETES: &str = "removed-position-deletes";
const REMOVED_POSITION_DELETE_FILES: &str = "removed-position-delete-files";
const REMOVED_DVS: &str = "removed-dvs";
const DELETED_DUPLICATE_FILES: &str = "deleted-duplicate-files";
const TOTAL_EQUALITY_DELETES: &str = "total-equality-deletes";
const TOTAL_POSITION_DELETES: &str = "total-position-deletes";
pub(crate) const TOTAL_DATA_FILES: &str = "total-data-files";
pub(crate) const TOTAL_DELETE_FILES: &str = "total-delete-files";
pub(crate) const TOTAL_RECORDS: &str = "total-records";
const TOTAL_FILE_SIZE: &str = "total-files-size";
const CHANGED_PARTITION_COUNT_PROP: &str = "changed-partition-count";
const CHANGED_PARTITION_PREFIX: &str = "partitions.";
const PARTITION_SUMMARY_PROP: &str = "partition-summaries-included";

/// `SnapshotSummaryCollector` collects and aggregates snapshot update metrics.
/// It gathers metrics about added or removed data files and manifests, and tracks
/// partition-specific updates.
///
/// Partition metrics are only trusted while every change was recorded file
/// by file. Adding a whole manifest drops them.
#[derive(Debug, Clone)]
pub struct SnapshotSummaryCollector {
    metrics: UpdateMetrics,
    partition_metrics: HashMap<String, UpdateMetrics>,
    max_changed_partitions_for_summaries: u64,
    properties: HashMap<String, String>,
    trust_partition_metrics: bool,
}

impl Default for SnapshotSummaryCollector {
    fn default() -> Self {
        Self {
            metrics: UpdateMetrics::default(),
            partition_metrics: HashMap::new(),
            max_changed_partitions_for_summaries: 0,
            properties: HashMap::new(),
            trust_partition_metrics: true,
        }
    }
}

impl SnapshotSummaryCollector {
    /// Set properties for snapshot summary
    pub fn set(&mut self, key: impl ToString, value: impl ToString) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    /// Sets the limit for including partition summaries. Summaries are not
    /// included if the number of partitions is exceeded.
    pub fn set_partition_summary_limit(&mut self, limit: u64) {
        self.max_changed_partitions_for_summaries = limit;
    }

    /// Reset all metrics. Custom properties are kept.
    pub fn clear(&mut self) {
        self.metrics = UpdateMetrics::default();
        self.partition_metrics.clear();
        self.trust_partition_metrics = true;
    }

    /// Adds a data file to the summary collector
    pub fn add_file(&mut self, data_file: &DataFile, partition_spec: &PartitionSpec) {
        self.metrics.add_file(data_file);
        if !data_file.partition.is_empty() {
            self.update_partition_metrics(partition_spec, data_file, true);
        }
    }

    /// Removes a data file from the summary collector
    pub fn remove_file(&mut self, data_file: &DataFile, partition_spec: &PartitionSpec) {
        self.metrics.remove_file(data_file);
        if !data_file.partition.is_empty() {
            self.update_partition_metrics(partition_spec, data_file, false);
        }
    }

    /// Counts files that were deleted more than once, e.g. a data file
    /// tracked by two manifests.
    pub fn increment_duplicate_deletes(&mut self, count: u64) {
        self.metrics.deleted_duplicate_files += count;
    }

    /// Adds a manifest to the summary collector
    pub fn add_manifest(&mut self, manifest: &ManifestFile) {
        self.trust_partition_metrics = false;
        self.partition_metrics.clear();
        self.metrics.add_manifest(manifest);
    }

    fn update_partition_metrics(
        &mut self,
        partition_spec: &PartitionSpec,
        data_file: &DataFile,
        is_add_file: bool,
    ) {
        if !self.trust_partition_metrics {
            return;
        }
        let partition_path = partition_spec.partition_to_path(&data_file.partition);
        let metrics = self.partition_metrics.entry(partition_path).or_default();

        if is_add_file {
            metrics.add_file(data_file);
        } else {
            metrics.remove_file(data_file);
        }
    }

    /// Merges another `SnapshotSummaryCollector` into the current one
    pub fn merge(&mut self, summary: &SnapshotSummaryCollector) {
        self.metrics.merge(&summary.metrics);
        self.properties.extend(summary.properties.clone());

        if self.trust_partition_metrics && summary.trust_partition_metrics {
            for (partition, partition_metric) in summary.partition_metrics.iter() {
                self.partition_metrics
                    .entry(partition.to_string())
                    .or_default()
                    .merge(partition_metric);
            }
        } else {
            self.partition_metrics.clear();
            self.trust_partition_metrics = false;
        }
    }

    /// Builds final map of summaries
    pub fn build(&self) -> HashMap<String, String> {
        let mut properties = self.properties.clone();
        properties.extend(self.metrics.to_map());

        if self.trust_partition_metrics {
            let changed_partitions_count = self.partition_metrics.len() as u64;
            set_if_positive(
                &mut properties,
                changed_partitions_count,
                CHANGED_PARTITION_COUNT_PROP,
            );

            if changed_partitions_count > 0
                && changed_partitions_count <= self.max_changed_partitions_for_summaries
            {
                properties.insert(PARTITION_SUMMARY_PROP.to_string(), "true".to_string());
                for (partition_path, update_metrics_partition) in &self.partition_metrics {
                    let property_key = format!("{CHANGED_PARTITION_PREFIX}{partition_path}");
                    let partition_summary = update_metrics_partition
                        .to_map()
                        .into_iter()
                        .sorted()
                        .map(|(property, value)| format!("{property}={value}"))
                        .join(",");

                    if !partition_summary.is_empty() {
                        properties.insert(property_key, partition_summary);
                    }
                }
            }
        }
        properties
    }
}

#[derive(Debug, Default, Clone)]
struct UpdateMetrics {
    added_file_size: u64,
    removed_file_size: u64,
    added_data_files: u32,
    removed_data_files: u32,
    added_eq_delete_files: u64,
    removed_eq_delete_files: u64,
    added_pos_delete_files: u64,
    removed_pos_delete_files: u64,
    added_dvs: u64,
    removed_dvs: u64,
    added_delete_files: u32,
    removed_delete_files: u32,
    added_records: u64,
    deleted_records: u64,
    added_pos_deletes: u64,
    removed_pos_deletes: u64,
    added_eq_deletes: u64,
    removed_eq_deletes: u64,
    deleted_duplicate_files: u64,
}

impl UpdateMetrics {
    fn add_file(&mut self, data_file: &DataFile) {
        self.added_file_size += data_file.file_size_in_bytes;
        match data_file.content_type() {
            DataContentType::Data => {
                self.added_data_files += 1;
                self.added_records += data_file.record_count;
            }
            DataContentType::PositionDeletes => {
                if data_file.is_dv() {
                    self.added_dvs += 1;
                } else {
                    self.added_pos_delete_files += 1;
                }
                self.added_delete_files += 1;
                self.added_pos_deletes += data_file.record_count;
            }
            DataContentType::EqualityDeletes => {
                self.added_delete_files += 1;
                self.added_eq_delete_files += 1;
                self.added_eq_deletes += data_file.record_count;
            }
        }
    }

    fn remove_file(&mut self, data_file: &DataFile) {
        self.removed_file_size += data_file.file_size_in_bytes;
        match data_file.content_type() {
            DataContentType::Data => {
                self.removed_data_files += 1;
                self.deleted_records += data_file.record_count;
            }
            DataContentType::PositionDeletes => {
                if data_file.is_dv() {
                    self.removed_dvs += 1;
                } else {
                    self.removed_pos_delete_files += 1;
                }
                self.removed_delete_files += 1;
                self.removed_pos_deletes += data_file.record_count;
            }
            DataContentType::EqualityDeletes => {
                self.removed_delete_files += 1;
                self.removed_eq_delete_files += 1;
                self.removed_eq_deletes += data_file.record_count;
            }
        }
    }

    fn add_manifest(&mut self, manifest: &ManifestFile) {
        match manifest.content {
            ManifestContentType::Data => {
                self.added_data_files += manifest.added_files_count.unwrap_or(0);
                self.added_records += manifest.added_rows_count.unwrap_or(0);
                self.removed_data_files += manifest.deleted_files_count.unwrap_or(0);
                self.deleted_records += manifest.deleted_rows_count.unwrap_or(0);
            }
            ManifestContentType::Deletes => {
                self.added_delete_files += manifest.added_files_count.unwrap_or(0);
                self.removed_delete_files += manifest.deleted_files_count.unwrap_or(0);
            }
        }
    }

    fn to_map(&self) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        set_if_positive(&mut properties, self.added_file_size, ADDED_FILE_SIZE);
        set_if_positive(&mut properties, self.removed_file_size, REMOVED_FILE_SIZE);
        set_if_positive(&mut properties, self.added_data_files, ADDED_DATA_FILES);
        set_if_positive(&mut properties, self.removed_data_files, DELETED_DATA_FILES);
        set_if_positive(
            &mut properties,
            self.added_eq_delete_files,
            ADDED_EQUALITY_DELETE_FILES,
        );
        set_if_positive(
            &mut properties,
            self.removed_eq_delete_files,
            REMOVED_EQUALITY_DELETE_FILES,
        );
        set_if_positive(
            &mut properties,
            self.added_pos_delete_files,
            ADDED_POSITION_DELETE_FILES,
        );
        set_if_positive(
            &mut properties,
            self.removed_pos_delete_files,
            REMOVED_POSITION_DELETE_FILES,
        );
        set_if_positive(&mut properties, self.added_dvs, ADDED_DVS);
        set_if_positive(&mut properties, self.removed_dvs, REMOVED_DVS);
        set_if_positive(&mut properties, self.added_delete_files, ADDED_DELETE_FILES);
        set_if_positive(
            &mut properties,
            self.removed_delete_files,
            REMOVED_DELETE_FILES,
        );
        set_if_positive(&mut properties, self.added_records, ADDED_RECORDS);
        set_if_positive(&mut properties, self.deleted_records, DELETED_RECORDS);
        set_if_positive(
            &mut properties,
            self.added_pos_deletes,
            ADDED_POSITION_DELETES,
        );
        set_if_positive(
            &mut properties,
            self.removed_pos_deletes,
            REMOVED_POSITION_DELETES,
        );
        set_if_positive(
            &mut properties,
            self.added_eq_deletes,
            ADDED_EQUALITY_DELETES,
        );
        set_if_positive(
            &mut properties,
            self.removed_eq_deletes,
            REMOVED_EQUALITY_DELETES,
        );
        set_if_positive(
            &mut properties,
            self.deleted_duplicate_files,
            DELETED_DUPLICATE_FILES,
        );
        properties
    }

    fn merge(&mut self, other: &UpdateMetrics) {
        self.added_file_size += other.added_file_size;
        self.removed_file_size += other.removed_file_size;
        self.added_data_files += other.added_data_files;
        self.removed_data_files += other.removed_data_files;
        self.added_eq_delete_files += other.added_eq_delete_files;
        self.removed_eq_delete_files += other.removed_eq_delete_files;
        self.added_pos_delete_files += other.added_pos_delete_files;
        self.removed_pos_delete_files += other.removed_pos_delete_files;
        self.added_dvs += other.added_dvs;
        self.removed_dvs += other.removed_dvs;
        self.added_delete_files += other.added_delete_files;
        self.removed_delete_files += other.removed_delete_files;
        self.added_records += other.added_records;
        self.deleted_records += other.deleted_records;
        self.added_pos_deletes += other.added_pos_deletes;
        self.removed_pos_deletes += other.removed_pos_deletes;
        self.added_eq_deletes += other.added_eq_deletes;
        self.removed_eq_deletes += other.removed_eq_deletes;
        self.deleted_duplicate_files += other.deleted_duplicate_files;
    }
}

fn set_if_positive<T>(properties: &mut HashMap<String, String>, value: T, property_name: &str)
where T: PartialOrd + Default + ToString {
    if value > T::default() {
        properties.insert(property_name.to_string(), value.to_string());
    }
}

/// Adds the `total-*` properties to `summary`, starting from the totals of the
/// previous snapshot.
///
/// The first snapshot of a table starts from zero. A total is omitted when the
/// previous summary doesn't carry it, since it can't be derived.
pub(crate) fn update_snapshot_summaries(
    mut summary: Summary,
    previous_summary: Option<&Summary>,
) -> Result<Summary> {
    for (total_property, added_property, removed_property) in [
        (TOTAL_DATA_FILES, ADDED_DATA_FILES, DELETED_DATA_FILES),
        (TOTAL_DELETE_FILES, ADDED_DELETE_FILES, REMOVED_DELETE_FILES),
        (TOTAL_RECORDS, ADDED_RECORDS, DELETED_RECORDS),
        (TOTAL_FILE_SIZE, ADDED_FILE_SIZE, REMOVED_FILE_SIZE),
        (
            TOTAL_POSITION_DELETES,
            ADDED_POSITION_DELETES,
            REMOVED_POSITION_DELETES,
        ),
        (
            TOTAL_EQUALITY_DELETES,
            ADDED_EQUALITY_DELETES,
            REMOVED_EQUALITY_DELETES,
        ),
    ] {
        update_totals(
            &mut summary,
            previous_summary,
            total_property,
            added_property,
            removed_property,
        )?;
    }
    Ok(summary)
}

fn get_prop(summary: &Summary, prop: &str) -> Result<Option<i64>> {
    summary
        .additional_properties
        .get(prop)
        .map(|value| {
            value.parse::<i64>().map_err(|err| {
                Error::new(
                    ErrorKind::DataInvalid,
                    format!("Failed to parse summary property {prop}: {value}"),
                )
                .with_source(err)
            })
        })
        .transpose()
}

fn update_totals(
    summary: &mut Summary,
    previous_summary: Option<&Summary>,
    total_property: &str,
    added_property: &str,
    removed_property: &str,
) -> Result<()> {
    let previous_total = match previous_summary {
        Some(previous) => match get_prop(previous, total_property)? {
            Some(total) => total,
            None => return Ok(()),
        },
        None => 0,
    };

    let new_total = previous_total + get_prop(summary, added_property)?.unwrap_or(0)
        - get_prop(summary, removed_property)?.unwrap_or(0);
    if new_total >= 0 {
        summary
            .additional_properties
            .insert(total_property.to_string(), new_total.to_string());
    }
    Ok(())
}
