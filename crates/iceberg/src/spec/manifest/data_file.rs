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
use std::fmt::{Display, Formatter};

use serde_derive::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::spec::{Datum, Struct};

/// Data file carries data file path, partition tuple, metrics, …
///
/// The same type describes data files and delete files, `content` tells them
/// apart.
#[derive(Debug, PartialEq, Clone, Eq, Builder, Serialize, Deserialize)]
pub struct DataFile {
    /// Type of content stored by the data file: data, equality deletes,
    /// or position deletes (all v1 files are data files)
    pub(crate) content: DataContentType,
    /// Full URI for the file with FS scheme
    #[builder(setter(into))]
    pub(crate) file_path: String,
    /// String file format name, `avro`, `orc`, `parquet`, or `puffin`
    pub(crate) file_format: DataFileFormat,
    /// Partition data tuple, schema based on the partition spec output using
    /// partition field ids for the struct field ids
    #[builder(default)]
    pub(crate) partition: Struct,
    /// Number of records in this file, or the cardinality of a deletion vector
    pub(crate) record_count: u64,
    /// Total file size in bytes
    pub(crate) file_size_in_bytes: u64,
    /// Map from column id to number of values in the column (including null
    /// and NaN values)
    #[builder(default)]
    pub(crate) value_counts: HashMap<i32, u64>,
    /// Map from column id to number of null values in the column
    #[builder(default)]
    pub(crate) null_value_counts: HashMap<i32, u64>,
    /// Map from column id to number of NaN values in the column
    #[builder(default)]
    pub(crate) nan_value_counts: HashMap<i32, u64>,
    /// Map from column id to lower bound in the column.
    #[builder(default)]
    pub(crate) lower_bounds: HashMap<i32, Datum>,
    /// Map from column id to upper bound in the column.
    #[builder(default)]
    pub(crate) upper_bounds: HashMap<i32, Datum>,
    /// Field ids used to determine row equality in equality delete files.
    #[builder(default)]
    pub(crate) equality_ids: Option<Vec<i32>>,
    /// First row id assigned to the rows of this file, used for row lineage.
    #[builder(default, setter(strip_option))]
    pub(crate) first_row_id: Option<i64>,
    /// Id of the partition spec used to write this file.
    #[builder(default)]
    pub(crate) partition_spec_id: i32,
    /// Location of the data file that all position deletes in this file
    /// reference. Required for deletion vectors.
    #[builder(default, setter(into, strip_option))]
    pub(crate) referenced_data_file: Option<String>,
    /// Offset of the deletion vector blob inside its Puffin file.
    #[builder(default, setter(strip_option))]
    pub(crate) content_offset: Option<i64>,
    /// Length of the deletion vector blob inside its Puffin file.
    #[builder(default, setter(strip_option))]
    pub(crate) content_size_in_bytes: Option<i64>,
}

impl DataFile {
    /// Get the content type of the data file (data, equality deletes, or position deletes)
    pub fn content_type(&self) -> DataContentType {
        self.content
    }
    /// Get the file path as full URI with FS scheme
    pub fn file_path(&self) -> &str {
        &self.file_path
    }
    /// Get the file format of the file (avro, orc, parquet or puffin).
    pub fn file_format(&self) -> DataFileFormat {
        self.file_format
    }
    /// Get the partition values of the file.
    pub fn partition(&self) -> &Struct {
        &self.partition
    }
    /// Get the record count in the data file.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
    /// Get the file size in bytes.
    pub fn file_size_in_bytes(&self) -> u64 {
        self.file_size_in_bytes
    }
    /// Get the value counts for the data file.
    pub fn value_counts(&self) -> &HashMap<i32, u64> {
        &self.value_counts
    }
    /// Get the null value counts of the data file.
    pub fn null_value_counts(&self) -> &HashMap<i32, u64> {
        &self.null_value_counts
    }
    /// Get the nan value counts of the data file.
    pub fn nan_value_counts(&self) -> &HashMap<i32, u64> {
        &self.nan_value_counts
    }
    /// Get the lower bounds of the data file values per column.
    pub fn lower_bounds(&self) -> &HashMap<i32, Datum> {
        &self.lower_bounds
    }
    /// Get the upper bounds of the data file values per column.
    pub fn upper_bounds(&self) -> &HashMap<i32, Datum> {
        &self.upper_bounds
    }
    /// Get the equality ids of the data file.
    pub fn equality_ids(&self) -> Option<&[i32]> {
        self.equality_ids.as_deref()
    }
    /// Get the first row id in the data file.
    pub fn first_row_id(&self) -> Option<i64> {
        self.first_row_id
    }
    /// Get the partition spec id of the data file.
    pub fn partition_spec_id(&self) -> i32 {
        self.partition_spec_id
    }
    /// Get the referenced data file path.
    pub fn referenced_data_file(&self) -> Option<&str> {
        self.referenced_data_file.as_deref()
    }
    /// Get the offset of the deletion vector blob.
    pub fn content_offset(&self) -> Option<i64> {
        self.content_offset
    }
    /// Get the length of the deletion vector blob.
    pub fn content_size_in_bytes(&self) -> Option<i64> {
        self.content_size_in_bytes
    }

    /// Returns true for position and equality delete files.
    pub fn is_delete_file(&self) -> bool {
        self.content != DataContentType::Data
    }

    /// Returns true if this is a deletion vector, a position delete stored
    /// as a Puffin blob.
    pub fn is_dv(&self) -> bool {
        self.content == DataContentType::PositionDeletes
            && self.file_format == DataFileFormat::Puffin
    }

    pub(crate) fn with_first_row_id(mut self, first_row_id: Option<i64>) -> Self {
        self.first_row_id = first_row_id;
        self
    }

    /// Identity of this file within a [`DataFileSet`].
    pub fn key(&self) -> DataFileKey {
        DataFileKey {
            spec_id: self.partition_spec_id,
            partition: self.partition.clone(),
            file_path: self.file_path.clone(),
            content_offset: self.content_offset,
        }
    }
}

/// Type of content stored by the data file: data, equality deletes, or
/// position deletes (all v1 files are data files)
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize_repr, Deserialize_repr, Default)]
#[repr(u8)]
pub enum DataContentType {
    /// value: 0
    #[default]
    Data = 0,
    /// value: 1
    PositionDeletes = 1,
    /// value: 2
    EqualityDeletes = 2,
}

/// Format of this data.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFileFormat {
    /// Avro file format: <https://avro.apache.org/>
    Avro,
    /// Orc file format: <https://orc.apache.org/>
    Orc,
    /// Parquet file format: <https://parquet.apache.org/>
    Parquet,
    /// Puffin file format: <https://iceberg.apache.org/puffin-spec/>
    Puffin,
}

impl Display for DataFileFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFileFormat::Avro => write!(f, "avro"),
            DataFileFormat::Orc => write!(f, "orc"),
            DataFileFormat::Parquet => write!(f, "parquet"),
            DataFileFormat::Puffin => write!(f, "puffin"),
        }
    }
}

/// Identity of a content file: two descriptors of the same physical file
/// (or the same blob of a Puffin file) in the same partition are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataFileKey {
    spec_id: i32,
    partition: Struct,
    file_path: String,
    content_offset: Option<i64>,
}

/// Insertion-ordered set of content files, deduplicated by [`DataFileKey`].
#[derive(Debug, Clone, Default)]
pub struct DataFileSet {
    files: Vec<DataFile>,
    keys: HashSet<DataFileKey>,
}

impl DataFileSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, returns false if an equal file was already present.
    pub fn insert(&mut self, file: DataFile) -> bool {
        if self.keys.insert(file.key()) {
            self.files.push(file);
            true
        } else {
            false
        }
    }

    /// Check whether an equal file is in the set.
    pub fn contains(&self, file: &DataFile) -> bool {
        self.keys.contains(&file.key())
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the set holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate files in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, DataFile> {
        self.files.iter()
    }
}

impl Extend<DataFile> for DataFileSet {
    fn extend<T: IntoIterator<Item = DataFile>>(&mut self, iter: T) {
        for file in iter {
            self.insert(file);
        }
    }
}

impl FromIterator<DataFile> for DataFileSet {
    fn from_iter<T: IntoIterator<Item = DataFile>>(iter: T) -> Self {
        let mut set = DataFileSet::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for DataFileSet {
    type Item = DataFile;
    type IntoIter = std::vec::IntoIter<DataFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a DataFileSet {
    type Item = &'a DataFile;
    type IntoIter = std::slice::Iter<'a, DataFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn data_file(path: &str, region: &str) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::Data)
            .file_path(path)
            .file_format(DataFileFormat::Parquet)
            .partition(Struct::from_iter([Some(Datum::string(region))]))
            .record_count(10)
            .file_size_in_bytes(100)
            .build()
            .unwrap()
    }

    fn dv(path: &str, offset: i64, target: &str) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::PositionDeletes)
            .file_path(path)
            .file_format(DataFileFormat::Puffin)
            .record_count(1)
            .file_size_in_bytes(64)
            .referenced_data_file(target)
            .content_offset(offset)
            .content_size_in_bytes(16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_dedup_by_path_and_partition() {
        let mut set = DataFileSet::new();

        assert!(set.insert(data_file("s3://t/a.parquet", "us")));
        // Different metrics, same physical file.
        let mut same = data_file("s3://t/a.parquet", "us");
        same.record_count = 99;
        assert!(!set.insert(same));
        assert!(set.insert(data_file("s3://t/a.parquet", "eu")));

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.iter().map(|f| f.record_count()).collect::<Vec<_>>(),
            vec![10, 10]
        );
    }

    #[test]
    fn test_dv_blobs_in_one_puffin_file_are_distinct() {
        let set: DataFileSet = [
            dv("s3://t/dv.puffin", 4, "s3://t/a.parquet"),
            dv("s3://t/dv.puffin", 40, "s3://t/b.parquet"),
            dv("s3://t/dv.puffin", 4, "s3://t/a.parquet"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert!(set.iter().all(DataFile::is_dv));
    }

    #[test]
    fn test_json_round_trip_keeps_content_fields() {
        let file = dv("s3://t/dv.puffin", 4, "s3://t/a.parquet");
        let json = serde_json::to_string(&file).unwrap();

        let parsed: DataFile = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, file);
        assert_eq!(parsed.referenced_data_file(), Some("s3://t/a.parquet"));
        assert!(parsed.is_delete_file());
    }
}
