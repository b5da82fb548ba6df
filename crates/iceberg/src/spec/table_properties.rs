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
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{Error, ErrorKind, Result};

// Helper function to parse a property from a HashMap
// If the property is not found, use the default value
fn parse_property<T: FromStr>(
    properties: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T>
where
    <T as FromStr>::Err: Display,
{
    properties.get(key).map_or(Ok(default), |value| {
        value.trim().parse::<T>().map_err(|e| {
            Error::new(
                ErrorKind::DataInvalid,
                format!("Invalid value for {key}: {e}"),
            )
            .with_context("value", value)
        })
    })
}

/// Table properties that drive manifest production for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProperties {
    /// Target size of merged manifests.
    pub manifest_target_size_bytes: u64,
    /// Minimum number of manifests in a bin before it's merged.
    pub manifest_min_count_to_merge: usize,
    /// Whether manifests are merged on commit.
    pub manifest_merge_enabled: bool,
    /// Maximum number of changed partitions reported in a snapshot summary.
    pub write_summary_partition_limit: u64,
    /// Whether manifests appended to a v1 table may inherit the snapshot id.
    pub snapshot_id_inheritance_enabled: bool,
}

impl TableProperties {
    /// Target size when merging manifest files.
    pub const PROPERTY_MANIFEST_TARGET_SIZE_BYTES: &str = "commit.manifest.target-size-bytes";
    /// Default target size of merged manifests, 8 MiB.
    pub const PROPERTY_MANIFEST_TARGET_SIZE_BYTES_DEFAULT: u64 = 8 * 1024 * 1024;

    /// Minimum number of manifests to accumulate before merging.
    pub const PROPERTY_MANIFEST_MIN_MERGE_COUNT: &str = "commit.manifest.min-count-to-merge";
    /// Default minimum number of manifests to merge.
    pub const PROPERTY_MANIFEST_MIN_MERGE_COUNT_DEFAULT: usize = 100;

    /// Whether to merge manifests on commit.
    pub const PROPERTY_MANIFEST_MERGE_ENABLED: &str = "commit.manifest-merge.enabled";
    /// Manifests are merged by default.
    pub const PROPERTY_MANIFEST_MERGE_ENABLED_DEFAULT: bool = true;

    /// Maximum number of changed partitions for which summaries are written.
    pub const PROPERTY_WRITE_PARTITION_SUMMARY_LIMIT: &str = "write.summary.partition-limit";
    /// Partition summaries are disabled by default.
    pub const PROPERTY_WRITE_PARTITION_SUMMARY_LIMIT_DEFAULT: u64 = 0;

    /// Whether snapshot id inheritance is enabled for v1 tables.
    pub const PROPERTY_SNAPSHOT_ID_INHERITANCE_ENABLED: &str =
        "compatibility.snapshot-id-inheritance.enabled";
    /// Snapshot id inheritance is disabled by default for v1 tables.
    pub const PROPERTY_SNAPSHOT_ID_INHERITANCE_ENABLED_DEFAULT: bool = false;
}

impl TryFrom<&HashMap<String, String>> for TableProperties {
    // parse by entry key or use default value
    type Error = Error;

    fn try_from(props: &HashMap<String, String>) -> Result<Self> {
        Ok(TableProperties {
            manifest_target_size_bytes: parse_property(
                props,
                TableProperties::PROPERTY_MANIFEST_TARGET_SIZE_BYTES,
                TableProperties::PROPERTY_MANIFEST_TARGET_SIZE_BYTES_DEFAULT,
            )?,
            manifest_min_count_to_merge: parse_property(
                props,
                TableProperties::PROPERTY_MANIFEST_MIN_MERGE_COUNT,
                TableProperties::PROPERTY_MANIFEST_MIN_MERGE_COUNT_DEFAULT,
            )?,
            manifest_merge_enabled: parse_property(
                props,
                TableProperties::PROPERTY_MANIFEST_MERGE_ENABLED,
                TableProperties::PROPERTY_MANIFEST_MERGE_ENABLED_DEFAULT,
            )?,
            write_summary_partition_limit: parse_property(
                props,
                TableProperties::PROPERTY_WRITE_PARTITION_SUMMARY_LIMIT,
                TableProperties::PROPERTY_WRITE_PARTITION_SUMMARY_LIMIT_DEFAULT,
            )?,
            snapshot_id_inheritance_enabled: parse_property(
                props,
                TableProperties::PROPERTY_SNAPSHOT_ID_INHERITANCE_ENABLED,
                TableProperties::PROPERTY_SNAPSHOT_ID_INHERITANCE_ENABLED_DEFAULT,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_table_properties_default() {
        let props = HashMap::new();
        let table_properties = TableProperties::try_from(&props).unwrap();
        assert_eq!(table_properties, TableProperties {
            manifest_target_size_bytes: 8 * 1024 * 1024,
            manifest_min_count_to_merge: 100,
            manifest_merge_enabled: true,
            write_summary_partition_limit: 0,
            snapshot_id_inheritance_enabled: false,
        });
    }

    #[test]
    fn test_table_properties_valid() {
        let props = HashMap::from([
            (
                TableProperties::PROPERTY_MANIFEST_TARGET_SIZE_BYTES.to_string(),
                "1024".to_string(),
            ),
            (
                TableProperties::PROPERTY_MANIFEST_MIN_MERGE_COUNT.to_string(),
                "2".to_string(),
            ),
            (
                TableProperties::PROPERTY_MANIFEST_MERGE_ENABLED.to_string(),
                "false".to_string(),
            ),
            (
                TableProperties::PROPERTY_WRITE_PARTITION_SUMMARY_LIMIT.to_string(),
                "10".to_string(),
            ),
        ]);
        let table_properties = TableProperties::try_from(&props).unwrap();
        assert_eq!(table_properties.manifest_target_size_bytes, 1024);
        assert_eq!(table_properties.manifest_min_count_to_merge, 2);
        assert!(!table_properties.manifest_merge_enabled);
        assert_eq!(table_properties.write_summary_partition_limit, 10);
    }

    #[test]
    fn test_table_properties_invalid() {
        let invalid_entries = [
            (TableProperties::PROPERTY_MANIFEST_TARGET_SIZE_BYTES, "-1"),
            (TableProperties::PROPERTY_MANIFEST_MIN_MERGE_COUNT, "many"),
            (TableProperties::PROPERTY_MANIFEST_MERGE_ENABLED, "yes"),
        ];

        for (key, value) in invalid_entries {
            let props = HashMap::from([(key.to_string(), value.to_string())]);
            let err = TableProperties::try_from(&props).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DataInvalid);
            assert!(err.message().contains(key));
        }
    }
}
