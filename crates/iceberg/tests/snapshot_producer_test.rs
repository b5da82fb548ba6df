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

//! Commits driven through the snapshot producer against an in-memory table.

mod common;

use std::collections::HashMap;

use common::{TestTable, data_file, dv, partition, position_delete};
use iceberg_commit::ErrorKind;
use iceberg_commit::delete_file_index::DeleteFileIndex;
use iceberg_commit::expr::Reference;
use iceberg_commit::spec::{Datum, FormatVersion, ManifestStatus, Operation, TableProperties};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_append_then_delete_by_row_filter() {
    let mut table = TestTable::new(FormatVersion::V2);
    let f1 = data_file("f1", "eu");
    let f2 = data_file("f2", "us");

    let mut append = table.producer(Operation::Append);
    append
        .add_data_file(f1.clone())
        .unwrap()
        .add_data_file(f2.clone())
        .unwrap();
    table.commit(&mut append).await.unwrap();

    assert_eq!(table.entries().await, vec![
        (f1.file_path().to_string(), ManifestStatus::Added, Some(1)),
        (f2.file_path().to_string(), ManifestStatus::Added, Some(1)),
    ]);
    let summary = &table.current_snapshot().unwrap().summary().additional_properties;
    assert_eq!(summary["added-data-files"], "2");
    assert_eq!(summary["total-data-files"], "2");

    let mut delete = table.producer(Operation::Delete);
    delete.delete_by_row_filter(Reference::new("region").equal_to(Datum::string("eu")));
    table.commit(&mut delete).await.unwrap();

    assert_eq!(table.entries().await, vec![
        (f1.file_path().to_string(), ManifestStatus::Deleted, Some(1)),
        (f2.file_path().to_string(), ManifestStatus::Existing, Some(1)),
    ]);
    let summary = &table.current_snapshot().unwrap().summary().additional_properties;
    assert_eq!(summary["deleted-data-files"], "1");
    assert_eq!(summary["total-data-files"], "1");
    assert!(!summary.contains_key("added-data-files"));
}

#[tokio::test]
async fn test_same_file_added_twice_is_committed_once() {
    let mut table = TestTable::new(FormatVersion::V2);
    let file = data_file("dup", "eu");

    let mut producer = table.producer(Operation::Append);
    producer
        .add_data_file(file.clone())
        .unwrap()
        .add_data_file(file.clone())
        .unwrap();
    table.commit(&mut producer).await.unwrap();

    assert_eq!(table.entries().await.len(), 1);
    assert_eq!(
        table.current_snapshot().unwrap().summary().additional_properties["added-data-files"],
        "1"
    );
}

#[tokio::test]
async fn test_delete_files_follow_format_version() {
    let base = data_file("base", "eu");

    let v1 = TestTable::new(FormatVersion::V1);
    let err = v1
        .producer(Operation::Overwrite)
        .add_delete_file(position_delete("p", "eu"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeatureUnsupported);

    let v2 = TestTable::new(FormatVersion::V2);
    let mut producer = v2.producer(Operation::Overwrite);
    assert!(producer.add_delete_file(position_delete("p", "eu")).is_ok());
    assert_eq!(
        producer.add_delete_file(dv("dv", &base)).unwrap_err().kind(),
        ErrorKind::FeatureUnsupported
    );

    let v3 = TestTable::new(FormatVersion::V3);
    let mut producer = v3.producer(Operation::Overwrite);
    assert!(producer.add_delete_file(dv("dv", &base)).is_ok());
    assert_eq!(
        producer
            .add_delete_file(position_delete("p", "eu"))
            .unwrap_err()
            .kind(),
        ErrorKind::FeatureUnsupported
    );
    assert!(producer.new_dv_refs().contains(base.file_path()));
}

#[tokio::test]
async fn test_deletes_apply_to_older_data_only() {
    let mut table = TestTable::new(FormatVersion::V2);

    let mut append = table.producer(Operation::Append);
    append.add_data_file(data_file("old", "eu")).unwrap();
    table.commit(&mut append).await.unwrap();

    let deletes = position_delete("p", "eu");
    let mut row_delta = table.producer(Operation::Overwrite);
    row_delta.add_delete_file(deletes.clone()).unwrap();
    table.commit(&mut row_delta).await.unwrap();
    let delete_sequence_number = table.current_snapshot().unwrap().sequence_number();

    let delete_manifests = table
        .current_snapshot()
        .unwrap()
        .delete_manifests(&table.file_io)
        .await
        .unwrap();
    let index = DeleteFileIndex::builder(table.file_io.clone(), delete_manifests)
        .specs_by_id(table.metadata.specs_by_id().clone())
        .schema(table.metadata.current_schema().clone())
        .build()
        .await
        .unwrap();

    let candidate = data_file("candidate", "eu");
    let paths = |seq: i64| {
        index
            .for_data_file(seq, &candidate)
            .into_iter()
            .map(|f| f.file_path().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(paths(delete_sequence_number - 1), vec![
        deletes.file_path().to_string()
    ]);
    assert!(paths(delete_sequence_number).is_empty());
    assert!(paths(delete_sequence_number + 1).is_empty());
    assert!(index.for_data_file(delete_sequence_number - 1, &data_file("other", "us")).is_empty());
}

#[tokio::test]
async fn test_small_manifests_are_merged_once() {
    let properties = HashMap::from([(
        TableProperties::PROPERTY_MANIFEST_MIN_MERGE_COUNT.to_string(),
        "2".to_string(),
    )]);
    let mut table = TestTable::with_properties(FormatVersion::V2, properties);

    let mut first = table.producer(Operation::Append);
    first.add_data_file(data_file("a", "eu")).unwrap();
    table.commit(&mut first).await.unwrap();
    assert_eq!(table.manifests().await.len(), 1);

    let mut second = table.producer(Operation::Append);
    second.add_data_file(data_file("b", "us")).unwrap();
    let parent = table.metadata.current_snapshot().cloned();

    let applied = second.apply(&table.metadata, parent.as_deref()).await.unwrap();
    let reapplied = second.apply(&table.metadata, parent.as_deref()).await.unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(
        applied.iter().map(|m| &m.manifest_path).collect::<Vec<_>>(),
        reapplied.iter().map(|m| &m.manifest_path).collect::<Vec<_>>()
    );

    table.commit_attempt(&mut second, 1).await.unwrap();
    let manifests = table.manifests().await;
    assert_eq!(manifests.len(), 1);
    assert!(table.file_io.exists(&manifests[0].manifest_path).await.unwrap());

    let statuses: Vec<ManifestStatus> = table.entries().await.into_iter().map(|e| e.1).collect();
    assert_eq!(statuses, vec![ManifestStatus::Existing, ManifestStatus::Added]);
}

#[tokio::test]
async fn test_missing_files_to_delete_fail_the_commit() {
    let mut table = TestTable::new(FormatVersion::V2);
    let kept = data_file("kept", "eu");

    let mut append = table.producer(Operation::Append);
    append.add_data_file(kept.clone()).unwrap();
    table.commit(&mut append).await.unwrap();

    let missing = data_file("missing", "eu");
    let mut delete = table.producer(Operation::Delete);
    delete
        .fail_missing_delete_paths()
        .delete_data_file(kept.clone())
        .delete_data_file(missing.clone());
    let err = table.commit(&mut delete).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(
        err.message(),
        format!("Missing required files to delete: {}", missing.file_path())
    );

    let mut delete = table.producer(Operation::Delete);
    delete
        .fail_missing_delete_paths()
        .delete_by_path(kept.file_path());
    table.commit(&mut delete).await.unwrap();
    assert_eq!(table.entries().await, vec![(
        kept.file_path().to_string(),
        ManifestStatus::Deleted,
        Some(1)
    )]);
}

/// Commits one data file and one position delete file per region.
async fn table_with_deletes() -> TestTable {
    let mut table = TestTable::new(FormatVersion::V2);
    let mut append = table.producer(Operation::Append);
    append
        .add_data_file(data_file("eu", "eu"))
        .unwrap()
        .add_data_file(data_file("us", "us"))
        .unwrap();
    table.commit(&mut append).await.unwrap();

    let mut row_delta = table.producer(Operation::Overwrite);
    row_delta
        .add_delete_file(position_delete("eu", "eu"))
        .unwrap()
        .add_delete_file(position_delete("us", "us"))
        .unwrap();
    table.commit(&mut row_delta).await.unwrap();
    table
}

fn expected_after_eu_removal() -> Vec<(String, ManifestStatus, Option<i64>)> {
    vec![
        (position_delete("eu", "eu").file_path().to_string(), ManifestStatus::Deleted, Some(2)),
        (data_file("eu", "eu").file_path().to_string(), ManifestStatus::Deleted, Some(1)),
        (position_delete("us", "us").file_path().to_string(), ManifestStatus::Existing, Some(2)),
        (data_file("us", "us").file_path().to_string(), ManifestStatus::Existing, Some(1)),
    ]
}

#[tokio::test]
async fn test_drop_partition_removes_its_delete_files() {
    let mut table = table_with_deletes().await;

    let mut delete = table.producer(Operation::Delete);
    delete.drop_partition(0, partition("eu"));
    table.commit(&mut delete).await.unwrap();

    assert_eq!(table.entries().await, expected_after_eu_removal());
    let summary = &table.current_snapshot().unwrap().summary().additional_properties;
    assert_eq!(summary["deleted-data-files"], "1");
    assert_eq!(summary["removed-delete-files"], "1");
    assert_eq!(summary["total-data-files"], "1");
    assert_eq!(summary["total-delete-files"], "1");
}

#[tokio::test]
async fn test_row_filter_removes_matching_delete_files() {
    let mut table = table_with_deletes().await;

    let mut delete = table.producer(Operation::Delete);
    delete.delete_by_row_filter(Reference::new("region").equal_to(Datum::string("eu")));
    table.commit(&mut delete).await.unwrap();

    assert_eq!(table.entries().await, expected_after_eu_removal());
    let summary = &table.current_snapshot().unwrap().summary().additional_properties;
    assert_eq!(summary["removed-delete-files"], "1");
    assert_eq!(summary["total-delete-files"], "1");
}

#[tokio::test]
async fn test_row_filter_binding_follows_case_sensitivity() {
    let mut table = table_with_deletes().await;
    let filter = Reference::new("REGION").equal_to(Datum::string("eu"));

    let mut delete = table.producer(Operation::Delete);
    delete.delete_by_row_filter(filter.clone());
    let err = table.commit(&mut delete).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataInvalid);

    let mut delete = table.producer(Operation::Delete);
    delete.case_sensitive(false).delete_by_row_filter(filter);
    table.commit(&mut delete).await.unwrap();
    assert_eq!(table.entries().await, expected_after_eu_removal());
}
