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

//! Conflict checks between a pending commit and the snapshots committed
//! since it started.

mod common;

use common::{TestTable, data_file, dv};
use iceberg_commit::ErrorKind;
use iceberg_commit::expr::Reference;
use iceberg_commit::runtime::WorkerPool;
use iceberg_commit::spec::{Datum, FormatVersion, Operation};
use iceberg_commit::transaction::SnapshotValidator;
use pretty_assertions::assert_eq;

async fn append(table: &mut TestTable, name: &str, region: &str) -> i64 {
    let mut producer = table.producer(Operation::Append);
    producer.add_data_file(data_file(name, region)).unwrap();
    table.commit(&mut producer).await.unwrap()
}

fn validator(table: &TestTable) -> SnapshotValidator {
    SnapshotValidator::new(table.file_io.clone(), WorkerPool::in_process())
}

#[tokio::test]
async fn test_concurrent_appends_are_found_by_filter() {
    let mut table = TestTable::new(FormatVersion::V2);
    let s1 = append(&mut table, "s1", "eu").await;
    let s2 = append(&mut table, "s2", "us").await;
    append(&mut table, "s3", "eu").await;

    let validator = validator(&table);
    let eu = Reference::new("region").equal_to(Datum::string("eu"));
    let us = Reference::new("region").equal_to(Datum::string("us"));

    let err = validator
        .validate_added_data_files(&table.metadata, Some(s1), &eu, table.current_snapshot())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(
        err.message(),
        format!(
            "Found conflicting files that can contain records matching region = eu: [{}]",
            data_file("s3", "eu").file_path()
        )
    );

    assert!(
        validator
            .validate_added_data_files(&table.metadata, Some(s1), &us, table.current_snapshot())
            .await
            .is_err()
    );
    validator
        .validate_added_data_files(&table.metadata, Some(s2), &us, table.current_snapshot())
        .await
        .unwrap();

    // Nothing committed since the operation started.
    let latest = table.current_snapshot().unwrap().snapshot_id();
    validator
        .validate_added_data_files(&table.metadata, Some(latest), &eu, table.current_snapshot())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_history_fails_validation() {
    let mut table = TestTable::new(FormatVersion::V2);
    let s1 = append(&mut table, "s1", "eu").await;
    let s2 = append(&mut table, "s2", "eu").await;
    let s3 = append(&mut table, "s3", "eu").await;
    table.metadata.remove_snapshots(&[s2]).unwrap();

    let err = validator(&table)
        .validate_added_data_files(
            &table.metadata,
            Some(s1),
            &Reference::new("region").equal_to(Datum::string("us")),
            table.current_snapshot(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(
        err.message(),
        format!("Cannot determine history between starting snapshot {s1} and the last known ancestor {s3}")
    );
}

#[tokio::test]
async fn test_only_one_writer_can_add_a_dv_for_a_file() {
    let mut table = TestTable::new(FormatVersion::V3);
    let target = data_file("target", "eu");
    let mut producer = table.producer(Operation::Append);
    producer.add_data_file(target.clone()).unwrap();
    let start = table.commit(&mut producer).await.unwrap();

    // Both writers start from the same snapshot.
    let mut first = table.producer(Operation::Overwrite);
    first.add_delete_file(dv("first", &target)).unwrap();
    let mut second = table.producer(Operation::Overwrite);
    second.add_delete_file(dv("second", &target)).unwrap();

    first
        .validate_added_dvs(&table.metadata, Some(start), None, table.current_snapshot())
        .await
        .unwrap();
    table.commit(&mut first).await.unwrap();

    let err = second
        .validate_added_dvs(&table.metadata, Some(start), None, table.current_snapshot())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert!(
        err.message().starts_with(&format!(
            "Found concurrently added DV for {}: DV{{location={}",
            target.file_path(),
            dv("first", &target).file_path()
        )),
        "{}",
        err.message()
    );

    // A DV for another file doesn't conflict.
    let other = data_file("other", "eu");
    let mut third = table.producer(Operation::Overwrite);
    third.add_delete_file(dv("third", &other)).unwrap();
    third
        .validate_added_dvs(&table.metadata, Some(start), None, table.current_snapshot())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_delete_of_rewritten_file() {
    let mut table = TestTable::new(FormatVersion::V2);
    let target = data_file("target", "eu");
    let mut producer = table.producer(Operation::Append);
    producer.add_data_file(target.clone()).unwrap();
    let start = table.commit(&mut producer).await.unwrap();

    let mut delete = table.producer(Operation::Delete);
    delete.delete_data_file(target.clone());
    table.commit(&mut delete).await.unwrap();

    let validator = validator(&table);
    let err = validator
        .validate_deleted_data_files(
            &table.metadata,
            Some(start),
            &Reference::new("region").equal_to(Datum::string("eu")),
            table.current_snapshot(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    let referenced = [target.file_path().to_string()].into_iter().collect();
    let err = validator
        .validate_data_files_exist(
            &table.metadata,
            Some(start),
            &referenced,
            false,
            None,
            table.current_snapshot(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.message(),
        format!("Cannot commit, missing data files: [{}]", target.file_path())
    );
}
