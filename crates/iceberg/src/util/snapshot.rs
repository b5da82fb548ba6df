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

//! Snapshot ancestry traversal.

use crate::spec::{SnapshotRef, TableMetadata};

/// Iterator over a snapshot and its ancestors, newest first.
///
/// The walk stops when a parent id is missing or can't be found in the
/// table metadata, e.g. because it has been expired.
pub struct Ancestors<'a> {
    metadata: &'a TableMetadata,
    next: Option<SnapshotRef>,
}

impl Iterator for Ancestors<'_> {
    type Item = SnapshotRef;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current
            .parent_snapshot_id()
            .and_then(|id| self.metadata.snapshot_by_id(id))
            .cloned();
        Some(current)
    }
}

/// Iterate starting from `snapshot_id` (inclusive) to the root snapshot.
pub fn ancestors_of(metadata: &TableMetadata, snapshot_id: i64) -> Ancestors<'_> {
    Ancestors {
        metadata,
        next: metadata.snapshot_by_id(snapshot_id).cloned(),
    }
}

/// Iterate starting from `latest_snapshot_id` (inclusive) to
/// `oldest_snapshot_id` (exclusive).
///
/// When `oldest_snapshot_id` is not an ancestor of `latest_snapshot_id` the
/// iterator yields the whole ancestry of `latest_snapshot_id`. Callers that
/// need to know whether the oldest snapshot was reached must check the parent
/// of the last yielded snapshot.
pub fn ancestors_between(
    metadata: &TableMetadata,
    latest_snapshot_id: i64,
    oldest_snapshot_id: Option<i64>,
) -> impl Iterator<Item = SnapshotRef> + '_ {
    ancestors_of(metadata, latest_snapshot_id)
        .take_while(move |snapshot| Some(snapshot.snapshot_id()) != oldest_snapshot_id)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::tests::metadata_with_snapshot_chain;

    fn ids(iter: impl Iterator<Item = SnapshotRef>) -> Vec<i64> {
        iter.map(|s| s.snapshot_id()).collect()
    }

    #[test]
    fn test_ancestors_of() {
        let metadata = metadata_with_snapshot_chain(&[(1, None), (2, Some(1)), (3, Some(2))]);

        assert_eq!(ids(ancestors_of(&metadata, 3)), vec![3, 2, 1]);
        assert_eq!(ids(ancestors_of(&metadata, 1)), vec![1]);
        assert!(ids(ancestors_of(&metadata, 42)).is_empty());
    }

    #[test]
    fn test_ancestors_between() {
        let metadata = metadata_with_snapshot_chain(&[(1, None), (2, Some(1)), (3, Some(2))]);

        assert_eq!(ids(ancestors_between(&metadata, 3, Some(1))), vec![3, 2]);
        assert_eq!(ids(ancestors_between(&metadata, 3, None)), vec![3, 2, 1]);
        assert!(ids(ancestors_between(&metadata, 3, Some(3))).is_empty());
    }

    #[test]
    fn test_walk_stops_at_expired_parent() {
        // Snapshot 2 was expired, 3 still points at it.
        let metadata = metadata_with_snapshot_chain(&[(1, None), (3, Some(2))]);

        assert_eq!(ids(ancestors_between(&metadata, 3, Some(1))), vec![3]);
    }
}
