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

use fnv::FnvHashSet;

use crate::expr::visitors::{visit, BoundPredicateVisitor, FileMetrics};
use crate::expr::{BoundPredicate, BoundReference};
use crate::spec::{DataFile, Datum, PartitionSpec};
use crate::Result;

const ROWS_MIGHT_MATCH: Result<bool> = Ok(true);
const ROWS_CANNOT_MATCH: Result<bool> = Ok(false);

/// Evaluates a bound predicate on a [`DataFile`] to test whether any row
/// in the file may match.
///
/// This evaluation is inclusive: it returns true if a file may match and
/// false if it cannot. Bounds of identity partition columns come from the
/// partition tuple.
pub(crate) struct InclusiveMetricsEvaluator<'a> {
    metrics: FileMetrics<'a>,
}

impl<'a> InclusiveMetricsEvaluator<'a> {
    /// Returns false when no row of `data_file` can match `filter`.
    pub(crate) fn eval(
        filter: &BoundPredicate,
        data_file: &'a DataFile,
        spec: &'a PartitionSpec,
    ) -> Result<bool> {
        if data_file.record_count() == 0 {
            return ROWS_CANNOT_MATCH;
        }

        let mut evaluator = Self {
            metrics: FileMetrics::new(data_file, spec),
        };
        visit(&mut evaluator, filter)
    }

    fn nulls_or_nans_only(&self, field_id: i32) -> bool {
        self.metrics.contains_nulls_only(field_id) || self.metrics.contains_nans_only(field_id)
    }
}

impl BoundPredicateVisitor for InclusiveMetricsEvaluator<'_> {
    type T = bool;

    fn always_true(&mut self) -> Result<bool> {
        ROWS_MIGHT_MATCH
    }

    fn always_false(&mut self) -> Result<bool> {
        ROWS_CANNOT_MATCH
    }

    fn and(&mut self, lhs: bool, rhs: bool) -> Result<bool> {
        Ok(lhs && rhs)
    }

    fn or(&mut self, lhs: bool, rhs: bool) -> Result<bool> {
        Ok(lhs || rhs)
    }

    fn is_null(&mut self, reference: &BoundReference) -> Result<bool> {
        match self.metrics.null_count(reference.field().id) {
            Some(0) => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn not_null(&mut self, reference: &BoundReference) -> Result<bool> {
        if self.metrics.contains_nulls_only(reference.field().id) {
            return ROWS_CANNOT_MATCH;
        }
        ROWS_MIGHT_MATCH
    }

    fn less_than(&mut self, reference: &BoundReference, literal: &Datum) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }
        match self.metrics.lower_bound(field_id) {
            Some(lower) if lower.is_nan() => ROWS_MIGHT_MATCH,
            Some(lower) if lower >= literal => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn less_than_or_eq(&mut self, reference: &BoundReference, literal: &Datum) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }
        match self.metrics.lower_bound(field_id) {
            Some(lower) if lower.is_nan() => ROWS_MIGHT_MATCH,
            Some(lower) if lower > literal => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn greater_than(&mut self, reference: &BoundReference, literal: &Datum) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }
        match self.metrics.upper_bound(field_id) {
            Some(upper) if upper <= literal => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn greater_than_or_eq(&mut self, reference: &BoundReference, literal: &Datum) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }
        match self.metrics.upper_bound(field_id) {
            Some(upper) if upper < literal => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn eq(&mut self, reference: &BoundReference, literal: &Datum) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }

        if let Some(lower) = self.metrics.lower_bound(field_id) {
            if lower.is_nan() {
                return ROWS_MIGHT_MATCH;
            }
            if lower > literal {
                return ROWS_CANNOT_MATCH;
            }
        }

        match self.metrics.upper_bound(field_id) {
            Some(upper) if upper < literal => ROWS_CANNOT_MATCH,
            _ => ROWS_MIGHT_MATCH,
        }
    }

    fn not_eq(&mut self, _reference: &BoundReference, _literal: &Datum) -> Result<bool> {
        // Bounds cannot prove every row equals the literal.
        ROWS_MIGHT_MATCH
    }

    fn r#in(&mut self, reference: &BoundReference, literals: &FnvHashSet<Datum>) -> Result<bool> {
        let field_id = reference.field().id;
        if self.nulls_or_nans_only(field_id) {
            return ROWS_CANNOT_MATCH;
        }

        let mut candidates: Vec<&Datum> = literals.iter().collect();
        if let Some(lower) = self.metrics.lower_bound(field_id) {
            if lower.is_nan() {
                return ROWS_MIGHT_MATCH;
            }
            candidates.retain(|v| *v >= lower);
            if candidates.is_empty() {
                return ROWS_CANNOT_MATCH;
            }
        }

        if let Some(upper) = self.metrics.upper_bound(field_id) {
            candidates.retain(|v| *v <= upper);
            if candidates.is_empty() {
                return ROWS_CANNOT_MATCH;
            }
        }

        ROWS_MIGHT_MATCH
    }

    fn not_in(
        &mut self,
        _reference: &BoundReference,
        _literals: &FnvHashSet<Datum>,
    ) -> Result<bool> {
        ROWS_MIGHT_MATCH
    }
}
