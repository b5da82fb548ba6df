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

const ROWS_MUST_MATCH: Result<bool> = Ok(true);
const ROWS_MIGHT_NOT_MATCH: Result<bool> = Ok(false);

/// Evaluates a bound predicate on a [`DataFile`] to test whether all rows in the file match.
///
/// This evaluation is strict: it returns true if all rows in a file must match the expression.
/// For example, if a file's ts column has min X and max Y, this evaluator will return true for ts
/// &lt; Y+1 but not for ts &lt; Y-1.
pub(crate) struct StrictMetricsEvaluator<'a> {
    metrics: FileMetrics<'a>,
}

impl<'a> StrictMetricsEvaluator<'a> {
    /// Returns true only when every row of `data_file` must match `filter`.
    pub(crate) fn eval(
        filter: &BoundPredicate,
        data_file: &'a DataFile,
        spec: &'a PartitionSpec,
    ) -> Result<bool> {
        if data_file.record_count() == 0 {
            return ROWS_MUST_MATCH;
        }

        let mut evaluator = Self {
            metrics: FileMetrics::new(data_file, spec),
        };
        visit(&mut evaluator, filter)
    }

    fn visit_inequality(
        &mut self,
        reference: &BoundReference,
        datum: &Datum,
        cmp_fn: fn(&Datum, &Datum) -> bool,
        use_lower_bound: bool,
    ) -> Result<bool> {
        let field_id = reference.field().id;

        if self.metrics.may_contain_null(field_id) || self.metrics.may_contain_nan(reference) {
            return ROWS_MIGHT_NOT_MATCH;
        }

        let bound = if use_lower_bound {
            self.metrics.lower_bound(field_id)
        } else {
            self.metrics.upper_bound(field_id)
        };

        match bound {
            Some(bound) if !bound.is_nan() && cmp_fn(bound, datum) => ROWS_MUST_MATCH,
            _ => ROWS_MIGHT_NOT_MATCH,
        }
    }
}

impl BoundPredicateVisitor for StrictMetricsEvaluator<'_> {
    type T = bool;

    fn always_true(&mut self) -> Result<bool> {
        ROWS_MUST_MATCH
    }

    fn always_false(&mut self) -> Result<bool> {
        ROWS_MIGHT_NOT_MATCH
    }

    fn and(&mut self, lhs: bool, rhs: bool) -> Result<bool> {
        Ok(lhs && rhs)
    }

    fn or(&mut self, lhs: bool, rhs: bool) -> Result<bool> {
        Ok(lhs || rhs)
    }

    fn is_null(&mut self, reference: &BoundReference) -> Result<bool> {
        if self.metrics.contains_nulls_only(reference.field().id) {
            return ROWS_MUST_MATCH;
        }
        ROWS_MIGHT_NOT_MATCH
    }

    fn not_null(&mut self, reference: &BoundReference) -> Result<bool> {
        match self.metrics.null_count(reference.field().id) {
            Some(0) => ROWS_MUST_MATCH,
            _ => ROWS_MIGHT_NOT_MATCH,
        }
    }

    fn less_than(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        self.visit_inequality(reference, datum, PartialOrd::lt, false)
    }

    fn less_than_or_eq(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        self.visit_inequality(reference, datum, PartialOrd::le, false)
    }

    fn greater_than(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        self.visit_inequality(reference, datum, PartialOrd::gt, true)
    }

    fn greater_than_or_eq(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        self.visit_inequality(reference, datum, PartialOrd::ge, true)
    }

    fn eq(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        let field_id = reference.field().id;

        if self.metrics.may_contain_null(field_id) || self.metrics.may_contain_nan(reference) {
            return ROWS_MIGHT_NOT_MATCH;
        }

        // For an equality predicate to hold strictly, we must have:
        //     lower == literal == upper.
        match (
            self.metrics.lower_bound(field_id),
            self.metrics.upper_bound(field_id),
        ) {
            (Some(lower), Some(upper)) if lower == datum && upper == datum => ROWS_MUST_MATCH,
            _ => ROWS_MIGHT_NOT_MATCH,
        }
    }

    fn not_eq(&mut self, reference: &BoundReference, datum: &Datum) -> Result<bool> {
        let field_id = reference.field().id;

        if self.metrics.contains_nulls_only(field_id) || self.metrics.contains_nans_only(field_id)
        {
            return ROWS_MUST_MATCH;
        }

        if let Some(lower) = self.metrics.lower_bound(field_id) {
            if lower.is_nan() {
                return ROWS_MIGHT_NOT_MATCH;
            }
            if lower > datum {
                return ROWS_MUST_MATCH;
            }
        }

        if let Some(upper) = self.metrics.upper_bound(field_id) {
            if upper.is_nan() {
                return ROWS_MIGHT_NOT_MATCH;
            }
            if upper < datum {
                return ROWS_MUST_MATCH;
            }
        }

        ROWS_MIGHT_NOT_MATCH
    }

    fn r#in(&mut self, reference: &BoundReference, literals: &FnvHashSet<Datum>) -> Result<bool> {
        let field_id = reference.field().id;

        if self.metrics.may_contain_null(field_id) || self.metrics.may_contain_nan(reference) {
            return ROWS_MIGHT_NOT_MATCH;
        }

        match (
            self.metrics.lower_bound(field_id),
            self.metrics.upper_bound(field_id),
        ) {
            (Some(lower), Some(upper)) if lower == upper && literals.contains(lower) => {
                ROWS_MUST_MATCH
            }
            _ => ROWS_MIGHT_NOT_MATCH,
        }
    }

    fn not_in(
        &mut self,
        reference: &BoundReference,
        literals: &FnvHashSet<Datum>,
    ) -> Result<bool> {
        let field_id = reference.field().id;

        if self.metrics.contains_nulls_only(field_id) || self.metrics.contains_nans_only(field_id)
        {
            return ROWS_MUST_MATCH;
        }

        let mut remaining: Vec<&Datum> = literals.iter().collect();

        if let Some(lower) = self.metrics.lower_bound(field_id) {
            if lower.is_nan() {
                return ROWS_MIGHT_NOT_MATCH;
            }
            remaining.retain(|val| *val >= lower);
            if remaining.is_empty() {
                return ROWS_MUST_MATCH;
            }
        }

        if let Some(upper) = self.metrics.upper_bound(field_id) {
            remaining.retain(|val| *val <= upper);
            if remaining.is_empty() {
                return ROWS_MUST_MATCH;
            }
        }

        ROWS_MIGHT_NOT_MATCH
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::expr::{Predicate, Reference};
    use crate::spec::{
        DataContentType, DataFileBuilder, DataFileFormat, NestedField, PrimitiveType, Schema,
        Struct, Transform,
    };

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .with_fields(vec![
                    NestedField::required(1, "id", PrimitiveType::Long).into(),
                    NestedField::optional(2, "region", PrimitiveType::String).into(),
                    NestedField::optional(3, "score", PrimitiveType::Double).into(),
                    NestedField::optional(4, "note", PrimitiveType::String).into(),
                ])
                .build()
                .unwrap(),
        )
    }

    fn file(record_count: u64) -> DataFile {
        DataFileBuilder::default()
            .content(DataContentType::Data)
            .file_path("memory:///t/data/a.parquet")
            .file_format(DataFileFormat::Parquet)
            .record_count(record_count)
            .file_size_in_bytes(100)
            .value_counts(HashMap::from([(1, record_count), (3, record_count), (4, record_count)]))
            .null_value_counts(HashMap::from([(1, 0), (3, 0), (4, record_count)]))
            .lower_bounds(HashMap::from([(1, Datum::long(10)), (3, Datum::double(1.0))]))
            .upper_bounds(HashMap::from([(1, Datum::long(20)), (3, Datum::double(2.0))]))
            .build()
            .unwrap()
    }

    fn eval(filter: Predicate, data_file: &DataFile, spec: &PartitionSpec) -> bool {
        let bound = filter.bind(&schema(), true).unwrap();
        StrictMetricsEvaluator::eval(&bound, data_file, spec).unwrap()
    }

    #[test]
    fn test_empty_file_always_matches() {
        let spec = PartitionSpec::unpartition_spec();
        assert!(eval(Predicate::AlwaysFalse, &file(0), &spec));
    }

    #[test]
    fn test_inequalities() {
        let spec = PartitionSpec::unpartition_spec();
        let f = file(10);
        assert!(eval(Reference::new("id").less_than(Datum::long(21)), &f, &spec));
        assert!(!eval(Reference::new("id").less_than(Datum::long(20)), &f, &spec));
        assert!(eval(Reference::new("id").less_than_or_equal_to(Datum::long(20)), &f, &spec));
        assert!(eval(Reference::new("id").greater_than(Datum::long(9)), &f, &spec));
        assert!(!eval(Reference::new("id").greater_than(Datum::long(10)), &f, &spec));
        assert!(eval(Reference::new("id").greater_than_or_equal_to(Datum::long(10)), &f, &spec));
        assert!(!eval(Reference::new("id").equal_to(Datum::long(10)), &f, &spec));
        assert!(eval(Reference::new("id").not_equal_to(Datum::long(25)), &f, &spec));
        assert!(!eval(Reference::new("id").not_equal_to(Datum::long(15)), &f, &spec));
        assert!(eval(
            Reference::new("id").is_not_in(vec![Datum::long(1), Datum::long(25)]),
            &f,
            &spec
        ));
    }

    #[test]
    fn test_nan_count_unknown_for_floating_column() {
        let spec = PartitionSpec::unpartition_spec();
        let f = file(10);
        assert!(!eval(Reference::new("score").less_than(Datum::double(5.0)), &f, &spec));
    }

    #[test]
    fn test_nulls() {
        let spec = PartitionSpec::unpartition_spec();
        let f = file(10);
        assert!(eval(Reference::new("note").is_null(), &f, &spec));
        assert!(eval(Reference::new("note").not_equal_to(Datum::string("x")), &f, &spec));
        assert!(!eval(Reference::new("note").is_not_null(), &f, &spec));
        assert!(!eval(Reference::new("region").is_null(), &f, &spec));
    }

    #[test]
    fn test_identity_partition_matches_whole_file() {
        let spec = PartitionSpec::builder(schema())
            .add_partition_field("region", "region", Transform::Identity)
            .unwrap()
            .build();
        let mut f = file(10);
        f.partition = Struct::from_iter([Some(Datum::string("us"))]);

        assert!(eval(Reference::new("region").equal_to(Datum::string("us")), &f, &spec));
        assert!(eval(
            Reference::new("region").is_in(vec![Datum::string("us"), Datum::string("eu")]),
            &f,
            &spec
        ));
        assert!(!eval(Reference::new("region").equal_to(Datum::string("eu")), &f, &spec));
        assert!(eval(
            Reference::new("region")
                .equal_to(Datum::string("us"))
                .and(Reference::new("id").greater_than_or_equal_to(Datum::long(10))),
            &f,
            &spec
        ));
    }
}
