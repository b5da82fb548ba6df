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

//! Visitors evaluating bound predicates against file metrics.

pub(crate) mod inclusive_metrics_evaluator;
pub(crate) mod strict_metrics_evaluator;

use fnv::FnvHashSet;

use crate::expr::{BoundPredicate, BoundReference, PredicateOperator};
use crate::spec::{DataFile, Datum, PartitionSpec, PrimitiveType};
use crate::Result;

/// A visitor for [`BoundPredicate`]s. Visits in post-order.
pub trait BoundPredicateVisitor {
    /// The return type of this visitor
    type T;

    /// Called after an `AlwaysTrue` predicate is visited
    fn always_true(&mut self) -> Result<Self::T>;

    /// Called after an `AlwaysFalse` predicate is visited
    fn always_false(&mut self) -> Result<Self::T>;

    /// Called after an `And` predicate is visited
    fn and(&mut self, lhs: Self::T, rhs: Self::T) -> Result<Self::T>;

    /// Called after an `Or` predicate is visited
    fn or(&mut self, lhs: Self::T, rhs: Self::T) -> Result<Self::T>;

    /// Called after a predicate with an `IsNull` operator is visited
    fn is_null(&mut self, reference: &BoundReference) -> Result<Self::T>;

    /// Called after a predicate with a `NotNull` operator is visited
    fn not_null(&mut self, reference: &BoundReference) -> Result<Self::T>;

    /// Called after a predicate with a `LessThan` operator is visited
    fn less_than(&mut self, reference: &BoundReference, literal: &Datum) -> Result<Self::T>;

    /// Called after a predicate with a `LessThanOrEq` operator is visited
    fn less_than_or_eq(&mut self, reference: &BoundReference, literal: &Datum)
    -> Result<Self::T>;

    /// Called after a predicate with a `GreaterThan` operator is visited
    fn greater_than(&mut self, reference: &BoundReference, literal: &Datum) -> Result<Self::T>;

    /// Called after a predicate with a `GreaterThanOrEq` operator is visited
    fn greater_than_or_eq(
        &mut self,
        reference: &BoundReference,
        literal: &Datum,
    ) -> Result<Self::T>;

    /// Called after a predicate with an `Eq` operator is visited
    fn eq(&mut self, reference: &BoundReference, literal: &Datum) -> Result<Self::T>;

    /// Called after a predicate with a `NotEq` operator is visited
    fn not_eq(&mut self, reference: &BoundReference, literal: &Datum) -> Result<Self::T>;

    /// Called after a predicate with an `In` operator is visited
    fn r#in(&mut self, reference: &BoundReference, literals: &FnvHashSet<Datum>)
    -> Result<Self::T>;

    /// Called after a predicate with a `NotIn` operator is visited
    fn not_in(
        &mut self,
        reference: &BoundReference,
        literals: &FnvHashSet<Datum>,
    ) -> Result<Self::T>;
}

/// Visits a [`BoundPredicate`] with the provided visitor,
/// in post-order
pub fn visit<V: BoundPredicateVisitor>(
    visitor: &mut V,
    predicate: &BoundPredicate,
) -> Result<V::T> {
    match predicate {
        BoundPredicate::AlwaysTrue => visitor.always_true(),
        BoundPredicate::AlwaysFalse => visitor.always_false(),
        BoundPredicate::And(lhs, rhs) => {
            let lhs = visit(visitor, lhs)?;
            let rhs = visit(visitor, rhs)?;
            visitor.and(lhs, rhs)
        }
        BoundPredicate::Or(lhs, rhs) => {
            let lhs = visit(visitor, lhs)?;
            let rhs = visit(visitor, rhs)?;
            visitor.or(lhs, rhs)
        }
        BoundPredicate::Unary { op, term } => match op {
            PredicateOperator::IsNull => visitor.is_null(term),
            _ => visitor.not_null(term),
        },
        BoundPredicate::Binary { op, term, literal } => match op {
            PredicateOperator::LessThan => visitor.less_than(term, literal),
            PredicateOperator::LessThanOrEq => visitor.less_than_or_eq(term, literal),
            PredicateOperator::GreaterThan => visitor.greater_than(term, literal),
            PredicateOperator::GreaterThanOrEq => visitor.greater_than_or_eq(term, literal),
            PredicateOperator::NotEq => visitor.not_eq(term, literal),
            _ => visitor.eq(term, literal),
        },
        BoundPredicate::Set { op, term, literals } => match op {
            PredicateOperator::NotIn => visitor.not_in(term, literals),
            _ => visitor.r#in(term, literals),
        },
    }
}

/// Column metrics of one file as the evaluators see them.
///
/// Identity partition values are exact for every row of the file, so they
/// take precedence over the recorded column statistics.
pub(crate) struct FileMetrics<'a> {
    data_file: &'a DataFile,
    spec: &'a PartitionSpec,
}

impl<'a> FileMetrics<'a> {
    pub(crate) fn new(data_file: &'a DataFile, spec: &'a PartitionSpec) -> Self {
        Self { data_file, spec }
    }

    pub(crate) fn record_count(&self) -> u64 {
        self.data_file.record_count()
    }

    fn identity_value(&self, field_id: i32) -> Option<Option<&'a Datum>> {
        self.spec
            .identity_value(self.data_file.partition(), field_id)
    }

    pub(crate) fn value_count(&self, field_id: i32) -> Option<u64> {
        match self.identity_value(field_id) {
            Some(_) => Some(self.record_count()),
            None => self.data_file.value_counts().get(&field_id).copied(),
        }
    }

    pub(crate) fn null_count(&self, field_id: i32) -> Option<u64> {
        match self.identity_value(field_id) {
            Some(None) => Some(self.record_count()),
            Some(Some(_)) => Some(0),
            None => self.data_file.null_value_counts().get(&field_id).copied(),
        }
    }

    pub(crate) fn nan_count(&self, field_id: i32) -> Option<u64> {
        match self.identity_value(field_id) {
            Some(Some(v)) if v.is_nan() => Some(self.record_count()),
            Some(_) => Some(0),
            None => self.data_file.nan_value_counts().get(&field_id).copied(),
        }
    }

    pub(crate) fn lower_bound(&self, field_id: i32) -> Option<&'a Datum> {
        match self.identity_value(field_id) {
            Some(value) => value,
            None => self.data_file.lower_bounds().get(&field_id),
        }
    }

    pub(crate) fn upper_bound(&self, field_id: i32) -> Option<&'a Datum> {
        match self.identity_value(field_id) {
            Some(value) => value,
            None => self.data_file.upper_bounds().get(&field_id),
        }
    }

    pub(crate) fn contains_nulls_only(&self, field_id: i32) -> bool {
        let null_count = self.null_count(field_id);
        null_count.is_some() && null_count == self.value_count(field_id)
    }

    pub(crate) fn contains_nans_only(&self, field_id: i32) -> bool {
        let nan_count = self.nan_count(field_id);
        nan_count.is_some() && nan_count == self.value_count(field_id)
    }

    pub(crate) fn may_contain_null(&self, field_id: i32) -> bool {
        self.null_count(field_id).is_none_or(|c| c > 0)
    }

    /// Only floating point columns carry NaN; a missing count means unknown.
    pub(crate) fn may_contain_nan(&self, reference: &BoundReference) -> bool {
        let field = reference.field();
        match self.nan_count(field.id) {
            Some(count) => count > 0,
            None => matches!(field.field_type, PrimitiveType::Float | PrimitiveType::Double),
        }
    }
}
