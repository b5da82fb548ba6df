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

//! Term definition.

use std::fmt::{Display, Formatter};

use crate::expr::{Predicate, PredicateOperator};
use crate::spec::{Datum, NestedFieldRef};

/// A named reference in an unbound expression.
/// For example, `a` in `a > 10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: String,
}

impl Reference {
    /// Create a new unbound reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Return the name of this reference.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates an is-null expression. For example, `a IS NULL`.
    pub fn is_null(self) -> Predicate {
        Predicate::Unary {
            op: PredicateOperator::IsNull,
            term: self,
        }
    }

    /// Creates a not-null expression. For example, `a IS NOT NULL`.
    pub fn is_not_null(self) -> Predicate {
        Predicate::Unary {
            op: PredicateOperator::NotNull,
            term: self,
        }
    }

    /// Creates an less than expression. For example, `a < 10`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use iceberg_commit::expr::Reference;
    /// use iceberg_commit::spec::Datum;
    /// let expr = Reference::new("a").less_than(Datum::long(10));
    ///
    /// assert_eq!(&format!("{expr}"), "a < 10");
    /// ```
    pub fn less_than(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::LessThan, datum)
    }

    /// Creates an less than or equal to expression. For example, `a <= 10`.
    pub fn less_than_or_equal_to(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::LessThanOrEq, datum)
    }

    /// Creates an greater than expression. For example, `a > 10`.
    pub fn greater_than(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::GreaterThan, datum)
    }

    /// Creates a greater-than-or-equal-to than expression. For example, `a >= 10`.
    pub fn greater_than_or_equal_to(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::GreaterThanOrEq, datum)
    }

    /// Creates an equal-to expression. For example, `a = 10`.
    pub fn equal_to(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::Eq, datum)
    }

    /// Creates a not equal-to expression. For example, `a!= 10`.
    pub fn not_equal_to(self, datum: Datum) -> Predicate {
        self.binary(PredicateOperator::NotEq, datum)
    }

    /// Creates an in expression. For example, `a IN (5, 6)`.
    pub fn is_in(self, literals: impl IntoIterator<Item = Datum>) -> Predicate {
        Predicate::Set {
            op: PredicateOperator::In,
            term: self,
            literals: literals.into_iter().collect(),
        }
    }

    /// Creates a not-in expression. For example, `a NOT IN (5, 6)`.
    pub fn is_not_in(self, literals: impl IntoIterator<Item = Datum>) -> Predicate {
        Predicate::Set {
            op: PredicateOperator::NotIn,
            term: self,
            literals: literals.into_iter().collect(),
        }
    }

    fn binary(self, op: PredicateOperator, literal: Datum) -> Predicate {
        Predicate::Binary {
            op,
            term: self,
            literal,
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A named reference in a bound expression after binding to a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundReference {
    // This field is only used for debug and display purposes.
    column_name: String,
    field: NestedFieldRef,
}

impl BoundReference {
    /// Creates a new bound reference.
    pub fn new(name: impl Into<String>, field: NestedFieldRef) -> Self {
        Self {
            column_name: name.into(),
            field,
        }
    }

    /// Return the field of this reference.
    pub fn field(&self) -> &NestedFieldRef {
        &self.field
    }
}

impl Display for BoundReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column_name)
    }
}
