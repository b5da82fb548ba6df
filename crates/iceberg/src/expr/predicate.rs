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

//! This module contains predicate expressions.
//! Predicate expressions are used to filter data, and evaluates to a boolean value. For example,
//! `a > 10` is a predicate expression, and it evaluates to `true` if `a` is greater than `10`,

use std::fmt::{Display, Formatter};
use std::ops::Not;

use fnv::FnvHashSet;
use itertools::Itertools;

use crate::expr::{BoundReference, PredicateOperator, Reference};
use crate::spec::{Datum, Schema};
use crate::{Error, ErrorKind, Result};

/// Unbound predicate expression before binding to a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// AlwaysTrue predicate, for example, `TRUE`.
    AlwaysTrue,
    /// AlwaysFalse predicate, for example, `FALSE`.
    AlwaysFalse,
    /// And predicate, for example, `a > 10 AND b < 20`.
    And(Box<Predicate>, Box<Predicate>),
    /// Or predicate, for example, `a > 10 OR b < 20`.
    Or(Box<Predicate>, Box<Predicate>),
    /// Not predicate, for example, `NOT (a > 10)`.
    Not(Box<Predicate>),
    /// Unary expression, for example, `a IS NULL`.
    Unary {
        /// Operator, one of `IsNull` or `NotNull`.
        op: PredicateOperator,
        /// Column reference.
        term: Reference,
    },
    /// Binary expression, for example, `a > 10`.
    Binary {
        /// Comparison operator.
        op: PredicateOperator,
        /// Column reference.
        term: Reference,
        /// Literal compared against.
        literal: Datum,
    },
    /// Set predicates, for example, `a in (1, 2, 3)`.
    Set {
        /// Operator, one of `In` or `NotIn`.
        op: PredicateOperator,
        /// Column reference.
        term: Reference,
        /// Literal set.
        literals: Vec<Datum>,
    },
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::AlwaysTrue => write!(f, "TRUE"),
            Predicate::AlwaysFalse => write!(f, "FALSE"),
            Predicate::And(lhs, rhs) => write!(f, "({lhs}) AND ({rhs})"),
            Predicate::Or(lhs, rhs) => write!(f, "({lhs}) OR ({rhs})"),
            Predicate::Not(inner) => write!(f, "NOT ({inner})"),
            Predicate::Unary { op, term } => write!(f, "{term} {op}"),
            Predicate::Binary { op, term, literal } => write!(f, "{term} {op} {literal}"),
            Predicate::Set { op, term, literals } => {
                write!(f, "{term} {op} ({})", literals.iter().join(", "))
            }
        }
    }
}

impl Predicate {
    /// Combines two predicates with `AND`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use iceberg_commit::expr::{Predicate, Reference};
    /// use iceberg_commit::spec::Datum;
    /// let expr1 = Reference::new("a").less_than(Datum::long(10));
    ///
    /// let expr2 = Reference::new("b").less_than(Datum::long(20));
    ///
    /// let expr = expr1.and(expr2);
    ///
    /// assert_eq!(&format!("{expr}"), "(a < 10) AND (b < 20)");
    /// ```
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::AlwaysFalse, _) | (_, Predicate::AlwaysFalse) => Predicate::AlwaysFalse,
            (Predicate::AlwaysTrue, rhs) => rhs,
            (lhs, Predicate::AlwaysTrue) => lhs,
            (lhs, rhs) => Predicate::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Combines two predicates with `OR`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use iceberg_commit::expr::{Predicate, Reference};
    /// use iceberg_commit::spec::Datum;
    /// let expr1 = Reference::new("a").less_than(Datum::long(10));
    ///
    /// let expr2 = Reference::new("b").less_than(Datum::long(20));
    ///
    /// let expr = expr1.or(expr2);
    ///
    /// assert_eq!(&format!("{expr}"), "(a < 10) OR (b < 20)");
    /// ```
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::AlwaysTrue, _) | (_, Predicate::AlwaysTrue) => Predicate::AlwaysTrue,
            (Predicate::AlwaysFalse, rhs) => rhs,
            (lhs, Predicate::AlwaysFalse) => lhs,
            (lhs, rhs) => Predicate::Or(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Returns a predicate representing the negation ('NOT') of this one,
    /// by using inverse predicates rather than wrapping in a `NOT`.
    /// Used for `NOT` elimination.
    ///
    /// # Example
    ///
    /// ```rust
    /// use iceberg_commit::expr::{Predicate, Reference};
    /// use iceberg_commit::spec::Datum;
    /// let expr1 = Reference::new("a").less_than(Datum::long(10));
    /// let expr2 = Reference::new("b").less_than(Datum::long(5));
    /// let expr = expr1.or(expr2);
    ///
    /// assert_eq!(&format!("{}", expr.negate()), "(a >= 10) AND (b >= 5)");
    /// ```
    pub fn negate(self) -> Predicate {
        match self {
            Predicate::AlwaysTrue => Predicate::AlwaysFalse,
            Predicate::AlwaysFalse => Predicate::AlwaysTrue,
            Predicate::And(lhs, rhs) => lhs.negate().or(rhs.negate()),
            Predicate::Or(lhs, rhs) => lhs.negate().and(rhs.negate()),
            Predicate::Not(inner) => *inner,
            Predicate::Unary { op, term } => Predicate::Unary {
                op: op.negate(),
                term,
            },
            Predicate::Binary { op, term, literal } => Predicate::Binary {
                op: op.negate(),
                term,
                literal,
            },
            Predicate::Set { op, term, literals } => Predicate::Set {
                op: op.negate(),
                term,
                literals,
            },
        }
    }

    /// Simplifies the expression by removing `NOT` predicates,
    /// directly negating the inner expressions instead.
    pub fn rewrite_not(self) -> Predicate {
        match self {
            Predicate::And(lhs, rhs) => lhs.rewrite_not().and(rhs.rewrite_not()),
            Predicate::Or(lhs, rhs) => lhs.rewrite_not().or(rhs.rewrite_not()),
            Predicate::Not(inner) => inner.rewrite_not().negate(),
            leaf => leaf,
        }
    }

    /// Bind this predicate to the columns of `schema`.
    ///
    /// `NOT` is rewritten away first, so the bound form never contains it.
    /// Literals are converted to the column type.
    pub fn bind(&self, schema: &Schema, case_sensitive: bool) -> Result<BoundPredicate> {
        self.clone().rewrite_not().bind_rewritten(schema, case_sensitive)
    }

    fn bind_rewritten(self, schema: &Schema, case_sensitive: bool) -> Result<BoundPredicate> {
        match self {
            Predicate::AlwaysTrue => Ok(BoundPredicate::AlwaysTrue),
            Predicate::AlwaysFalse => Ok(BoundPredicate::AlwaysFalse),
            Predicate::And(lhs, rhs) => Ok(lhs
                .bind_rewritten(schema, case_sensitive)?
                .and(rhs.bind_rewritten(schema, case_sensitive)?)),
            Predicate::Or(lhs, rhs) => Ok(lhs
                .bind_rewritten(schema, case_sensitive)?
                .or(rhs.bind_rewritten(schema, case_sensitive)?)),
            Predicate::Not(inner) => inner.negate().bind_rewritten(schema, case_sensitive),
            Predicate::Unary { op, term } => {
                let term = bind_reference(&term, schema, case_sensitive)?;
                let required = term.field().required;
                Ok(match op {
                    PredicateOperator::IsNull if required => BoundPredicate::AlwaysFalse,
                    PredicateOperator::NotNull if required => BoundPredicate::AlwaysTrue,
                    op => BoundPredicate::Unary { op, term },
                })
            }
            Predicate::Binary { op, term, literal } => {
                let term = bind_reference(&term, schema, case_sensitive)?;
                let literal = literal.to(term.field().field_type)?;
                Ok(BoundPredicate::Binary { op, term, literal })
            }
            Predicate::Set { op, term, literals } => {
                let term = bind_reference(&term, schema, case_sensitive)?;
                let field_type = term.field().field_type;
                let literals = literals
                    .into_iter()
                    .map(|l| l.to(field_type))
                    .collect::<Result<FnvHashSet<_>>>()?;
                Ok(match (op, literals.len()) {
                    (PredicateOperator::In, 0) => BoundPredicate::AlwaysFalse,
                    (PredicateOperator::NotIn, 0) => BoundPredicate::AlwaysTrue,
                    (PredicateOperator::In, 1) | (PredicateOperator::NotIn, 1) => {
                        let op = if op == PredicateOperator::In {
                            PredicateOperator::Eq
                        } else {
                            PredicateOperator::NotEq
                        };
                        match literals.into_iter().next() {
                            Some(literal) => BoundPredicate::Binary { op, term, literal },
                            None => BoundPredicate::AlwaysFalse,
                        }
                    }
                    _ => BoundPredicate::Set { op, term, literals },
                })
            }
        }
    }
}

fn bind_reference(
    term: &Reference,
    schema: &Schema,
    case_sensitive: bool,
) -> Result<BoundReference> {
    let field = schema
        .field_by_name(term.name(), case_sensitive)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::DataInvalid,
                format!("Cannot find field '{}' in schema", term.name()),
            )
            .with_context("schema_id", schema.schema_id().to_string())
        })?;
    Ok(BoundReference::new(term.name(), field.clone()))
}

impl Not for Predicate {
    type Output = Predicate;

    /// Create a predicate which is the reverse of this predicate. For example: `NOT (a > 10)`.
    ///
    /// # Example
    ///
    ///```rust
    /// use iceberg_commit::expr::Reference;
    /// use iceberg_commit::spec::Datum;
    /// let expr = Reference::new("a").less_than(Datum::long(10));
    ///
    /// let expr = !expr;
    ///
    /// assert_eq!(&format!("{expr}"), "NOT (a < 10)");
    /// ```
    fn not(self) -> Self::Output {
        match self {
            Predicate::AlwaysTrue => Predicate::AlwaysFalse,
            Predicate::AlwaysFalse => Predicate::AlwaysTrue,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

/// Bound predicate expression after binding to a schema.
///
/// `NOT` has been rewritten away, so there is no variant for it.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundPredicate {
    /// An expression always evaluates to true.
    AlwaysTrue,
    /// An expression always evaluates to false.
    AlwaysFalse,
    /// An expression combined by `AND`, for example, `a > 10 AND b < 20`.
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    /// An expression combined by `OR`, for example, `a > 10 OR b < 20`.
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
    /// Unary expression, for example, `a IS NULL`.
    Unary {
        /// Operator.
        op: PredicateOperator,
        /// Bound column.
        term: BoundReference,
    },
    /// Binary expression, for example, `a > 10`.
    Binary {
        /// Operator.
        op: PredicateOperator,
        /// Bound column.
        term: BoundReference,
        /// Literal of the column type.
        literal: Datum,
    },
    /// Set predicates, for example, `a IN (1, 2, 3)`.
    Set {
        /// Operator.
        op: PredicateOperator,
        /// Bound column.
        term: BoundReference,
        /// Literals of the column type.
        literals: FnvHashSet<Datum>,
    },
}

impl BoundPredicate {
    fn and(self, other: BoundPredicate) -> BoundPredicate {
        match (self, other) {
            (BoundPredicate::AlwaysFalse, _) | (_, BoundPredicate::AlwaysFalse) => {
                BoundPredicate::AlwaysFalse
            }
            (BoundPredicate::AlwaysTrue, rhs) => rhs,
            (lhs, BoundPredicate::AlwaysTrue) => lhs,
            (lhs, rhs) => BoundPredicate::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    fn or(self, other: BoundPredicate) -> BoundPredicate {
        match (self, other) {
            (BoundPredicate::AlwaysTrue, _) | (_, BoundPredicate::AlwaysTrue) => {
                BoundPredicate::AlwaysTrue
            }
            (BoundPredicate::AlwaysFalse, rhs) => rhs,
            (lhs, BoundPredicate::AlwaysFalse) => lhs,
            (lhs, rhs) => BoundPredicate::Or(Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl Display for BoundPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundPredicate::AlwaysTrue => write!(f, "True"),
            BoundPredicate::AlwaysFalse => write!(f, "False"),
            BoundPredicate::And(lhs, rhs) => write!(f, "({lhs}) AND ({rhs})"),
            BoundPredicate::Or(lhs, rhs) => write!(f, "({lhs}) OR ({rhs})"),
            BoundPredicate::Unary { op, term } => write!(f, "{term} {op}"),
            BoundPredicate::Binary { op, term, literal } => write!(f, "{term} {op} {literal}"),
            BoundPredicate::Set { op, term, literals } => {
                let literals = literals.iter().map(|l| l.to_string()).sorted().join(", ");
                write!(f, "{term} {op} ({literals})")
            }
        }
    }
}
