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

//! Literal values used in partition tuples, column bounds and row filters.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use chrono::{Datelike, NaiveDate};
use ordered_float::OrderedFloat;
use serde_derive::{Deserialize, Serialize};

use super::PrimitiveType;
use crate::{Error, ErrorKind, Result};

// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A typed primitive value.
///
/// Values of the same variant are totally ordered. Values of different
/// variants are not comparable, `partial_cmp` returns `None` for them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Datum {
    /// True or false
    Boolean(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit IEEE 754 floating point.
    Float(OrderedFloat<f32>),
    /// 64-bit IEEE 754 floating point.
    Double(OrderedFloat<f64>),
    /// UTF-8 character sequence.
    String(String),
    /// Calendar date, days from 1970-01-01.
    Date(i32),
}

impl Datum {
    /// Creates a boolean value.
    pub fn bool(v: bool) -> Self {
        Self::Boolean(v)
    }

    /// Creates an int value.
    pub fn int(v: i32) -> Self {
        Self::Int(v)
    }

    /// Creates a long value.
    pub fn long(v: i64) -> Self {
        Self::Long(v)
    }

    /// Creates a float value.
    pub fn float(v: f32) -> Self {
        Self::Float(OrderedFloat(v))
    }

    /// Creates a double value.
    pub fn double(v: f64) -> Self {
        Self::Double(OrderedFloat(v))
    }

    /// Creates a string value.
    pub fn string(v: impl ToString) -> Self {
        Self::String(v.to_string())
    }

    /// Creates a date value from days since the unix epoch.
    pub fn date(days: i32) -> Self {
        Self::Date(days)
    }

    /// Creates a date value from a `YYYY-MM-DD` string.
    pub fn date_from_str(s: impl AsRef<str>) -> Result<Self> {
        let date = NaiveDate::parse_from_str(s.as_ref(), "%Y-%m-%d").map_err(|e| {
            Error::new(
                ErrorKind::DataInvalid,
                format!("Can't parse date from string: {}", s.as_ref()),
            )
            .with_source(e)
        })?;
        Ok(Self::Date(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE))
    }

    /// Type of this value.
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Datum::Boolean(_) => PrimitiveType::Boolean,
            Datum::Int(_) => PrimitiveType::Int,
            Datum::Long(_) => PrimitiveType::Long,
            Datum::Float(_) => PrimitiveType::Float,
            Datum::Double(_) => PrimitiveType::Double,
            Datum::String(_) => PrimitiveType::String,
            Datum::Date(_) => PrimitiveType::Date,
        }
    }

    /// Returns true if the value is a floating point NaN.
    pub fn is_nan(&self) -> bool {
        match self {
            Datum::Float(v) => v.is_nan(),
            Datum::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Converts this value to `target`, widening numbers where it's lossless.
    pub fn to(self, target: PrimitiveType) -> Result<Datum> {
        let converted = match (&self, target) {
            (_, t) if t == self.primitive_type() => Some(self.clone()),
            (Datum::Int(v), PrimitiveType::Long) => Some(Datum::Long(*v as i64)),
            (Datum::Int(v), PrimitiveType::Float) => Some(Datum::float(*v as f32)),
            (Datum::Int(v), PrimitiveType::Double) => Some(Datum::double(*v as f64)),
            (Datum::Int(v), PrimitiveType::Date) => Some(Datum::Date(*v)),
            (Datum::Long(v), PrimitiveType::Int) => i32::try_from(*v).ok().map(Datum::Int),
            (Datum::Long(v), PrimitiveType::Double) => Some(Datum::double(*v as f64)),
            (Datum::Float(v), PrimitiveType::Double) => Some(Datum::double(v.0 as f64)),
            (Datum::String(s), PrimitiveType::Date) => Datum::date_from_str(s).ok(),
            _ => None,
        };

        converted.ok_or_else(|| {
            Error::new(
                ErrorKind::DataInvalid,
                format!("Can't convert datum {self} to type {target}"),
            )
        })
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.partial_cmp(b),
            (Datum::Long(a), Datum::Long(b)) => a.partial_cmp(b),
            (Datum::Float(a), Datum::Float(b)) => a.partial_cmp(b),
            (Datum::Double(a), Datum::Double(b)) => a.partial_cmp(b),
            (Datum::String(a), Datum::String(b)) => a.partial_cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Boolean(v) => write!(f, "{v}"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Long(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Double(v) => write!(f, "{v}"),
            Datum::String(v) => write!(f, "{v}"),
            Datum::Date(days) => {
                match days
                    .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                {
                    Some(date) => write!(f, "{date}"),
                    None => write!(f, "{days}"),
                }
            }
        }
    }
}

/// Partition tuple: one optional value per partition field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Struct {
    fields: Vec<Option<Datum>>,
}

impl Struct {
    /// Create a empty struct.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a iterator to read the field in order of field_value.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Option<&Datum>> {
        self.fields.iter().map(Option::as_ref)
    }

    /// Value at `index`, `None` for nulls and out-of-range indexes.
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    /// Field values.
    pub fn fields(&self) -> &[Option<Datum>] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true for the partition tuple of unpartitioned files.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Option<Datum>> for Struct {
    fn from_iter<I: IntoIterator<Item = Option<Datum>>>(iter: I) -> Self {
        Struct {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Display for Struct {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, value) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Some(v) => write!(f, "{v}")?,
                None => write!(f, "null")?,
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_datum_ordering_within_type() {
        assert!(Datum::int(1) < Datum::int(2));
        assert!(Datum::string("a") < Datum::string("b"));
        assert!(Datum::double(1.5) > Datum::double(-1.0));
        assert_eq!(Datum::int(1).partial_cmp(&Datum::long(1)), None);
    }

    #[test]
    fn test_datum_conversion() {
        assert_eq!(Datum::int(7).to(PrimitiveType::Long).unwrap(), Datum::long(7));
        assert_eq!(Datum::long(7).to(PrimitiveType::Int).unwrap(), Datum::int(7));
        assert_eq!(
            Datum::string("1970-01-11").to(PrimitiveType::Date).unwrap(),
            Datum::date(10)
        );

        let err = Datum::long(i64::MAX).to(PrimitiveType::Int).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInvalid);
        assert!(Datum::bool(true).to(PrimitiveType::String).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Datum::date(0).to_string(), "1970-01-01");
        assert_eq!(Datum::date(-1).to_string(), "1969-12-31");
        assert_eq!(
            Struct::from_iter([Some(Datum::string("us")), None]).to_string(),
            "{us, null}"
        );
        assert_eq!(Struct::empty().to_string(), "{}");
    }

    #[test]
    fn test_struct_json() {
        let partition = Struct::from_iter([Some(Datum::int(3)), None]);
        let json = serde_json::to_string(&partition).unwrap();
        assert_eq!(json, r#"[{"type":"int","value":3},null]"#);
        assert_eq!(serde_json::from_str::<Struct>(&json).unwrap(), partition);
    }
}
