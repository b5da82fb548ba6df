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

//! Flat table schemas, used to resolve row filter columns and partition
//! source fields.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::{Error, ErrorKind, Result};

/// Reference to [`Schema`].
pub type SchemaRef = Arc<Schema>;

/// Reference to [`NestedField`].
pub type NestedFieldRef = Arc<NestedField>;

/// Primitive column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// True or false.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 floating point.
    Float,
    /// 64-bit IEEE 754 floating point.
    Double,
    /// Arbitrary-length character sequences encoded in utf-8.
    String,
    /// Calendar date without timezone or time.
    Date,
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::String => "string",
            PrimitiveType::Date => "date",
        };
        write!(f, "{name}")
    }
}

/// A column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedField {
    /// Id of the field, unique within the schema.
    pub id: i32,
    /// Name of the field.
    pub name: String,
    /// Whether the field must have a value.
    pub required: bool,
    /// Type of the field.
    pub field_type: PrimitiveType,
}

impl NestedField {
    /// Construct a required field.
    pub fn required(id: i32, name: impl ToString, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.to_string(),
            required: true,
            field_type,
        }
    }

    /// Construct an optional field.
    pub fn optional(id: i32, name: impl ToString, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.to_string(),
            required: false,
            field_type,
        }
    }
}

/// Table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    schema_id: i32,
    fields: Vec<NestedFieldRef>,
    id_to_index: HashMap<i32, usize>,
}

/// Schema builder.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema_id: i32,
    fields: Vec<NestedFieldRef>,
}

impl SchemaBuilder {
    /// Set the schema id.
    pub fn with_schema_id(mut self, schema_id: i32) -> Self {
        self.schema_id = schema_id;
        self
    }

    /// Add fields to the schema.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = NestedFieldRef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Builds the schema. Field ids and names must be unique.
    pub fn build(self) -> Result<Schema> {
        let mut id_to_index = HashMap::with_capacity(self.fields.len());
        for (idx, field) in self.fields.iter().enumerate() {
            if id_to_index.insert(field.id, idx).is_some() {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    format!("Duplicate field id {} in schema", field.id),
                ));
            }
            if self.fields[..idx].iter().any(|f| f.name == field.name) {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    format!("Duplicate field name {} in schema", field.name),
                ));
            }
        }

        Ok(Schema {
            schema_id: self.schema_id,
            fields: self.fields,
            id_to_index,
        })
    }
}

impl Schema {
    /// Create a schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns the schema id.
    pub fn schema_id(&self) -> i32 {
        self.schema_id
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> &[NestedFieldRef] {
        &self.fields
    }

    /// Get field by field id.
    pub fn field_by_id(&self, field_id: i32) -> Option<&NestedFieldRef> {
        self.id_to_index.get(&field_id).map(|idx| &self.fields[*idx])
    }

    /// Get field by name, optionally ignoring ascii case.
    pub fn field_by_name(&self, name: &str, case_sensitive: bool) -> Option<&NestedFieldRef> {
        if case_sensitive {
            self.fields.iter().find(|f| f.name == name)
        } else {
            self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
        }
    }
}
