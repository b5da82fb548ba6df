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

//! Content kinds a manifest manager can be specialized for.

use crate::spec::ManifestContentType;

/// Kind of content files tracked by the manifests a manager works on.
///
/// Managers are generic over the kind so that operations only valid for one
/// kind, like deleting a data file by path, exist only on that
/// specialization.
pub trait ManifestContentKind: Send + Sync + 'static {
    /// Content type of the manifests this kind is written to.
    const CONTENT: ManifestContentType;
}

/// Data files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataContent;

impl ManifestContentKind for DataContent {
    const CONTENT: ManifestContentType = ManifestContentType::Data;
}

/// Position and equality delete files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteContent;

impl ManifestContentKind for DeleteContent {
    const CONTENT: ManifestContentType = ManifestContentType::Deletes;
}
