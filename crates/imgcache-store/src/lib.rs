// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Key-value storage used to persist the image cache index.
//!
//! The cache only needs string values under a handful of keys, so the
//! [`KvStore`] seam is deliberately untyped. Two backends are provided:
//! [`SqliteKvStore`] for durable storage and [`MemoryKvStore`] for
//! process-local use.

mod config;
mod db;
mod err;
mod kv;
mod memory;

pub use config::DatabaseConfig;
pub use db::DBStore;
pub use err::{Error, Result};
pub use kv::{KvStore, SqliteKvStore};
pub use memory::MemoryKvStore;
