// Copyright 2025 Distcalc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Distcalc CLI
//!
//! Command-line interface for the distcalc distributed calculator.
//!
//! - **Orchestrator**: accepts expressions, hands out subtasks, reduces results
//! - **Worker**: a pool of compute loops pulling subtasks from an orchestrator
//! - **Submit / Get**: one-shot client calls printing raw JSON for scripting
//!
//! Argument parsing lives in the binary (`argh`); this crate holds the
//! command bodies so they can be driven from integration tests.

pub mod commands;
