/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Worker configuration.
//!
//! Configuration is read from a TOML file with `${VAR}` style environment
//! substitution. Every field has a default, so an absent file (or an absent
//! section) yields a runnable local setup: SQLite file in the working
//! directory and a broker at `localhost:5672` with guest credentials.

mod defaults;
mod error;
mod loader;
mod types;
mod validation;

pub use defaults::generate_default_config_toml;
pub use error::{ConfigError, ValidationError};
pub use loader::ConfigLoader;
pub use types::{BrokerConfig, DatabaseConfig, LoggingConfig, ReminderConfig, TaskminderConfig};
pub use validation::Validate;
