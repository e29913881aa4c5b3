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

use crate::config::{types::*, ValidationError};

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for TaskminderConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.database.validate() {
            errors.push(e);
        }
        if let Err(e) = self.broker.validate() {
            errors.push(e);
        }
        if let Err(e) = self.reminders.validate() {
            errors.push(e);
        }
        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple { errors }),
        }
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() || url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl {
                url: self.url.clone(),
            });
        }

        if self.pool_size == 0 || self.pool_size > 100 {
            return Err(ValidationError::InvalidPoolSize {
                size: self.pool_size,
            });
        }

        Ok(())
    }
}

impl Validate for BrokerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::InvalidBroker {
                field: "host",
                message: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidBroker {
                field: "port",
                message: "must be non-zero".to_string(),
            });
        }
        if self.queue_name.trim().is_empty() {
            return Err(ValidationError::InvalidBroker {
                field: "queue_name",
                message: "must not be empty".to_string(),
            });
        }
        if self.prefetch_count == 0 {
            return Err(ValidationError::InvalidBroker {
                field: "prefetch_count",
                message: "must be at least 1".to_string(),
            });
        }
        // A limit of 1 dead-letters a failed message without ever redelivering it.
        if self.max_delivery_attempts == 1 {
            return Err(ValidationError::InvalidBroker {
                field: "max_delivery_attempts",
                message: "must be 0 (unbounded) or at least 2".to_string(),
            });
        }
        if self.dead_letter_queue_name() == self.queue_name {
            return Err(ValidationError::InvalidBroker {
                field: "dead_letter_queue",
                message: "must differ from queue_name".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for ReminderConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval {
                field: "poll_interval_secs",
                value: self.poll_interval_secs,
            });
        }
        if self.retry_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval {
                field: "retry_interval_secs",
                value: self.retry_interval_secs,
            });
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ValidationError::InvalidLogLevel {
                level: self.level.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TaskminderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_prefetch_rejected() {
        let broker = BrokerConfig {
            prefetch_count: 0,
            ..BrokerConfig::default()
        };
        assert!(matches!(
            broker.validate(),
            Err(ValidationError::InvalidBroker {
                field: "prefetch_count",
                ..
            })
        ));
    }

    #[test]
    fn test_dead_letter_queue_must_differ() {
        let broker = BrokerConfig {
            dead_letter_queue: Some("task-reminders".to_string()),
            ..BrokerConfig::default()
        };
        assert!(broker.validate().is_err());
    }

    #[test]
    fn test_single_delivery_attempt_rejected() {
        let broker = BrokerConfig {
            max_delivery_attempts: 1,
            ..BrokerConfig::default()
        };
        assert!(matches!(
            broker.validate(),
            Err(ValidationError::InvalidBroker {
                field: "max_delivery_attempts",
                ..
            })
        ));

        for attempts in [0, 2] {
            let broker = BrokerConfig {
                max_delivery_attempts: attempts,
                ..BrokerConfig::default()
            };
            assert!(broker.validate().is_ok());
        }
    }

    #[test]
    fn test_postgres_url_rejected() {
        let database = DatabaseConfig {
            url: "postgres://localhost/tasks".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            database.validate(),
            Err(ValidationError::InvalidDatabaseUrl { .. })
        ));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = TaskminderConfig::default();
        config.reminders.poll_interval_secs = 0;
        config.logging.level = "loud".to_string();

        match config.validate() {
            Err(ValidationError::Multiple { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregated errors, got {:?}", other),
        }
    }
}
