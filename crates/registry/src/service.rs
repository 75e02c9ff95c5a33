//! Registration service implementation
//!
//! Each operation is a single stateless round trip against the store. Every
//! failure is folded into the `error` field of the returned outcome.

use crate::config::{RegistrationPolicy, RegistryConfig, UnknownCodeTimeLookup};
use crate::errors::*;
use licreg_storage::{BindOutcome, BindRequest, Namespace, RegistrationStore};
use licreg_types::{
    RegisterOutcome, RegistrationCode, ReverseOutcome, SerialNumber, SharedClock, SystemClock,
    ValidateOutcome,
};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a successful `register` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registered {
    Created,
    Confirmed,
}

impl Registered {
    fn outcome_label(self) -> &'static str {
        match self {
            Registered::Created => "created",
            Registered::Confirmed => "confirmed",
        }
    }
}

/// Registration API over an explicitly constructed store handle.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    config: RegistryConfig,
    clock: SharedClock,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, config: RegistryConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RegistrationStore>,
        config: RegistryConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether registration times are recorded and reported.
    pub fn tracks_timestamps(&self) -> bool {
        self.store.has_namespace(Namespace::Timestamp)
    }

    /// Bind `serial_number` to `registration_code` on first use.
    pub async fn register(&self, serial_number: &str, registration_code: &str) -> RegisterOutcome {
        match self.try_register(serial_number, registration_code).await {
            Ok(registered) => {
                counter!("licreg_register_total", "outcome" => registered.outcome_label())
                    .increment(1);
                RegisterOutcome::verified()
            }
            Err(err) => {
                counter!("licreg_register_total", "outcome" => err.outcome_label()).increment(1);
                log_failure("register", serial_number, &err);
                RegisterOutcome::rejected(err.to_string())
            }
        }
    }

    /// Report whether `serial_number` has been bound and to which code.
    pub async fn validate(&self, serial_number: &str) -> ValidateOutcome {
        let result = self.try_validate(serial_number).await;
        let label = match &result {
            Ok(outcome) if outcome.used => "used",
            Ok(_) => "unused",
            Err(err) => err.outcome_label(),
        };
        counter!("licreg_validate_total", "outcome" => label).increment(1);

        result.unwrap_or_else(|err| {
            log_failure("validate", serial_number, &err);
            ValidateOutcome::failed(err.to_string())
        })
    }

    /// Resolve `registration_code` to the serial number it was bound to.
    ///
    /// An unknown code is not an error: the outcome simply carries no serial.
    pub async fn reverse(&self, registration_code: &str) -> ReverseOutcome {
        let result = self.try_reverse(registration_code).await;
        let label = match &result {
            Ok(outcome) if outcome.serial_number.is_some() => "resolved",
            Ok(_) => "unknown_code",
            Err(err) => err.outcome_label(),
        };
        counter!("licreg_reverse_total", "outcome" => label).increment(1);

        result.unwrap_or_else(|err| {
            log_failure("reverse", registration_code, &err);
            ReverseOutcome::failed(err.to_string())
        })
    }

    async fn try_register(&self, serial_number: &str, registration_code: &str) -> Result<Registered> {
        let serial = SerialNumber::parse(serial_number)?;
        let code = RegistrationCode::parse(registration_code)?;

        let request = BindRequest {
            serial,
            code,
            registered_at: self.tracks_timestamps().then(|| self.clock.now()),
            require_issued: self.config.policy == RegistrationPolicy::IssuedOnly,
        };

        match self.store.bind(&request).await? {
            BindOutcome::Created => {
                info!(
                    serial = %request.serial,
                    code = %request.code,
                    registered_at = ?request.registered_at.map(|at| at.to_string()),
                    "serial number registered"
                );
                Ok(Registered::Created)
            }
            BindOutcome::AlreadyBound(existing) if existing == request.code.as_str() => {
                debug!(serial = %request.serial, "registration confirmed");
                Ok(Registered::Confirmed)
            }
            BindOutcome::AlreadyBound(_) => Err(RegistryError::AlreadyRegistered),
            BindOutcome::NotIssued => Err(RegistryError::UnknownSerial),
            BindOutcome::CodeInUse(owner) => {
                debug!(code = %request.code, owner = %owner, "registration code already bound");
                Err(RegistryError::CodeInUse)
            }
        }
    }

    async fn try_validate(&self, serial_number: &str) -> Result<ValidateOutcome> {
        let serial = SerialNumber::parse(serial_number)?;
        let code = self
            .store
            .get(Namespace::Primary, serial.as_str())
            .await?
            .ok_or(RegistryError::UnknownSerial)?;

        // Issued placeholder, not yet bound.
        if code.is_empty() {
            return Ok(ValidateOutcome::default());
        }

        let regtime = if self.tracks_timestamps() {
            self.store
                .get(Namespace::Timestamp, serial.as_str())
                .await?
        } else {
            None
        };

        Ok(ValidateOutcome {
            used: true,
            error: None,
            regkey: Some(code),
            regtime,
        })
    }

    async fn try_reverse(&self, registration_code: &str) -> Result<ReverseOutcome> {
        let code =
            RegistrationCode::parse_field(registration_code, RegistrationCode::REVERSE_FIELD)?;
        let serial_number = self.store.get(Namespace::Reverse, code.as_str()).await?;
        debug!(code = %code, serial = ?serial_number, "reverse lookup");

        let register_time = match (&serial_number, self.tracks_timestamps()) {
            (_, false) => None,
            (Some(serial), true) => self.store.get(Namespace::Timestamp, serial).await?,
            (None, true) => match self.config.unknown_code_time_lookup {
                UnknownCodeTimeLookup::Skip => None,
                UnknownCodeTimeLookup::Attempt => {
                    self.store.get(Namespace::Timestamp, "").await?;
                    None
                }
            },
        };

        Ok(ReverseOutcome {
            serial_number,
            register_time,
            error: None,
        })
    }
}

fn log_failure(operation: &'static str, key: &str, err: &RegistryError) {
    match err {
        RegistryError::Backend(source) => {
            warn!(operation, key, error = %source, "registration store unavailable")
        }
        RegistryError::AlreadyRegistered => {
            warn!(operation, key, "registration code mismatch")
        }
        RegistryError::CodeInUse => {
            warn!(operation, key, "registration code owned by another serial")
        }
        other => debug!(operation, key, error = %other, "request rejected"),
    }
}
