//! Failure escalation.
//!
//! Every health timeout and every failed operation response passes through
//! [`Escalation::on_failure`]. Under [`FailurePolicy::FailFast`] it becomes an
//! error carrying the original response. Under [`FailurePolicy::FailSoft`]
//! the message is emitted through the [`OutputSink`] and the caller gets the
//! unsuccessful response back unchanged.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{EngineResponse, HealthResponse};
use crate::health::Diagnostic;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Return an error as soon as a failure is detected.
    #[default]
    FailFast,
    /// Report the failure and carry on.
    FailSoft,
}

impl FailurePolicy {
    pub fn from_throw_on_failure(throw_on_failure: bool) -> Self {
        if throw_on_failure {
            Self::FailFast
        } else {
            Self::FailSoft
        }
    }
}

/// Destination for runner messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputSink {
    #[default]
    Stdout,
    /// Emit through `tracing` at INFO.
    Log,
}

impl OutputSink {
    pub fn from_use_std_out(use_std_out: bool) -> Self {
        if use_std_out { Self::Stdout } else { Self::Log }
    }

    pub fn print(self, line: &str) {
        match self {
            Self::Stdout => println!("{line}"),
            Self::Log => info!("{line}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Escalation {
    policy: FailurePolicy,
    sink: OutputSink,
}

impl Escalation {
    pub fn new(policy: FailurePolicy, sink: OutputSink) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn sink(&self) -> OutputSink {
        self.sink
    }

    /// Escalates a failed operation response.
    pub fn operation_failed(&self, message: String, response: EngineResponse) -> Result<()> {
        self.on_failure(message, |message| Error::OperationFailed {
            message,
            response: Box::new(response),
        })
    }

    /// Escalates a health wait that hit its deadline.
    pub fn health_timed_out(
        &self,
        message: String,
        response: HealthResponse,
        diagnostic: Diagnostic,
    ) -> Result<()> {
        self.on_failure(message, |message| Error::HealthTimeout {
            message,
            response: Box::new(response),
            diagnostic: Box::new(diagnostic),
        })
    }

    fn on_failure(&self, message: String, raise: impl FnOnce(String) -> Error) -> Result<()> {
        match self.policy {
            FailurePolicy::FailFast => Err(raise(message)),
            FailurePolicy::FailSoft => {
                self.sink.print(&message);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DeleteResponse;

    fn not_found() -> EngineResponse {
        EngineResponse::Delete(DeleteResponse {
            index: "i1".to_string(),
            doc_type: "t".to_string(),
            id: "1".to_string(),
            version: 1,
            found: false,
        })
    }

    #[test]
    fn test_fail_fast_raises_with_response() {
        let escalation = Escalation::new(FailurePolicy::FailFast, OutputSink::Log);

        let err = escalation
            .operation_failed("boom".to_string(), not_found())
            .unwrap_err();

        match err {
            Error::OperationFailed { message, response } => {
                assert_eq!(message, "boom");
                assert_eq!(*response, not_found());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fail_soft_continues() {
        let escalation = Escalation::new(FailurePolicy::FailSoft, OutputSink::Log);
        assert!(
            escalation
                .operation_failed("boom".to_string(), not_found())
                .is_ok()
        );
    }

    #[test]
    fn test_policy_from_flags() {
        assert_eq!(
            FailurePolicy::from_throw_on_failure(true),
            FailurePolicy::FailFast
        );
        assert_eq!(
            FailurePolicy::from_throw_on_failure(false),
            FailurePolicy::FailSoft
        );
        assert_eq!(OutputSink::from_use_std_out(true), OutputSink::Stdout);
        assert_eq!(OutputSink::from_use_std_out(false), OutputSink::Log);
    }
}
