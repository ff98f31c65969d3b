//! Errors raised while running block coordinate descent

use ndarray_linalg::error::LinalgError;

/// Everything that can abort a run.
///
/// Line-search failures and matrix repairs are not represented here: both are
/// recovered in place and only logged.
#[derive(Debug, thiserror::Error)]
pub enum BcdError {
    /// A caller broke a precondition, e.g. an infeasible point for a
    /// non-negative loss or a non-descent direction handed to the line search.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("loss increased from {previous:.16e} to {current:.16e} at iteration {iteration}")]
    LossIncreased {
        iteration: usize,
        previous: f64,
        current: f64,
    },

    #[error("non-finite loss {value} at iteration {iteration}")]
    NonFinite { iteration: usize, value: f64 },

    #[error("update rule `{0}` doesn't exist")]
    UnknownRule(String),

    #[error("loss `{0}` doesn't exist")]
    UnknownLoss(String),

    #[error("selection or partition rule `{0}` doesn't exist")]
    UnknownSelection(String),

    #[error("linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),

    #[error("history serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl BcdError {
    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        BcdError::ContractViolation(msg.into())
    }

    /// True for the errors that signal the iterate went numerically bad.
    pub fn is_numerical_instability(&self) -> bool {
        matches!(
            self,
            BcdError::LossIncreased { .. } | BcdError::NonFinite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BcdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instability_grouping() {
        let err = BcdError::LossIncreased {
            iteration: 3,
            previous: 1.0,
            current: 2.0,
        };
        assert!(err.is_numerical_instability());
        assert!(BcdError::NonFinite {
            iteration: 0,
            value: f64::NAN
        }
        .is_numerical_instability());
        assert!(!BcdError::contract("x must be >= 0").is_numerical_instability());
        assert!(!BcdError::UnknownRule("foo".into()).is_numerical_instability());
    }

    #[test]
    fn messages() {
        let err = BcdError::UnknownRule("Newton".into());
        assert_eq!(err.to_string(), "update rule `Newton` doesn't exist");
    }
}
