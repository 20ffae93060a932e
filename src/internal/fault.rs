//! Per-declaration fault isolation.

use std::panic::{self, AssertUnwindSafe};

use crate::error::{VerifyError, VerifyResult};

/// Runs `f`, turning a panic into [`VerifyError::Internal`] tagged with `subject`.
///
/// Used at the per-declaration boundary so one faulty declaration cannot
/// abort the rest of the snapshot.
pub(crate) fn catch_fault<T, F>(subject: &dyn std::fmt::Display, f: F) -> VerifyResult<T>
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::warn!(subject = %subject, fault = %message, "internal fault while verifying declaration");
            Err(VerifyError::Internal {
                subject: subject.to_string(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_values_through() {
        assert_eq!(catch_fault(&"A", || 7), Ok(7));
    }

    #[test]
    fn converts_panics_into_internal_errors() {
        let result: VerifyResult<()> = catch_fault(&"Broken", || panic!("boom"));
        assert_eq!(
            result,
            Err(VerifyError::Internal {
                subject: "Broken".to_string(),
                message: "boom".to_string(),
            })
        );
    }
}
