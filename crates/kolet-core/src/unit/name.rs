//! Unit name handling

use crate::error::KoletError;

const SERVICE_SUFFIX: &str = ".service";

/// Normalize a test unit name, appending `.service` when missing.
///
/// Only service units are supported for external tests. The name is never
/// rewritten beyond the suffix; one containing whitespace is rejected.
pub fn service_unit_name(name: &str) -> Result<String, KoletError> {
    if name.is_empty() || name == SERVICE_SUFFIX {
        return Err(KoletError::InvalidArgument(
            "unit name must not be empty".to_string(),
        ));
    }
    if name.contains(char::is_whitespace) {
        return Err(KoletError::InvalidArgument(format!(
            "unit name {name:?} must not contain whitespace"
        )));
    }
    if name.ends_with(SERVICE_SUFFIX) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{SERVICE_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_suffix() {
        assert_eq!(service_unit_name("kola-runext").unwrap(), "kola-runext.service");
    }

    #[test]
    fn keeps_existing_suffix() {
        assert_eq!(service_unit_name("foo.service").unwrap(), "foo.service");
    }

    #[test]
    fn other_unit_types_become_services() {
        assert_eq!(service_unit_name("foo.timer").unwrap(), "foo.timer.service");
    }

    #[test]
    fn rejects_empty() {
        assert!(service_unit_name("").unwrap_err().is_usage());
        assert!(service_unit_name(".service").unwrap_err().is_usage());
    }

    #[test]
    fn padded_names_are_rejected_not_trimmed() {
        for name in ["  ", " foo", "foo ", "foo.service\n", "foo bar"] {
            let err = service_unit_name(name).unwrap_err();
            assert!(err.is_usage(), "{name:?}");
        }
    }
}
