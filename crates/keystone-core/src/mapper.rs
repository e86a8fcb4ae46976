//! Translation of native failures into the domain error taxonomy.
//!
//! The mapper is stateless and total: every input yields a [`DomainError`],
//! and the same input always yields the same kind. Driver messages are parsed
//! with a fixed set of patterns matching PostgreSQL's wording; when a pattern
//! does not match, the most specific kind that can still be justified wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Diagnostics, DomainError, ErrorKind};
use crate::failure::{Failure, FailureCategory, StorageFailure};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const STRING_TRUNCATION: &str = "22001";
const NUMERIC_OUT_OF_RANGE: &str = "22003";
const INVALID_DATETIME: &str = "22007";
const DATETIME_OVERFLOW: &str = "22008";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const INSUFFICIENT_PRIVILEGE: &str = "42501";

type Pattern = LazyLock<Option<Regex>>;

static UNIQUE_CONSTRAINT: Pattern =
    LazyLock::new(|| Regex::new(r#"duplicate key value violates unique constraint "([^"]+)""#).ok());
static KEY_DETAIL: Pattern = LazyLock::new(|| Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").ok());
static FOREIGN_KEY_CONSTRAINT: Pattern =
    LazyLock::new(|| Regex::new(r#"violates foreign key constraint "([^"]+)""#).ok());
static FOREIGN_KEY_DETAIL: Pattern = LazyLock::new(|| {
    Regex::new(r#"Key \(([^)]+)\)=\(([^)]+)\) is not present in table "([^"]+)""#).ok()
});
static CHECK_CONSTRAINT: Pattern =
    LazyLock::new(|| Regex::new(r#"violates check constraint "([^"]+)""#).ok());
static RELATION: Pattern = LazyLock::new(|| Regex::new(r#"relation "([^"]+)""#).ok());
static PERMISSION_DENIED: Pattern = LazyLock::new(|| Regex::new(r"(?i)permission denied").ok());
static CONNECTION_FAILURE: Pattern = LazyLock::new(|| {
    Regex::new(r"(?i)(connection|network|server|host)\s+(error|refused|closed|unavailable|reset|lost)")
        .ok()
});

fn captures(pattern: &Pattern, text: &str) -> Option<Vec<String>> {
    let caps = pattern.as_ref()?.captures(text)?;
    Some(
        caps.iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_owned()).unwrap_or_default())
            .collect(),
    )
}

fn first_capture(pattern: &Pattern, text: &str) -> Option<String> {
    captures(pattern, text)?.into_iter().next()
}

fn is_match(pattern: &Pattern, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Maps native failures onto [`ErrorKind`]s.
pub struct ErrorMapper;

impl ErrorMapper {
    /// Classify a failure without attaching diagnostics.
    pub fn map(failure: Failure) -> DomainError {
        match failure {
            Failure::Domain(err) => err,
            Failure::Storage(storage) => Self::classify(&storage).into(),
            Failure::Other(err) => ErrorKind::Unclassified(err.to_string()).into(),
        }
    }

    /// Classify a failure and keep the original as diagnostics and cause.
    /// Domain errors are returned untouched.
    pub fn wrap(failure: Failure) -> DomainError {
        match failure {
            Failure::Domain(err) => err,
            Failure::Storage(storage) => {
                let diagnostics = Diagnostics {
                    original_type: storage.origin().to_owned(),
                    original_message: storage.message().to_owned(),
                    trace: storage.trace().to_owned(),
                };
                DomainError::new(Self::classify(&storage))
                    .with_diagnostics(diagnostics)
                    .with_cause(storage)
            }
            Failure::Other(err) => {
                let kind = ErrorKind::Unclassified(err.to_string());
                tracing::error!(error = %err, "unclassified failure reached the persistence boundary");
                let diagnostics = Diagnostics {
                    original_type: "anyhow::Error".to_owned(),
                    original_message: err.to_string(),
                    trace: format!("{err:?}"),
                };
                DomainError::new(kind)
                    .with_diagnostics(diagnostics)
                    .with_cause(err)
            }
        }
    }

    /// The kind a storage failure maps to.
    pub fn classify(failure: &StorageFailure) -> ErrorKind {
        let message = failure.message();
        let code = failure.code();
        match failure.category() {
            FailureCategory::Integrity => integrity(message, code),
            FailureCategory::Data => data(message, code),
            FailureCategory::Operational => operational(message, code),
            FailureCategory::Timeout => ErrorKind::Timeout {
                operation: timed_out_operation(message).to_owned(),
            },
            FailureCategory::Programming => programming(message, code),
            FailureCategory::Driver => ErrorKind::Persistence(format!("database error: {message}")),
        }
    }
}

fn integrity(message: &str, code: Option<&str>) -> ErrorKind {
    match code {
        Some(UNIQUE_VIOLATION) => return unique_violation(message),
        Some(FOREIGN_KEY_VIOLATION) => return foreign_key_violation(message),
        Some(CHECK_VIOLATION) => return check_violation(message),
        _ => {}
    }

    if is_match(&UNIQUE_CONSTRAINT, message) {
        unique_violation(message)
    } else if is_match(&FOREIGN_KEY_CONSTRAINT, message) {
        foreign_key_violation(message)
    } else if is_match(&CHECK_CONSTRAINT, message) {
        check_violation(message)
    } else {
        ErrorKind::Persistence(format!("data integrity violation: {message}"))
    }
}

fn unique_violation(message: &str) -> ErrorKind {
    let constraint = first_capture(&UNIQUE_CONSTRAINT, message);
    let (field, value) = match captures(&KEY_DETAIL, message).as_deref() {
        Some([field, value]) => (field.clone(), value.clone()),
        _ => (String::new(), "unknown".to_owned()),
    };

    let names_email = |name: &str| name.to_ascii_lowercase().contains("email");
    let field = if names_email(&field) || constraint.as_deref().is_some_and(names_email) {
        "email".to_owned()
    } else if field.is_empty() {
        constraint.clone().unwrap_or_else(|| "unknown".to_owned())
    } else {
        field
    };

    ErrorKind::Conflict {
        field,
        value,
        constraint,
    }
}

fn foreign_key_violation(message: &str) -> ErrorKind {
    let constraint = first_capture(&FOREIGN_KEY_CONSTRAINT, message);
    match captures(&FOREIGN_KEY_DETAIL, message).as_deref() {
        Some([_column, key, table]) => ErrorKind::ReferentialIntegrity {
            entity: entity_name(table),
            key: key.clone(),
            constraint,
        },
        _ => ErrorKind::ReferentialIntegrity {
            entity: "referenced record".to_owned(),
            key: "unknown".to_owned(),
            constraint,
        },
    }
}

fn check_violation(message: &str) -> ErrorKind {
    let constraint = first_capture(&CHECK_CONSTRAINT, message).unwrap_or_else(|| "unknown".to_owned());
    let (field, value) = match captures(&KEY_DETAIL, message).as_deref() {
        Some([field, value]) => (field.clone(), value.clone()),
        _ => (checked_column(message, &constraint), "unknown".to_owned()),
    };
    ErrorKind::CheckConstraint {
        field,
        value,
        constraint,
    }
}

/// PostgreSQL names check constraints `<table>_<column>_check` by default.
fn checked_column(message: &str, constraint: &str) -> String {
    let column = first_capture(&RELATION, message).and_then(|table| {
        constraint
            .strip_prefix(table.as_str())?
            .strip_prefix('_')?
            .strip_suffix("_check")
            .map(str::to_owned)
    });
    column.unwrap_or_else(|| "unknown".to_owned())
}

/// `user_roles` becomes `User Roles`.
fn entity_name(table: &str) -> String {
    table
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn data(message: &str, code: Option<&str>) -> ErrorKind {
    let problem = match code {
        Some(STRING_TRUNCATION) => "value too long for field",
        Some(NUMERIC_OUT_OF_RANGE) => "numeric value out of range",
        Some(INVALID_DATETIME | DATETIME_OVERFLOW) => "invalid date/time value",
        Some(INVALID_TEXT_REPRESENTATION) => "invalid text representation for the data type",
        _ => "invalid data",
    };
    ErrorKind::Validation(format!("{problem}: {message}"))
}

fn operational(message: &str, code: Option<&str>) -> ErrorKind {
    if code == Some(INSUFFICIENT_PRIVILEGE) {
        return ErrorKind::Permission(message.to_owned());
    }
    match code.and_then(|code| code.get(..2)) {
        Some("08") => return ErrorKind::Connectivity(message.to_owned()),
        Some("42") => return ErrorKind::Persistence(format!("SQL syntax error: {message}")),
        Some("53") => return ErrorKind::Persistence(format!("insufficient storage resources: {message}")),
        Some("57") => return ErrorKind::Persistence(format!("operator intervention: {message}")),
        Some("58") => return ErrorKind::Persistence(format!("storage system error: {message}")),
        _ => {}
    }

    if is_match(&CONNECTION_FAILURE, message) {
        ErrorKind::Connectivity(message.to_owned())
    } else if is_match(&PERMISSION_DENIED, message) {
        ErrorKind::Permission(message.to_owned())
    } else {
        ErrorKind::Persistence(format!("operational error: {message}"))
    }
}

fn programming(message: &str, code: Option<&str>) -> ErrorKind {
    if code == Some(INSUFFICIENT_PRIVILEGE) || is_match(&PERMISSION_DENIED, message) {
        ErrorKind::Permission(message.to_owned())
    } else {
        ErrorKind::Persistence(format!("SQL programming error: {message}"))
    }
}

fn timed_out_operation(message: &str) -> &'static str {
    let message = message.to_lowercase();
    if message.contains("query") || message.contains("select") {
        "query"
    } else if message.contains("update") {
        "update"
    } else if message.contains("insert") {
        "insert"
    } else if message.contains("delete") {
        "delete"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classify(failure: StorageFailure) -> ErrorKind {
        ErrorMapper::map(failure.into()).into_kind()
    }

    #[test]
    fn test_duplicate_email_becomes_conflict() {
        let failure = StorageFailure::integrity(
            "duplicate key value violates unique constraint \"users_email_key\"\n\
             DETAIL:  Key (email)=(a@b.com) already exists.",
        )
        .with_code("23505");

        assert_eq!(
            classify(failure),
            ErrorKind::Conflict {
                field: "email".into(),
                value: "a@b.com".into(),
                constraint: Some("users_email_key".into()),
            }
        );
    }

    #[test]
    fn test_other_unique_constraint_keeps_its_field() {
        let failure = StorageFailure::integrity(
            "duplicate key value violates unique constraint \"roles_name_key\"\n\
             DETAIL:  Key (name)=(admin) already exists.",
        );

        match classify(failure) {
            ErrorKind::Conflict { field, value, .. } => {
                assert_eq!(field, "name");
                assert_eq!(value, "admin");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_missing_reference_names_table_and_key() {
        let failure = StorageFailure::integrity(
            "insert or update on table \"user_roles\" violates foreign key constraint \"user_roles_role_id_fkey\"\n\
             DETAIL:  Key (role_id)=(999) is not present in table \"roles\".",
        )
        .with_code("23503");

        let kind = classify(failure);
        assert_eq!(
            kind,
            ErrorKind::ReferentialIntegrity {
                entity: "Roles".into(),
                key: "999".into(),
                constraint: Some("user_roles_role_id_fkey".into()),
            }
        );
        let rendered = kind.to_string();
        assert!(rendered.contains("Roles") && rendered.contains("999"));
    }

    #[test]
    fn test_check_violation_derives_column_from_constraint_name() {
        let failure = StorageFailure::integrity(
            "new row for relation \"roles\" violates check constraint \"roles_name_check\"",
        )
        .with_code("23514");

        assert_eq!(
            classify(failure),
            ErrorKind::CheckConstraint {
                field: "name".into(),
                value: "unknown".into(),
                constraint: "roles_name_check".into(),
            }
        );
    }

    #[test]
    fn test_unrecognised_integrity_failure_stays_generic() {
        let kind = classify(StorageFailure::integrity("null value in column \"email\""));
        assert!(matches!(kind, ErrorKind::Persistence(msg) if msg.starts_with("data integrity violation")));
    }

    #[rstest]
    #[case(Some("22001"), "value too long")]
    #[case(Some("22003"), "out of range")]
    #[case(Some("22007"), "date/time")]
    #[case(Some("22P02"), "invalid text representation")]
    #[case(None, "invalid data")]
    fn test_data_errors_become_validation(#[case] code: Option<&str>, #[case] fragment: &str) {
        let mut failure = StorageFailure::data("bad value");
        if let Some(code) = code {
            failure = failure.with_code(code);
        }

        match classify(failure) {
            ErrorKind::Validation(msg) => assert!(msg.contains(fragment), "{msg}"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[rstest]
    #[case("canceling statement due to statement timeout while running query", "query")]
    #[case("timeout during UPDATE users", "update")]
    #[case("insert timed out", "insert")]
    #[case("delete took too long", "delete")]
    #[case("deadline has elapsed", "unknown")]
    fn test_timeout_names_the_operation(#[case] message: &str, #[case] operation: &str) {
        assert_eq!(
            classify(StorageFailure::timeout(message)),
            ErrorKind::Timeout {
                operation: operation.into()
            }
        );
    }

    #[rstest]
    #[case(Some("08006"), "server closed the connection", "connectivity")]
    #[case(Some("42501"), "permission denied for table users", "permission")]
    #[case(Some("53100"), "disk full", "persistence")]
    #[case(None, "Connection refused", "connectivity")]
    #[case(None, "permission denied for schema public", "permission")]
    #[case(None, "something odd", "persistence")]
    fn test_operational_failures(#[case] code: Option<&str>, #[case] message: &str, #[case] expected: &str) {
        let mut failure = StorageFailure::operational(message);
        if let Some(code) = code {
            failure = failure.with_code(code);
        }

        let kind = classify(failure);
        let actual = match kind {
            ErrorKind::Connectivity(_) => "connectivity",
            ErrorKind::Permission(_) => "permission",
            ErrorKind::Persistence(_) => "persistence",
            _ => "other",
        };
        assert_eq!(actual, expected, "{message}");
    }

    #[test]
    fn test_programming_error_without_permission_is_persistence() {
        let kind = classify(StorageFailure::programming("relation \"nope\" does not exist").with_code("42P01"));
        assert!(matches!(kind, ErrorKind::Persistence(msg) if msg.contains("SQL programming error")));
    }

    #[test]
    fn test_domain_errors_pass_through_wrap_untouched() {
        let original = DomainError::not_found("User", 42);
        let wrapped = ErrorMapper::wrap(original.into());

        assert_eq!(
            wrapped.kind(),
            &ErrorKind::NotFound {
                entity: "User",
                key: "42".into()
            }
        );
        assert!(wrapped.diagnostics().is_none());
    }

    #[test]
    fn test_unknown_failure_is_unclassified_with_diagnostics() {
        let wrapped = ErrorMapper::wrap(Failure::other("boom"));

        assert_eq!(wrapped.kind(), &ErrorKind::Unclassified("boom".into()));
        assert_eq!(wrapped.to_string(), "Unexpected error: boom");
        let diagnostics = wrapped.diagnostics().expect("diagnostics attached");
        assert_eq!(diagnostics.original_message, "boom");
        assert!(std::error::Error::source(&wrapped).is_some());
    }

    #[test]
    fn test_wrap_keeps_storage_origin() {
        let failure = StorageFailure::driver("bad handshake").with_origin("sqlx::Error");
        let wrapped = ErrorMapper::wrap(failure.into());

        let diagnostics = wrapped.diagnostics().expect("diagnostics attached");
        assert_eq!(diagnostics.original_type, "sqlx::Error");
        assert!(diagnostics.notes()[0].contains("sqlx::Error: bad handshake"));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let make = || {
            StorageFailure::integrity("duplicate key value violates unique constraint \"users_email_key\"")
                .with_code("23505")
        };
        assert_eq!(classify(make()), classify(make()));
    }

    #[test]
    fn test_entity_name_title_cases_tables() {
        assert_eq!(entity_name("user_roles"), "User Roles");
        assert_eq!(entity_name("roles"), "Roles");
    }
}
