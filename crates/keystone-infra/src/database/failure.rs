//! Conversion of SeaORM and sqlx errors into [`StorageFailure`]s.

use keystone_core::{FailureCategory, StorageFailure};
use sea_orm::sqlx;
use sea_orm::{ConnAcquireErr, DbErr, RuntimeErr};

const DB_ERR: &str = "sea_orm::DbErr";
const PG_ERROR: &str = "sqlx::postgres::PgDatabaseError";

/// Extension trait turning SeaORM results into storage results.
pub trait DbResultExt<T> {
    fn or_failure(self) -> Result<T, StorageFailure>;
}

impl<T> DbResultExt<T> for Result<T, DbErr> {
    fn or_failure(self) -> Result<T, StorageFailure> {
        self.map_err(into_failure)
    }
}

pub fn into_failure(err: DbErr) -> StorageFailure {
    match &err {
        DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) => {
            StorageFailure::timeout(err.to_string()).with_origin(DB_ERR)
        }
        DbErr::ConnectionAcquire(_) => {
            StorageFailure::operational(format!("connection error: {err}")).with_origin(DB_ERR)
        }
        DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime) => from_runtime(runtime),
        DbErr::Type(_) | DbErr::Json(_) | DbErr::TryIntoErr { .. } | DbErr::ConvertFromU64(_) => {
            StorageFailure::data(err.to_string()).with_origin(DB_ERR)
        }
        _ => StorageFailure::driver(err.to_string()).with_origin(DB_ERR),
    }
}

fn from_runtime(runtime: &RuntimeErr) -> StorageFailure {
    match runtime {
        RuntimeErr::SqlxError(err) => from_sqlx(err),
        RuntimeErr::Internal(message) => from_message(message),
    }
}

fn from_sqlx(err: &sqlx::Error) -> StorageFailure {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|code| code.into_owned());
            let mut message = db.message().to_owned();
            let mut origin = "sqlx::error::DatabaseError";
            if let Some(pg) = db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                origin = PG_ERROR;
                if let Some(detail) = pg.detail() {
                    message.push_str("\nDETAIL:  ");
                    message.push_str(detail);
                }
            }
            let category = match code.as_deref() {
                Some(code) => category_for_sqlstate(code),
                None => FailureCategory::Driver,
            };
            let failure = StorageFailure::new(category, message).with_origin(origin);
            match code {
                Some(code) => failure.with_code(code),
                None => failure,
            }
        }
        sqlx::Error::PoolTimedOut => StorageFailure::timeout(err.to_string()).with_origin("sqlx::Error"),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            StorageFailure::operational(format!("connection error: {err}")).with_origin("sqlx::Error")
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StorageFailure::data(err.to_string()).with_origin("sqlx::Error")
        }
        _ => StorageFailure::driver(err.to_string()).with_origin("sqlx::Error"),
    }
}

/// Category from the two-character SQLSTATE class.
pub fn category_for_sqlstate(code: &str) -> FailureCategory {
    if code == "57014" {
        // query_canceled, raised by statement_timeout
        return FailureCategory::Timeout;
    }
    match code.get(..2) {
        Some("23") => FailureCategory::Integrity,
        Some("22") => FailureCategory::Data,
        Some("42") => FailureCategory::Programming,
        Some("08" | "40" | "53" | "54" | "55" | "57" | "58" | "XX") => FailureCategory::Operational,
        _ => FailureCategory::Driver,
    }
}

/// Errors SeaORM reports as plain strings, including mocked ones.
fn from_message(message: &str) -> StorageFailure {
    let lower = message.to_lowercase();
    let category = if lower.contains("violates") && lower.contains("constraint") {
        FailureCategory::Integrity
    } else if lower.contains("timeout") || lower.contains("timed out") {
        FailureCategory::Timeout
    } else if lower.contains("permission denied") {
        FailureCategory::Programming
    } else if lower.contains("connection") {
        FailureCategory::Operational
    } else {
        FailureCategory::Driver
    };
    let code = match category {
        FailureCategory::Integrity if lower.contains("unique constraint") => Some("23505"),
        FailureCategory::Integrity if lower.contains("foreign key constraint") => Some("23503"),
        FailureCategory::Integrity if lower.contains("check constraint") => Some("23514"),
        _ => None,
    };

    let failure = StorageFailure::new(category, message).with_origin(DB_ERR);
    match code {
        Some(code) => failure.with_code(code),
        None => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("23505", FailureCategory::Integrity)]
    #[case("22001", FailureCategory::Data)]
    #[case("42P01", FailureCategory::Programming)]
    #[case("08006", FailureCategory::Operational)]
    #[case("57014", FailureCategory::Timeout)]
    #[case("P0001", FailureCategory::Driver)]
    fn test_sqlstate_classes(#[case] code: &str, #[case] category: FailureCategory) {
        assert_eq!(category_for_sqlstate(code), category);
    }

    #[test]
    fn test_acquire_timeout_is_timeout() {
        let failure = into_failure(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert_eq!(failure.category(), FailureCategory::Timeout);
    }

    #[test]
    fn test_internal_constraint_message_is_integrity() {
        let failure = into_failure(DbErr::Query(RuntimeErr::Internal(
            "duplicate key value violates unique constraint \"users_email_key\"".to_owned(),
        )));
        assert_eq!(failure.category(), FailureCategory::Integrity);
        assert_eq!(failure.code(), Some("23505"));
    }

    #[test]
    fn test_unknown_db_errors_are_driver_failures() {
        let failure = into_failure(DbErr::Custom("something unexpected".to_owned()));
        assert_eq!(failure.category(), FailureCategory::Driver);
        assert_eq!(failure.origin(), DB_ERR);
    }

    #[test]
    fn test_type_errors_are_data_failures() {
        let failure = into_failure(DbErr::Type("bad uuid".to_owned()));
        assert_eq!(failure.category(), FailureCategory::Data);
    }
}
