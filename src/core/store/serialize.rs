//! SQLite serialization for typed enums
//!
//! Implements ToSql and FromSql for Stage, HistoryAction and TaskType
//! so they are stored by their stable codes.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core::stage::Stage;
use crate::core::watering::TaskType;

use super::HistoryAction;

fn invalid_data(message: String) -> FromSqlError {
    FromSqlError::Other(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

// =========================================================================
// Stage - ToSql/FromSql
// =========================================================================

impl ToSql for Stage {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Stage {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: crate::core::stage::StageError| invalid_data(e.to_string()))
    }
}

// =========================================================================
// HistoryAction - ToSql/FromSql
// =========================================================================

impl std::str::FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advance" => Ok(HistoryAction::Advance),
            "revert" => Ok(HistoryAction::Revert),
            "exit_soaking" => Ok(HistoryAction::ExitSoaking),
            "repair" => Ok(HistoryAction::Repair),
            "suspend_watering" => Ok(HistoryAction::SuspendWatering),
            _ => Err(format!("Unknown history action: {}", s)),
        }
    }
}

impl ToSql for HistoryAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for HistoryAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(invalid_data)
    }
}

// =========================================================================
// TaskType - ToSql/FromSql
// =========================================================================

impl ToSql for TaskType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for TaskType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(invalid_data)
    }
}
