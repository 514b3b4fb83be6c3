//! Errors surfaced by the student query layer.

#[derive(Debug, thiserror::Error)]
pub enum RecordsError {
    /// No student row carries the requested USN.
    #[error("student not found: {usn}")]
    NotFound { usn: String },

    /// A list filter or sort option could not be understood.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A CSV import row was rejected.
    #[error("import failed at line {line}: {message}")]
    Import { line: u64, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RecordsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecordsError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinct_from_database_errors() {
        let missing = RecordsError::NotFound {
            usn: "1XX21CS001".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "student not found: 1XX21CS001");

        let db = RecordsError::Database(sqlx::Error::RowNotFound);
        assert!(!db.is_not_found());
    }
}
