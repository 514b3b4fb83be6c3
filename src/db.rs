use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::{self, AnalyticsOptions};
use crate::config::Config;
use crate::error::RecordsError;
use crate::grading;
use crate::models::{AnalyticsSummary, PlacementStatus, Student, StudentList};
use crate::query::StudentFilters;

const STUDENT_COLUMNS: &str = "id, usn, name, batch, tenth_percentage, puc_percentage, \
     sem1_percentage, sem2_percentage, sem3_percentage, sem4_percentage, \
     sem5_percentage, sem6_percentage, aggregate_percentage, active_backlogs, \
     placement_status, placement_eligible, updated_at";

pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config.database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    debug!(max_connections = config.database.max_connections, "connected to Postgres");
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn student_from_row(row: &PgRow) -> Result<Student, sqlx::Error> {
    let backlogs: i32 = row.try_get("active_backlogs")?;
    let status: String = row.try_get("placement_status")?;

    Ok(Student {
        id: row.try_get("id")?,
        usn: row.try_get("usn")?,
        name: row.try_get("name")?,
        batch: row.try_get("batch")?,
        tenth_percentage: row.try_get("tenth_percentage")?,
        puc_percentage: row.try_get("puc_percentage")?,
        sem1_percentage: row.try_get("sem1_percentage")?,
        sem2_percentage: row.try_get("sem2_percentage")?,
        sem3_percentage: row.try_get("sem3_percentage")?,
        sem4_percentage: row.try_get("sem4_percentage")?,
        sem5_percentage: row.try_get("sem5_percentage")?,
        sem6_percentage: row.try_get("sem6_percentage")?,
        aggregate_percentage: row.try_get("aggregate_percentage")?,
        active_backlogs: u32::try_from(backlogs).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        placement_status: PlacementStatus::from(status),
        placement_eligible: row.try_get("placement_eligible")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_students(pool: &PgPool, batch: Option<&str>) -> Result<Vec<Student>, RecordsError> {
    let mut query = format!("SELECT {STUDENT_COLUMNS} FROM student_insights.students");
    if batch.is_some() {
        query.push_str(" WHERE batch = $1");
    }

    let mut rows = sqlx::query(&query);
    if let Some(value) = batch {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let students = records
        .iter()
        .map(student_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    debug!(batch = batch.unwrap_or("all"), count = students.len(), "fetched students");
    Ok(students)
}

pub async fn list_students(pool: &PgPool, filters: &StudentFilters) -> Result<StudentList, RecordsError> {
    let students = filters.apply(fetch_students(pool, filters.batch_scope()).await?);
    let total = students.len();
    Ok(StudentList { students, total })
}

pub async fn get_student(pool: &PgPool, usn: &str) -> Result<Student, RecordsError> {
    let query = format!("SELECT {STUDENT_COLUMNS} FROM student_insights.students WHERE usn = $1");
    let row = sqlx::query(&query)
        .bind(usn.trim())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(student_from_row(&row)?),
        None => Err(RecordsError::NotFound {
            usn: usn.trim().to_string(),
        }),
    }
}

pub async fn get_analytics(
    pool: &PgPool,
    batch: Option<&str>,
    options: &AnalyticsOptions,
) -> Result<AnalyticsSummary, RecordsError> {
    let scope = StudentFilters::for_batch(batch);
    let students = scope.apply(fetch_students(pool, scope.batch_scope()).await?);
    Ok(analytics::summarize(&students, options))
}

/// `active_backlogs` as stored in the INTEGER column.
fn backlogs_column(backlogs: u32) -> Result<i32, sqlx::Error> {
    i32::try_from(backlogs).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub async fn upsert_student<'e, E>(executor: E, student: &Student) -> Result<u64, RecordsError>
where
    E: PgExecutor<'e>,
{
    let backlogs = backlogs_column(student.active_backlogs)?;
    let result = sqlx::query(
        r#"
        INSERT INTO student_insights.students
        (id, usn, name, batch, tenth_percentage, puc_percentage,
         sem1_percentage, sem2_percentage, sem3_percentage, sem4_percentage,
         sem5_percentage, sem6_percentage, aggregate_percentage, active_backlogs,
         placement_status, placement_eligible, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (usn) DO UPDATE
        SET name = EXCLUDED.name,
            batch = EXCLUDED.batch,
            tenth_percentage = EXCLUDED.tenth_percentage,
            puc_percentage = EXCLUDED.puc_percentage,
            sem1_percentage = EXCLUDED.sem1_percentage,
            sem2_percentage = EXCLUDED.sem2_percentage,
            sem3_percentage = EXCLUDED.sem3_percentage,
            sem4_percentage = EXCLUDED.sem4_percentage,
            sem5_percentage = EXCLUDED.sem5_percentage,
            sem6_percentage = EXCLUDED.sem6_percentage,
            aggregate_percentage = EXCLUDED.aggregate_percentage,
            active_backlogs = EXCLUDED.active_backlogs,
            placement_status = EXCLUDED.placement_status,
            placement_eligible = EXCLUDED.placement_eligible,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(student.id)
    .bind(&student.usn)
    .bind(&student.name)
    .bind(&student.batch)
    .bind(student.tenth_percentage)
    .bind(student.puc_percentage)
    .bind(student.sem1_percentage)
    .bind(student.sem2_percentage)
    .bind(student.sem3_percentage)
    .bind(student.sem4_percentage)
    .bind(student.sem5_percentage)
    .bind(student.sem6_percentage)
    .bind(student.aggregate_percentage)
    .bind(backlogs)
    .bind(student.placement_status.as_str())
    .bind(student.placement_eligible)
    .bind(student.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

struct SeedRow {
    usn: &'static str,
    name: &'static str,
    tenth: f64,
    puc: f64,
    semesters: &'static [f64],
    backlogs: u32,
    placed: bool,
}

#[rustfmt::skip]
const FIFTH_SEM_ROWS: &[SeedRow] = &[
    SeedRow { usn: "1GS22CS001", name: "Aarav Kulkarni", tenth: 92.4, puc: 88.0, semesters: &[84.2, 86.5, 88.1, 87.0], backlogs: 0, placed: false },
    SeedRow { usn: "1GS22CS002", name: "Bhavana Reddy", tenth: 95.0, puc: 93.2, semesters: &[91.0, 92.4, 90.8, 93.5], backlogs: 0, placed: false },
    SeedRow { usn: "1GS22CS003", name: "Chetan Gowda", tenth: 78.6, puc: 71.4, semesters: &[62.0, 58.5, 64.2, 60.0], backlogs: 2, placed: false },
    SeedRow { usn: "1GS22CS004", name: "Deepika Hegde", tenth: 88.8, puc: 84.6, semesters: &[74.5, 76.0, 72.8, 75.4], backlogs: 0, placed: false },
    SeedRow { usn: "1GS22CS005", name: "Farhan Sheikh", tenth: 81.2, puc: 76.8, semesters: &[68.0, 66.4, 70.2, 67.5], backlogs: 0, placed: false },
    SeedRow { usn: "1GS22CS006", name: "Gayathri Menon", tenth: 90.0, puc: 89.4, semesters: &[79.8, 82.1, 80.5, 83.0], backlogs: 0, placed: false },
    SeedRow { usn: "1GS22CS007", name: "Harsha Naik", tenth: 72.0, puc: 65.5, semesters: &[55.0, 61.2, 57.8, 59.4], backlogs: 1, placed: false },
    SeedRow { usn: "1GS22CS008", name: "Ishita Joshi", tenth: 96.2, puc: 94.8, semesters: &[88.0, 89.6, 91.2, 90.4], backlogs: 0, placed: false },
];

#[rustfmt::skip]
const SEVENTH_SEM_ROWS: &[SeedRow] = &[
    SeedRow { usn: "1GS21CS001", name: "Karthik Shetty", tenth: 89.0, puc: 85.2, semesters: &[80.4, 82.0, 79.6, 84.2, 83.0, 85.6], backlogs: 0, placed: true },
    SeedRow { usn: "1GS21CS002", name: "Lakshmi Prasad", tenth: 94.6, puc: 92.0, semesters: &[90.2, 91.8, 93.4, 92.0, 94.1, 93.6], backlogs: 0, placed: true },
    SeedRow { usn: "1GS21CS003", name: "Manoj Patil", tenth: 76.4, puc: 70.0, semesters: &[60.2, 63.5, 58.0, 62.4, 65.0, 61.8], backlogs: 3, placed: false },
    SeedRow { usn: "1GS21CS004", name: "Nandini Rao", tenth: 87.2, puc: 83.8, semesters: &[72.0, 74.6, 71.2, 73.8, 75.0, 76.2], backlogs: 0, placed: false },
    SeedRow { usn: "1GS21CS005", name: "Omkar Desai", tenth: 82.0, puc: 78.4, semesters: &[69.0, 67.2, 68.8, 70.4, 66.0, 69.6], backlogs: 0, placed: false },
    SeedRow { usn: "1GS21CS006", name: "Pooja Bhat", tenth: 91.8, puc: 90.6, semesters: &[86.4, 85.0, 88.2, 87.6, 89.0, 88.4], backlogs: 0, placed: true },
    SeedRow { usn: "1GS21CS007", name: "Rahul Kamath", tenth: 84.4, puc: 80.2, semesters: &[77.0, 74.2, 78.8, 76.4, 79.2, 80.0], backlogs: 1, placed: false },
    SeedRow { usn: "1GS21CS008", name: "Sneha Pai", tenth: 79.0, puc: 74.6, semesters: &[70.8, 72.4, 71.0, 73.2, 74.8, 72.6], backlogs: 0, placed: false },
];

fn seed_student(row: &SeedRow, batch: &str, eligibility_threshold: f64) -> Student {
    let semester = |index: usize| row.semesters.get(index).copied();
    let mut student = Student {
        id: Uuid::new_v4(),
        usn: row.usn.to_string(),
        name: row.name.to_string(),
        batch: batch.to_string(),
        tenth_percentage: Some(row.tenth),
        puc_percentage: Some(row.puc),
        sem1_percentage: semester(0),
        sem2_percentage: semester(1),
        sem3_percentage: semester(2),
        sem4_percentage: semester(3),
        sem5_percentage: semester(4),
        sem6_percentage: semester(5),
        aggregate_percentage: None,
        active_backlogs: row.backlogs,
        placement_status: if row.placed {
            PlacementStatus::Placed
        } else {
            PlacementStatus::NotPlaced
        },
        placement_eligible: false,
        updated_at: Utc::now(),
    };
    student.aggregate_percentage =
        grading::aggregate_from_semesters(&student).map(|value| (value * 100.0).round() / 100.0);
    student.placement_eligible = grading::is_placement_eligible(
        student.aggregate_percentage,
        student.active_backlogs,
        eligibility_threshold,
    );
    student
}

async fn seed_batch(
    pool: &PgPool,
    batch: &str,
    rows: &[SeedRow],
    eligibility_threshold: f64,
) -> Result<String, RecordsError> {
    let students: Vec<Student> = rows
        .iter()
        .map(|row| seed_student(row, batch, eligibility_threshold))
        .collect();
    write_students(pool, &students).await?;
    info!(batch, count = rows.len(), "seeded students");
    Ok(format!("Seeded {} {} students.", rows.len(), batch))
}

pub async fn seed_fifth_sem_data(pool: &PgPool, eligibility_threshold: f64) -> Result<String, RecordsError> {
    seed_batch(pool, "5th-sem", FIFTH_SEM_ROWS, eligibility_threshold).await
}

pub async fn seed_seventh_sem_data(pool: &PgPool, eligibility_threshold: f64) -> Result<String, RecordsError> {
    seed_batch(pool, "7th-sem", SEVENTH_SEM_ROWS, eligibility_threshold).await
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    usn: String,
    name: String,
    batch: String,
    tenth_percentage: Option<f64>,
    puc_percentage: Option<f64>,
    sem1_percentage: Option<f64>,
    sem2_percentage: Option<f64>,
    sem3_percentage: Option<f64>,
    sem4_percentage: Option<f64>,
    sem5_percentage: Option<f64>,
    sem6_percentage: Option<f64>,
    aggregate_percentage: Option<f64>,
    active_backlogs: Option<u32>,
    placement_status: Option<String>,
}

impl CsvRow {
    fn into_student(self, line: u64, eligibility_threshold: f64) -> Result<Student, RecordsError> {
        let reject = |message: String| RecordsError::Import { line, message };

        if self.usn.trim().is_empty() {
            return Err(reject("usn must not be empty".to_string()));
        }
        if self.batch.trim().is_empty() {
            return Err(reject("batch must not be empty".to_string()));
        }

        if let Some(backlogs) = self.active_backlogs {
            if backlogs_column(backlogs).is_err() {
                return Err(reject(format!("active_backlogs out of range: {backlogs}")));
            }
        }

        let percentages = [
            ("tenth_percentage", self.tenth_percentage),
            ("puc_percentage", self.puc_percentage),
            ("sem1_percentage", self.sem1_percentage),
            ("sem2_percentage", self.sem2_percentage),
            ("sem3_percentage", self.sem3_percentage),
            ("sem4_percentage", self.sem4_percentage),
            ("sem5_percentage", self.sem5_percentage),
            ("sem6_percentage", self.sem6_percentage),
            ("aggregate_percentage", self.aggregate_percentage),
        ];
        for (column, value) in percentages {
            if let Some(value) = value {
                if !(0.0..=100.0).contains(&value) {
                    return Err(reject(format!("{column} out of range: {value}")));
                }
            }
        }

        let mut student = Student {
            id: Uuid::new_v4(),
            usn: self.usn.trim().to_string(),
            name: self.name.trim().to_string(),
            batch: self.batch.trim().to_string(),
            tenth_percentage: self.tenth_percentage,
            puc_percentage: self.puc_percentage,
            sem1_percentage: self.sem1_percentage,
            sem2_percentage: self.sem2_percentage,
            sem3_percentage: self.sem3_percentage,
            sem4_percentage: self.sem4_percentage,
            sem5_percentage: self.sem5_percentage,
            sem6_percentage: self.sem6_percentage,
            aggregate_percentage: self.aggregate_percentage,
            active_backlogs: self.active_backlogs.unwrap_or(0),
            placement_status: PlacementStatus::from(self.placement_status.unwrap_or_default()),
            placement_eligible: false,
            updated_at: Utc::now(),
        };

        if student.aggregate_percentage.is_none() {
            student.aggregate_percentage = grading::aggregate_from_semesters(&student);
        }
        student.placement_eligible = grading::is_placement_eligible(
            student.aggregate_percentage,
            student.active_backlogs,
            eligibility_threshold,
        );
        Ok(student)
    }
}

/// Parse a student CSV (header row required). Line numbers in errors are 1-based
/// and count the header.
pub fn parse_csv(csv_path: &Path, eligibility_threshold: f64) -> Result<Vec<Student>, RecordsError> {
    let mut reader = csv::Reader::from_path(csv_path).map_err(|e| RecordsError::Import {
        line: 0,
        message: e.to_string(),
    })?;

    let mut students = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index as u64 + 2;
        let row = result.map_err(|e| RecordsError::Import {
            line: e.position().map_or(line, |p| p.line()),
            message: e.to_string(),
        })?;
        students.push(row.into_student(line, eligibility_threshold)?);
    }

    Ok(students)
}

/// Upsert every student in one transaction; a failing row leaves the table untouched.
pub async fn write_students(pool: &PgPool, students: &[Student]) -> Result<usize, RecordsError> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for student in students {
        if upsert_student(&mut *tx, student).await? > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    debug!(written, "committed student batch");
    Ok(written)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &Path,
    eligibility_threshold: f64,
) -> Result<usize, RecordsError> {
    let students = parse_csv(csv_path, eligibility_threshold)?;
    let written = write_students(pool, &students).await?;
    info!(path = %csv_path.display(), written, "imported students");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "usn,name,batch,tenth_percentage,puc_percentage,sem1_percentage,sem2_percentage,sem3_percentage,sem4_percentage,sem5_percentage,sem6_percentage,aggregate_percentage,active_backlogs,placement_status";

    fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn csv_rows_derive_aggregate_and_eligibility() {
        let file = write_csv(&[
            "1GS22EC001,Tara Iyer,5th-sem,90,85,70,80,,,,,,0,",
            "1GS21EC002,Uday Murthy,7th-sem,80,75,,,,,,,91.5,1,Placed",
        ]);

        let students = parse_csv(file.path(), 70.0).unwrap();
        assert_eq!(students.len(), 2);

        let tara = &students[0];
        assert_eq!(tara.aggregate_percentage, Some(75.0));
        assert!(tara.placement_eligible);
        assert_eq!(tara.placement_status, PlacementStatus::NotPlaced);

        let uday = &students[1];
        assert_eq!(uday.aggregate_percentage, Some(91.5));
        assert!(!uday.placement_eligible);
        assert_eq!(uday.placement_status, PlacementStatus::Placed);
    }

    #[test]
    fn csv_rejects_out_of_range_percentages() {
        let file = write_csv(&[
            "1GS22EC001,Tara Iyer,5th-sem,90,85,70,80,,,,,,0,",
            "1GS22EC003,Vivek Rao,5th-sem,90,185,70,80,,,,,,0,",
        ]);

        match parse_csv(file.path(), 70.0) {
            Err(RecordsError::Import { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("puc_percentage"));
            }
            other => panic!("expected import error, got {other:?}"),
        }
    }

    #[test]
    fn csv_rejects_backlogs_beyond_the_column() {
        let file = write_csv(&["1GS22EC004,Wren Das,5th-sem,90,85,70,80,,,,,,3000000000,"]);

        match parse_csv(file.path(), 70.0) {
            Err(RecordsError::Import { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("active_backlogs"));
            }
            other => panic!("expected import error, got {other:?}"),
        }
    }

    #[test]
    fn backlogs_column_refuses_to_truncate() {
        assert_eq!(backlogs_column(3).unwrap(), 3);
        assert_eq!(backlogs_column(i32::MAX as u32).unwrap(), i32::MAX);
        assert!(matches!(backlogs_column(u32::MAX), Err(sqlx::Error::Encode(_))));
    }

    #[tokio::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn failed_write_rolls_back_the_whole_batch() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        init_db(&pool).await.unwrap();
        sqlx::query("DELETE FROM student_insights.students WHERE batch = 'rollback-sem'")
            .execute(&pool)
            .await
            .unwrap();

        let good = crate::grading::tests::sample_student("1RB22CS001", "rollback-sem", Some(81.0));
        let mut bad = crate::grading::tests::sample_student("1RB22CS002", "rollback-sem", Some(77.0));
        bad.active_backlogs = u32::MAX;

        let err = write_students(&pool, &[good, bad]).await.unwrap_err();
        assert!(matches!(err, RecordsError::Database(sqlx::Error::Encode(_))));
        assert!(fetch_students(&pool, Some("rollback-sem")).await.unwrap().is_empty());
    }

    #[test]
    fn seed_rows_are_scored_consistently() {
        for row in FIFTH_SEM_ROWS.iter().chain(SEVENTH_SEM_ROWS) {
            let student = seed_student(row, "5th-sem", 70.0);
            let aggregate = student.aggregate_percentage.unwrap();
            assert!((0.0..=100.0).contains(&aggregate));
            assert_eq!(
                student.placement_eligible,
                row.backlogs == 0 && aggregate >= 70.0,
                "{}",
                row.usn
            );
        }
        assert_eq!(seed_student(&FIFTH_SEM_ROWS[0], "5th-sem", 70.0).sem5_percentage, None);
        assert!(seed_student(&SEVENTH_SEM_ROWS[0], "7th-sem", 70.0).sem6_percentage.is_some());
    }
}
