use crate::models::DischargeRecord;
use crate::types::{AppError, AppResult};
use sqlx::SqlitePool;

/// Row shape as stored; medications are a comma-joined string in SQLite
#[derive(Debug, sqlx::FromRow)]
struct DischargeRow {
    patient_name: String,
    discharge_date: String,
    primary_diagnosis: String,
    medications: String,
    dietary_restrictions: String,
    follow_up: String,
    warning_signs: String,
    discharge_instructions: String,
}

impl From<DischargeRow> for DischargeRecord {
    fn from(row: DischargeRow) -> Self {
        DischargeRecord {
            patient_name: row.patient_name,
            discharge_date: row.discharge_date,
            primary_diagnosis: row.primary_diagnosis,
            medications: row
                .medications
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            dietary_restrictions: row.dietary_restrictions,
            follow_up: row.follow_up,
            warning_signs: row.warning_signs,
            discharge_instructions: row.discharge_instructions,
        }
    }
}

pub struct DischargeStore;

impl DischargeStore {
    /// Fetch a discharge record by patient name.
    ///
    /// Matching is case-insensitive and exact on the trimmed name. Zero
    /// matches and multiple matches are distinct error kinds so the caller
    /// can render specific guidance instead of guessing a row.
    pub async fn lookup_by_name(pool: &SqlitePool, name: &str) -> AppResult<DischargeRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidRequest("Patient name is empty".to_string()));
        }

        let rows: Vec<DischargeRow> = sqlx::query_as(
            r#"
            SELECT patient_name, discharge_date, primary_diagnosis, medications,
                   dietary_restrictions, follow_up, warning_signs, discharge_instructions
            FROM discharge_summaries
            WHERE LOWER(patient_name) = LOWER(?)
            "#,
        )
        .bind(name)
        .fetch_all(pool)
        .await?;

        match rows.len() {
            0 => Err(AppError::RecordNotFound(name.to_string())),
            1 => Ok(rows.into_iter().next().map(DischargeRecord::from).ok_or_else(
                || AppError::Internal("Row vanished after length check".to_string()),
            )?),
            n => Err(AppError::AmbiguousRecord(name.to_string(), n)),
        }
    }

    pub async fn insert(pool: &SqlitePool, record: &DischargeRecord) -> AppResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO discharge_summaries
            (patient_name, discharge_date, primary_diagnosis, medications,
             dietary_restrictions, follow_up, warning_signs, discharge_instructions)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.patient_name)
        .bind(&record.discharge_date)
        .bind(&record.primary_diagnosis)
        .bind(record.medications.join(", "))
        .bind(&record.dietary_restrictions)
        .bind(&record.follow_up)
        .bind(&record.warning_signs)
        .bind(&record.discharge_instructions)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{jane_doe, memory_pool};
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let pool = memory_pool().await;
        DischargeStore::insert(&pool, &jane_doe()).await.unwrap();

        let lower = DischargeStore::lookup_by_name(&pool, "jane doe").await.unwrap();
        let upper = DischargeStore::lookup_by_name(&pool, "JANE DOE").await.unwrap();
        assert_eq!(lower.patient_name, upper.patient_name);
        assert_eq!(lower.medications, upper.medications);
        assert_eq!(lower.medications.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let pool = memory_pool().await;
        let err = DischargeStore::lookup_by_name(&pool, "Unknown Person")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound(_)));
        assert!(err.to_string().to_lowercase().contains("no record found"));
    }

    #[tokio::test]
    async fn test_lookup_ambiguous() {
        let pool = memory_pool().await;
        DischargeStore::insert(&pool, &jane_doe()).await.unwrap();
        let mut dup = jane_doe();
        dup.patient_name = "JANE DOE".to_string();
        DischargeStore::insert(&pool, &dup).await.unwrap();

        let err = DischargeStore::lookup_by_name(&pool, "Jane Doe")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AmbiguousRecord(_, 2)));
    }

    #[tokio::test]
    async fn test_lookup_trims_name() {
        let pool = memory_pool().await;
        DischargeStore::insert(&pool, &jane_doe()).await.unwrap();
        let record = DischargeStore::lookup_by_name(&pool, "  Jane Doe  ")
            .await
            .unwrap();
        assert_eq!(record.primary_diagnosis, "Chronic kidney disease, stage 3");
    }
}
