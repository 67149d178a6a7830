use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub user_id: String,
    pub email: Option<String>,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    pub override_subscribed: bool,
    pub override_tier: Option<String>,
    pub override_end: Option<String>,
    pub billing_customer_id: Option<String>,
}

pub trait TrialRepository: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<TrialRecord>, InfraError>;

    // Creates the record only when the user has none, then reads back
    // whatever is stored, so repeated calls return the same trial window.
    fn create_if_missing(&self, record: &TrialRecord) -> Result<TrialRecord, InfraError>;

    fn save_override(
        &self,
        user_id: &str,
        subscribed: bool,
        tier: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), InfraError>;

    fn save_billing_customer_id(&self, user_id: &str, customer_id: &str)
        -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTrialRepository {
    db_path: PathBuf,
}

impl SqliteTrialRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn row_to_record(
        user_id: String,
        email: Option<String>,
        trial_start_raw: String,
        trial_end_raw: String,
        override_subscribed: i64,
        override_tier: Option<String>,
        override_end: Option<String>,
        billing_customer_id: Option<String>,
    ) -> Result<TrialRecord, InfraError> {
        Ok(TrialRecord {
            user_id,
            email,
            trial_start: parse_stored_datetime(&trial_start_raw, "trials.trial_start")?,
            trial_end: parse_stored_datetime(&trial_end_raw, "trials.trial_end")?,
            override_subscribed: override_subscribed != 0,
            override_tier,
            override_end,
            billing_customer_id,
        })
    }
}

fn parse_stored_datetime(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidConfig(format!("invalid {field_name} '{value}': {error}"))
        })
}

impl TrialRepository for SqliteTrialRepository {
    fn load(&self, user_id: &str) -> Result<Option<TrialRecord>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "SELECT user_id, email, trial_start, trial_end,
                        override_subscribed, override_tier, override_end,
                        billing_customer_id
                 FROM trials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, email, start, end, subscribed, tier, override_end, customer_id)) = row
        else {
            return Ok(None);
        };
        Ok(Some(Self::row_to_record(
            user_id,
            email,
            start,
            end,
            subscribed,
            tier,
            override_end,
            customer_id,
        )?))
    }

    fn create_if_missing(&self, record: &TrialRecord) -> Result<TrialRecord, InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO trials (user_id, email, trial_start, trial_end,
                                 override_subscribed, override_tier, override_end,
                                 billing_customer_id)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, NULL, NULL)
             ON CONFLICT(user_id) DO NOTHING",
            params![
                record.user_id,
                record.email,
                record.trial_start.to_rfc3339(),
                record.trial_end.to_rfc3339(),
            ],
        )?;
        drop(connection);

        self.load(&record.user_id)?.ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "trial record missing after create for user {}",
                record.user_id
            ))
        })
    }

    fn save_override(
        &self,
        user_id: &str,
        subscribed: bool,
        tier: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE trials
             SET override_subscribed = ?2, override_tier = ?3, override_end = ?4
             WHERE user_id = ?1",
            params![user_id, i64::from(subscribed), tier, end],
        )?;
        if updated == 0 {
            return Err(InfraError::InvalidConfig(format!(
                "no trial record for user {user_id}"
            )));
        }
        Ok(())
    }

    fn save_billing_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE trials SET billing_customer_id = ?2 WHERE user_id = ?1",
            params![user_id, customer_id],
        )?;
        if updated == 0 {
            return Err(InfraError::InvalidConfig(format!(
                "no trial record for user {user_id}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTrialRepository {
    records: Mutex<HashMap<String, TrialRecord>>,
}

impl InMemoryTrialRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TrialRecord>>, InfraError> {
        self.records
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("trial lock poisoned: {error}")))
    }
}

impl TrialRepository for InMemoryTrialRepository {
    fn load(&self, user_id: &str) -> Result<Option<TrialRecord>, InfraError> {
        Ok(self.lock()?.get(user_id).cloned())
    }

    fn create_if_missing(&self, record: &TrialRecord) -> Result<TrialRecord, InfraError> {
        let mut records = self.lock()?;
        Ok(records
            .entry(record.user_id.clone())
            .or_insert_with(|| record.clone())
            .clone())
    }

    fn save_override(
        &self,
        user_id: &str,
        subscribed: bool,
        tier: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), InfraError> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(user_id) else {
            return Err(InfraError::InvalidConfig(format!(
                "no trial record for user {user_id}"
            )));
        };
        record.override_subscribed = subscribed;
        record.override_tier = tier.map(ToOwned::to_owned);
        record.override_end = end.map(ToOwned::to_owned);
        Ok(())
    }

    fn save_billing_customer_id(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<(), InfraError> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(user_id) else {
            return Err(InfraError::InvalidConfig(format!(
                "no trial record for user {user_id}"
            )));
        };
        record.billing_customer_id = Some(customer_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-07T00:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_record(user_id: &str) -> TrialRecord {
        TrialRecord {
            user_id: user_id.to_string(),
            email: Some("user@example.com".to_string()),
            trial_start: fixed_time(),
            trial_end: fixed_time() + Duration::days(5),
            override_subscribed: false,
            override_tier: None,
            override_end: None,
            billing_customer_id: None,
        }
    }

    #[test]
    fn create_if_missing_is_idempotent_in_memory() {
        let repository = InMemoryTrialRepository::default();
        let first = repository
            .create_if_missing(&sample_record("user-1"))
            .expect("create");

        let mut later = sample_record("user-1");
        later.trial_start = fixed_time() + Duration::days(3);
        later.trial_end = fixed_time() + Duration::days(8);
        let second = repository.create_if_missing(&later).expect("read back");

        assert_eq!(first.trial_end, second.trial_end);
    }

    #[test]
    fn save_override_requires_existing_record() {
        let repository = InMemoryTrialRepository::default();
        assert!(repository
            .save_override("missing", true, Some("premium"), None)
            .is_err());

        repository
            .create_if_missing(&sample_record("user-1"))
            .expect("create");
        repository
            .save_override("user-1", true, Some("premium"), Some("2026-12-31"))
            .expect("override");
        let loaded = repository.load("user-1").expect("load").expect("record");
        assert!(loaded.override_subscribed);
        assert_eq!(loaded.override_tier.as_deref(), Some("premium"));
    }
}
