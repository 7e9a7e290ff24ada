use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::models::{JobProgress, JobStatus, Language, Translation, TranslationJob, TranslationTask};

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        JobStatus::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// SQLite-backed store for translation records, languages, and job records.
/// The connection is shared behind a mutex; every method takes the lock for
/// the duration of its statement(s).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database and create tables.
    pub fn new(database_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open database at {}", database_path))?;

        // The server and the worker open this file from separate processes
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                locale_values TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )
        .context("Failed to create translations table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS languages (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )
        .context("Failed to create languages table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS translation_jobs (
                job_id TEXT PRIMARY KEY,
                source_language TEXT NOT NULL,
                target_language TEXT NOT NULL,
                status TEXT NOT NULL,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create translation_jobs table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Translations ====================

    pub fn list_translations(&self) -> Result<Vec<Translation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, key, locale_values FROM translations ORDER BY id ASC")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, key, raw)| translation_from_parts(id, key, &raw))
            .collect()
    }

    pub fn get_translation(&self, id: i64) -> Result<Option<Translation>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, key, locale_values FROM translations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        raw.map(|(id, key, raw)| translation_from_parts(id, key, &raw))
            .transpose()
    }

    pub fn get_translation_by_key(&self, key: &str) -> Result<Option<Translation>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, key, locale_values FROM translations WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        raw.map(|(id, key, raw)| translation_from_parts(id, key, &raw))
            .transpose()
    }

    pub fn insert_translation(
        &self,
        key: &str,
        values: &HashMap<String, String>,
    ) -> Result<Translation> {
        let conn = self.conn.lock().unwrap();
        let raw = serde_json::to_string(values)?;
        conn.execute(
            "INSERT INTO translations (key, locale_values) VALUES (?1, ?2)",
            params![key, raw],
        )?;

        Ok(Translation {
            id: conn.last_insert_rowid(),
            key: key.to_string(),
            values: values.clone(),
        })
    }

    pub fn update_translation(
        &self,
        id: i64,
        key: &str,
        values: &HashMap<String, String>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let raw = serde_json::to_string(values)?;
        let rows = conn.execute(
            "UPDATE translations SET key = ?1, locale_values = ?2 WHERE id = ?3",
            params![key, raw, id],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_translation(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM translations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Write one locale's value without touching the rest of the record.
    /// Concurrent writers of other locales are never clobbered. Returns
    /// false when the record no longer exists (a no-op, not an error).
    pub fn set_translation_value(&self, id: i64, locale: &str, text: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE translations SET locale_values = json_set(locale_values, ?1, ?2) WHERE id = ?3",
            params![json_path(locale), text, id],
        )?;
        Ok(rows > 0)
    }

    /// Drop one locale's value from every record (language deletion cascade).
    pub fn remove_locale_values(&self, locale: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE translations SET locale_values = json_remove(locale_values, ?1)",
            params![json_path(locale)],
        )?;
        Ok(rows)
    }

    /// Every record with a non-empty value for the source locale, as work
    /// tasks. Deliberately not filtered by target presence: a bulk run
    /// re-translates records that already have a target value.
    pub fn translations_with_source_value(&self, source: &str) -> Result<Vec<TranslationTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, key, json_extract(locale_values, ?1) FROM translations
             WHERE json_extract(locale_values, ?1) IS NOT NULL
               AND json_extract(locale_values, ?1) != ''
             ORDER BY id ASC",
        )?;

        let tasks = stmt
            .query_map(params![json_path(source)], |row| {
                Ok(TranslationTask {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    source_text: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Records with a source value but no target value yet, as work tasks.
    /// This is the filtered preview variant of `translations_with_source_value`.
    pub fn translations_missing_target(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Vec<TranslationTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, key, json_extract(locale_values, ?1) FROM translations
             WHERE json_extract(locale_values, ?1) IS NOT NULL
               AND json_extract(locale_values, ?1) != ''
               AND (json_extract(locale_values, ?2) IS NULL
                    OR json_extract(locale_values, ?2) = '')
             ORDER BY id ASC",
        )?;

        let tasks = stmt
            .query_map(params![json_path(source), json_path(target)], |row| {
                Ok(TranslationTask {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    source_text: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Flat `key -> text` map of non-empty values for one locale.
    pub fn translations_for_locale(&self, locale: &str) -> Result<BTreeMap<String, String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, json_extract(locale_values, ?1) FROM translations
             WHERE json_extract(locale_values, ?1) IS NOT NULL
               AND json_extract(locale_values, ?1) != ''",
        )?;

        let pairs = stmt
            .query_map(params![json_path(locale)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(pairs)
    }

    // ==================== Languages ====================

    pub fn list_languages(&self) -> Result<Vec<Language>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT code, name, is_default, is_active FROM languages ORDER BY code ASC",
        )?;

        let languages = stmt
            .query_map([], language_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(languages)
    }

    pub fn get_language(&self, code: &str) -> Result<Option<Language>> {
        let conn = self.conn.lock().unwrap();
        let language = conn
            .query_row(
                "SELECT code, name, is_default, is_active FROM languages WHERE code = ?1",
                params![code],
                language_from_row,
            )
            .optional()?;

        Ok(language)
    }

    /// Insert a language. A default language unseats any previous default.
    pub fn insert_language(&self, language: &Language) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if language.is_default {
            conn.execute("UPDATE languages SET is_default = 0", [])?;
        }
        conn.execute(
            "INSERT INTO languages (code, name, is_default, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![
                language.code,
                language.name,
                language.is_default as i64,
                language.is_active as i64
            ],
        )?;
        Ok(())
    }

    /// Partial update; returns false when the language does not exist.
    pub fn update_language(
        &self,
        code: &str,
        name: Option<&str>,
        is_default: Option<bool>,
        is_active: Option<bool>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                "SELECT code, name, is_default, is_active FROM languages WHERE code = ?1",
                params![code],
                language_from_row,
            )
            .optional()?;

        let Some(current) = existing else {
            return Ok(false);
        };

        if is_default == Some(true) {
            conn.execute("UPDATE languages SET is_default = 0", [])?;
        }

        conn.execute(
            "UPDATE languages SET name = ?1, is_default = ?2, is_active = ?3 WHERE code = ?4",
            params![
                name.unwrap_or(&current.name),
                is_default.unwrap_or(current.is_default) as i64,
                is_active.unwrap_or(current.is_active) as i64,
                code
            ],
        )?;
        Ok(true)
    }

    pub fn delete_language(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM languages WHERE code = ?1", params![code])?;
        Ok(rows > 0)
    }

    /// Seed the catalog used on first run: pt (default), en, es.
    pub fn seed_default_languages(&self) -> Result<Vec<Language>> {
        let defaults = vec![
            Language {
                code: "pt".to_string(),
                name: "Português".to_string(),
                is_default: true,
                is_active: true,
            },
            Language {
                code: "en".to_string(),
                name: "English".to_string(),
                is_default: false,
                is_active: true,
            },
            Language {
                code: "es".to_string(),
                name: "Español".to_string(),
                is_default: false,
                is_active: true,
            },
        ];

        let conn = self.conn.lock().unwrap();
        for language in &defaults {
            conn.execute(
                "INSERT OR IGNORE INTO languages (code, name, is_default, is_active)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    language.code,
                    language.name,
                    language.is_default as i64,
                    language.is_active as i64
                ],
            )?;
        }

        Ok(defaults)
    }

    /// The active languages among a submitted pair. Both codes must match
    /// distinct active rows for the pair to be valid, so an identical
    /// source/target pair comes back with a single row.
    pub fn active_language_pair(&self, source: &str, target: &str) -> Result<Vec<Language>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT code, name, is_default, is_active FROM languages
             WHERE code IN (?1, ?2) AND is_active = 1",
        )?;

        let languages = stmt
            .query_map(params![source, target], language_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(languages)
    }

    /// Display names for a code pair, active or not. The worker resolves
    /// names once per job and reuses them for every task.
    pub fn language_names(&self, source: &str, target: &str) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT code, name FROM languages WHERE code IN (?1, ?2)")?;

        let names = stmt
            .query_map(params![source, target], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(names)
    }

    // ==================== Translation Jobs ====================

    pub fn insert_job(&self, job: &TranslationJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO translation_jobs
             (job_id, source_language, target_language, status, total, completed, failed, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.job_id,
                job.source_language,
                job.target_language,
                job.status,
                job.progress.total,
                job.progress.completed,
                job.progress.failed,
                job.error,
                job.created_at,
                job.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<TranslationJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT job_id, source_language, target_language, status, total, completed, failed, error, created_at, updated_at
                 FROM translation_jobs WHERE job_id = ?1",
                params![job_id],
                job_from_row,
            )
            .optional()?;

        Ok(job)
    }

    pub fn list_recent_jobs(&self, limit: u32) -> Result<Vec<TranslationJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, source_language, target_language, status, total, completed, failed, error, created_at, updated_at
             FROM translation_jobs ORDER BY created_at DESC LIMIT ?1",
        )?;

        let jobs = stmt
            .query_map(params![limit], job_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    /// Start (or restart) a processing pass. The completed counter resets;
    /// failures from an earlier delivery of the same message carry over.
    pub fn mark_job_processing(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE translation_jobs SET status = 'processing', completed = 0, updated_at = ?1
             WHERE job_id = ?2",
            params![Utc::now(), job_id],
        )?;
        Ok(())
    }

    pub fn increment_completed(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE translation_jobs SET completed = completed + 1, updated_at = ?1
             WHERE job_id = ?2",
            params![Utc::now(), job_id],
        )?;
        Ok(())
    }

    pub fn increment_failed(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE translation_jobs SET failed = failed + 1, updated_at = ?1
             WHERE job_id = ?2",
            params![Utc::now(), job_id],
        )?;
        Ok(())
    }

    /// Move a job to a terminal status. `error = None` clears any earlier
    /// error text.
    pub fn finish_job(&self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE translation_jobs SET status = ?1, error = ?2, updated_at = ?3
             WHERE job_id = ?4",
            params![status, error, Utc::now(), job_id],
        )?;
        Ok(())
    }

    /// Cancel a job. The status check and the write are a single conditional
    /// update, so a job that reached a terminal state in the meantime is
    /// left untouched (returns false).
    pub fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE translation_jobs
             SET status = 'failed', error = 'cancelled by user', updated_at = ?1
             WHERE job_id = ?2 AND status IN ('pending', 'processing')",
            params![Utc::now(), job_id],
        )?;
        Ok(rows > 0)
    }

    /// Fail pending jobs nothing has touched for `older_than_minutes`.
    /// Covers work messages lost after the job record was written.
    pub fn expire_stale_pending(&self, older_than_minutes: u64) -> Result<usize> {
        // Cap at a millennium: the cutoff must stay representable, and a
        // u64 window can exceed what chrono durations hold
        let minutes = older_than_minutes.min(60 * 24 * 365 * 1000) as i64;
        let cutoff = Utc::now() - Duration::minutes(minutes);
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE translation_jobs
             SET status = 'failed', error = 'expired before processing', updated_at = ?1
             WHERE status = 'pending' AND updated_at < ?2",
            params![Utc::now(), cutoff],
        )?;
        Ok(rows)
    }
}

fn translation_from_parts(id: i64, key: String, raw_values: &str) -> Result<Translation> {
    let values: HashMap<String, String> = serde_json::from_str(raw_values)?;
    Ok(Translation { id, key, values })
}

fn language_from_row(row: &rusqlite::Row) -> rusqlite::Result<Language> {
    Ok(Language {
        code: row.get(0)?,
        name: row.get(1)?,
        is_default: row.get::<_, i64>(2)? != 0,
        is_active: row.get::<_, i64>(3)? != 0,
    })
}

fn job_from_row(row: &rusqlite::Row) -> rusqlite::Result<TranslationJob> {
    Ok(TranslationJob {
        job_id: row.get(0)?,
        source_language: row.get(1)?,
        target_language: row.get(2)?,
        status: row.get(3)?,
        progress: JobProgress {
            total: row.get(4)?,
            completed: row.get(5)?,
            failed: row.get(6)?,
        },
        error: row.get(7)?,
        created_at: row.get::<_, DateTime<Utc>>(8)?,
        updated_at: row.get::<_, DateTime<Utc>>(9)?,
    })
}

/// JSON1 path for a locale key. Quoted so codes like `pt-BR` work.
fn json_path(locale: &str) -> String {
    format!(
        "$.\"{}\"",
        locale.replace('\\', "\\\\").replace('"', "\\\"")
    )
}
