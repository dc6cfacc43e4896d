//! Stored response rows.
//!
//! Entries are addressed by `(generation, key_hash)`. Writes are single
//! statements, so an entry is either fully present or absent.

use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, types::Type};

use super::connection::CacheDb;
use super::hash::identity_key;
use crate::Error;
use crate::request::RequestIdentity;
use crate::response::StoredResponse;

/// A row ready to be written into a generation.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers_json: String,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl NewEntry {
    pub fn new(identity: &RequestIdentity, response: &StoredResponse) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::StoreWrite(format!("failed to encode headers: {e}")))?;
        Ok(Self {
            key_hash: identity_key(identity),
            method: identity.method().to_string(),
            url: identity.url().to_string(),
            status: response.status,
            headers_json,
            body: response.body.clone(),
            stored_at: response.stored_at.to_rfc3339(),
        })
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn map_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResponse> {
    let headers_json: String = row.get(1)?;
    let stored_at: String = row.get(3)?;
    Ok(StoredResponse {
        status: row.get(0)?,
        headers: serde_json::from_str(&headers_json).map_err(|e| conversion_error(1, e))?,
        body: row.get(2)?,
        stored_at: DateTime::parse_from_rfc3339(&stored_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(3, e))?,
    })
}

impl CacheDb {
    /// Read one entry from a generation.
    ///
    /// Returns None if the generation holds no entry for the key.
    pub async fn get_entry(&self, generation: &str, key_hash: &str) -> Result<Option<StoredResponse>, Error> {
        let generation = generation.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let result = conn
                    .query_row(
                        "SELECT status, headers_json, body, stored_at
                         FROM entries WHERE generation = ?1 AND key_hash = ?2",
                        params![generation, key_hash],
                        map_stored,
                    )
                    .optional();

                match result {
                    Ok(entry) => Ok(entry),
                    Err(rusqlite::Error::FromSqlConversionFailure(_, _, e)) => Err(Error::CorruptEntry(e.to_string())),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Upsert an entry into an active generation.
    ///
    /// The row replaces any previous entry for the same key wholesale. Writing
    /// into a generation that is not active is a `StoreWrite` error, as is any
    /// rejection from SQLite itself (disk full, read-only file, ...).
    pub async fn put_entry(&self, generation: &str, entry: NewEntry) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let written = conn
                    .execute(
                        "INSERT INTO entries (
                            generation, key_hash, method, url, status, headers_json, body, stored_at
                        )
                        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                        WHERE EXISTS (SELECT 1 FROM generations WHERE name = ?1 AND state = 'active')
                        ON CONFLICT(generation, key_hash) DO UPDATE SET
                            method = excluded.method,
                            url = excluded.url,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![
                            &generation,
                            &entry.key_hash,
                            &entry.method,
                            &entry.url,
                            entry.status,
                            &entry.headers_json,
                            &entry.body,
                            &entry.stored_at,
                        ],
                    )
                    .map_err(|e| Error::StoreWrite(e.to_string()))?;

                if written == 0 {
                    return Err(Error::StoreWrite(format!("generation {generation} is not active")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries held by a generation.
    pub async fn count_entries(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![generation], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HttpResponse;

    fn stored(body: &str) -> StoredResponse {
        StoredResponse::now(HttpResponse::new(
            200,
            vec![("content-type".into(), "text/plain".into())],
            body.as_bytes().to_vec(),
        ))
    }

    async fn active_db(name: &str) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.begin_install(name).await.unwrap();
        db.commit_install(name, Vec::new()).await.unwrap();
        db.activate_generation(name).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = active_db("v1").await;
        let id = RequestIdentity::get("https://shop.test/uploads/a.jpg").unwrap();
        let response = stored("jpeg bytes");

        db.put_entry("v1", NewEntry::new(&id, &response).unwrap()).await.unwrap();

        let retrieved = db.get_entry("v1", &identity_key(&id)).await.unwrap().unwrap();
        assert_eq!(retrieved.body, response.body);
        assert_eq!(retrieved.headers, response.headers);
        assert_eq!(retrieved.stored_at.timestamp_micros(), response.stored_at.timestamp_micros());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = active_db("v1").await;
        assert!(db.get_entry("v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_wholesale() {
        let db = active_db("v1").await;
        let id = RequestIdentity::get("https://shop.test/").unwrap();

        db.put_entry("v1", NewEntry::new(&id, &stored("old")).unwrap()).await.unwrap();
        db.put_entry("v1", NewEntry::new(&id, &stored("new")).unwrap()).await.unwrap();

        let retrieved = db.get_entry("v1", &identity_key(&id)).await.unwrap().unwrap();
        assert_eq!(retrieved.body, b"new".to_vec());
        assert_eq!(db.count_entries("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_into_inactive_generation_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.begin_install("v1").await.unwrap();
        db.commit_install("v1", Vec::new()).await.unwrap();

        let id = RequestIdentity::get("https://shop.test/").unwrap();
        let result = db.put_entry("v1", NewEntry::new(&id, &stored("x")).unwrap()).await;
        assert!(matches!(result, Err(Error::StoreWrite(_))));

        let result = db.put_entry("missing", NewEntry::new(&id, &stored("x")).unwrap()).await;
        assert!(matches!(result, Err(Error::StoreWrite(_))));
    }

    #[tokio::test]
    async fn test_corrupt_headers_reported() {
        let db = active_db("v1").await;
        let id = RequestIdentity::get("https://shop.test/").unwrap();
        let mut entry = NewEntry::new(&id, &stored("x")).unwrap();
        entry.headers_json = "{not json".into();
        db.put_entry("v1", entry).await.unwrap();

        let result = db.get_entry("v1", &identity_key(&id)).await;
        assert!(matches!(result, Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_commit_install_writes_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let a = RequestIdentity::get("https://shop.test/").unwrap();
        let b = RequestIdentity::get("https://shop.test/app.css").unwrap();

        db.begin_install("v1").await.unwrap();
        db.commit_install(
            "v1",
            vec![NewEntry::new(&a, &stored("index")).unwrap(), NewEntry::new(&b, &stored("css")).unwrap()],
        )
        .await
        .unwrap();

        assert_eq!(db.count_entries("v1").await.unwrap(), 2);
        assert!(db.get_entry("v1", &identity_key(&b)).await.unwrap().is_some());
    }
}
