//! Generation and entry operations on the SQLite store.

use async_trait::async_trait;
use tokio_rusqlite::{params, rusqlite};
use url::Url;

use super::connection::CacheDb;
use super::store::CacheStore;
use crate::Error;
use crate::http::{RequestKey, Response};

/// Row shape shared by insert paths.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    response_url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(key: &RequestKey, response: Response) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(response.headers())?;
        let response_url = response.url().to_string();
        let status = i64::from(response.status());
        Ok(Self {
            key_hash: key.digest(),
            method: key.method().to_string(),
            url: key.url().to_string(),
            response_url,
            status,
            headers_json,
            body: response.into_body().to_vec(),
        })
    }
}

const UPSERT_ENTRY: &str = "INSERT INTO entries (
        generation, key_hash, method, url, response_url, status, headers_json, body, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(generation, key_hash) DO UPDATE SET
        response_url = excluded.response_url,
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

fn ensure_generation(conn: &rusqlite::Connection, generation: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
        params![generation, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn insert_entry(conn: &rusqlite::Connection, generation: &str, row: &EntryRow, stored_at: &str) -> Result<(), Error> {
    conn.execute(
        UPSERT_ENTRY,
        params![
            generation,
            &row.key_hash,
            &row.method,
            &row.url,
            &row.response_url,
            row.status,
            &row.headers_json,
            &row.body,
            stored_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Number of entries stored under a generation.
    pub async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
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

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| ensure_generation(conn, &generation))
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, generation: &str, entries: Vec<(RequestKey, Response)>) -> Result<(), Error> {
        let generation = generation.to_string();
        let rows = entries
            .into_iter()
            .map(|(key, response)| EntryRow::new(&key, response))
            .collect::<Result<Vec<_>, _>>()?;
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                for row in &rows {
                    insert_entry(&tx, &generation, row, &stored_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<Response>, Error> {
        let generation = generation.to_string();
        let key_hash = key.digest();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, i64, String, Vec<u8>)>, Error> {
                let result = conn.query_row(
                    "SELECT response_url, status, headers_json, body
                     FROM entries WHERE generation = ?1 AND key_hash = ?2",
                    params![generation, key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                );

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((response_url, status, headers_json, body)) = row else {
            return Ok(None);
        };

        let url = Url::parse(&response_url).map_err(|e| Error::InvalidResponse(format!("{response_url}: {e}")))?;
        let status =
            u16::try_from(status).map_err(|_| Error::InvalidResponse(format!("stored status {status} out of range")))?;
        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;

        Ok(Some(Response::new(url, status, headers, body)))
    }

    async fn put(&self, generation: &str, key: &RequestKey, response: Response) -> Result<(), Error> {
        let generation = generation.to_string();
        let row = EntryRow::new(key, response)?;
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_generation(conn, &generation)?;
                insert_entry(conn, &generation, &row, &stored_at)
            })
            .await
            .map_err(Error::from)
    }

    async fn generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at, name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![generation])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
