//! Generation rows and their lifecycle transitions.
//!
//! Every transition runs inside a single SQLite transaction so a crash or a
//! dropped future leaves each generation in exactly one state.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction};

use super::connection::CacheDb;
use super::entries::NewEntry;
use crate::Error;

/// Lifecycle state of a cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Manifest fetch in progress; holds no entries yet.
    Installing,
    /// Fully populated, not serving traffic.
    Waiting,
    /// Serving every lookup. At most one generation is in this state.
    Active,
    /// Replaced by a newer generation; waiting for in-flight readers.
    Superseded,
    /// Entries removed. Terminal.
    Deleted,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationState::Installing => "installing",
            GenerationState::Waiting => "waiting",
            GenerationState::Active => "active",
            GenerationState::Superseded => "superseded",
            GenerationState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installing" => Ok(GenerationState::Installing),
            "waiting" => Ok(GenerationState::Waiting),
            "active" => Ok(GenerationState::Active),
            "superseded" => Ok(GenerationState::Superseded),
            "deleted" => Ok(GenerationState::Deleted),
            other => Err(Error::CorruptEntry(format!("unknown generation state: {other}"))),
        }
    }
}

/// A generation row plus its entry count.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Generation {
    pub name: String,
    pub state: GenerationState,
    pub created_at: String,
    pub installed_at: Option<String>,
    pub activated_at: Option<String>,
    pub superseded_at: Option<String>,
    pub deleted_at: Option<String>,
    pub entry_count: i64,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn state_of(tx: &Transaction<'_>, name: &str) -> Result<Option<GenerationState>, Error> {
    let raw: Option<String> = tx
        .query_row("SELECT state FROM generations WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;
    raw.map(|s| s.parse()).transpose()
}

fn map_generation(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Generation, String)> {
    let state: String = row.get(1)?;
    Ok((
        Generation {
            name: row.get(0)?,
            state: GenerationState::Installing,
            created_at: row.get(2)?,
            installed_at: row.get(3)?,
            activated_at: row.get(4)?,
            superseded_at: row.get(5)?,
            deleted_at: row.get(6)?,
            entry_count: row.get(7)?,
        },
        state,
    ))
}

const GENERATION_COLUMNS: &str = "g.name, g.state, g.created_at, g.installed_at, g.activated_at,
    g.superseded_at, g.deleted_at,
    (SELECT COUNT(*) FROM entries e WHERE e.generation = g.name)";

impl CacheDb {
    /// Check that `name` may be installed and claim it if it is new.
    ///
    /// A new name is recorded as `Installing`. A `Waiting` or `Deleted`
    /// generation of the same name is left as it is until
    /// [`commit_install`](Self::commit_install) replaces it, so a failed
    /// reinstall cannot damage it. Any other existing state is rejected.
    pub async fn begin_install(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                match state_of(&tx, &name)? {
                    None => {
                        tx.execute(
                            "INSERT INTO generations (name, state, created_at) VALUES (?1, 'installing', ?2)",
                            params![name, now()],
                        )?;
                    }
                    Some(GenerationState::Waiting | GenerationState::Deleted) => {}
                    Some(state) => {
                        return Err(Error::InvalidTransition(format!(
                            "cannot install generation {name}: it is {state}"
                        )));
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Write every fetched manifest entry and move the generation to `Waiting`.
    ///
    /// All rows land in one transaction: either the generation is complete or
    /// nothing was written. When reinstalling a `Waiting` or `Deleted`
    /// generation, its previous entries are dropped in the same transaction.
    pub async fn commit_install(&self, name: &str, entries: Vec<NewEntry>) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                match state_of(&tx, &name)? {
                    Some(GenerationState::Installing) => {}
                    Some(GenerationState::Waiting | GenerationState::Deleted) => {
                        tx.execute("DELETE FROM entries WHERE generation = ?1", params![name])?;
                        tx.execute(
                            "UPDATE generations SET activated_at = NULL, superseded_at = NULL, deleted_at = NULL
                             WHERE name = ?1",
                            params![name],
                        )?;
                    }
                    Some(state) => {
                        return Err(Error::InvalidTransition(format!(
                            "cannot finish installing {name}: it is {state}"
                        )));
                    }
                    None => return Err(Error::GenerationNotFound(name)),
                }

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO entries (
                            generation, key_hash, method, url, status, headers_json, body, stored_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        ON CONFLICT(generation, key_hash) DO UPDATE SET
                            method = excluded.method,
                            url = excluded.url,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                    )?;
                    for entry in &entries {
                        stmt.execute(params![
                            &name,
                            &entry.key_hash,
                            &entry.method,
                            &entry.url,
                            entry.status,
                            &entry.headers_json,
                            &entry.body,
                            &entry.stored_at,
                        ])?;
                    }
                }

                tx.execute(
                    "UPDATE generations SET state = 'waiting', installed_at = ?2 WHERE name = ?1",
                    params![name, now()],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Drop a generation still marked `Installing`, along with anything it holds.
    ///
    /// A reinstall of an existing `Waiting` or `Deleted` generation never
    /// touched its row, so there is nothing to undo for it. Returns whether a
    /// row was removed.
    pub async fn abort_install(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute(
                    "DELETE FROM generations WHERE name = ?1 AND state = 'installing'",
                    params![name],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every generation left in `Installing`, e.g. after a crash.
    pub async fn remove_stale_installs(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM generations WHERE state = 'installing'", [])?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Make a `Waiting` generation active, superseding the current one.
    ///
    /// Returns the name of the generation that was superseded, if any.
    pub async fn activate_generation(&self, name: &str) -> Result<Option<String>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let tx = conn.transaction()?;
                match state_of(&tx, &name)? {
                    Some(GenerationState::Waiting) => {}
                    Some(state) => {
                        return Err(Error::InvalidTransition(format!("cannot activate generation {name}: it is {state}")));
                    }
                    None => return Err(Error::GenerationNotFound(name)),
                }

                let previous: Option<String> = tx
                    .query_row("SELECT name FROM generations WHERE state = 'active'", [], |row| row.get(0))
                    .optional()?;

                let stamp = now();
                if let Some(previous) = &previous {
                    tx.execute(
                        "UPDATE generations SET state = 'superseded', superseded_at = ?2 WHERE name = ?1",
                        params![previous, stamp],
                    )?;
                }
                tx.execute(
                    "UPDATE generations SET state = 'active', activated_at = ?2 WHERE name = ?1",
                    params![name, stamp],
                )?;
                tx.commit()?;
                Ok(previous)
            })
            .await
            .map_err(Error::from)
    }

    /// Name of the active generation, if any.
    pub async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let name = conn
                    .query_row("SELECT name FROM generations WHERE state = 'active'", [], |row| row.get(0))
                    .optional()?;
                Ok(name)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of generations waiting to be garbage-collected.
    pub async fn superseded_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT name FROM generations WHERE state = 'superseded' ORDER BY superseded_at")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of a generation and mark it `Deleted`.
    ///
    /// Rejected for the active generation and for one still installing.
    /// Returns the number of entries removed.
    pub async fn delete_generation(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                match state_of(&tx, &name)? {
                    Some(state @ (GenerationState::Active | GenerationState::Installing)) => {
                        return Err(Error::InvalidTransition(format!("cannot delete generation {name}: it is {state}")));
                    }
                    Some(_) => {}
                    None => return Err(Error::GenerationNotFound(name)),
                }

                let removed = tx.execute("DELETE FROM entries WHERE generation = ?1", params![name])?;
                tx.execute(
                    "UPDATE generations SET state = 'deleted', deleted_at = COALESCE(deleted_at, ?2) WHERE name = ?1",
                    params![name, now()],
                )?;
                tx.commit()?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up one generation.
    pub async fn get_generation(&self, name: &str) -> Result<Option<Generation>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Generation>, Error> {
                let sql = format!("SELECT {GENERATION_COLUMNS} FROM generations g WHERE g.name = ?1");
                let row = conn.query_row(&sql, params![name], map_generation).optional()?;
                row.map(|(mut generation, state)| {
                    generation.state = state.parse()?;
                    Ok(generation)
                })
                .transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// All generations, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<Generation>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<Generation>, Error> {
                let sql = format!("SELECT {GENERATION_COLUMNS} FROM generations g ORDER BY g.created_at, g.name");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], map_generation)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter()
                    .map(|(mut generation, state)| {
                        generation.state = state.parse()?;
                        Ok(generation)
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }
}
