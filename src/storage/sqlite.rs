//! `SQLite` storage backend.
//!
//! Durable [`GraphStore`] for single-process deployments, using the
//! deployed column contract verbatim (camelCase column names, quoted).
//! Concurrency model: a `Mutex<Connection>` with WAL mode and a busy
//! timeout; batches are single-threaded, the mutex only guards against
//! accidental cross-thread use.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{
    EdgeDraft, EdgeId, EdgeLabel, EdgeRow, EventDraft, EventId, EventKind, EventRow, OrgId,
    OrganisationDraft, OrganisationRow, PersonDraft, PersonId, PersonRow,
};
use crate::identity::TaxId;
use crate::resolve::LookupIndex;
use crate::storage::traits::{
    EdgeUpsert, EventUpsert, GraphStore, StorageError, StoreCounts, Upserted,
};
use crate::tenant::TenantCode;

fn db_err(err: rusqlite::Error) -> StorageError {
    StorageError::BackendError(err.to_string())
}

fn parse_uuid(text: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(text)
        .map_err(|err| StorageError::SerializationError(format!("bad uuid {text:?}: {err}")))
}

fn parse_date(text: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|err| StorageError::SerializationError(format!("bad date {t:?}: {err}")))
    })
    .transpose()
}

fn parse_json(text: &str) -> Result<serde_json::Value, StorageError> {
    serde_json::from_str(text)
        .map_err(|err| StorageError::SerializationError(format!("bad metadata json: {err}")))
}

fn tenant_code(text: String) -> Result<TenantCode, StorageError> {
    TenantCode::new(text).map_err(|err| StorageError::SerializationError(err.to_string()))
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "Person" (
    id TEXT PRIMARY KEY,
    "tenantCode" TEXT NOT NULL,
    "taxId" TEXT,
    "normalizedName" TEXT NOT NULL,
    "givenNames" TEXT,
    "familyNames" TEXT,
    "fullName" TEXT NOT NULL,
    title TEXT,
    source TEXT,
    "createdAt" TEXT NOT NULL,
    "updatedAt" TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS person_tenant_tax
    ON "Person" ("tenantCode", "taxId") WHERE "taxId" IS NOT NULL;
CREATE INDEX IF NOT EXISTS person_tenant_name
    ON "Person" ("tenantCode", "normalizedName");

CREATE TABLE IF NOT EXISTS "Organisation" (
    id TEXT PRIMARY KEY,
    "tenantCode" TEXT NOT NULL,
    "taxId" TEXT,
    "normalizedName" TEXT NOT NULL,
    name TEXT NOT NULL,
    type TEXT,
    source TEXT,
    "createdAt" TEXT NOT NULL,
    "updatedAt" TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS org_tenant_tax
    ON "Organisation" ("tenantCode", "taxId") WHERE "taxId" IS NOT NULL;
CREATE INDEX IF NOT EXISTS org_tenant_name
    ON "Organisation" ("tenantCode", "normalizedName");

CREATE TABLE IF NOT EXISTS "Event" (
    id TEXT PRIMARY KEY,
    "tenantCode" TEXT NOT NULL,
    "externalId" TEXT NOT NULL,
    kind TEXT NOT NULL,
    date TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    "createdAt" TEXT NOT NULL,
    "updatedAt" TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS event_natural_key
    ON "Event" ("tenantCode", "externalId", kind);

CREATE TABLE IF NOT EXISTS "Edge" (
    id TEXT PRIMARY KEY,
    "tenantCode" TEXT NOT NULL,
    "eventId" TEXT NOT NULL REFERENCES "Event"(id),
    "fromPersonId" TEXT,
    "fromOrgId" TEXT,
    "toPersonId" TEXT,
    "toOrgId" TEXT,
    label TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    "createdAt" TEXT NOT NULL,
    "updatedAt" TEXT NOT NULL
);
-- SQLite treats NULLs as distinct in unique indexes, so the natural
-- key is enforced over COALESCEd endpoint columns.
CREATE UNIQUE INDEX IF NOT EXISTS edge_natural_key
    ON "Edge" (
        "eventId",
        COALESCE("fromPersonId", ''),
        COALESCE("fromOrgId", ''),
        COALESCE("toPersonId", ''),
        COALESCE("toOrgId", ''),
        label
    );
"#;

/// `SQLite`-backed [`GraphStore`].
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Opens (or creates) a database file and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionError`] when the file cannot
    /// be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|err| StorageError::ConnectionError(err.to_string()))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionError`] when opening fails.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| StorageError::ConnectionError(err.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::BackendError("poisoned connection lock".to_string()))
    }
}

fn person_from_row(row: &Row<'_>) -> rusqlite::Result<RawPerson> {
    Ok(RawPerson {
        id: row.get(0)?,
        tenant_code: row.get(1)?,
        tax_id: row.get(2)?,
        normalized_name: row.get(3)?,
        given_names: row.get(4)?,
        family_names: row.get(5)?,
        full_name: row.get(6)?,
        title: row.get(7)?,
        source: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

struct RawPerson {
    id: String,
    tenant_code: String,
    tax_id: Option<String>,
    normalized_name: String,
    given_names: Option<String>,
    family_names: Option<String>,
    full_name: String,
    title: Option<String>,
    source: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawPerson {
    fn into_row(self) -> Result<PersonRow, StorageError> {
        Ok(PersonRow {
            id: PersonId::from_uuid(parse_uuid(&self.id)?),
            tenant_code: tenant_code(self.tenant_code)?,
            tax_id: self.tax_id,
            normalized_name: self.normalized_name,
            given_names: self.given_names,
            family_names: self.family_names,
            full_name: self.full_name,
            title: self.title,
            source: self.source,
            created_at: parse_date(Some(self.created_at))?
                .unwrap_or_else(Utc::now),
            updated_at: parse_date(Some(self.updated_at))?
                .unwrap_or_else(Utc::now),
        })
    }
}

const PERSON_COLUMNS: &str = r#"id, "tenantCode", "taxId", "normalizedName", "givenNames", "familyNames", "fullName", title, source, "createdAt", "updatedAt""#;

impl GraphStore for SqliteGraphStore {
    fn upsert_person(&self, draft: &PersonDraft) -> Result<Upserted<PersonId>, StorageError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tenant = draft.tenant_code.as_str();

        // 1. Valid tax-id wins.
        if let Some(tax) = &draft.tax_id {
            let hit: Option<String> = conn
                .query_row(
                    r#"SELECT id FROM "Person" WHERE "tenantCode" = ?1 AND "taxId" = ?2"#,
                    params![tenant, tax.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if let Some(id) = hit {
                conn.execute(
                    r#"UPDATE "Person" SET
                        "givenNames" = COALESCE("givenNames", ?2),
                        "familyNames" = COALESCE("familyNames", ?3),
                        title = COALESCE(title, ?4),
                        source = COALESCE(source, ?5),
                        "fullName" = CASE WHEN "fullName" = '' THEN ?6 ELSE "fullName" END,
                        "updatedAt" = ?7
                    WHERE id = ?1"#,
                    params![
                        id,
                        draft.given_names,
                        draft.family_names,
                        draft.title,
                        draft.source,
                        draft.full_name,
                        now
                    ],
                )
                .map_err(db_err)?;
                return Ok(Upserted::Updated(PersonId::from_uuid(parse_uuid(&id)?)));
            }
        }

        // 2. Normalized name.
        if !draft.normalized_name.is_empty() {
            let mut stmt = conn
                .prepare(
                    r#"SELECT id, "taxId" FROM "Person"
                    WHERE "tenantCode" = ?1 AND "normalizedName" = ?2
                    ORDER BY "createdAt", id"#,
                )
                .map_err(db_err)?;
            let candidates: Vec<(String, Option<String>)> = stmt
                .query_map(params![tenant, draft.normalized_name], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(db_err)?
                .collect::<Result<_, _>>()
                .map_err(db_err)?;
            drop(stmt);

            if !candidates.is_empty() {
                if let Some(tax) = &draft.tax_id {
                    let tax_less: Vec<&String> = candidates
                        .iter()
                        .filter(|(_, t)| t.is_none())
                        .map(|(id, _)| id)
                        .collect();
                    match tax_less.as_slice() {
                        [] => {}
                        [id] => {
                            conn.execute(
                                r#"UPDATE "Person" SET
                                    "taxId" = ?2,
                                    "givenNames" = COALESCE("givenNames", ?3),
                                    "familyNames" = COALESCE("familyNames", ?4),
                                    title = COALESCE(title, ?5),
                                    source = COALESCE(source, ?6),
                                    "updatedAt" = ?7
                                WHERE id = ?1"#,
                                params![
                                    id,
                                    tax.as_str(),
                                    draft.given_names,
                                    draft.family_names,
                                    draft.title,
                                    draft.source,
                                    now
                                ],
                            )
                            .map_err(db_err)?;
                            return Ok(Upserted::Updated(PersonId::from_uuid(parse_uuid(id)?)));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                } else {
                    match candidates.as_slice() {
                        [(id, _)] => {
                            conn.execute(
                                r#"UPDATE "Person" SET
                                    "givenNames" = COALESCE("givenNames", ?2),
                                    "familyNames" = COALESCE("familyNames", ?3),
                                    title = COALESCE(title, ?4),
                                    source = COALESCE(source, ?5),
                                    "updatedAt" = ?6
                                WHERE id = ?1"#,
                                params![
                                    id,
                                    draft.given_names,
                                    draft.family_names,
                                    draft.title,
                                    draft.source,
                                    now
                                ],
                            )
                            .map_err(db_err)?;
                            return Ok(Upserted::Updated(PersonId::from_uuid(parse_uuid(id)?)));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                }
            }
        }

        // 3. Insert a new row.
        let id = PersonId::new();
        conn.execute(
            r#"INSERT INTO "Person" (id, "tenantCode", "taxId", "normalizedName", "givenNames", "familyNames", "fullName", title, source, "createdAt", "updatedAt")
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)"#,
            params![
                id.to_string(),
                tenant,
                draft.tax_id.as_ref().map(TaxId::as_str),
                draft.normalized_name,
                draft.given_names,
                draft.family_names,
                draft.full_name,
                draft.title,
                draft.source,
                now
            ],
        )
        .map_err(db_err)?;
        Ok(Upserted::Created(id))
    }

    fn upsert_organisation(
        &self,
        draft: &OrganisationDraft,
    ) -> Result<Upserted<OrgId>, StorageError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tenant = draft.tenant_code.as_str();

        if let Some(tax) = &draft.tax_id {
            let hit: Option<String> = conn
                .query_row(
                    r#"SELECT id FROM "Organisation" WHERE "tenantCode" = ?1 AND "taxId" = ?2"#,
                    params![tenant, tax.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if let Some(id) = hit {
                conn.execute(
                    r#"UPDATE "Organisation" SET
                        type = COALESCE(type, ?2),
                        source = COALESCE(source, ?3),
                        name = CASE WHEN name = '' THEN ?4 ELSE name END,
                        "updatedAt" = ?5
                    WHERE id = ?1"#,
                    params![id, draft.org_type, draft.source, draft.name, now],
                )
                .map_err(db_err)?;
                return Ok(Upserted::Updated(OrgId::from_uuid(parse_uuid(&id)?)));
            }
        }

        if !draft.normalized_name.is_empty() {
            let mut stmt = conn
                .prepare(
                    r#"SELECT id, "taxId" FROM "Organisation"
                    WHERE "tenantCode" = ?1 AND "normalizedName" = ?2
                    ORDER BY "createdAt", id"#,
                )
                .map_err(db_err)?;
            let candidates: Vec<(String, Option<String>)> = stmt
                .query_map(params![tenant, draft.normalized_name], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(db_err)?
                .collect::<Result<_, _>>()
                .map_err(db_err)?;
            drop(stmt);

            if !candidates.is_empty() {
                if let Some(tax) = &draft.tax_id {
                    let tax_less: Vec<&String> = candidates
                        .iter()
                        .filter(|(_, t)| t.is_none())
                        .map(|(id, _)| id)
                        .collect();
                    match tax_less.as_slice() {
                        [] => {}
                        [id] => {
                            conn.execute(
                                r#"UPDATE "Organisation" SET
                                    "taxId" = ?2,
                                    type = COALESCE(type, ?3),
                                    source = COALESCE(source, ?4),
                                    "updatedAt" = ?5
                                WHERE id = ?1"#,
                                params![id, tax.as_str(), draft.org_type, draft.source, now],
                            )
                            .map_err(db_err)?;
                            return Ok(Upserted::Updated(OrgId::from_uuid(parse_uuid(id)?)));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                } else {
                    match candidates.as_slice() {
                        [(id, _)] => {
                            conn.execute(
                                r#"UPDATE "Organisation" SET
                                    type = COALESCE(type, ?2),
                                    source = COALESCE(source, ?3),
                                    "updatedAt" = ?4
                                WHERE id = ?1"#,
                                params![id, draft.org_type, draft.source, now],
                            )
                            .map_err(db_err)?;
                            return Ok(Upserted::Updated(OrgId::from_uuid(parse_uuid(id)?)));
                        }
                        _ => {
                            return Err(StorageError::AmbiguousNaturalKey(
                                draft.normalized_name.clone(),
                            ))
                        }
                    }
                }
            }
        }

        let id = OrgId::new();
        conn.execute(
            r#"INSERT INTO "Organisation" (id, "tenantCode", "taxId", "normalizedName", name, type, source, "createdAt", "updatedAt")
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
            params![
                id.to_string(),
                tenant,
                draft.tax_id.as_ref().map(TaxId::as_str),
                draft.normalized_name,
                draft.name,
                draft.org_type,
                draft.source,
                now
            ],
        )
        .map_err(db_err)?;
        Ok(Upserted::Created(id))
    }

    fn upsert_event(&self, draft: &EventDraft) -> Result<EventUpsert, StorageError> {
        let external_id = draft.external_id.trim();
        if external_id.is_empty() {
            return Err(crate::error::ValidationError::EmptyExternalId.into());
        }

        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tenant = draft.tenant_code.as_str();
        let metadata = serde_json::to_string(&draft.metadata)
            .map_err(|err| StorageError::SerializationError(err.to_string()))?;

        let hit: Option<String> = conn
            .query_row(
                r#"SELECT id FROM "Event" WHERE "tenantCode" = ?1 AND "externalId" = ?2 AND kind = ?3"#,
                params![tenant, external_id, draft.kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(id) = hit {
            // Mutable fields only.
            conn.execute(
                r#"UPDATE "Event" SET
                    date = COALESCE(?2, date),
                    metadata = CASE WHEN ?3 = 'null' THEN metadata ELSE ?3 END,
                    "updatedAt" = ?4
                WHERE id = ?1"#,
                params![
                    id,
                    draft.date.map(|d| d.to_rfc3339()),
                    metadata,
                    now
                ],
            )
            .map_err(db_err)?;
            return Ok(EventUpsert::Existing(EventId::from_uuid(parse_uuid(&id)?)));
        }

        let id = EventId::new();
        conn.execute(
            r#"INSERT INTO "Event" (id, "tenantCode", "externalId", kind, date, metadata, "createdAt", "updatedAt")
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
            params![
                id.to_string(),
                tenant,
                external_id,
                draft.kind.as_str(),
                draft.date.map(|d| d.to_rfc3339()),
                metadata,
                now
            ],
        )
        .map_err(db_err)?;
        Ok(EventUpsert::Created(id))
    }

    fn upsert_edge(&self, draft: &EdgeDraft) -> Result<EdgeUpsert, StorageError> {
        draft.validate().map_err(StorageError::InvalidDraft)?;

        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(&draft.metadata)
            .map_err(|err| StorageError::SerializationError(err.to_string()))?;

        let changed = conn
            .execute(
                r#"INSERT INTO "Edge" (id, "tenantCode", "eventId", "fromPersonId", "fromOrgId", "toPersonId", "toOrgId", label, metadata, "createdAt", "updatedAt")
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                ON CONFLICT DO NOTHING"#,
                params![
                    EdgeId::new().to_string(),
                    draft.tenant_code.as_str(),
                    draft.event_id.to_string(),
                    draft.from_person_id.map(|id| id.to_string()),
                    draft.from_org_id.map(|id| id.to_string()),
                    draft.to_person_id.map(|id| id.to_string()),
                    draft.to_org_id.map(|id| id.to_string()),
                    draft.label.as_str(),
                    metadata,
                    now
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            Ok(EdgeUpsert::Duplicate)
        } else {
            Ok(EdgeUpsert::Created)
        }
    }

    fn person_index(&self, tenant: &TenantCode) -> Result<LookupIndex<PersonId>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"SELECT id, "taxId", "normalizedName" FROM "Person" WHERE "tenantCode" = ?1"#,
            )
            .map_err(db_err)?;
        let rows: Vec<(String, Option<String>, String)> = stmt
            .query_map(params![tenant.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(db_err)?
            .collect::<Result<_, _>>()
            .map_err(db_err)?;

        let mut index = LookupIndex::new();
        for (id, tax, name) in rows {
            let id = PersonId::from_uuid(parse_uuid(&id)?);
            let tax = tax.map(TaxId::from_canonical);
            index.insert(tax.as_ref(), &name, id);
        }
        Ok(index)
    }

    fn organisation_index(
        &self,
        tenant: &TenantCode,
    ) -> Result<LookupIndex<OrgId>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"SELECT id, "taxId", "normalizedName" FROM "Organisation" WHERE "tenantCode" = ?1"#,
            )
            .map_err(db_err)?;
        let rows: Vec<(String, Option<String>, String)> = stmt
            .query_map(params![tenant.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(db_err)?
            .collect::<Result<_, _>>()
            .map_err(db_err)?;

        let mut index = LookupIndex::new();
        for (id, tax, name) in rows {
            let id = OrgId::from_uuid(parse_uuid(&id)?);
            let tax = tax.map(TaxId::from_canonical);
            index.insert(tax.as_ref(), &name, id);
        }
        Ok(index)
    }

    fn find_event(
        &self,
        tenant: &TenantCode,
        external_id: &str,
        kind: &EventKind,
    ) -> Result<Option<EventId>, StorageError> {
        let conn = self.lock()?;
        let hit: Option<String> = conn
            .query_row(
                r#"SELECT id FROM "Event" WHERE "tenantCode" = ?1 AND "externalId" = ?2 AND kind = ?3"#,
                params![tenant.as_str(), external_id.trim(), kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        hit.map(|id| Ok(EventId::from_uuid(parse_uuid(&id)?))).transpose()
    }

    fn get_person(&self, id: PersonId) -> Result<Option<PersonRow>, StorageError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(r#"SELECT {PERSON_COLUMNS} FROM "Person" WHERE id = ?1"#),
                params![id.to_string()],
                person_from_row,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawPerson::into_row).transpose()
    }

    fn get_organisation(&self, id: OrgId) -> Result<Option<OrganisationRow>, StorageError> {
        let conn = self.lock()?;
        let raw: Option<(String, String, Option<String>, String, String, Option<String>, Option<String>, String, String)> = conn
            .query_row(
                r#"SELECT id, "tenantCode", "taxId", "normalizedName", name, type, source, "createdAt", "updatedAt" FROM "Organisation" WHERE id = ?1"#,
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        raw.map(
            |(id, tenant, tax, normalized, name, org_type, source, created, updated)| {
                Ok(OrganisationRow {
                    id: OrgId::from_uuid(parse_uuid(&id)?),
                    tenant_code: tenant_code(tenant)?,
                    tax_id: tax,
                    normalized_name: normalized,
                    name,
                    org_type,
                    source,
                    created_at: parse_date(Some(created))?.unwrap_or_else(Utc::now),
                    updated_at: parse_date(Some(updated))?.unwrap_or_else(Utc::now),
                })
            },
        )
        .transpose()
    }

    fn get_event(&self, id: EventId) -> Result<Option<EventRow>, StorageError> {
        let conn = self.lock()?;
        let raw: Option<(String, String, String, String, Option<String>, String, String, String)> =
            conn.query_row(
                r#"SELECT id, "tenantCode", "externalId", kind, date, metadata, "createdAt", "updatedAt" FROM "Event" WHERE id = ?1"#,
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        raw.map(
            |(id, tenant, external_id, kind, date, metadata, created, updated)| {
                Ok(EventRow {
                    id: EventId::from_uuid(parse_uuid(&id)?),
                    tenant_code: tenant_code(tenant)?,
                    external_id,
                    kind: EventKind::try_from(kind)
                        .map_err(|err| StorageError::SerializationError(err.to_string()))?,
                    date: parse_date(date)?,
                    metadata: parse_json(&metadata)?,
                    created_at: parse_date(Some(created))?.unwrap_or_else(Utc::now),
                    updated_at: parse_date(Some(updated))?.unwrap_or_else(Utc::now),
                })
            },
        )
        .transpose()
    }

    fn edges_for_event(&self, id: EventId) -> Result<Vec<EdgeRow>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"SELECT id, "tenantCode", "eventId", "fromPersonId", "fromOrgId", "toPersonId", "toOrgId", label, metadata, "createdAt", "updatedAt"
                FROM "Edge" WHERE "eventId" = ?1 ORDER BY "createdAt", id"#,
            )
            .map_err(db_err)?;

        type RawEdge = (
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            String,
            String,
            String,
        );
        let rows: Vec<RawEdge> = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<_, _>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(
                |(
                    id,
                    tenant,
                    event_id,
                    from_person,
                    from_org,
                    to_person,
                    to_org,
                    label,
                    metadata,
                    created,
                    updated,
                )| {
                    Ok(EdgeRow {
                        id: EdgeId::from_uuid(parse_uuid(&id)?),
                        tenant_code: tenant_code(tenant)?,
                        event_id: EventId::from_uuid(parse_uuid(&event_id)?),
                        from_person_id: from_person
                            .map(|s| Ok::<_, StorageError>(PersonId::from_uuid(parse_uuid(&s)?)))
                            .transpose()?,
                        from_org_id: from_org
                            .map(|s| Ok::<_, StorageError>(OrgId::from_uuid(parse_uuid(&s)?)))
                            .transpose()?,
                        to_person_id: to_person
                            .map(|s| Ok::<_, StorageError>(PersonId::from_uuid(parse_uuid(&s)?)))
                            .transpose()?,
                        to_org_id: to_org
                            .map(|s| Ok::<_, StorageError>(OrgId::from_uuid(parse_uuid(&s)?)))
                            .transpose()?,
                        label: EdgeLabel::try_from(label)
                            .map_err(|err| StorageError::SerializationError(err.to_string()))?,
                        metadata: parse_json(&metadata)?,
                        created_at: parse_date(Some(created))?.unwrap_or_else(Utc::now),
                        updated_at: parse_date(Some(updated))?.unwrap_or_else(Utc::now),
                    })
                },
            )
            .collect()
    }

    fn counts(&self, tenant: &TenantCode) -> Result<StoreCounts, StorageError> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<usize, StorageError> {
            let n: i64 = conn
                .query_row(
                    &format!(r#"SELECT COUNT(*) FROM "{table}" WHERE "tenantCode" = ?1"#),
                    params![tenant.as_str()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(n as usize)
        };
        Ok(StoreCounts {
            persons: count("Person")?,
            organisations: count("Organisation")?,
            events: count("Event")?,
            edges: count("Edge")?,
        })
    }

    fn in_transaction(
        &self,
        f: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        // The mutex is not reentrant, so the transaction statements
        // take their own short-lived locks around the closure.
        {
            let conn = self.lock()?;
            conn.execute_batch("BEGIN IMMEDIATE").map_err(db_err)?;
        }
        match f(self) {
            Ok(()) => {
                let conn = self.lock()?;
                conn.execute_batch("COMMIT").map_err(db_err)
            }
            Err(err) => {
                if let Ok(conn) = self.lock() {
                    let _ = conn.execute_batch("ROLLBACK");
                }
                Err(err)
            }
        }
    }
}
