//! Postgres store.
//!
//! Each unit of work is one database transaction. Rows that a caller intends to
//! change are read with `SELECT … FOR UPDATE`; goods are always locked in id order
//! so that two verifications touching the same goods cannot deadlock each other.
//! Writes additionally carry an optimistic version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{ExpectedVersion, GoodId, RequestId, RequestLineId, UserId};
use stockroom_inventory::{Good, GoodSnapshot};
use stockroom_requests::{Request, RequestLine, RequestSnapshot, RequestStatus, Verification};

use super::{
    GoodFilter, GoodRepository, Page, Pagination, RequestFilter, RequestRepository, Store,
    UnitOfWork,
};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const GOOD_COLUMNS: &str = "id, code, name, unit, description, quantity_on_hand, \
     critical_threshold, active, version, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, requester_id, submitted_at, note, status, verifier_id, \
     verified_at, decision_note, version";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using the given settings.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn install_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("install_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// A single Postgres transaction. Dropping it uncommitted rolls back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

/// Map sqlx errors onto store errors.
///
/// Serialization failures, deadlocks and lock timeouts are transient: the whole
/// transaction was rolled back and may be retried by the caller.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Transient(msg),
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Transient(format!("io error in {}: {}", operation, e)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("failed to decode row in {}: {}", operation, err))
        }
        other => StoreError::Database(format!("{} failed: {}", operation, other)),
    }
}

fn to_db_version(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

fn from_db_version(version: i64) -> StoreResult<u64> {
    u64::try_from(version).map_err(|_| StoreError::Corrupt(format!("negative version {version}")))
}

fn expected_db_version(expected: ExpectedVersion) -> StoreResult<Option<i64>> {
    match expected {
        ExpectedVersion::Any => Ok(None),
        ExpectedVersion::Exact(v) => to_db_version(v).map(Some),
    }
}

/// Escape LIKE metacharacters and wrap the term for a substring match.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn good_from_row(row: &PgRow) -> StoreResult<Good> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_good", e);
    Ok(Good::from_snapshot(GoodSnapshot {
        id: GoodId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        code: row.try_get("code").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        unit: row.try_get("unit").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        quantity_on_hand: row.try_get("quantity_on_hand").map_err(decode)?,
        critical_threshold: row.try_get("critical_threshold").map_err(decode)?,
        active: row.try_get("active").map_err(decode)?,
        version: from_db_version(row.try_get("version").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    }))
}

fn goods_from_rows(rows: &[PgRow]) -> StoreResult<Vec<Good>> {
    rows.iter().map(good_from_row).collect()
}

struct RequestHeader {
    id: RequestId,
    requester: UserId,
    submitted_at: DateTime<Utc>,
    note: Option<String>,
    status: RequestStatus,
    verification: Option<Verification>,
    version: u64,
}

fn header_from_row(row: &PgRow) -> StoreResult<RequestHeader> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_request", e);
    let id = RequestId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?);
    let status_raw: String = row.try_get("status").map_err(decode)?;
    let status = status_raw
        .parse::<RequestStatus>()
        .map_err(|_| StoreError::Corrupt(format!("request {id} has unknown status '{status_raw}'")))?;

    let verifier: Option<Uuid> = row.try_get("verifier_id").map_err(decode)?;
    let verified_at: Option<DateTime<Utc>> = row.try_get("verified_at").map_err(decode)?;
    let verification = match (verifier, verified_at) {
        (Some(verifier), Some(verified_at)) => Some(Verification {
            verifier: UserId::from_uuid(verifier),
            verified_at,
            note: row.try_get("decision_note").map_err(decode)?,
        }),
        (None, None) => None,
        _ => {
            return Err(StoreError::Corrupt(format!(
                "request {id} has partial verification metadata"
            )));
        }
    };

    Ok(RequestHeader {
        id,
        requester: UserId::from_uuid(row.try_get::<Uuid, _>("requester_id").map_err(decode)?),
        submitted_at: row.try_get("submitted_at").map_err(decode)?,
        note: row.try_get("note").map_err(decode)?,
        status,
        verification,
        version: from_db_version(row.try_get("version").map_err(decode)?)?,
    })
}

fn line_from_row(row: &PgRow) -> StoreResult<(RequestId, RequestLine)> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_request_line", e);
    Ok((
        RequestId::from_uuid(row.try_get::<Uuid, _>("request_id").map_err(decode)?),
        RequestLine {
            line_id: RequestLineId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
            good_id: GoodId::from_uuid(row.try_get::<Uuid, _>("good_id").map_err(decode)?),
            quantity_requested: row.try_get("quantity_requested").map_err(decode)?,
            quantity_approved: row.try_get("quantity_approved").map_err(decode)?,
        },
    ))
}

impl PostgresUnitOfWork {
    async fn fetch_goods(&mut self, sql: &str) -> StoreResult<Vec<Good>> {
        let rows = sqlx::query(sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_goods", e))?;
        goods_from_rows(&rows)
    }

    /// Attach lines (in position order) to already-loaded headers.
    async fn assemble_requests(&mut self, headers: Vec<RequestHeader>) -> StoreResult<Vec<Request>> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = headers.iter().map(|h| *h.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, good_id, quantity_requested, quantity_approved
            FROM request_lines
            WHERE request_id = ANY($1)
            ORDER BY request_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_request_lines", e))?;

        let mut lines = std::collections::HashMap::<RequestId, Vec<RequestLine>>::new();
        for row in &rows {
            let (request_id, line) = line_from_row(row)?;
            lines.entry(request_id).or_default().push(line);
        }

        headers
            .into_iter()
            .map(|h| {
                let request_lines = lines.remove(&h.id).unwrap_or_default();
                if request_lines.is_empty() {
                    return Err(StoreError::Corrupt(format!("request {} has no lines", h.id)));
                }
                Ok(Request::from_snapshot(RequestSnapshot {
                    id: h.id,
                    requester: h.requester,
                    submitted_at: h.submitted_at,
                    note: h.note,
                    status: h.status,
                    lines: request_lines,
                    verification: h.verification,
                    version: h.version,
                }))
            })
            .collect()
    }

    async fn load_request(&mut self, id: RequestId, lock: bool) -> StoreResult<Option<Request>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_request", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = header_from_row(&row)?;
        Ok(self.assemble_requests(vec![header]).await?.pop())
    }
}

#[async_trait]
impl GoodRepository for PostgresUnitOfWork {
    async fn good(&mut self, id: GoodId) -> StoreResult<Option<Good>> {
        let sql = format!("SELECT {GOOD_COLUMNS} FROM goods WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_good", e))?;
        row.as_ref().map(good_from_row).transpose()
    }

    #[instrument(skip(self), fields(count = ids.len()), err)]
    async fn goods_for_update(&mut self, ids: &[GoodId]) -> StoreResult<Vec<Good>> {
        let mut ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        ids.sort();
        ids.dedup();
        let sql = format!(
            "SELECT {GOOD_COLUMNS} FROM goods WHERE id = ANY($1) ORDER BY id ASC FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_goods", e))?;
        goods_from_rows(&rows)
    }

    async fn good_by_code(&mut self, code: &str) -> StoreResult<Option<Good>> {
        let sql = format!("SELECT {GOOD_COLUMNS} FROM goods WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_good_by_code", e))?;
        row.as_ref().map(good_from_row).transpose()
    }

    async fn active_goods(&mut self) -> StoreResult<Vec<Good>> {
        let sql = format!("SELECT {GOOD_COLUMNS} FROM goods WHERE active ORDER BY name ASC, id ASC");
        self.fetch_goods(&sql).await
    }

    async fn critical_goods(&mut self) -> StoreResult<Vec<Good>> {
        let sql = format!(
            "SELECT {GOOD_COLUMNS} FROM goods \
             WHERE active AND quantity_on_hand <= critical_threshold \
             ORDER BY quantity_on_hand ASC, name ASC, id ASC"
        );
        self.fetch_goods(&sql).await
    }

    async fn search_goods(&mut self, filter: &GoodFilter, page: Pagination) -> StoreResult<Page<Good>> {
        let pattern = filter.search_term().map(like_pattern);

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM goods
            WHERE ($1 OR active)
              AND ($2::text IS NULL OR code ILIKE $2 OR name ILIKE $2)
            "#,
        )
        .bind(filter.include_inactive)
        .bind(&pattern)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_goods", e))?
        .try_get("total")
        .map_err(|e| map_sqlx_error("count_goods", e))?;

        let sql = format!(
            "SELECT {GOOD_COLUMNS} FROM goods \
             WHERE ($1 OR active) \
               AND ($2::text IS NULL OR code ILIKE $2 OR name ILIKE $2) \
             ORDER BY name ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.include_inactive)
            .bind(&pattern)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("search_goods", e))?;

        Ok(Page::new(goods_from_rows(&rows)?, page, total.max(0) as u64))
    }

    #[instrument(skip(self, good), fields(good_id = %good.id_typed()), err)]
    async fn insert_good(&mut self, good: &Good) -> StoreResult<()> {
        let s = good.snapshot();
        sqlx::query(
            r#"
            INSERT INTO goods (
                id, code, name, unit, description, quantity_on_hand,
                critical_threshold, active, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.code)
        .bind(&s.name)
        .bind(&s.unit)
        .bind(&s.description)
        .bind(s.quantity_on_hand)
        .bind(s.critical_threshold)
        .bind(s.active)
        .bind(to_db_version(s.version)?)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_good", e))?;
        Ok(())
    }

    #[instrument(skip(self, good), fields(good_id = %good.id_typed(), expected = ?expected), err)]
    async fn update_good(&mut self, good: &Good, expected: ExpectedVersion) -> StoreResult<()> {
        let s = good.snapshot();
        let result = sqlx::query(
            r#"
            UPDATE goods
            SET name = $2,
                unit = $3,
                description = $4,
                quantity_on_hand = $5,
                critical_threshold = $6,
                active = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1 AND ($10::bigint IS NULL OR version = $10)
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(&s.unit)
        .bind(&s.description)
        .bind(s.quantity_on_hand)
        .bind(s.critical_threshold)
        .bind(s.active)
        .bind(to_db_version(s.version)?)
        .bind(s.updated_at)
        .bind(expected_db_version(expected)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_good", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "good {}: expected {expected:?}",
                s.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestRepository for PostgresUnitOfWork {
    async fn request(&mut self, id: RequestId) -> StoreResult<Option<Request>> {
        self.load_request(id, false).await
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn request_for_update(&mut self, id: RequestId) -> StoreResult<Option<Request>> {
        self.load_request(id, true).await
    }

    #[instrument(skip(self, request), fields(request_id = %request.id_typed()), err)]
    async fn insert_request(&mut self, request: &Request) -> StoreResult<()> {
        let s = request
            .snapshot()
            .ok_or_else(|| StoreError::Corrupt(format!("request {} was never submitted", request.id_typed())))?;

        sqlx::query(
            r#"
            INSERT INTO requests (
                id, requester_id, submitted_at, note, status,
                verifier_id, verified_at, decision_note, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(s.requester.as_uuid())
        .bind(s.submitted_at)
        .bind(&s.note)
        .bind(s.status.as_str())
        .bind(s.verification.as_ref().map(|v| *v.verifier.as_uuid()))
        .bind(s.verification.as_ref().map(|v| v.verified_at))
        .bind(s.verification.as_ref().and_then(|v| v.note.clone()))
        .bind(to_db_version(s.version)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;

        for (position, line) in s.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO request_lines (
                    id, request_id, position, good_id, quantity_requested, quantity_approved
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.line_id.as_uuid())
            .bind(s.id.as_uuid())
            .bind(position as i32)
            .bind(line.good_id.as_uuid())
            .bind(line.quantity_requested)
            .bind(line.quantity_approved)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_request_line", e))?;
        }

        Ok(())
    }

    #[instrument(
        skip(self, request),
        fields(request_id = %request.id_typed(), expected = ?expected),
        err
    )]
    async fn update_request(&mut self, request: &Request, expected: ExpectedVersion) -> StoreResult<()> {
        let s = request
            .snapshot()
            .ok_or_else(|| StoreError::Corrupt(format!("request {} was never submitted", request.id_typed())))?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $2,
                verifier_id = $3,
                verified_at = $4,
                decision_note = $5,
                version = $6
            WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(s.status.as_str())
        .bind(s.verification.as_ref().map(|v| *v.verifier.as_uuid()))
        .bind(s.verification.as_ref().map(|v| v.verified_at))
        .bind(s.verification.as_ref().and_then(|v| v.note.clone()))
        .bind(to_db_version(s.version)?)
        .bind(expected_db_version(expected)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_request", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "request {}: expected {expected:?}",
                s.id
            )));
        }

        for line in &s.lines {
            sqlx::query("UPDATE request_lines SET quantity_approved = $2 WHERE id = $1 AND request_id = $3")
                .bind(line.line_id.as_uuid())
                .bind(line.quantity_approved)
                .bind(s.id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_request_line", e))?;
        }

        Ok(())
    }

    async fn list_requests(&mut self, filter: &RequestFilter, page: Pagination) -> StoreResult<Page<Request>> {
        let status = filter.status.map(RequestStatus::as_str);
        let requester = filter.requester.map(|r| *r.as_uuid());

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM requests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR requester_id = $2)
              AND ($3::timestamptz IS NULL OR submitted_at >= $3)
              AND ($4::timestamptz IS NULL OR submitted_at < $4)
            "#,
        )
        .bind(status)
        .bind(requester)
        .bind(filter.submitted_from)
        .bind(filter.submitted_to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_requests", e))?
        .try_get("total")
        .map_err(|e| map_sqlx_error("count_requests", e))?;

        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR requester_id = $2) \
               AND ($3::timestamptz IS NULL OR submitted_at >= $3) \
               AND ($4::timestamptz IS NULL OR submitted_at < $4) \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(requester)
            .bind(filter.submitted_from)
            .bind(filter.submitted_to)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_requests", e))?;

        let headers = rows.iter().map(header_from_row).collect::<StoreResult<Vec<_>>>()?;
        let items = self.assemble_requests(headers).await?;
        Ok(Page::new(items, page, total.max(0) as u64))
    }

    async fn count_by_status(&mut self) -> StoreResult<Vec<(RequestStatus, u64)>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM requests GROUP BY status ORDER BY status ASC",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_by_status", e))?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("status").map_err(|e| map_sqlx_error("count_by_status", e))?;
                let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("count_by_status", e))?;
                let status = raw
                    .parse::<RequestStatus>()
                    .map_err(|_| StoreError::Corrupt(format!("unknown status '{raw}'")))?;
                Ok((status, n.max(0) as u64))
            })
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}
