use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_core::{AggregateRoot, ExpectedVersion, GoodId, RequestId};
use stockroom_inventory::{Good, GoodSnapshot};
use stockroom_requests::{Request, RequestSnapshot, RequestStatus};

use super::{
    GoodFilter, GoodRepository, Page, Pagination, RequestFilter, RequestRepository, Store,
    UnitOfWork,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Dataset {
    goods: BTreeMap<GoodId, GoodSnapshot>,
    requests: BTreeMap<RequestId, RequestSnapshot>,
}

/// In-memory store.
///
/// Intended for tests/dev. A unit of work holds the dataset lock from `begin` until
/// it is committed or dropped, so units of work are fully serialized.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<Dataset>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.data.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

/// Writes go to a private copy; `commit` swaps it in, drop throws it away.
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Dataset>,
    working: Dataset,
}

fn paginate<T>(matches: Vec<T>, page: Pagination) -> Page<T> {
    let total = matches.len() as u64;
    let items = matches
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page::new(items, page, total)
}

fn check_version(kind: &str, expected: ExpectedVersion, actual: u64) -> StoreResult<()> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{kind}: expected {expected:?}, found {actual}"
        )))
    }
}

impl InMemoryUnitOfWork {
    fn goods_sorted_by_name(&self) -> Vec<Good> {
        let mut goods: Vec<Good> = self
            .working
            .goods
            .values()
            .cloned()
            .map(Good::from_snapshot)
            .collect();
        goods.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        goods
    }
}

#[async_trait]
impl GoodRepository for InMemoryUnitOfWork {
    async fn good(&mut self, id: GoodId) -> StoreResult<Option<Good>> {
        Ok(self.working.goods.get(&id).cloned().map(Good::from_snapshot))
    }

    async fn goods_for_update(&mut self, ids: &[GoodId]) -> StoreResult<Vec<Good>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.working.goods.get(id).cloned())
            .map(Good::from_snapshot)
            .collect())
    }

    async fn good_by_code(&mut self, code: &str) -> StoreResult<Option<Good>> {
        Ok(self
            .working
            .goods
            .values()
            .find(|g| g.code == code)
            .cloned()
            .map(Good::from_snapshot))
    }

    async fn active_goods(&mut self) -> StoreResult<Vec<Good>> {
        Ok(self
            .goods_sorted_by_name()
            .into_iter()
            .filter(Good::is_active)
            .collect())
    }

    async fn critical_goods(&mut self) -> StoreResult<Vec<Good>> {
        let mut goods: Vec<Good> = self
            .goods_sorted_by_name()
            .into_iter()
            .filter(|g| g.is_active() && g.is_critical())
            .collect();
        // stable: name order survives among equal quantities
        goods.sort_by_key(Good::quantity_on_hand);
        Ok(goods)
    }

    async fn search_goods(&mut self, filter: &GoodFilter, page: Pagination) -> StoreResult<Page<Good>> {
        let matches = self
            .goods_sorted_by_name()
            .into_iter()
            .filter(|g| filter.matches(g))
            .collect();
        Ok(paginate(matches, page))
    }

    async fn insert_good(&mut self, good: &Good) -> StoreResult<()> {
        let snapshot = good.snapshot();
        if self.working.goods.contains_key(&snapshot.id) {
            return Err(StoreError::Duplicate(format!("good {} already exists", snapshot.id)));
        }
        if self.working.goods.values().any(|g| g.code == snapshot.code) {
            return Err(StoreError::Duplicate(format!(
                "good code '{}' already exists",
                snapshot.code
            )));
        }
        self.working.goods.insert(snapshot.id, snapshot);
        Ok(())
    }

    async fn update_good(&mut self, good: &Good, expected: ExpectedVersion) -> StoreResult<()> {
        let snapshot = good.snapshot();
        let stored = self
            .working
            .goods
            .get_mut(&snapshot.id)
            .ok_or_else(|| StoreError::Conflict(format!("good {} does not exist", snapshot.id)))?;
        check_version("good", expected, stored.version)?;
        *stored = snapshot;
        Ok(())
    }
}

#[async_trait]
impl RequestRepository for InMemoryUnitOfWork {
    async fn request(&mut self, id: RequestId) -> StoreResult<Option<Request>> {
        Ok(self.working.requests.get(&id).cloned().map(Request::from_snapshot))
    }

    async fn request_for_update(&mut self, id: RequestId) -> StoreResult<Option<Request>> {
        self.request(id).await
    }

    async fn insert_request(&mut self, request: &Request) -> StoreResult<()> {
        let snapshot = request
            .snapshot()
            .ok_or_else(|| StoreError::Corrupt(format!("request {} was never submitted", request.id())))?;
        if self.working.requests.contains_key(&snapshot.id) {
            return Err(StoreError::Duplicate(format!("request {} already exists", snapshot.id)));
        }
        for line in &snapshot.lines {
            if !self.working.goods.contains_key(&line.good_id) {
                return Err(StoreError::Database(format!(
                    "request line {} references unknown good {}",
                    line.line_id, line.good_id
                )));
            }
        }
        self.working.requests.insert(snapshot.id, snapshot);
        Ok(())
    }

    async fn update_request(&mut self, request: &Request, expected: ExpectedVersion) -> StoreResult<()> {
        let snapshot = request
            .snapshot()
            .ok_or_else(|| StoreError::Corrupt(format!("request {} was never submitted", request.id())))?;
        let stored = self
            .working
            .requests
            .get_mut(&snapshot.id)
            .ok_or_else(|| StoreError::Conflict(format!("request {} does not exist", snapshot.id)))?;
        check_version("request", expected, stored.version)?;
        *stored = snapshot;
        Ok(())
    }

    async fn list_requests(&mut self, filter: &RequestFilter, page: Pagination) -> StoreResult<Page<Request>> {
        let mut matches: Vec<Request> = self
            .working
            .requests
            .values()
            .cloned()
            .map(Request::from_snapshot)
            .filter(|r| filter.matches(r))
            .collect();
        matches.sort_by(|a, b| {
            b.submitted_at()
                .cmp(&a.submitted_at())
                .then(b.id_typed().cmp(&a.id_typed()))
        });
        Ok(paginate(matches, page))
    }

    async fn count_by_status(&mut self) -> StoreResult<Vec<(RequestStatus, u64)>> {
        let mut counts: BTreeMap<&'static str, (RequestStatus, u64)> = BTreeMap::new();
        for request in self.working.requests.values() {
            counts
                .entry(request.status.as_str())
                .or_insert((request.status, 0))
                .1 += 1;
        }
        Ok(counts.into_values().collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockroom_core::Aggregate;
    use stockroom_inventory::{GoodCommand, RegisterGood};

    fn good(code: &str, name: &str, qty: i64) -> Good {
        let id = GoodId::new();
        let mut g = Good::empty(id);
        g.execute(&GoodCommand::RegisterGood(RegisterGood {
            good_id: id,
            code: code.to_string(),
            name: name.to_string(),
            unit: "pcs".to_string(),
            description: String::new(),
            critical_threshold: 2,
            initial_quantity: qty,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }))
        .unwrap();
        g
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let store = InMemoryStore::new();
        let pen = good("PEN", "Pen", 10);

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_good(&pen).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow.good(pen.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_units() {
        let store = InMemoryStore::new();
        let pen = good("PEN", "Pen", 10);

        let mut uow = store.begin().await.unwrap();
        uow.insert_good(&pen).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.good(pen.id_typed()).await.unwrap(), Some(pen));
    }

    #[tokio::test]
    async fn duplicate_codes_and_stale_versions_are_rejected() {
        let store = InMemoryStore::new();
        let pen = good("PEN", "Pen", 10);

        let mut uow = store.begin().await.unwrap();
        uow.insert_good(&pen).await.unwrap();
        let err = uow.insert_good(&good("PEN", "Other pen", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let err = uow
            .update_good(&pen, ExpectedVersion::Exact(pen.version() + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn critical_goods_are_ordered_by_quantity_then_name() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        for g in [
            good("B", "Binder", 1),
            good("A", "Album", 1),
            good("S", "Stapler", 0),
            good("P", "Paper", 50),
        ] {
            uow.insert_good(&g).await.unwrap();
        }

        let names: Vec<String> = uow
            .critical_goods()
            .await
            .unwrap()
            .iter()
            .map(|g| g.name().to_string())
            .collect();
        assert_eq!(names, ["Stapler", "Album", "Binder"]);
    }
}
