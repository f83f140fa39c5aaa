//! In-process transport (thread-safe, async).
//!
//! Holds records in memory and answers the same envelopes a REST backend
//! would. Counts dispatches per operation and can fail scripted calls, which
//! makes it the transport of choice for tests and demos.

use super::{Envelope, ExportFormat, ImportFile, ImportReport, ListEnvelope, Transport, TransportResult};
use crate::entity::Entity;
use crate::key::{ListParams, ParamValue};
use crate::normalizer::{ErrorBody, RawFailure};
use crate::query::{SortDirection, SortSpec};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

type Builder<T> = dyn Fn(Option<&T>, &<T as Entity>::Patch, u64) -> T + Send + Sync;

struct Shared<T: Entity> {
    records: RwLock<Vec<T>>,
    build: Box<Builder<T>>,
    sequence: AtomicU64,
    dispatches: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<VecDeque<RawFailure>>,
    latency: RwLock<Option<Duration>>,
}

/// Transport backed by an in-memory `Vec<T>`.
///
/// Clones share the same records, counters and failure script.
///
/// The `build` closure turns a patch into a record: it receives the existing
/// record on update (`None` on create), the patch, and a fresh sequence number
/// for id assignment.
pub struct InMemoryTransport<T: Entity> {
    shared: Arc<Shared<T>>,
}

impl<T: Entity> Clone for InMemoryTransport<T> {
    fn clone(&self) -> Self {
        InMemoryTransport {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Entity> InMemoryTransport<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(Option<&T>, &T::Patch, u64) -> T + Send + Sync + 'static,
    {
        InMemoryTransport {
            shared: Arc::new(Shared {
                records: RwLock::new(Vec::new()),
                build: Box::new(build),
                sequence: AtomicU64::new(0),
                dispatches: Mutex::new(HashMap::new()),
                failures: Mutex::new(VecDeque::new()),
                latency: RwLock::new(None),
            }),
        }
    }

    /// Start with the given records.
    pub fn with_records(self, records: Vec<T>) -> Self {
        self.seed(records);
        self
    }

    /// Delay every dispatch by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.shared.latency.write() = latency;
    }

    /// Append records directly, without counting a dispatch.
    pub fn seed(&self, records: Vec<T>) {
        self.shared.records.write().extend(records);
    }

    /// Snapshot of the stored records.
    pub fn records(&self) -> Vec<T> {
        self.shared.records.read().clone()
    }

    /// Fail the next dispatch with `failure`. Queued failures are consumed in order.
    pub fn push_failure(&self, failure: RawFailure) {
        self.shared.failures.lock().push_back(failure);
    }

    /// Total dispatches across all operations.
    pub fn dispatch_count(&self) -> usize {
        self.shared.dispatches.lock().values().sum()
    }

    /// Dispatches of one operation, e.g. `"list"` or `"update"`.
    pub fn dispatches(&self, operation: &str) -> usize {
        self.shared
            .dispatches
            .lock()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_counts(&self) {
        self.shared.dispatches.lock().clear();
    }

    async fn dispatch(&self, operation: &'static str) -> TransportResult<()> {
        *self.shared.dispatches.lock().entry(operation).or_insert(0) += 1;
        debug!("» InMemory {} {}", operation, T::resource());

        let latency = *self.shared.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.shared.failures.lock().pop_front();
        match scripted {
            Some(failure) => {
                debug!("InMemory {} failing with scripted {:?}", operation, failure);
                Err(failure)
            }
            None => Ok(()),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.shared.sequence.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn not_found(id: &T::Id) -> RawFailure {
        RawFailure::status_with_body(
            404,
            ErrorBody::with_message(format!("{} {} not found", T::resource(), id)),
        )
    }

    fn insert_new(&self, patch: &T::Patch) -> T {
        let record = (self.shared.build)(None, patch, self.next_sequence());
        self.shared.records.write().push(record.clone());
        record
    }

    fn replace(&self, id: &T::Id, patch: &T::Patch) -> TransportResult<T> {
        let sequence = self.next_sequence();
        let mut records = self.shared.records.write();
        let slot = records
            .iter_mut()
            .find(|record| record.id() == *id)
            .ok_or_else(|| Self::not_found(id))?;
        let updated = (self.shared.build)(Some(&*slot), patch, sequence);
        *slot = updated.clone();
        Ok(updated)
    }

    /// Apply every update or none; an unknown id leaves the records untouched.
    fn replace_all(&self, updates: &[(T::Id, T::Patch)]) -> TransportResult<Vec<T>> {
        let mut records = self.shared.records.write();
        let slots = updates
            .iter()
            .map(|(id, _)| {
                records
                    .iter()
                    .position(|record| record.id() == *id)
                    .ok_or_else(|| Self::not_found(id))
            })
            .collect::<TransportResult<Vec<usize>>>()?;

        let mut updated = Vec::with_capacity(slots.len());
        for (slot, (_, patch)) in slots.into_iter().zip(updates) {
            let record = (self.shared.build)(Some(&records[slot]), patch, self.next_sequence());
            records[slot] = record.clone();
            updated.push(record);
        }
        Ok(updated)
    }

    fn remove(&self, id: &T::Id) -> bool {
        let mut records = self.shared.records.write();
        let before = records.len();
        records.retain(|record| record.id() != *id);
        records.len() < before
    }

    /// Records matching the filters, sorted, ignoring pagination.
    fn select(&self, params: &ListParams) -> TransportResult<Vec<T>> {
        let records = self.shared.records.read().clone();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let json = serde_json::to_value(&record)?;
            if params
                .filters
                .iter()
                .all(|(field, wanted)| field_matches(&json, field, wanted))
            {
                rows.push((json, record));
            }
        }
        if let Some(sort) = &params.sort {
            sort_rows(&mut rows, sort);
        }
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }
}

fn field_matches(json: &Value, field: &str, wanted: &ParamValue) -> bool {
    let Some(actual) = json.get(field).map(scalar_text) else {
        return false;
    };
    match wanted {
        ParamValue::One(value) => actual == *value,
        ParamValue::Many(values) => values.is_empty() || values.iter().any(|v| *v == actual),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sort_rows<T>(rows: &mut [(Value, T)], sort: &SortSpec) {
    rows.sort_by(|(a, _), (b, _)| {
        let ordering = compare_json(a.get(&sort.key), b.get(&sort.key));
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(x), Some(y)) => scalar_text(x).to_lowercase().cmp(&scalar_text(y).to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn to_csv(rows: &[Value]) -> Vec<u8> {
    let mut columns: Vec<&String> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|object| object.keys())
        .collect();
    columns.sort();
    columns.dedup();

    let escape = |cell: String| {
        if cell.contains([',', '"', '\n']) {
            format!("\"{}\"", cell.replace('"', "\"\""))
        } else {
            cell
        }
    };

    let mut out = columns
        .iter()
        .map(|c| escape(c.to_string()))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        let line = columns
            .iter()
            .map(|c| escape(row.get(c.as_str()).map(scalar_text).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out.into_bytes()
}

impl<T: Entity> Transport<T> for InMemoryTransport<T> {
    async fn list(&self, params: &ListParams) -> TransportResult<ListEnvelope<T>> {
        self.dispatch("list").await?;

        let matched = self.select(params)?;
        let total = matched.len() as u64;
        let limit = params.limit.max(1);
        let page = params.page.max(1);
        let start = (u64::from(page) - 1) * u64::from(limit);
        let data = matched
            .into_iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();
        let total_pages = u32::try_from(total.div_ceil(u64::from(limit)))
            .unwrap_or(u32::MAX)
            .max(1);

        Ok(ListEnvelope {
            data,
            total,
            page,
            limit,
            total_pages,
        })
    }

    async fn get(&self, id: &T::Id) -> TransportResult<Envelope<T>> {
        self.dispatch("getById").await?;
        self.shared
            .records
            .read()
            .iter()
            .find(|record| record.id() == *id)
            .cloned()
            .map(Envelope::ok)
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, patch: &T::Patch) -> TransportResult<Envelope<T>> {
        self.dispatch("create").await?;
        Ok(Envelope::ok(self.insert_new(patch)).with_message("Created"))
    }

    async fn update(&self, id: &T::Id, patch: &T::Patch) -> TransportResult<Envelope<T>> {
        self.dispatch("update").await?;
        Ok(Envelope::ok(self.replace(id, patch)?).with_message("Updated"))
    }

    async fn delete(&self, id: &T::Id) -> TransportResult<Envelope<()>> {
        self.dispatch("delete").await?;
        if self.remove(id) {
            Ok(Envelope::ok(()).with_message("Deleted"))
        } else {
            Err(Self::not_found(id))
        }
    }

    async fn create_many(&self, patches: &[T::Patch]) -> TransportResult<Envelope<Vec<T>>> {
        self.dispatch("createMany").await?;
        let created = patches.iter().map(|patch| self.insert_new(patch)).collect();
        Ok(Envelope::ok(created))
    }

    async fn update_many(
        &self,
        updates: &[(T::Id, T::Patch)],
    ) -> TransportResult<Envelope<Vec<T>>> {
        self.dispatch("updateMany").await?;
        let updated = self.replace_all(updates)?;
        Ok(Envelope::ok(updated))
    }

    async fn delete_many(&self, ids: &[T::Id]) -> TransportResult<Envelope<u64>> {
        self.dispatch("deleteMany").await?;
        let deleted = ids.iter().filter(|id| self.remove(id)).count() as u64;
        Ok(Envelope::ok(deleted))
    }

    async fn export(&self, format: ExportFormat, params: &ListParams) -> TransportResult<Vec<u8>> {
        self.dispatch("export").await?;
        let rows = self
            .select(params)?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        match format {
            ExportFormat::Csv => Ok(to_csv(&rows)),
            other => Err(RawFailure::Unsupported(format!("export ({})", other))),
        }
    }

    /// Accepts a JSON array of records; rows that fail to decode are reported
    /// and skipped. Records with an existing id replace it.
    async fn import(&self, file: &ImportFile) -> TransportResult<Envelope<ImportReport>> {
        self.dispatch("import").await?;
        let rows: Vec<Value> = serde_json::from_slice(&file.content).map_err(|_| {
            RawFailure::status_with_body(
                400,
                ErrorBody::with_message(format!("{} is not a JSON array of records", file.name)),
            )
        })?;

        let mut report = ImportReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<T>(row) {
                Ok(record) => {
                    let id = record.id();
                    let mut records = self.shared.records.write();
                    records.retain(|existing| existing.id() != id);
                    records.push(record);
                    report.imported_count += 1;
                }
                Err(e) => report.errors.push(format!("row {}: {}", index + 1, e)),
            }
        }
        info!(
            "InMemory import of {}: {} imported, {} rejected",
            file.name,
            report.imported_count,
            report.errors.len()
        );
        Ok(Envelope::ok(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u64,
        name: String,
        category: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    #[derive(Clone, Debug, Serialize)]
    struct ItemPatch {
        name: String,
        category: String,
    }

    impl Entity for Item {
        type Id = u64;
        type Patch = ItemPatch;

        fn id(&self) -> u64 {
            self.id
        }

        fn resource() -> &'static str {
            "items"
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn updated_at(&self) -> DateTime<Utc> {
            self.updated_at
        }
    }

    fn transport() -> InMemoryTransport<Item> {
        InMemoryTransport::new(|existing: Option<&Item>, patch: &ItemPatch, seq| {
            let now = Utc::now();
            Item {
                id: existing.map_or(seq, |e| e.id),
                name: patch.name.clone(),
                category: patch.category.clone(),
                created_at: existing.map_or(now, |e| e.created_at),
                updated_at: now,
            }
        })
    }

    fn patch(name: &str, category: &str) -> ItemPatch {
        ItemPatch {
            name: name.to_string(),
            category: category.to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let transport = transport();
        for (name, category) in [("kale", "produce"), ("brie", "dairy"), ("apple", "produce")] {
            transport.create(&patch(name, category)).await.unwrap();
        }

        let params = ListParams::new()
            .filter("category", "produce")
            .sort_by("name", SortDirection::Asc)
            .limit(1)
            .page(2);
        let envelope = transport.list(&params).await.unwrap();

        assert_eq!(envelope.total, 2);
        assert_eq!(envelope.total_pages, 2);
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].name, "kale");
        assert_eq!(transport.dispatches("create"), 3);
        assert_eq!(transport.dispatches("list"), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_consumed_once() {
        let transport = transport();
        transport.push_failure(RawFailure::status(503));

        let first = transport.list(&ListParams::new()).await;
        assert_eq!(first.unwrap_err(), RawFailure::status(503));
        assert!(transport.list(&ListParams::new()).await.is_ok());
        assert_eq!(transport.dispatch_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let transport = transport();
        match transport.get(&42).await {
            Err(RawFailure::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected 404, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bulk_and_delete_many() {
        let transport = transport();
        let created = transport
            .create_many(&[patch("a", "x"), patch("b", "y")])
            .await
            .unwrap()
            .into_data()
            .unwrap();
        let ids: Vec<u64> = created.iter().map(|item| item.id).collect();

        let deleted = transport.delete_many(&[ids[0], 999]).await.unwrap();
        assert_eq!(deleted.data, 1);
        assert_eq!(transport.records().len(), 1);
    }

    #[tokio::test]
    async fn test_update_many_with_unknown_id_writes_nothing() {
        let transport = transport();
        let first = transport.create(&patch("brie", "dairy")).await.unwrap().data;
        let second = transport.create(&patch("kale", "produce")).await.unwrap().data;
        let before = transport.records();

        let outcome = transport
            .update_many(&[
                (first.id, patch("camembert", "dairy")),
                (999, patch("ghost", "none")),
                (second.id, patch("cavolo nero", "produce")),
            ])
            .await;

        match outcome {
            Err(RawFailure::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected 404, got {:?}", other),
        }
        assert_eq!(transport.records(), before);

        let updated = transport
            .update_many(&[(second.id, patch("cavolo nero", "produce"))])
            .await
            .unwrap()
            .data;
        assert_eq!(updated[0].name, "cavolo nero");
        assert_eq!(transport.records()[0], first);
    }

    #[tokio::test]
    async fn test_export_csv_and_import() {
        let transport = transport();
        transport.create(&patch("brie, aged", "dairy")).await.unwrap();

        let csv = transport
            .export(ExportFormat::Csv, &ListParams::new())
            .await
            .unwrap();
        let text = String::from_utf8(csv).unwrap();
        assert!(text.starts_with("category,created_at,id,name,updated_at\n"));
        assert!(text.contains("\"brie, aged\""));

        let file = ImportFile::new(
            "items.json",
            r#"[{"id":9,"name":"kale","category":"produce","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"},{"id":"bad"}]"#,
        );
        let report = transport.import(&file).await.unwrap().data;
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("row 2:"));
    }
}
