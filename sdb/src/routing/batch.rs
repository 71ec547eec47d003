//! `Begin`/`Submit`/`Cancel` batching: data commands accumulate locally
//! with no I/O; `Submit`
//! fires every accumulated request at once and waits for all of them.
//! The size cap is `Σ max(0, fieldLen − smallStringThreshold)` over
//! request fields, checked as each command is added so a batch never
//! grows past `batchLimit` before `Submit` runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::net::{Request, RequestType};

use super::data_client::{interpret, DataClient};
use super::error::Error;
use super::result::RoutingValue;
use super::session::Session;

pub struct Batch {
    client: Arc<DataClient>,
    session: Arc<Session>,
    pending: Mutex<Vec<Request>>,
    size: AtomicU64,
    closed: AtomicBool,
}

impl Batch {
    pub fn new(client: Arc<DataClient>, session: Arc<Session>) -> Self {
        Self {
            client,
            session,
            pending: Mutex::new(Vec::new()),
            size: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn field_cost(field: Option<&Bytes>, threshold: u64) -> u64 {
        field
            .map(|b| b.len() as u64)
            .unwrap_or(0)
            .saturating_sub(threshold)
    }

    fn request_cost(request: &Request, threshold: u64) -> u64 {
        Self::field_cost(request.key.as_ref(), threshold)
            + Self::field_cost(request.value.as_ref(), threshold)
            + Self::field_cost(request.test_value.as_ref(), threshold)
            + Self::field_cost(request.start_key.as_ref(), threshold)
    }

    fn enqueue(&self, request: Request) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::BatchLimitExceeded);
        }

        let general = self.session.general();
        let cost = Self::request_cost(&request, general.small_string_threshold);
        let new_size = self.size.fetch_add(cost, Ordering::SeqCst) + cost;
        if new_size > general.batch_limit {
            self.closed.store(true, Ordering::SeqCst);
            return Err(Error::BatchLimitExceeded);
        }

        self.pending.lock().push(request);
        Ok(())
    }

    fn push(
        &self,
        kind: RequestType,
        key: &[u8],
        value: Option<Bytes>,
        test_value: Option<Bytes>,
    ) -> Result<(), Error> {
        let request = Request {
            command_id: self.client.next_command_id(),
            kind: Some(kind),
            table_id: self.session.current_table(),
            key: Some(Bytes::copy_from_slice(key)),
            value,
            test_value,
            ..Default::default()
        };
        self.enqueue(request)
    }

    pub fn get(&self, key: &[u8]) -> Result<(), Error> {
        self.push(RequestType::Get, key, None, None)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.push(RequestType::Set, key, Some(Bytes::copy_from_slice(value)), None)
    }

    pub fn set_if_not_exists(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.push(
            RequestType::SetIfNotExists,
            key,
            Some(Bytes::copy_from_slice(value)),
            None,
        )
    }

    pub fn test_and_set(&self, key: &[u8], test_value: &[u8], value: &[u8]) -> Result<(), Error> {
        self.push(
            RequestType::TestAndSet,
            key,
            Some(Bytes::copy_from_slice(value)),
            Some(Bytes::copy_from_slice(test_value)),
        )
    }

    pub fn get_and_set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.push(
            RequestType::GetAndSet,
            key,
            Some(Bytes::copy_from_slice(value)),
            None,
        )
    }

    pub fn add(&self, key: &[u8], delta: i64) -> Result<(), Error> {
        self.push(
            RequestType::Add,
            key,
            Some(Bytes::from(delta.to_be_bytes().to_vec())),
            None,
        )
    }

    pub fn append(&self, key: &[u8], suffix: &[u8]) -> Result<(), Error> {
        self.push(RequestType::Append, key, Some(Bytes::copy_from_slice(suffix)), None)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
        self.push(RequestType::Delete, key, None, None)
    }

    pub fn remove(&self, key: &[u8]) -> Result<(), Error> {
        self.push(RequestType::Remove, key, None, None)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop every pending request without executing it. The batch is
    /// left ready to accumulate again.
    pub fn cancel(&self) {
        self.pending.lock().clear();
        self.size.store(0, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Drive every accumulated request concurrently and return results
    /// in submission order. Leaves the batch empty and reopened
    /// regardless of whether individual requests failed.
    pub async fn submit(&self) -> Vec<Result<RoutingValue, Error>> {
        let requests = std::mem::take(&mut *self.pending.lock());
        self.size.store(0, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        let total = requests.len();

        let mut set = tokio::task::JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let client = self.client.clone();
            set.spawn(async move { (index, client.execute(request).await.map(interpret)) });
        }

        let mut results: Vec<Option<Result<RoutingValue, Error>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            if let Ok((index, result)) = joined {
                results[index] = Some(result);
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(Error::BatchCancelled)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::TableId;
    use sdb_config::General;

    fn batch_with_limit(batch_limit: u64, small_string_threshold: u64) -> Batch {
        let mut general = General::default();
        general.batch_limit = batch_limit;
        general.small_string_threshold = small_string_threshold;
        let session = Arc::new(Session::new(general));
        session.use_database(crate::ids::DatabaseId(1));
        session.use_table(TableId(1));
        let client = Arc::new(DataClient::new(session.clone()));
        Batch::new(client, session)
    }

    #[test]
    fn test_small_fields_do_not_count_toward_limit() {
        let batch = batch_with_limit(10, 128);
        batch.set(b"k", b"v").unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_batch_limit_exceeded_closes_batch() {
        let batch = batch_with_limit(1024, 0);
        let value = vec![0u8; 512];
        batch.set(b"k1", &value).unwrap();
        batch.set(b"k2", &value).unwrap();
        let err = batch.set(b"k3", &value).unwrap_err();
        assert!(matches!(err, Error::BatchLimitExceeded));

        let err = batch.set(b"k4", b"v").unwrap_err();
        assert!(matches!(err, Error::BatchLimitExceeded));
    }

    #[test]
    fn test_cancel_clears_pending() {
        let batch = batch_with_limit(1024, 128);
        batch.set(b"k", b"v").unwrap();
        assert_eq!(batch.len(), 1);
        batch.cancel();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_submit_empty_batch_returns_empty() {
        let batch = batch_with_limit(1024, 128);
        let results = batch.submit().await;
        assert!(results.is_empty());
    }
}
