//! Row batching and partitioned output
//!
//! [`EntityWriter`] is the shared, process-wide writer: it assigns part
//! numbers under a per-partition lock, encodes batches to Parquet in a
//! blocking task, and persists through the configured store with bounded
//! retries. [`PayerBatcher`] is the pipeline-local accumulator in front of
//! it: per-entity buffers that flush on batch size, on the memory ceiling,
//! and at finalize.

use crate::domain::entities::{
    AnalyticsRecord, OrganizationRecord, ProviderRecord, RateRecord,
};
use crate::domain::{PrismError, Result};
use crate::writer::parquet::{write_parquet, Cell, ColumnSpec};
use crate::writer::store::OutputStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Write attempts per part file before the partition is marked failed
const WRITE_RETRIES: usize = 3;

/// Rough resident-size estimates used for the memory ceiling, in bytes
const RATE_ROW_ESTIMATE: usize = 900;
const ORGANIZATION_ROW_ESTIMATE: usize = 200;
const PROVIDER_ROW_ESTIMATE: usize = 250;

/// Output entity families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Rates,
    Organizations,
    Providers,
    Analytics,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Rates => "rates",
            EntityType::Organizations => "organizations",
            EntityType::Providers => "providers",
            EntityType::Analytics => "analytics",
        }
    }

    fn columns(self) -> &'static [ColumnSpec] {
        match self {
            EntityType::Rates => &RATE_COLUMNS,
            EntityType::Organizations => &ORGANIZATION_COLUMNS,
            EntityType::Providers => &PROVIDER_COLUMNS,
            EntityType::Analytics => &ANALYTICS_COLUMNS,
        }
    }
}

const RATE_COLUMNS: [ColumnSpec; 15] = [
    ColumnSpec::utf8("rate_uuid"),
    ColumnSpec::utf8("payer_uuid"),
    ColumnSpec::utf8("organization_uuid"),
    ColumnSpec::utf8("service_code"),
    ColumnSpec::utf8("service_description"),
    ColumnSpec::utf8("billing_code_type"),
    ColumnSpec::float64("negotiated_rate"),
    ColumnSpec::utf8("billing_class"),
    ColumnSpec::utf8("rate_type"),
    ColumnSpec::utf8("service_codes"),
    ColumnSpec::utf8("plan_details"),
    ColumnSpec::utf8("contract_period"),
    ColumnSpec::utf8("provider_network"),
    ColumnSpec::utf8("data_lineage"),
    ColumnSpec::utf8("created_at"),
];

const ORGANIZATION_COLUMNS: [ColumnSpec; 6] = [
    ColumnSpec::utf8("organization_uuid"),
    ColumnSpec::utf8("tin"),
    ColumnSpec::utf8("organization_name"),
    ColumnSpec::utf8("npi_count"),
    ColumnSpec::utf8("is_facility"),
    ColumnSpec::utf8("created_at"),
];

const PROVIDER_COLUMNS: [ColumnSpec; 8] = [
    ColumnSpec::utf8("provider_uuid"),
    ColumnSpec::utf8("npi"),
    ColumnSpec::utf8("organization_uuid"),
    ColumnSpec::utf8("primary_specialty"),
    ColumnSpec::utf8("secondary_specialties"),
    ColumnSpec::utf8("addresses"),
    ColumnSpec::utf8("is_active"),
    ColumnSpec::utf8("created_at"),
];

const ANALYTICS_COLUMNS: [ColumnSpec; 5] = [
    ColumnSpec::utf8("analytics_uuid"),
    ColumnSpec::utf8("service_code"),
    ColumnSpec::utf8("geographic_scope"),
    ColumnSpec::utf8("market_statistics"),
    ColumnSpec::utf8("computation_date"),
];

fn ts(value: &DateTime<Utc>) -> Cell {
    Cell::Utf8(Some(value.to_rfc3339()))
}

fn json_cell<T: Serialize>(value: &T) -> Result<Cell> {
    Ok(Cell::Utf8(Some(serde_json::to_string(value)?)))
}

fn encode_rate(r: &RateRecord) -> Result<Vec<Cell>> {
    Ok(vec![
        Cell::Utf8(Some(r.rate_uuid.to_string())),
        Cell::Utf8(Some(r.payer_uuid.to_string())),
        Cell::Utf8(Some(r.organization_uuid.to_string())),
        Cell::Utf8(Some(r.service_code.clone())),
        Cell::Utf8(Some(r.service_description.clone())),
        Cell::Utf8(Some(r.billing_code_type.clone())),
        Cell::Float64(r.negotiated_rate),
        Cell::Utf8(Some(r.billing_class.clone())),
        Cell::Utf8(Some(r.rate_type.clone())),
        json_cell(&r.service_codes)?,
        json_cell(&r.plan_details)?,
        json_cell(&r.contract_period)?,
        json_cell(&r.provider_network)?,
        json_cell(&r.data_lineage)?,
        ts(&r.created_at),
    ])
}

fn encode_organization(o: &OrganizationRecord) -> Result<Vec<Cell>> {
    Ok(vec![
        Cell::Utf8(Some(o.organization_uuid.to_string())),
        Cell::Utf8(Some(o.tin.clone())),
        Cell::Utf8(o.organization_name.clone()),
        Cell::Utf8(Some(o.npi_count.to_string())),
        Cell::Utf8(Some(o.is_facility.to_string())),
        ts(&o.created_at),
    ])
}

fn encode_provider(p: &ProviderRecord) -> Result<Vec<Cell>> {
    Ok(vec![
        Cell::Utf8(Some(p.provider_uuid.to_string())),
        Cell::Utf8(Some(p.npi.clone())),
        Cell::Utf8(Some(p.organization_uuid.to_string())),
        Cell::Utf8(p.primary_specialty.clone()),
        json_cell(&p.secondary_specialties)?,
        json_cell(&p.addresses)?,
        Cell::Utf8(Some(p.is_active.to_string())),
        ts(&p.created_at),
    ])
}

fn encode_analytics(a: &AnalyticsRecord) -> Result<Vec<Cell>> {
    Ok(vec![
        Cell::Utf8(Some(a.analytics_uuid.to_string())),
        Cell::Utf8(Some(a.service_code.clone())),
        json_cell(&a.geographic_scope)?,
        json_cell(&a.market_statistics)?,
        ts(&a.computation_date),
    ])
}

/// Shared partitioned writer
///
/// Different partitions flush in parallel; writes within one partition are
/// serialized by its lock, which also owns the part-number sequence.
pub struct EntityWriter {
    store: Arc<dyn OutputStore>,
    staging: PathBuf,
    partitions: Mutex<HashMap<String, Arc<AsyncMutex<u32>>>>,
    staging_counter: AtomicU64,
}

impl EntityWriter {
    /// Creates a writer staging files under `staging_dir`
    pub fn new(store: Arc<dyn OutputStore>, staging_dir: impl Into<PathBuf>) -> Result<Self> {
        let staging = staging_dir.into();
        std::fs::create_dir_all(&staging)
            .map_err(|e| PrismError::Write(format!("creating {}: {e}", staging.display())))?;
        Ok(Self {
            store,
            staging,
            partitions: Mutex::new(HashMap::new()),
            staging_counter: AtomicU64::new(0),
        })
    }

    fn partition_lock(&self, partition: &str) -> Arc<AsyncMutex<u32>> {
        let mut map = self.partitions.lock().expect("partition map poisoned");
        map.entry(partition.to_string()).or_default().clone()
    }

    fn staging_path(&self, suffix: &str) -> PathBuf {
        let n = self.staging_counter.fetch_add(1, Ordering::Relaxed);
        self.staging
            .join(format!(".staging-{}-{n}.{suffix}", std::process::id()))
    }

    /// Writes one batch of encoded rows as the partition's next part file
    pub async fn write_rows(
        &self,
        entity: EntityType,
        payer: &str,
        date: &str,
        rows: Vec<Vec<Cell>>,
    ) -> Result<String> {
        let partition = format!("{}/payer={payer}/date={date}", entity.as_str());
        let lock = self.partition_lock(&partition);
        let mut seq = lock.lock().await;

        let key = format!("{partition}/part-{:04}.parquet", *seq);
        let staged = self.staging_path("parquet");

        let mut last_error = None;
        for attempt in 0..WRITE_RETRIES {
            let staged_clone = staged.clone();
            let rows_ref = rows.clone();
            let columns = entity.columns();
            let write_result = tokio::task::spawn_blocking(move || {
                write_parquet(&staged_clone, columns, &rows_ref)
            })
            .await
            .map_err(|e| PrismError::Write(format!("writer task panicked: {e}")))?;

            let result = match write_result {
                Ok(()) => self.store.persist(&staged, &key).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    *seq += 1;
                    tracing::debug!(key = %key, rows = rows.len(), "Flushed part file");
                    return Ok(key);
                }
                Err(e) => {
                    tracing::warn!(key = %key, attempt = attempt + 1, error = %e, "Part write failed");
                    last_error = Some(e);
                }
            }
        }

        let _ = std::fs::remove_file(&staged);
        Err(last_error.unwrap_or_else(|| PrismError::Write("unknown write failure".to_string())))
    }

    /// Persists a JSON document (manifests) under `key`
    pub async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let staged = self.staging_path("json");
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&staged, body)
            .await
            .map_err(|e| PrismError::Write(format!("staging {}: {e}", staged.display())))?;
        self.store.persist(&staged, key).await
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }
}

/// Per-entity flush statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    pub rates_written: u64,
    pub organizations_written: u64,
    pub providers_written: u64,
    pub analytics_written: u64,
    pub parts_written: u64,
    pub failed_partitions: Vec<String>,
}

/// Pipeline-local accumulator in front of the shared writer
pub struct PayerBatcher {
    writer: Arc<EntityWriter>,
    payer: String,
    date: String,
    batch_size: usize,
    memory_threshold_bytes: usize,
    rates: Vec<RateRecord>,
    organizations: Vec<OrganizationRecord>,
    providers: Vec<ProviderRecord>,
    pub stats: BatcherStats,
}

impl PayerBatcher {
    pub fn new(
        writer: Arc<EntityWriter>,
        payer: impl Into<String>,
        date: impl Into<String>,
        batch_size: usize,
        memory_threshold_mb: usize,
    ) -> Self {
        Self {
            writer,
            payer: payer.into(),
            date: date.into(),
            batch_size,
            memory_threshold_bytes: memory_threshold_mb * 1024 * 1024,
            rates: Vec::new(),
            organizations: Vec::new(),
            providers: Vec::new(),
            stats: BatcherStats::default(),
        }
    }

    fn resident_bytes(&self) -> usize {
        self.rates.len() * RATE_ROW_ESTIMATE
            + self.organizations.len() * ORGANIZATION_ROW_ESTIMATE
            + self.providers.len() * PROVIDER_ROW_ESTIMATE
    }

    /// Enqueues one normalized batch, flushing as thresholds are crossed.
    ///
    /// Awaiting the flush here is what backpressures the normalizer: the
    /// bounded channel upstream fills while this future is pending.
    pub async fn push(&mut self, batch: crate::normalize::NormalizedBatch) -> Result<()> {
        self.rates.extend(batch.rates);
        self.organizations.extend(batch.organizations);
        self.providers.extend(batch.providers);

        if self.resident_bytes() >= self.memory_threshold_bytes {
            tracing::info!(
                payer = %self.payer,
                resident_mb = self.resident_bytes() / (1024 * 1024),
                "Memory ceiling reached, early flush"
            );
            self.flush_all().await?;
            return Ok(());
        }

        if self.rates.len() >= self.batch_size {
            self.flush_entity(EntityType::Rates).await?;
        }
        if self.organizations.len() >= self.batch_size {
            self.flush_entity(EntityType::Organizations).await?;
        }
        if self.providers.len() >= self.batch_size {
            self.flush_entity(EntityType::Providers).await?;
        }
        Ok(())
    }

    /// Flushes everything still buffered; called at finalize and on
    /// cancellation so partial progress is preserved.
    pub async fn flush_all(&mut self) -> Result<()> {
        self.flush_entity(EntityType::Rates).await?;
        self.flush_entity(EntityType::Organizations).await?;
        self.flush_entity(EntityType::Providers).await?;
        Ok(())
    }

    /// Writes the run's analytics rows
    pub async fn write_analytics(&mut self, records: &[AnalyticsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let rows = records
            .iter()
            .map(encode_analytics)
            .collect::<Result<Vec<_>>>()?;
        let count = rows.len() as u64;
        if self.write_partition(EntityType::Analytics, rows).await? {
            self.stats.analytics_written += count;
        }
        Ok(())
    }

    async fn flush_entity(&mut self, entity: EntityType) -> Result<()> {
        let (rows, count) = match entity {
            EntityType::Rates => {
                let drained: Vec<RateRecord> = self.rates.drain(..).collect();
                let rows = drained.iter().map(encode_rate).collect::<Result<Vec<_>>>()?;
                (rows, drained.len() as u64)
            }
            EntityType::Organizations => {
                let drained: Vec<OrganizationRecord> = self.organizations.drain(..).collect();
                let rows = drained
                    .iter()
                    .map(encode_organization)
                    .collect::<Result<Vec<_>>>()?;
                (rows, drained.len() as u64)
            }
            EntityType::Providers => {
                let drained: Vec<ProviderRecord> = self.providers.drain(..).collect();
                let rows = drained
                    .iter()
                    .map(encode_provider)
                    .collect::<Result<Vec<_>>>()?;
                (rows, drained.len() as u64)
            }
            EntityType::Analytics => (Vec::new(), 0),
        };
        if rows.is_empty() {
            return Ok(());
        }
        if self.write_partition(entity, rows).await? {
            match entity {
                EntityType::Rates => self.stats.rates_written += count,
                EntityType::Organizations => self.stats.organizations_written += count,
                EntityType::Providers => self.stats.providers_written += count,
                EntityType::Analytics => {}
            }
        }
        Ok(())
    }

    /// Returns whether the part landed. A persistently failing partition
    /// doesn't take the payer down; it is recorded and the pipeline
    /// continues with other partitions.
    async fn write_partition(&mut self, entity: EntityType, rows: Vec<Vec<Cell>>) -> Result<bool> {
        match self
            .writer
            .write_rows(entity, &self.payer, &self.date, rows)
            .await
        {
            Ok(_key) => {
                self.stats.parts_written += 1;
                Ok(true)
            }
            Err(e) => {
                let partition =
                    format!("{}/payer={}/date={}", entity.as_str(), self.payer, self.date);
                tracing::error!(partition = %partition, error = %e, "Partition write failed");
                self.stats.failed_partitions.push(partition);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use crate::normalize::NormalizedBatch;
    use crate::writer::store::LocalStore;
    use tempfile::TempDir;

    fn rate_record(code: &str, rate: f64) -> RateRecord {
        let payer = identity::payer_uuid("test");
        let org = identity::organization_uuid("12-3456789");
        let plan = identity::plan_fingerprint("p", "", "");
        RateRecord {
            rate_uuid: identity::rate_uuid(
                payer,
                org,
                code,
                "CPT",
                rate,
                "professional",
                "negotiated",
                plan,
            ),
            payer_uuid: payer,
            organization_uuid: org,
            service_code: code.to_string(),
            service_description: String::new(),
            billing_code_type: "CPT".to_string(),
            negotiated_rate: rate,
            billing_class: "professional".to_string(),
            rate_type: "negotiated".to_string(),
            service_codes: vec!["11".to_string()],
            plan_details: Default::default(),
            contract_period: Default::default(),
            provider_network: Default::default(),
            data_lineage: crate::domain::entities::DataLineage {
                source_file_url: "https://x/rates.json".to_string(),
                extraction_timestamp: Utc::now(),
                processing_version: "test".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    fn writer_in(dir: &TempDir) -> Arc<EntityWriter> {
        let store = Arc::new(LocalStore::new(dir.path()));
        Arc::new(EntityWriter::new(store, dir.path().join(".staging")).unwrap())
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let writer = writer_in(&dir);
        let mut batcher = PayerBatcher::new(writer, "centene", "2025-06-01", 2, 1024);

        let mut batch = NormalizedBatch::default();
        batch.rates.push(rate_record("99213", 81.84));
        batcher.push(batch).await.unwrap();
        // Below threshold: nothing on disk yet.
        assert_eq!(batcher.stats.parts_written, 0);

        let mut batch = NormalizedBatch::default();
        batch.rates.push(rate_record("99214", 120.5));
        batcher.push(batch).await.unwrap();

        assert_eq!(batcher.stats.parts_written, 1);
        assert_eq!(batcher.stats.rates_written, 2);
        assert!(dir
            .path()
            .join("rates/payer=centene/date=2025-06-01/part-0000.parquet")
            .exists());
    }

    #[tokio::test]
    async fn test_part_numbers_increment() {
        let dir = TempDir::new().unwrap();
        let writer = writer_in(&dir);
        let mut batcher = PayerBatcher::new(writer, "centene", "2025-06-01", 1, 1024);

        for (code, rate) in [("99213", 81.84), ("99214", 120.5), ("99215", 180.0)] {
            let mut batch = NormalizedBatch::default();
            batch.rates.push(rate_record(code, rate));
            batcher.push(batch).await.unwrap();
        }

        let partition = dir.path().join("rates/payer=centene/date=2025-06-01");
        for n in 0..3 {
            assert!(partition.join(format!("part-{n:04}.parquet")).exists());
        }
    }

    #[tokio::test]
    async fn test_flush_all_drains_everything() {
        let dir = TempDir::new().unwrap();
        let writer = writer_in(&dir);
        let mut batcher = PayerBatcher::new(writer, "centene", "2025-06-01", 1000, 1024);

        let mut batch = NormalizedBatch::default();
        batch.rates.push(rate_record("99213", 81.84));
        batcher.push(batch).await.unwrap();
        assert_eq!(batcher.stats.parts_written, 0);

        batcher.flush_all().await.unwrap();
        assert_eq!(batcher.stats.rates_written, 1);
        assert_eq!(batcher.stats.parts_written, 1);
    }

    #[tokio::test]
    async fn test_memory_ceiling_forces_flush() {
        let dir = TempDir::new().unwrap();
        let writer = writer_in(&dir);
        // 1 MB ceiling: ~1165 estimated rate rows.
        let mut batcher = PayerBatcher::new(writer, "centene", "2025-06-01", 1_000_000, 1);

        let mut batch = NormalizedBatch::default();
        for i in 0..1200 {
            batch.rates.push(rate_record("99213", 1.0 + i as f64));
        }
        batcher.push(batch).await.unwrap();
        assert!(batcher.stats.parts_written >= 1);
        assert_eq!(batcher.stats.rates_written, 1200);
    }
}
