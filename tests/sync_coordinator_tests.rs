//! End-to-end coordinator runs against a temporary SQLite database with fake
//! vendor and image collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use menu_catalog_sync_lib::application::SyncCoordinator;
use menu_catalog_sync_lib::domain::repositories::{
    CatalogRepository, CatalogSource, CoordinationStore, ImageStore, UpsertSummary,
};
use menu_catalog_sync_lib::domain::{
    CatalogItem, OptionRecord, ProgressSnapshot, SizeOption, SyncError, SyncStage, SyncStatus,
};
use menu_catalog_sync_lib::infrastructure::config::SyncConfig;
use menu_catalog_sync_lib::infrastructure::{DatabaseConnection, InMemoryCoordinationStore, SqliteCatalogRepository};

/// Tracks the current and peak number of concurrent calls
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakeSource {
    list: Mutex<Option<Vec<CatalogItem>>>,
    temperatures: HashMap<String, Vec<String>>,
    panicking: HashSet<String>,
    sizes: HashMap<(String, String), Vec<SizeOption>>,
    list_calls: AtomicUsize,
    gauge: Gauge,
    delay: Duration,
}

impl FakeSource {
    fn with_list(items: Vec<CatalogItem>) -> Self {
        Self { list: Mutex::new(Some(items)), ..Self::default() }
    }

    fn set_list(&self, items: Vec<CatalogItem>) {
        *self.list.lock().unwrap() = Some(items);
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn fetch_list(&self) -> Result<Vec<CatalogItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }

    async fn fetch_temperature_options(&self, item_code: &str) -> Vec<String> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();
        if self.panicking.contains(item_code) {
            panic!("detail page parser exploded for {item_code}");
        }
        self.temperatures.get(item_code).cloned().unwrap_or_default()
    }

    async fn fetch_size_options(&self, item_code: &str, temperature_code: &str) -> Vec<SizeOption> {
        self.sizes
            .get(&(item_code.to_string(), temperature_code.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct FakeImages {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    gauge: Gauge,
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl ImageStore for FakeImages {
    async fn download_and_store(&self, item_code: &str, remote_url: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();

        if self.panicking.contains(item_code) {
            panic!("decoder exploded for {item_code}");
        }
        if self.failing.contains(item_code) {
            return None;
        }
        let ext = if remote_url.ends_with(".png") { ".png" } else { ".jpg" };
        Some(format!("/images/catalog/{item_code}{ext}"))
    }
}

/// In-memory store that keeps every published snapshot
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryCoordinationStore,
    published: Mutex<Vec<ProgressSnapshot>>,
}

#[async_trait]
impl CoordinationStore for RecordingStore {
    async fn try_acquire_lock(&self, name: &str, holder: &str, lease: Duration) -> Result<bool> {
        self.inner.try_acquire_lock(name, holder, lease).await
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        self.inner.release_lock(name, holder).await
    }

    async fn is_locked(&self, name: &str) -> Result<bool> {
        self.inner.is_locked(name).await
    }

    async fn put_progress(&self, snapshot: &ProgressSnapshot, ttl: Duration) -> Result<()> {
        self.published.lock().unwrap().push(snapshot.clone());
        self.inner.put_progress(snapshot, ttl).await
    }

    async fn get_progress(&self) -> Result<Option<ProgressSnapshot>> {
        self.inner.get_progress().await
    }

    async fn clear_progress(&self) -> Result<()> {
        self.inner.clear_progress().await
    }
}

/// Repository whose option insert always fails
struct DiskFullRepository {
    inner: Arc<SqliteCatalogRepository>,
}

#[async_trait]
impl CatalogRepository for DiskFullRepository {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<UpsertSummary> {
        self.inner.upsert_items(items).await
    }

    async fn save_local_image_paths(&self, paths: &[(String, String)]) -> Result<u64> {
        self.inner.save_local_image_paths(paths).await
    }

    async fn delete_all_options(&self) -> Result<u64> {
        self.inner.delete_all_options().await
    }

    async fn insert_options(&self, _options: &[OptionRecord]) -> Result<u64> {
        Err(anyhow!("disk full"))
    }

    async fn find_item(&self, code: &str) -> Result<Option<CatalogItem>> {
        self.inner.find_item(code).await
    }

    async fn find_options(&self, item_code: &str) -> Result<Vec<OptionRecord>> {
        self.inner.find_options(item_code).await
    }

    async fn list_active_items(&self) -> Result<Vec<CatalogItem>> {
        self.inner.list_active_items().await
    }

    async fn count_items(&self) -> Result<u64> {
        self.inner.count_items().await
    }

    async fn count_options(&self) -> Result<u64> {
        self.inner.count_options().await
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    repository: Arc<SqliteCatalogRepository>,
    store: Arc<RecordingStore>,
    source: Arc<FakeSource>,
    images: Arc<FakeImages>,
    coordinator: Arc<SyncCoordinator>,
}

async fn harness(source: FakeSource, images: FakeImages, config: SyncConfig) -> Harness {
    harness_with(source, images, config, |repository| repository as Arc<dyn CatalogRepository>).await
}

async fn harness_with(
    source: FakeSource,
    images: FakeImages,
    config: SyncConfig,
    wrap: impl FnOnce(Arc<SqliteCatalogRepository>) -> Arc<dyn CatalogRepository>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
    let db = DatabaseConnection::new(&url).await.unwrap();
    db.migrate().await.unwrap();

    let repository = Arc::new(SqliteCatalogRepository::new(Arc::new(db.pool().clone())));
    let store = Arc::new(RecordingStore::default());
    let source = Arc::new(source);
    let images = Arc::new(images);
    let coordinator = Arc::new(SyncCoordinator::new(
        wrap(repository.clone()),
        store.clone(),
        source.clone(),
        images.clone(),
        config,
    ));

    Harness { _dir: dir, repository, store, source, images, coordinator }
}

fn item(code: &str, name: &str) -> CatalogItem {
    let mut item = CatalogItem::new(code, name);
    item.image_url = Some(format!("/upload/menu/{code}.png"));
    item
}

fn size(code: &str) -> SizeOption {
    SizeOption {
        variant_code: Some(format!("020{code}")),
        size_group_code: Some("020".to_string()),
        size_name: Some(code.to_string()),
        size_code: code.to_string(),
    }
}

fn lock_name() -> String {
    SyncConfig::default().lock_name
}

#[tokio::test]
async fn first_run_inserts_every_new_item() {
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano"), item("A2", "Latte")]),
        FakeImages::default(),
        SyncConfig::default(),
    )
    .await;

    let result = h.coordinator.run().await.unwrap();
    assert_eq!(result.item_count, 2);
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.updated_count, 0);
    assert_eq!(result.image_count, 2);

    let stored = h.repository.find_item("A1").await.unwrap().unwrap();
    assert_eq!(stored.local_image_path.as_deref(), Some("/images/catalog/A1.png"));

    let progress = h.coordinator.progress().await;
    assert_eq!(progress.status, SyncStatus::Completed);
    assert_eq!(progress.overall_progress, 100);
    assert_eq!(progress.inserted_count, 2);
    assert!(!h.coordinator.is_in_progress().await.unwrap());
}

#[tokio::test]
async fn second_run_updates_in_place_and_keeps_absent_items() {
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano"), item("A2", "Latte")]),
        FakeImages::default(),
        SyncConfig::default(),
    )
    .await;
    h.coordinator.run().await.unwrap();

    h.source.set_list(vec![item("A1", "Iced Americano")]);
    let result = h.coordinator.run().await.unwrap();
    assert_eq!(result.inserted_count, 0);
    assert_eq!(result.updated_count, 1);
    assert_eq!(result.item_count, 1);

    assert_eq!(h.repository.find_item("A1").await.unwrap().unwrap().name, "Iced Americano");
    let absent = h.repository.find_item("A2").await.unwrap().unwrap();
    assert_eq!(absent.name, "Latte");
    assert!(!absent.deleted);
    assert_eq!(h.repository.count_items().await.unwrap(), 2);
}

#[tokio::test]
async fn options_are_rebuilt_per_temperature() {
    let mut source = FakeSource::with_list(vec![item("A1", "Americano"), item("B1", "Cookie")]);
    source.temperatures.insert("A1".into(), vec!["010H".into(), "010I".into()]);
    source.sizes.insert(("A1".into(), "010H".into()), vec![size("R"), size("L")]);
    source.sizes.insert(("A1".into(), "010I".into()), vec![size("R")]);

    let h = harness(source, FakeImages::default(), SyncConfig::default()).await;

    let first = h.coordinator.run().await.unwrap();
    assert_eq!(first.option_count, 3);

    // 이전 실행의 옵션이 남지 않아야 함
    let second = h.coordinator.run().await.unwrap();
    assert_eq!(second.option_count, 3);
    assert_eq!(h.repository.count_options().await.unwrap(), 3);

    let options = h.repository.find_options("A1").await.unwrap();
    let mut pairs: Vec<(String, String)> = options
        .iter()
        .map(|o| (o.temperature_code.clone(), o.size_code.clone()))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("010H".to_string(), "L".to_string()),
            ("010H".to_string(), "R".to_string()),
            ("010I".to_string(), "R".to_string()),
        ]
    );
    assert!(options.iter().any(|o| o.temperature_name == "아이스"));
    assert!(h.repository.find_options("B1").await.unwrap().is_empty());
}

#[tokio::test]
async fn held_lock_rejects_run_immediately() {
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano")]),
        FakeImages::default(),
        SyncConfig::default(),
    )
    .await;
    assert!(h
        .store
        .try_acquire_lock(&lock_name(), "other-instance", Duration::from_secs(600))
        .await
        .unwrap());

    let started = Instant::now();
    let outcome = h.coordinator.run().await;
    assert!(matches!(outcome, Err(SyncError::AlreadyInProgress)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.source.list_calls.load(Ordering::SeqCst), 0);

    // 다른 인스턴스의 락은 그대로 유지
    assert!(h.coordinator.is_in_progress().await.unwrap());
    assert_eq!(h.coordinator.progress().await.status, SyncStatus::Running);
}

#[tokio::test]
async fn overlapping_runs_in_one_process_conflict() {
    let images = FakeImages { delay: Duration::from_millis(100), ..FakeImages::default() };
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano"), item("A2", "Latte")]),
        images,
        SyncConfig::default(),
    )
    .await;

    let coordinator = h.coordinator.clone();
    let first = tokio::spawn(async move { coordinator.run().await });

    // 첫 번째 실행이 락을 잡을 때까지 대기
    let deadline = Instant::now() + Duration::from_secs(5);
    while !h.coordinator.is_in_progress().await.unwrap() {
        assert!(Instant::now() < deadline, "first run never acquired the lock");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(h.coordinator.run().await, Err(SyncError::AlreadyInProgress)));
    assert!(first.await.unwrap().is_ok());
    assert!(!h.coordinator.is_in_progress().await.unwrap());
}

#[tokio::test]
async fn empty_list_aborts_and_releases_lock() {
    let h = harness(FakeSource::with_list(Vec::new()), FakeImages::default(), SyncConfig::default()).await;

    let outcome = h.coordinator.run().await;
    assert!(matches!(outcome, Err(SyncError::Aborted(_))));
    assert!(!h.coordinator.is_in_progress().await.unwrap());
    assert_eq!(h.images.calls.load(Ordering::SeqCst), 0);

    let progress = h.coordinator.progress().await;
    assert_eq!(progress.status, SyncStatus::Failed);
    assert!(progress.overall_progress < 100);
    assert_eq!(progress.error_message.as_deref(), Some("menu list is empty"));
}

#[tokio::test]
async fn unreachable_list_aborts_with_message() {
    let h = harness(FakeSource::default(), FakeImages::default(), SyncConfig::default()).await;

    let outcome = h.coordinator.run().await;
    assert!(matches!(outcome, Err(SyncError::Aborted(_))));

    let progress = h.coordinator.progress().await;
    assert_eq!(progress.status, SyncStatus::Failed);
    assert!(progress.error_message.unwrap().contains("connection refused"));
    assert_eq!(h.repository.count_items().await.unwrap(), 0);
    assert!(!h.coordinator.is_in_progress().await.unwrap());
}

#[tokio::test]
async fn fan_out_never_exceeds_pool_width() {
    let items: Vec<CatalogItem> = (0..24).map(|i| item(&format!("M{i:02}"), "menu")).collect();
    let source = FakeSource { delay: Duration::from_millis(10), ..FakeSource::with_list(items) };
    let images = FakeImages { delay: Duration::from_millis(10), ..FakeImages::default() };
    let config = SyncConfig { worker_pool_width: 3, ..SyncConfig::default() };

    let h = harness(source, images, config).await;
    let result = h.coordinator.run().await.unwrap();

    assert_eq!(result.image_count, 24);
    assert!(h.images.gauge.peak() <= 3, "image peak {}", h.images.gauge.peak());
    assert!(h.source.gauge.peak() <= 3, "option peak {}", h.source.gauge.peak());
    assert!(h.images.gauge.peak() >= 1);
}

#[tokio::test]
async fn published_progress_is_monotonic() {
    let items: Vec<CatalogItem> = (0..35).map(|i| item(&format!("M{i:02}"), "menu")).collect();
    let h = harness(FakeSource::with_list(items), FakeImages::default(), SyncConfig::default()).await;
    h.coordinator.run().await.unwrap();

    let published = h.store.published.lock().unwrap().clone();
    assert!(published.len() > 4);

    for pair in published.windows(2) {
        assert!(
            pair[1].overall_progress >= pair[0].overall_progress,
            "progress went backwards: {} -> {}",
            pair[0].overall_progress,
            pair[1].overall_progress
        );
        assert!(pair[1].current_stage >= pair[0].current_stage);
        if pair[1].current_stage == pair[0].current_stage {
            assert!(pair[1].processed_count >= pair[0].processed_count);
        }
    }

    let (last, rest) = published.split_last().unwrap();
    assert_eq!(last.status, SyncStatus::Completed);
    assert_eq!(last.overall_progress, 100);
    assert!(rest.iter().all(|s| s.overall_progress < 100 && s.status == SyncStatus::Running));
}

#[tokio::test]
async fn image_failures_do_not_fail_the_run() {
    let images = FakeImages {
        failing: HashSet::from(["A2".to_string()]),
        panicking: HashSet::from(["A3".to_string()]),
        ..FakeImages::default()
    };
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano"), item("A2", "Latte"), item("A3", "Mocha")]),
        images,
        SyncConfig::default(),
    )
    .await;

    let result = h.coordinator.run().await.unwrap();
    assert_eq!(result.image_count, 1);
    assert_eq!(result.image_failed_count, 2);

    let a1 = h.repository.find_item("A1").await.unwrap().unwrap();
    let a2 = h.repository.find_item("A2").await.unwrap().unwrap();
    assert!(a1.local_image_path.is_some());
    assert!(a2.local_image_path.is_none());
    assert_eq!(h.coordinator.progress().await.status, SyncStatus::Completed);
}

#[tokio::test]
async fn items_without_images_are_skipped() {
    let h = harness(
        FakeSource::with_list(vec![item("A1", "Americano"), CatalogItem::new("A2", "Water")]),
        FakeImages::default(),
        SyncConfig::default(),
    )
    .await;

    let result = h.coordinator.run().await.unwrap();
    assert_eq!(result.image_count, 1);
    assert_eq!(result.image_failed_count, 0);
    assert_eq!(h.images.calls.load(Ordering::SeqCst), 1);

    // 이미지 단계와 옵션 단계의 분모가 같아야 함
    let published = h.store.published.lock().unwrap().clone();
    let image_totals: HashSet<u32> = published
        .iter()
        .filter(|s| s.current_stage == SyncStage::ImageDownload)
        .map(|s| s.total_count)
        .collect();
    assert_eq!(image_totals, HashSet::from([2]));
    let last_image = published
        .iter()
        .filter(|s| s.current_stage == SyncStage::ImageDownload)
        .last()
        .unwrap();
    assert_eq!(last_image.processed_count, 2);
}

#[tokio::test]
async fn repeated_feed_codes_are_stored_once() {
    let mut source = FakeSource::with_list(vec![item("A1", "Americano"), item("A1", "Iced Americano")]);
    source.temperatures.insert("A1".into(), vec!["010H".into()]);
    source.sizes.insert(("A1".into(), "010H".into()), vec![size("R")]);

    let h = harness(source, FakeImages::default(), SyncConfig::default()).await;
    let result = h.coordinator.run().await.unwrap();

    assert_eq!(result.item_count, 1);
    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.updated_count, 0);
    assert_eq!(result.option_count, 1);
    assert_eq!(h.images.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.repository.count_items().await.unwrap(), 1);
    assert_eq!(h.repository.count_options().await.unwrap(), 1);
    assert_eq!(h.repository.find_item("A1").await.unwrap().unwrap().name, "Iced Americano");
}

#[tokio::test]
async fn persistence_failure_fails_the_run_and_releases_lock() {
    let mut source = FakeSource::with_list(vec![item("A1", "Americano")]);
    source.temperatures.insert("A1".into(), vec!["010H".into()]);
    source.sizes.insert(("A1".into(), "010H".into()), vec![size("R")]);

    let h = harness_with(source, FakeImages::default(), SyncConfig::default(), |inner| {
        Arc::new(DiskFullRepository { inner }) as Arc<dyn CatalogRepository>
    })
    .await;

    let error = match h.coordinator.run().await {
        Err(SyncError::Unexpected(error)) => error,
        other => panic!("expected an unexpected failure, got {other:?}"),
    };
    assert!(format!("{error:#}").contains("disk full"));
    assert!(!h.coordinator.is_in_progress().await.unwrap());

    let progress = h.coordinator.progress().await;
    assert_eq!(progress.status, SyncStatus::Failed);
    assert!(progress.overall_progress < 100);
    assert!(progress.error_message.unwrap().contains("disk full"));

    // 앞 단계는 이미 커밋됨
    assert_eq!(h.repository.count_items().await.unwrap(), 1);
    assert!(h.repository.find_item("A1").await.unwrap().unwrap().local_image_path.is_some());
    assert_eq!(h.repository.count_options().await.unwrap(), 0);
}

#[tokio::test]
async fn panicking_option_discovery_is_counted_not_fatal() {
    let mut source = FakeSource::with_list(vec![item("A1", "Americano"), item("A2", "Latte")]);
    source.temperatures.insert("A1".into(), vec!["010H".into()]);
    source.sizes.insert(("A1".into(), "010H".into()), vec![size("R"), size("L")]);
    source.panicking.insert("A2".into());

    let h = harness(source, FakeImages::default(), SyncConfig::default()).await;
    let result = h.coordinator.run().await.unwrap();

    assert_eq!(result.option_count, 2);
    assert_eq!(result.option_failed_count, 1);
    assert_eq!(h.repository.count_options().await.unwrap(), 2);
    assert!(h.repository.find_options("A2").await.unwrap().is_empty());
    assert_eq!(h.coordinator.progress().await.status, SyncStatus::Completed);
    assert!(!h.coordinator.is_in_progress().await.unwrap());
}
