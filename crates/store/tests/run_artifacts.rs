use std::fs;

use chrono::Utc;
use tempfile::TempDir;

use storelens_core::clustering::ClusteringSettings;
use storelens_core::pipeline::{self, PipelineOutput, PipelineSettings};
use storelens_store::{
    load_orders, read_manifest, verify_run, write_run, ArtifactKind, ArtifactStatus,
    ArtifactStore, DirectoryArtifactStore, InMemoryArtifactStore, LoadedOrders, RunContext,
    StoreError, MANIFEST_FILE,
};

const REGIONS: [(&str, f64); 6] = [
    ("Texas", -40.0),
    ("Ohio", -15.0),
    ("Illinois", -5.0),
    ("California", 60.0),
    ("New York", 45.0),
    ("Washington", 20.0),
];

fn snapshot_csv() -> String {
    let mut csv = String::from(
        "Row ID,Order Date,Customer ID,Customer Name,Segment,State,Sales,Quantity,Profit\n",
    );
    let mut row_id = 1;
    for (index, (state, profit)) in REGIONS.iter().enumerate() {
        for line in 0..(index + 2) {
            csv.push_str(&format!(
                "{row_id},2017-{:02}-{:02},CU-{index}{line},Customer {row_id},Consumer,{state},{},{},{}\n",
                1 + line % 12,
                1 + index,
                120.0 * (index + 1) as f64 + line as f64,
                line + 1,
                profit + line as f64,
            ));
            row_id += 1;
        }
    }
    csv
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        clustering: ClusteringSettings { clusters: 3, ..ClusteringSettings::default() },
        ..PipelineSettings::default()
    }
}

fn load(dir: &TempDir) -> LoadedOrders {
    let input = dir.path().join("ss.csv");
    fs::write(&input, snapshot_csv()).expect("write snapshot");
    load_orders(&input, &["%Y-%m-%d".to_string()]).expect("load snapshot")
}

fn run_pipeline(loaded: &LoadedOrders) -> PipelineOutput {
    pipeline::run(&loaded.records, &settings()).expect("pipeline")
}

fn context(loaded: &LoadedOrders) -> RunContext {
    RunContext { input: loaded.fingerprint.clone(), settings: settings(), started_at: Utc::now() }
}

struct FailingStore {
    inner: InMemoryArtifactStore,
    fail_on: &'static str,
}

impl ArtifactStore for FailingStore {
    fn location(&self) -> String {
        "failing".to_string()
    }

    fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        if name == self.fail_on {
            return Err(StoreError::Write { name: name.to_string(), message: "disk full".to_string() });
        }
        self.inner.put(name, contents)
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(name)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.inner.remove(name)
    }
}

#[test]
fn writes_every_artifact_and_a_verifiable_manifest() {
    let dir = TempDir::new().expect("tempdir");
    let loaded = load(&dir);
    let output = run_pipeline(&loaded);
    let store = DirectoryArtifactStore::new(dir.path().join("out"));

    let manifest = write_run(&store, &output, context(&loaded)).expect("write run");

    for kind in ArtifactKind::ALL {
        assert!(store.root().join(kind.file_name()).exists(), "{kind} should be written");
    }
    assert!(store.root().join(MANIFEST_FILE).exists());
    assert_eq!(manifest.input.records, loaded.records.len());
    assert_eq!(
        manifest.entry(ArtifactKind::CustomerClassification).map(|entry| entry.rows),
        Some(output.customers.len())
    );
    assert_eq!(
        manifest.entry(ArtifactKind::RegionSimilarity).map(|entry| entry.rows),
        Some(REGIONS.len() * 5)
    );

    let report = verify_run(&store).expect("verify");
    assert!(report.is_intact());
    assert_eq!(report.run_id, manifest.run_id);
    assert_eq!(read_manifest(&store).expect("manifest"), manifest);
}

#[test]
fn written_tables_keep_the_dashboard_columns() {
    let dir = TempDir::new().expect("tempdir");
    let loaded = load(&dir);
    let store = DirectoryArtifactStore::new(dir.path().join("out"));

    write_run(&store, &run_pipeline(&loaded), context(&loaded)).expect("write run");

    for kind in ArtifactKind::ALL {
        let raw = fs::read_to_string(store.root().join(kind.file_name())).expect("artifact");
        let header = raw.lines().next().expect("header line");
        assert_eq!(header, kind.columns().join(","), "{kind} header");
    }
}

#[test]
fn tampered_artifact_fails_verification() {
    let dir = TempDir::new().expect("tempdir");
    let loaded = load(&dir);
    let store = DirectoryArtifactStore::new(dir.path().join("out"));
    write_run(&store, &run_pipeline(&loaded), context(&loaded)).expect("write run");

    fs::write(store.root().join("knn_estado.csv"), "referencia,vizinho\n").expect("tamper");
    fs::remove_file(store.root().join("centroides_estado.csv")).expect("remove");

    let report = verify_run(&store).expect("verify");
    let failures: Vec<(&str, &ArtifactStatus)> =
        report.failures().map(|check| (check.file.as_str(), &check.status)).collect();

    assert!(!report.is_intact());
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0], ("knn_estado.csv", ArtifactStatus::Mismatch { .. })));
    assert_eq!(failures[1], ("centroides_estado.csv", &ArtifactStatus::Missing));
}

#[test]
fn failed_write_leaves_no_manifest_behind() {
    let dir = TempDir::new().expect("tempdir");
    let loaded = load(&dir);
    let output = run_pipeline(&loaded);
    let store = FailingStore { inner: InMemoryArtifactStore::default(), fail_on: "knn_estado.csv" };
    store.inner.put(MANIFEST_FILE, b"{}").expect("seed stale manifest");

    let error = write_run(&store, &output, context(&loaded)).expect_err("write should fail");

    assert_eq!(error.error_class(), "artifact_write");
    assert_eq!(store.get(MANIFEST_FILE).expect("get"), None);
    assert!(store.get("probabilidade_estado.csv").expect("get").is_some());
    assert!(matches!(verify_run(&store), Err(StoreError::ManifestMissing { .. })));
}

#[test]
fn in_memory_store_round_trips_a_run() {
    let dir = TempDir::new().expect("tempdir");
    let loaded = load(&dir);
    let store = InMemoryArtifactStore::default();

    write_run(&store, &run_pipeline(&loaded), context(&loaded)).expect("write run");

    let mut expected: Vec<String> =
        ArtifactKind::ALL.iter().map(|kind| kind.file_name().to_string()).collect();
    expected.push(MANIFEST_FILE.to_string());
    expected.sort();
    assert_eq!(store.names().expect("names"), expected);
    assert!(verify_run(&store).expect("verify").is_intact());
}
