use async_trait::async_trait;
use dataql::cache::CacheManager;
use dataql::compress::Compression;
use dataql::error::{ErrorKind, Result};
use dataql::queue::{MemoryReader, Message, QueueKind, Registry};
use dataql::{Engine, ImportSummary, Pipeline, Prepared, Source};
use filetime::{FileTime, set_file_mtime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Writes the concatenated inputs to the target and records every call.
#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<(Vec<PathBuf>, Option<PathBuf>)>>,
    fail_with: Option<String>,
}

impl FakeEngine {
    fn failing(message: &str) -> Self {
        Self { fail_with: Some(message.to_string()), ..Self::default() }
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_files(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().last().unwrap().0.clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn import(&self, files: &[PathBuf], target: Option<&Path>) -> Result<ImportSummary> {
        self.calls.lock().unwrap().push((files.to_vec(), target.map(Path::to_path_buf)));
        if let Some(message) = &self.fail_with {
            exn::bail!(ErrorKind::Engine(message.clone()));
        }
        let mut summary = ImportSummary::default();
        let mut store = Vec::new();
        for file in files {
            let contents = fs::read_to_string(file).unwrap();
            summary.tables.push(file.file_stem().unwrap().to_string_lossy().into_owned());
            summary.total_rows += contents.lines().count().saturating_sub(1) as u64;
            store.extend_from_slice(contents.as_bytes());
        }
        if let Some(target) = target {
            fs::write(target, store).unwrap();
        }
        Ok(summary)
    }
}

struct Workspace {
    root: TempDir,
    pipeline: Pipeline,
}

impl Workspace {
    fn new(enabled: bool) -> Self {
        Self::with_registry(enabled, Registry::new())
    }

    fn with_registry(enabled: bool, registry: Registry) -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("data")).unwrap();
        fs::create_dir(root.path().join("tmp")).unwrap();
        let cache = CacheManager::new(root.path().join("cache"), enabled);
        let pipeline = Pipeline::builder(cache).registry(registry).temp_root(root.path().join("tmp")).build();
        Self { root, pipeline }
    }

    fn write(&self, name: &str, contents: &[u8], mtime: i64) -> PathBuf {
        let path = self.root.path().join("data").join(name);
        fs::write(&path, contents).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
        path
    }

    fn temp_entries(&self) -> usize {
        fs::read_dir(self.root.path().join("tmp")).unwrap().count()
    }
}

/// Answer every request with `body` until the test ends.
async fn serve(body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });
    format!("http://{addr}/exports/a.csv")
}

fn sources(paths: &[&Path]) -> Vec<Source> {
    paths.iter().map(|path| Source::from(path.to_path_buf())).collect()
}

#[tokio::test]
async fn test_miss_import_hit_then_touch_misses() {
    let ws = Workspace::new(true);
    let csv = ws.write("a.csv", b"id,name\n1,x\n2,y\n", 1_700_000_000);
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();

    let first = ws.pipeline.prepare(&sources(&[&csv]), &engine, &cancel).await.unwrap();
    let Prepared::Imported { artifact: Some(artifact), summary } = &first else {
        panic!("expected a fresh import, got {first:?}");
    };
    assert_eq!(summary.tables, ["a"]);
    assert_eq!(summary.total_rows, 2);
    assert_eq!(fs::read(artifact).unwrap(), b"id,name\n1,x\n2,y\n");
    assert_eq!(engine.calls(), 1);

    let second = ws.pipeline.prepare(&sources(&[&csv]), &engine, &cancel).await.unwrap();
    assert!(second.is_cached());
    assert_eq!(second.artifact(), first.artifact());
    assert_eq!(engine.calls(), 1, "a hit must not re-import");
    let Prepared::Cached { metadata, .. } = &second else { unreachable!() };
    assert_eq!(metadata.total_rows, 2);

    set_file_mtime(&csv, FileTime::from_unix_time(1_700_000_060, 0)).unwrap();
    let third = ws.pipeline.prepare(&sources(&[&csv]), &engine, &cancel).await.unwrap();
    assert!(!third.is_cached());
    assert_eq!(engine.calls(), 2);
}

#[tokio::test]
async fn test_source_order_does_not_matter() {
    let ws = Workspace::new(true);
    let a = ws.write("a.csv", b"id\n1\n", 1_700_000_000);
    let b = ws.write("b.json", b"[]\n", 1_700_000_000);
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();

    ws.pipeline.prepare(&sources(&[&a, &b]), &engine, &cancel).await.unwrap();
    let again = ws.pipeline.prepare(&sources(&[&b, &a]), &engine, &cancel).await.unwrap();
    assert!(again.is_cached());
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_compressed_sources_hit_and_leave_no_temp_files() {
    let ws = Workspace::new(true);
    let body = b"id,total\n1,10\n2,20\n3,30\n";
    let gz = ws.write("sales.csv.gz", &Compression::Gzip.compress(body).unwrap(), 1_700_000_000);
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();

    let first = ws.pipeline.prepare(&sources(&[&gz]), &engine, &cancel).await.unwrap();
    let imported = engine.last_files();
    assert_eq!(imported[0].extension().unwrap(), "csv", "the inner extension is kept");
    assert!(!imported[0].exists(), "decompressed files are removed after preparing");
    assert_eq!(fs::read(first.artifact().unwrap()).unwrap(), body);
    assert_eq!(ws.temp_entries(), 0);

    let second = ws.pipeline.prepare(&sources(&[&gz]), &engine, &cancel).await.unwrap();
    assert!(second.is_cached(), "the compressed original is fingerprinted, not the temp file");
    assert_eq!(engine.calls(), 1);
    assert_eq!(ws.temp_entries(), 0);
}

#[tokio::test]
async fn test_remote_sources_are_never_written_back() {
    let ws = Workspace::new(true);
    let url = serve(b"id,name\n1,x\n").await;
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let prepared = ws.pipeline.prepare(&[Source::new(url.as_str())], &engine, &cancel).await.unwrap();
        let Prepared::Imported { artifact, summary } = &prepared else {
            panic!("remote sources must not hit the cache, got {prepared:?}");
        };
        assert_eq!(*artifact, None);
        assert_eq!(summary.total_rows, 1);
    }
    assert_eq!(engine.calls(), 3);
    assert_eq!(engine.calls.lock().unwrap()[0].1, None);
    assert_eq!(ws.pipeline.cache().list().unwrap().value.len(), 0);
    assert_eq!(ws.pipeline.cache().stats().unwrap().entries, 0);
    assert_eq!(ws.temp_entries(), 0);
}

#[tokio::test]
async fn test_disabled_cache_imports_in_memory() {
    let ws = Workspace::new(false);
    let csv = ws.write("a.csv", b"id\n1\n", 1_700_000_000);
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let prepared = ws.pipeline.prepare(&sources(&[&csv]), &engine, &cancel).await.unwrap();
        assert_eq!(prepared.artifact(), None);
    }
    assert_eq!(engine.calls(), 2);
    assert_eq!(engine.calls.lock().unwrap()[0].1, None);
    assert!(!ws.root.path().join("cache").exists());
}

#[tokio::test]
async fn test_engine_failure_is_explained_and_not_cached() {
    let ws = Workspace::new(true);
    let csv = ws.write("a.csv", b"id\n1\n", 1_700_000_000);
    let message = r#"Binder Error: Referenced column "nmae" not found in FROM clause!"#;
    let engine = FakeEngine::failing(message);

    let err = ws.pipeline.prepare(&sources(&[&csv]), &engine, &CancellationToken::new()).await.unwrap_err();
    let ErrorKind::Engine(raw) = &*err else {
        panic!("expected an engine error, got {err:?}");
    };
    let explained = ws.pipeline.explain(raw.as_str());
    assert_eq!(explained.hint().unwrap().message, "column \"nmae\" does not exist");
    assert!(!ws.pipeline.cache().is_valid(&[&csv]));
    assert_eq!(ws.pipeline.cache().list().unwrap().value.len(), 0);
}

#[tokio::test]
async fn test_missing_source_fails_resolution() {
    let ws = Workspace::new(true);
    let missing = ws.root.path().join("data").join("missing.csv");
    let engine = FakeEngine::default();

    let err = ws.pipeline.prepare(&sources(&[&missing]), &engine, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::Resolve);
    let cause = err.frame().children()[0].error().downcast_ref::<dataql::resolve::error::ErrorKind>();
    assert!(matches!(cause, Some(dataql::resolve::error::ErrorKind::NotFound(p)) if *p == missing));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_before_decompression() {
    let ws = Workspace::new(true);
    let gz = ws.write("a.csv.gz", &Compression::Gzip.compress(b"id\n1\n").unwrap(), 1_700_000_000);
    let engine = FakeEngine::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ws.pipeline.prepare(&sources(&[&gz]), &engine, &cancel).await.unwrap_err();
    assert_eq!(*err, ErrorKind::Cancelled);
    assert_eq!(engine.calls(), 0);
    assert_eq!(ws.temp_entries(), 0);
}

#[tokio::test]
async fn test_queue_sources_are_not_imported() {
    let ws = Workspace::new(true);
    let engine = FakeEngine::default();
    let err = ws
        .pipeline
        .prepare(&[Source::new("sqs://orders?region=us-east-1")], &engine, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(&*err, ErrorKind::QueueSource(url) if url == "sqs://orders?region=us-east-1"));
}

#[tokio::test]
async fn test_unregistered_sqs_names_its_package() {
    let ws = Workspace::new(true);
    let err = ws.pipeline.open_queue("sqs://queue?region=us-east-1").await.err().unwrap();
    assert_eq!(*err, ErrorKind::Queue);
    let cause = err.frame().children()[0].error().downcast_ref::<dataql::queue::error::ErrorKind>().unwrap();
    assert_eq!(
        *cause,
        dataql::queue::error::ErrorKind::NotRegistered { kind: QueueKind::Sqs, package: "dataql-queue/sqs" }
    );
    assert!(cause.to_string().contains("dataql-queue/sqs"));
}

#[tokio::test]
async fn test_peek_is_non_destructive() {
    let messages = vec![Message::new("1", "first"), Message::new("2", "second"), Message::new("3", "third")];
    let mut registry = Registry::new();
    registry.register(QueueKind::Kafka, MemoryReader::factory(messages.clone()));
    let ws = Workspace::with_registry(true, registry);

    let peeked = ws.pipeline.peek_queue("kafka://broker:9092/events?max_messages=2").await.unwrap();
    assert_eq!(peeked, messages[..2]);
    let again = ws.pipeline.peek_queue("kafka://broker:9092/events?max_messages=2").await.unwrap();
    assert_eq!(again, peeked);

    let reader = ws.pipeline.open_queue("kafka://broker:9092/events").await.unwrap();
    assert_eq!(reader.resource(), "events");
    assert_eq!(reader.peek(10).await.unwrap(), messages);
}
