use async_trait::async_trait;
use docscribe::errors::RecognitionError;
use docscribe::providers::ai::{TextRecognizer, VisionProvider};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// --- Call accounting ---

/// Counts calls and tracks the peak number of overlapping calls.
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl CallTracker {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A scripted reply for a mock recognizer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    RateLimited,
    Fail(String),
    Panic,
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }
}

#[derive(Debug)]
struct Script {
    queued: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    latency: Duration,
    tracker: CallTracker,
}

impl Script {
    fn new(fallback: MockReply) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::from_millis(20),
            tracker: CallTracker::default(),
        }
    }

    async fn play(&self) -> Result<String, RecognitionError> {
        self.tracker.enter();
        tokio::time::sleep(self.latency).await;
        let reply = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.tracker.exit();
        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::RateLimited => Err(RecognitionError::RateLimited("HTTP 429".into())),
            MockReply::Fail(msg) => Err(RecognitionError::Api(msg)),
            MockReply::Panic => panic!("mock recognizer panicked"),
        }
    }
}

// --- Mock Vision Provider ---

#[derive(Clone, Debug)]
pub struct MockVisionProvider {
    script: Arc<Script>,
}

impl MockVisionProvider {
    /// Replies with `fallback` whenever no queued reply is left.
    pub fn new(fallback: MockReply) -> Self {
        Self {
            script: Arc::new(Script::new(fallback)),
        }
    }

    pub fn with_latency(fallback: MockReply, latency: Duration) -> Self {
        let mut script = Script::new(fallback);
        script.latency = latency;
        Self {
            script: Arc::new(script),
        }
    }

    /// Queues a reply used before the fallback.
    pub fn push_reply(&self, reply: MockReply) {
        self.script.queued.lock().unwrap().push_back(reply);
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.script.tracker
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    async fn describe_image(
        &self,
        _image: &[u8],
        _instruction: &str,
    ) -> Result<String, RecognitionError> {
        self.script.play().await
    }
}

// --- Mock OCR ---

#[derive(Clone, Debug)]
pub struct MockTextRecognizer {
    script: Arc<Script>,
}

impl MockTextRecognizer {
    /// `fallback` text is split into lines on `\n`.
    pub fn new(fallback: MockReply) -> Self {
        Self {
            script: Arc::new(Script::new(fallback)),
        }
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.script.queued.lock().unwrap().push_back(reply);
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.script.tracker
    }
}

#[async_trait]
impl TextRecognizer for MockTextRecognizer {
    async fn recognize_text(&self, _image: &[u8]) -> Result<Vec<String>, RecognitionError> {
        let text = self.script.play().await?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

/// A tiny PNG signature followed by filler bytes; enough for MIME sniffing.
pub fn fake_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}
