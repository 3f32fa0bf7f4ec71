use crate::api::ApiClient;
use crate::model::FolderId;
use crate::upload::{is_ignored, DropZone, UploadEvent, UploadPipeline, UploadSource};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// A local directory used as a drop surface.
///
/// New or modified files activate the zone; once events have been quiet for
/// the debounce period the collected files are dropped as one batch. Each
/// path is handed out at most once.
pub struct Inbox {
    root: PathBuf,
    zone: DropZone,
    pending: BTreeSet<PathBuf>,
    dropped: HashSet<PathBuf>,
    last_event: Instant,
    debounce: Duration,
}

impl Inbox {
    pub fn new(root: &Path, debounce: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            zone: DropZone::default(),
            pending: BTreeSet::new(),
            dropped: HashSet::new(),
            last_event: Instant::now(),
            debounce,
        }
    }

    pub fn is_active(&self) -> bool {
        self.zone.is_active()
    }

    fn should_skip(&self, path: &Path) -> bool {
        if self.dropped.contains(path) {
            return true;
        }
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.components().any(|c| is_ignored(Path::new(c.as_os_str()))),
            Err(_) => is_ignored(path),
        }
    }

    pub fn observe(&mut self, event: &Event, now: Instant) {
        if let EventKind::Remove(_) = event.kind {
            for path in &event.paths {
                self.pending.remove(path);
            }
            if self.pending.is_empty() {
                self.zone.drag_leave();
            }
            return;
        }
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in &event.paths {
            if path.is_file() && !self.should_skip(path) {
                self.pending.insert(path.clone());
                self.zone.drag_enter();
            }
        }
        self.last_event = now;
    }

    /// Files ready to upload, once the debounce period has passed.
    pub fn take_ready(&mut self, now: Instant) -> Vec<UploadSource> {
        if self.pending.is_empty() || now.duration_since(self.last_event) < self.debounce {
            return Vec::new();
        }
        let paths: Vec<PathBuf> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        self.dropped.extend(paths.iter().cloned());
        self.zone.drop_paths(&paths)
    }
}

/// Watch `dir` and upload new files into `folder_id` until the watcher stops.
pub async fn watch_inbox(
    client: &ApiClient,
    dir: &Path,
    folder_id: Option<FolderId>,
    max_bytes: Option<u64>,
) -> anyhow::Result<()> {
    let (tx, rx) = channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;

    watcher.watch(dir, RecursiveMode::Recursive)?;

    let pipeline = UploadPipeline::new(client, folder_id).with_size_limit(max_bytes);
    let mut inbox = Inbox::new(dir, DEBOUNCE);
    println!("watching {}", dir.display());

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let was_active = inbox.is_active();
                inbox.observe(&event, Instant::now());
                if inbox.is_active() && !was_active {
                    tracing::debug!("Collecting files dropped into {}", dir.display());
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                let batch = inbox.take_ready(Instant::now());
                if batch.is_empty() {
                    continue;
                }
                let report = pipeline
                    .upload_batch(batch, |event| match event {
                        UploadEvent::Started { name, .. } => println!("  upload: {}", name),
                        UploadEvent::Failed { name, error } => eprintln!("  ! {}: {}", name, error),
                        UploadEvent::Succeeded { .. } => {}
                    })
                    .await;
                tracing::info!("{}", report.summary());
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}
