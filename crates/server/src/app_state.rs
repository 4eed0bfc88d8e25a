use std::sync::Arc;

use analysis::AnalysisSession;
use predictor::Predictor;
use shared::protocol::{SessionEvent, UploadProgress, UploadSummary};
use tokio::sync::{broadcast, watch, Mutex};

const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) session: Arc<Mutex<AnalysisSession>>,
    pub(crate) predictor: Arc<dyn Predictor>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl AppState {
    pub(crate) fn new(session: AnalysisSession, predictor: Arc<dyn Predictor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        forward_upload_changes(session.uploads().subscribe(), events.clone());
        Self {
            session: Arc::new(Mutex::new(session)),
            predictor,
            events,
        }
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Relays every upload-set change onto the session event stream. Ends when
/// the session (and with it the watch sender) is dropped.
fn forward_upload_changes(
    mut changes: watch::Receiver<Vec<UploadSummary>>,
    events: broadcast::Sender<SessionEvent>,
) {
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let files = changes.borrow_and_update().clone();
            let progress = UploadProgress::from_count(files.len());
            let _ = events.send(SessionEvent::UploadsChanged { files, progress });
        }
    });
}
