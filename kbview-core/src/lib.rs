pub mod config;
pub mod debounce;
pub mod document;
pub mod download;
pub mod format;
pub mod geometry;
pub mod loader;
pub mod navigator;
pub mod search;
pub mod source;
pub mod surface;
pub mod view;
pub mod viewer;
pub mod zoom;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

pub use config::{ConfigError, ViewerConfig};
pub use document::{PdfDocumentHandle, PdfEngine};
pub use format::{DocumentFormat, FormatFamily, UnsupportedFormat};
pub use geometry::{CoordinateMapper, MappedRect, PageSize, PixelRect, TextRun, Transform, Viewport};
pub use loader::{CancellationFlag, LoadError, LoadProgress, LoadState, LoadedDocument, PageRenderer};
pub use navigator::{MatchNavigator, MatchStatus};
pub use search::{Highlight, Hit, SearchEngine, SearchResult, SearchTicket, SearchTickets};
pub use source::{
    ByteSource, DocumentFetcher, DocumentSource, FetchError, FileTokenStore, MemoryTokenStore,
    SourceLocation, TokenStore,
};
pub use surface::{OverlayRect, PageSurface, PageSurfaces, RenderImage};
pub use view::{DocumentView, SpanStyle, StyledLine, StyledSpan, ViewAction, ViewError, ViewFrame};
pub use viewer::PdfViewer;
pub use zoom::ZoomController;

use debounce::Debouncer;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::from_bytes([
        0x3f, 0x1d, 0x8a, 0x52, 0x6c, 0x0b, 0x5e, 0x47, 0x9a, 0x2e, 0x71, 0xc4, 0x05, 0xd8, 0xb3,
        0x6f,
    ])
});

/// Stable id for a document source; local paths are canonicalized first.
pub fn document_id_for_source(location: &SourceLocation) -> DocumentId {
    let rendered = match location {
        SourceLocation::Remote(url) => url.to_string(),
        SourceLocation::Local(path) => {
            let resolved = path
                .canonicalize()
                .or_else(|_| {
                    if path.is_absolute() {
                        Ok(path.to_path_buf())
                    } else {
                        std::env::current_dir().map(|cwd| cwd.join(path))
                    }
                })
                .unwrap_or_else(|_| path.to_path_buf());
            resolved.to_string_lossy().into_owned()
        }
    };
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Search-field keystroke; debounced before it reaches the view.
    SetQuery { query: String },
    /// Immediate search, e.g. on Enter.
    SubmitQuery { query: String },
    ClearQuery,
    NextMatch,
    PrevMatch,
    View(ViewAction),
    Download { dir: PathBuf },
    SwitchDocument { index: usize },
    NextDocument,
    CloseDocument { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    ActiveDocumentChanged(DocumentId),
    RedrawNeeded(DocumentId),
    SearchCompleted { id: DocumentId, status: MatchStatus },
    Downloaded { id: DocumentId, path: PathBuf },
    Notice(String),
}

pub struct Tab {
    pub id: DocumentId,
    pub view: Box<dyn DocumentView>,
}

struct PendingQuery {
    ticket: SearchTicket,
    id: DocumentId,
    query: String,
}

/// Open documents, the active tab and the debounced search input.
pub struct Session {
    tabs: Vec<Tab>,
    active: usize,
    events: Arc<Mutex<Vec<SessionEvent>>>,
    pending: Debouncer<PendingQuery>,
    tickets: SearchTickets,
}

impl Session {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            tabs: Vec::new(),
            active: 0,
            events: Arc::new(Mutex::new(Vec::new())),
            pending: Debouncer::new(config.search_debounce),
            tickets: SearchTickets::default(),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&Tab> {
        self.tabs.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.active)
    }

    pub fn search_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// Adds a mounted document and makes it active.
    pub fn open(&mut self, id: DocumentId, view: Box<dyn DocumentView>) {
        if let Some(message) = view.error() {
            warn!(%id, title = view.title(), %message, "document opened in error state");
        }
        self.tabs.push(Tab { id, view });
        self.active = self.tabs.len() - 1;
        let mut events = self.events.lock();
        events.push(SessionEvent::DocumentOpened(id));
        events.push(SessionEvent::ActiveDocumentChanged(id));
    }

    #[instrument(skip(self), level = "debug")]
    pub fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        match command {
            Command::SetQuery { query } => {
                if let Some(tab) = self.tabs.get(self.active) {
                    let ticket = self.tickets.issue();
                    let id = tab.id;
                    self.pending.schedule(PendingQuery { ticket, id, query }, now);
                }
            }
            Command::SubmitQuery { query } => {
                let ticket = self.tickets.issue();
                self.run_query(ticket, None, &query);
            }
            Command::ClearQuery => {
                let ticket = self.tickets.issue();
                self.pending.cancel();
                self.run_query(ticket, None, "");
            }
            Command::NextMatch => {
                if let Some(tab) = self.tabs.get_mut(self.active) {
                    let status = tab.view.next_match();
                    let id = tab.id;
                    self.push_search_event(id, status);
                }
            }
            Command::PrevMatch => {
                if let Some(tab) = self.tabs.get_mut(self.active) {
                    let status = tab.view.prev_match();
                    let id = tab.id;
                    self.push_search_event(id, status);
                }
            }
            Command::View(action) => {
                if let Some(tab) = self.tabs.get_mut(self.active) {
                    if tab.view.handle(action, now) {
                        self.events.lock().push(SessionEvent::RedrawNeeded(tab.id));
                    }
                }
            }
            Command::Download { dir } => {
                if let Some(tab) = self.tabs.get(self.active) {
                    let event = match tab.view.source_bytes() {
                        Some(bytes) => match download::save_download(&dir, tab.view.title(), bytes) {
                            Ok(path) => SessionEvent::Downloaded { id: tab.id, path },
                            Err(err) => {
                                warn!(?err, "download failed");
                                SessionEvent::Notice(format!("Download failed: {err:#}"))
                            }
                        },
                        None => SessionEvent::Notice("Nothing to download yet".to_string()),
                    };
                    self.events.lock().push(event);
                }
            }
            Command::SwitchDocument { index } => {
                if index < self.tabs.len() {
                    self.active = index;
                    let id = self.tabs[index].id;
                    self.events
                        .lock()
                        .push(SessionEvent::ActiveDocumentChanged(id));
                }
            }
            Command::NextDocument => {
                if !self.tabs.is_empty() {
                    let index = (self.active + 1) % self.tabs.len();
                    return self.apply(Command::SwitchDocument { index }, now);
                }
            }
            Command::CloseDocument { index } => {
                if index >= self.tabs.len() {
                    return Ok(());
                }
                let tab = self.tabs.remove(index);
                self.events
                    .lock()
                    .push(SessionEvent::DocumentClosed(tab.id));
                if self.tabs.is_empty() {
                    self.active = 0;
                } else {
                    if index < self.active || self.active >= self.tabs.len() {
                        self.active = self.active.saturating_sub(1).min(self.tabs.len() - 1);
                    }
                    let id = self.tabs[self.active].id;
                    self.events
                        .lock()
                        .push(SessionEvent::ActiveDocumentChanged(id));
                }
            }
        }
        Ok(())
    }

    /// Fires a due debounced search and drives per-view timers.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if let Some(pending) = self.pending.take_due(now) {
            changed |= self.run_query(pending.ticket, Some(pending.id), &pending.query);
        }
        for tab in &mut self.tabs {
            if tab.view.tick(now) {
                self.events.lock().push(SessionEvent::RedrawNeeded(tab.id));
                changed = true;
            }
        }
        changed
    }

    fn run_query(&mut self, ticket: SearchTicket, target: Option<DocumentId>, query: &str) -> bool {
        if !self.tickets.is_current(ticket) {
            tracing::debug!(?ticket, query, "stale search discarded");
            return false;
        }
        let index = match target {
            Some(id) => self.tabs.iter().position(|tab| tab.id == id),
            None => (self.active < self.tabs.len()).then_some(self.active),
        };
        let Some(tab) = index.and_then(|index| self.tabs.get_mut(index)) else {
            return false;
        };
        let status = tab.view.search(query);
        let id = tab.id;
        self.push_search_event(id, status);
        true
    }

    fn push_search_event(&self, id: DocumentId, status: MatchStatus) {
        let mut events = self.events.lock();
        events.push(SessionEvent::SearchCompleted { id, status });
        events.push(SessionEvent::RedrawNeeded(id));
    }
}
