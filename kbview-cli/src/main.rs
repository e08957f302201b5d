use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use kbview_core::download::default_download_dir;
use kbview_core::{
    document_id_for_source, CancellationFlag, Command, DocumentFetcher, DocumentFormat,
    DocumentId, DocumentSource, DocumentView, FileTokenStore, Hit, LoadProgress, PageSurface,
    PdfEngine, Session, SessionEvent, SpanStyle, StyledLine, TokenStore, ViewAction, ViewFrame,
    ViewerConfig,
};
use kbview_render::{mount, PdfiumEngine};
use kbview_tty::{
    combine_status, compose_page, compute_viewport_origin, crop_render_image, draw_lines,
    truncate_with_ellipsis, write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer,
    LineScroll, TextArea, UiEvent,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const NOTICE_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Parser)]
#[command(
    name = "kbview",
    version,
    about = "Terminal viewer for knowledge-base documents with in-document search"
)]
struct Args {
    /// Format tag (pdf, docx, doc, txt, xls, xlsx, ppt, pptx); inferred from the extension when omitted
    #[arg(short = 'f', long = "format")]
    format: Option<DocumentFormat>,

    /// Page to open PDF documents on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<u32>,

    /// Query searched once each document is ready
    #[arg(short = 'q', long = "query")]
    query: Option<String>,

    /// File holding the bearer token used for remote documents
    #[arg(long = "token-file")]
    token_file: Option<PathBuf>,

    /// Container width in pixels that PDF pages are fitted to
    #[arg(long = "container-width")]
    container_width: Option<f32>,

    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Directory downloads are saved into
    #[arg(long = "download-dir")]
    download_dir: Option<PathBuf>,

    /// URLs or paths of the documents to open
    #[arg(required = true)]
    sources: Vec<String>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("com", "kbview", "kbview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = ViewerConfig::load(&config_path)?;
    if let Some(width) = args.container_width {
        config.container_width = width;
    }
    if let Some(path) = &args.token_file {
        config.token_file = Some(path.clone());
    }
    info!(path = ?config_path, "configuration loaded");

    let token_path = config
        .token_file
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().join("token"));
    let token = match FileTokenStore::new(token_path).load() {
        Ok(token) => token,
        Err(err) => {
            warn!(?err, "failed to read token; continuing signed out");
            None
        }
    };
    let fetcher = DocumentFetcher::new(token)?;
    let engine = match PdfiumEngine::new(config.pdfium_library.as_deref()) {
        Ok(engine) => Some(engine),
        Err(err) => {
            warn!(?err, "pdfium unavailable; PDF documents will not render");
            None
        }
    };
    let download_dir = args
        .download_dir
        .clone()
        .or_else(default_download_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    crossterm::execute!(renderer.writer(), cursor::Hide)?;
    renderer.clear_all()?;

    let mut session = Session::new(&config);
    let mut app = App::new(download_dir);
    let mut queued_input = VecDeque::new();

    for raw in &args.sources {
        let source = match DocumentSource::new(raw, args.format) {
            Ok(source) => source
                .with_initial_page(args.page)
                .with_initial_query(args.query.clone()),
            Err(err) => {
                warn!(%err, %raw, "skipping source");
                app.notice = Some(Notice::new(format!("{raw}: {err}")));
                continue;
            }
        };
        let id = document_id_for_source(&source.location);
        let name = source.file_name();
        let cancel = CancellationFlag::new();
        let mounted = mount(
            &fetcher,
            engine.as_ref().map(|engine| engine as &dyn PdfEngine),
            &source,
            &config,
            &cancel,
            |progress| report_progress(&name, progress, &cancel, &mut queued_input),
        )
        .await;
        session.open(id, mounted.into_view());
    }
    if !session.tabs().is_empty() {
        session.apply(Command::SwitchDocument { index: 0 }, Instant::now())?;
    }

    let mut dirty = true;
    loop {
        if dirty {
            redraw(&mut renderer, &session, &mut app)?;
            dirty = false;
        }

        let next_event = match queued_input.pop_front() {
            Some(ev) => Some(ev),
            None if event::poll(POLL_INTERVAL)? => Some(event::read()?),
            None => None,
        };
        if let Some(ev) = next_event {
            if matches!(ev, Event::Resize(..)) {
                dirty = true;
                continue;
            }
            let ui_event = app.mapper.map_event(ev);
            match handle_event(ui_event, &mut session, &mut app)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {
                    let (cols, rows) = terminal::size()?;
                    let status = combine_status(
                        document_status(&session, &app),
                        app.mapper.pending_input().as_deref(),
                    );
                    if let Some(status) = status {
                        draw_status_line(renderer.writer(), &status, cols, rows)?;
                    }
                }
                LoopAction::Quit => break,
            }
        }

        let now = Instant::now();
        if session.tick(now) {
            dirty = true;
        }
        if drain_session_events(&session, &mut app) {
            dirty = true;
        }
        if app.expire_notice(now) {
            dirty = true;
        }
    }

    renderer.delete_image()?;
    renderer.clear_all()?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct Notice {
    message: String,
    shown_at: Instant,
}

impl Notice {
    fn new(message: String) -> Self {
        Self {
            message,
            shown_at: Instant::now(),
        }
    }
}

enum OverlayState {
    None,
    Results(ResultsWindow),
}

/// Terminal-side state that outlives a single redraw.
struct App {
    mapper: EventMapper,
    overlay: OverlayState,
    scrolls: HashMap<DocumentId, LineScroll>,
    notice: Option<Notice>,
    download_dir: PathBuf,
    text_rows: usize,
    text_height: usize,
}

impl App {
    fn new(download_dir: PathBuf) -> Self {
        Self {
            mapper: EventMapper::new(),
            overlay: OverlayState::None,
            scrolls: HashMap::new(),
            notice: None,
            download_dir,
            text_rows: 0,
            text_height: 1,
        }
    }

    fn close_overlay(&mut self) {
        self.overlay = OverlayState::None;
        self.mapper.set_mode(InputMode::Normal);
    }

    fn scroll_active(&mut self, session: &Session, delta: isize) {
        if let Some(tab) = session.active() {
            self.scrolls
                .entry(tab.id)
                .or_default()
                .scroll_by(delta, self.text_rows, self.text_height);
        }
    }

    fn expire_notice(&mut self, now: Instant) -> bool {
        let expired = self
            .notice
            .as_ref()
            .is_some_and(|notice| now.duration_since(notice.shown_at) >= NOTICE_TTL);
        if expired {
            self.notice = None;
        }
        expired
    }
}

struct ResultsWindow {
    query: String,
    hits: Vec<Hit>,
    selected: usize,
    scroll_offset: usize,
}

impl ResultsWindow {
    fn new(query: String, hits: Vec<Hit>, current: Option<usize>) -> Self {
        let selected = current
            .and_then(|index| hits.iter().position(|hit| hit.match_index == index))
            .unwrap_or(0);
        Self {
            query,
            hits,
            selected,
            scroll_offset: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    fn selected_hit(&self) -> Option<&Hit> {
        self.hits.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.hits.is_empty() {
            return false;
        }
        let len = self.hits.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.hits.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.hits.len().saturating_sub(viewport_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + viewport_height {
            self.scroll_offset = self.selected + 1 - viewport_height;
        }
    }
}

fn handle_event(event: UiEvent, session: &mut Session, app: &mut App) -> Result<LoopAction> {
    let now = Instant::now();
    match event {
        UiEvent::Command(Command::View(action)) if active_is_lines(session) => {
            let height = app.text_height as isize;
            let everything = app.text_rows as isize;
            let delta = match action {
                ViewAction::NextPage { count } => Some(count as isize * height),
                ViewAction::PrevPage { count } => Some(-(count as isize) * height),
                ViewAction::GotoPage { page } if page <= 1 => Some(-everything),
                ViewAction::GotoPage { .. } => Some(everything),
                _ => None,
            };
            match delta {
                Some(delta) => app.scroll_active(session, delta),
                None => session.apply(Command::View(action), now)?,
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Command(cmd) => {
            let resets_overlay = matches!(
                cmd,
                Command::CloseDocument { .. }
                    | Command::SwitchDocument { .. }
                    | Command::NextDocument
            );
            session.apply(cmd, now)?;
            if resets_overlay {
                app.close_overlay();
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::BeginSearch => {
            let query = session
                .active()
                .map(|tab| tab.view.query().to_string())
                .unwrap_or_default();
            app.mapper.set_search_buffer(&query);
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::SearchBlur => Ok(LoopAction::ContinueRedraw),
        UiEvent::OpenResults => match session.active() {
            Some(tab) => {
                app.overlay = OverlayState::Results(ResultsWindow::new(
                    tab.view.query().to_string(),
                    tab.view.hits().to_vec(),
                    tab.view.match_status().current,
                ));
                Ok(LoopAction::ContinueRedraw)
            }
            None => {
                app.mapper.set_mode(InputMode::Normal);
                Ok(LoopAction::Continue)
            }
        },
        UiEvent::CloseOverlay => {
            app.close_overlay();
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::ResultsMoveSelection { delta } => {
            if let OverlayState::Results(window) = &mut app.overlay {
                if window.move_selection(delta) {
                    return Ok(LoopAction::ContinueRedraw);
                }
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ResultsActivateSelection => {
            let selected = match &app.overlay {
                OverlayState::Results(window) => window.selected_hit().map(|hit| hit.match_index),
                OverlayState::None => None,
            };
            app.close_overlay();
            if let Some(index) = selected {
                session.apply(Command::View(ViewAction::SelectHit { index }), now)?;
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::ScrollLines { delta } => {
            app.scroll_active(session, delta);
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Download => {
            session.apply(
                Command::Download {
                    dir: app.download_dir.clone(),
                },
                now,
            )?;
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::CloseDocument => {
            let index = session.active_index();
            session.apply(Command::CloseDocument { index }, now)?;
            app.close_overlay();
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

fn active_is_lines(session: &Session) -> bool {
    session
        .active()
        .is_some_and(|tab| matches!(tab.view.frame(), ViewFrame::Lines { .. }))
}

fn drain_session_events(session: &Session, app: &mut App) -> bool {
    let events = std::mem::take(&mut *session.events().lock());
    let mut redraw = false;
    for event in events {
        match event {
            SessionEvent::Downloaded { path, .. } => {
                app.notice = Some(Notice::new(format!("Saved {}", path.display())));
            }
            SessionEvent::Notice(message) => app.notice = Some(Notice::new(message)),
            SessionEvent::DocumentClosed(id) => {
                app.scrolls.remove(&id);
            }
            SessionEvent::SearchCompleted { id, status } => {
                debug!(%id, ?status, "search completed");
            }
            SessionEvent::DocumentOpened(_)
            | SessionEvent::ActiveDocumentChanged(_)
            | SessionEvent::RedrawNeeded(_) => {}
        }
        redraw = true;
    }
    redraw
}

fn report_progress(
    name: &str,
    progress: LoadProgress,
    cancel: &CancellationFlag,
    queued_input: &mut VecDeque<Event>,
) {
    if cancel_requested(queued_input) {
        cancel.cancel();
    }
    let label = if progress.total == 0 {
        format!("Loading {name}... (Esc cancels)")
    } else {
        format!(
            "Rendering {name}: page {}/{} (Esc cancels)",
            progress.current, progress.total
        )
    };
    let drawn = terminal::size()
        .map_err(anyhow::Error::from)
        .and_then(|(cols, rows)| draw_status_line(&mut io::stdout(), &label, cols, rows));
    if let Err(err) = drawn {
        debug!(?err, "progress line not drawn");
    }
}

/// Drains terminal input during a load. Esc cancels; everything else is
/// kept for the event loop.
fn cancel_requested(queued_input: &mut VecDeque<Event>) -> bool {
    while matches!(event::poll(Duration::ZERO), Ok(true)) {
        match event::read() {
            Ok(ev) => {
                if route_load_input(ev, queued_input) {
                    return true;
                }
            }
            Err(_) => return false,
        }
    }
    false
}

fn route_load_input(ev: Event, queued_input: &mut VecDeque<Event>) -> bool {
    match ev {
        Event::Key(key) if key.code == KeyCode::Esc => key.kind != KeyEventKind::Release,
        other => {
            queued_input.push_back(other);
            false
        }
    }
}

struct Layout {
    top: u16,
    cols: u16,
    rows: u16,
    total_rows: u16,
    cell: Option<(f32, f32)>,
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    app: &mut App,
) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = window.columns.max(1);
    let total_rows = window.rows.max(1);
    let cell = (window.width > 0 && window.height > 0).then(|| {
        (
            f32::from(window.width) / f32::from(total_cols),
            f32::from(window.height) / f32::from(total_rows),
        )
    });
    let layout = Layout {
        top: 1,
        cols: total_cols,
        rows: total_rows.saturating_sub(2).max(1),
        total_rows,
        cell,
    };

    renderer.begin_sync_update()?;
    renderer.delete_image()?;
    crossterm::queue!(renderer.writer(), Clear(ClearType::All))?;
    draw_tab_bar(renderer.writer(), session, total_cols)?;

    match session.active() {
        Some(tab) => match tab.view.frame() {
            ViewFrame::Page { surface, .. } => draw_page(renderer, surface, &layout)?,
            ViewFrame::Lines { lines, focus } => {
                let scroll = app.scrolls.entry(tab.id).or_default();
                let area = TextArea {
                    col: 0,
                    row: layout.top,
                    width: layout.cols,
                    height: layout.rows,
                };
                app.text_rows = draw_lines(renderer.writer(), &lines, focus, scroll, area)?;
                app.text_height = usize::from(layout.rows);
            }
            ViewFrame::Message { title, body } => {
                draw_message(renderer.writer(), &title, &body, &layout)?
            }
        },
        None => draw_message(
            renderer.writer(),
            "kbview",
            "No open documents. Press q to quit.",
            &layout,
        )?,
    }

    if let OverlayState::Results(window) = &mut app.overlay {
        draw_results_overlay(renderer.writer(), window, &layout)?;
    }

    let status = combine_status(
        document_status(session, app),
        app.mapper.pending_input().as_deref(),
    );
    if let Some(status) = status {
        draw_status_line(renderer.writer(), &status, layout.cols, layout.total_rows)?;
    }
    renderer.end_sync_update()?;
    Ok(())
}

fn draw_tab_bar(writer: &mut impl Write, session: &Session, cols: u16) -> Result<()> {
    crossterm::queue!(writer, cursor::MoveTo(0, 0))?;
    let mut used = 0usize;
    for (index, tab) in session.tabs().iter().enumerate() {
        let marker = if tab.view.error().is_some() { "!" } else { "" };
        let label = format!(" {}:{}{} ", index + 1, tab.view.title(), marker);
        let width = label.chars().count();
        if used + width > usize::from(cols) {
            break;
        }
        if index == session.active_index() {
            crossterm::queue!(
                writer,
                SetAttribute(Attribute::Reverse),
                Print(&label),
                SetAttribute(Attribute::Reset)
            )?;
        } else {
            crossterm::queue!(writer, Print(&label))?;
        }
        used += width;
    }
    Ok(())
}

/// Draws a composited page; zoomed pages are cropped around the current match.
fn draw_page(
    renderer: &mut KittyRenderer<io::Stdout>,
    surface: &PageSurface,
    layout: &Layout,
) -> Result<()> {
    let mut image = compose_page(surface);
    let zoom = surface.display_ratio();
    let available_cols = u32::from(layout.cols.saturating_sub(2).max(1));
    let available_rows = u32::from(layout.rows);

    if zoom > 1.0 && image.width > 0 && image.height > 0 {
        let crop_width = ((image.width as f32 / zoom).round() as u32).clamp(1, image.width);
        let crop_height = ((image.height as f32 / zoom).round() as u32).clamp(1, image.height);
        let (fraction_x, fraction_y) =
            focus_fraction(surface, image.width, image.height, crop_width, crop_height);
        let origin_x = compute_viewport_origin(image.width, crop_width, fraction_x);
        let origin_y = compute_viewport_origin(image.height, crop_height, fraction_y);
        image = crop_render_image(&image, origin_x, origin_y, crop_width, crop_height);
    }

    let (draw_cols, draw_rows) = shrink_for_zoom(
        compute_scaled_dimensions(
            image.width as f32 * zoom.max(1.0),
            image.height as f32 * zoom.max(1.0),
            available_cols,
            available_rows,
            layout.cell,
        ),
        zoom,
    );
    let start_col = (u32::from(layout.cols).saturating_sub(draw_cols)) / 2;
    let start_row = u32::from(layout.top) + (available_rows.saturating_sub(draw_rows)) / 2;
    crossterm::queue!(
        renderer.writer(),
        cursor::MoveTo(start_col as u16, start_row as u16)
    )?;
    renderer.draw(&image, DrawParams::clamped(draw_cols, draw_rows))
}

/// Crop position that centers the current match, or the top of the page.
fn focus_fraction(
    surface: &PageSurface,
    width: u32,
    height: u32,
    crop_width: u32,
    crop_height: u32,
) -> (f32, f32) {
    let Some(current) = surface.overlay().iter().find(|rect| rect.is_current) else {
        return (0.5, 0.0);
    };
    let center_x = current.rect.x + current.rect.width / 2.0;
    let center_y = current.rect.y + current.rect.height / 2.0;
    (
        centered_fraction(center_x, width, crop_width),
        centered_fraction(center_y, height, crop_height),
    )
}

fn centered_fraction(center: f32, total: u32, window: u32) -> f32 {
    if window >= total {
        return 0.0;
    }
    ((center - window as f32 / 2.0) / (total - window) as f32).clamp(0.0, 1.0)
}

/// Cells needed to show a `width` x `height` pixel image at the largest size
/// that fits the available area without distorting it.
fn compute_scaled_dimensions(
    width: f32,
    height: f32,
    available_cols: u32,
    available_rows: u32,
    cell: Option<(f32, f32)>,
) -> (u32, u32) {
    let available_cols = available_cols.max(1);
    let available_rows = available_rows.max(1);
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return (available_cols, available_rows);
    }
    // Terminals that do not report pixel sizes get the common 1:2 cell shape.
    let (cell_width, cell_height) = cell
        .filter(|(w, h)| *w > 0.0 && *h > 0.0)
        .unwrap_or((1.0, 2.0));
    let scale = (available_cols as f32 * cell_width / width)
        .min(available_rows as f32 * cell_height / height);
    let cols = (width * scale / cell_width)
        .round()
        .clamp(1.0, available_cols as f32);
    let rows = (height * scale / cell_height)
        .round()
        .clamp(1.0, available_rows as f32);
    (cols as u32, rows as u32)
}

/// Zooming out below the fitted size draws the page into proportionally
/// fewer cells.
fn shrink_for_zoom((cols, rows): (u32, u32), zoom: f32) -> (u32, u32) {
    if !zoom.is_finite() || zoom <= 0.0 || zoom >= 1.0 {
        return (cols, rows);
    }
    let shrink = |cells: u32| ((cells as f32 * zoom).round() as u32).clamp(1, cells.max(1));
    (shrink(cols), shrink(rows))
}

fn draw_message(writer: &mut impl Write, title: &str, body: &str, layout: &Layout) -> Result<()> {
    let mut lines = vec![
        StyledLine::styled(title, SpanStyle::Heading),
        StyledLine::default(),
    ];
    lines.extend(body.lines().map(StyledLine::plain));
    let area = TextArea {
        col: 2,
        row: layout.top.saturating_add(1),
        width: layout.cols.saturating_sub(4).max(1),
        height: layout.rows.saturating_sub(1).max(1),
    };
    draw_lines(writer, &lines, None, &mut LineScroll::new(), area)?;
    Ok(())
}

fn draw_results_overlay(
    writer: &mut impl Write,
    window: &mut ResultsWindow,
    layout: &Layout,
) -> Result<()> {
    const EMPTY_MESSAGE: &str = "No results";

    let total_cols = u32::from(layout.cols);
    let rows_available = u32::from(layout.rows);
    if total_cols < 24 || rows_available < 6 {
        return Ok(());
    }

    let inner_width = (total_cols.saturating_sub(6) as usize).min(100);
    let max_content_height = rows_available.saturating_sub(6) as usize;
    if max_content_height == 0 {
        return Ok(());
    }
    let total_entries = window.hits.len().max(1);
    let content_height = total_entries.min(max_content_height);
    window.ensure_visible(content_height);

    let window_height = (content_height + 4) as u32;
    let window_width = (inner_width + 2) as u32;
    let start_col = (total_cols.saturating_sub(window_width) / 2) as u16;
    let mut row =
        (u32::from(layout.top) + rows_available.saturating_sub(window_height) / 2) as u16;

    let border = format!("+{}+", "-".repeat(inner_width));
    let title = format!("Results for /{} ({})", window.query, window.hits.len());
    print_inverted(writer, start_col, row, &border)?;
    row = row.saturating_add(1);
    let title_line = format!("|{}|", truncate_with_ellipsis(&format!(" {title}"), inner_width));
    print_inverted(writer, start_col, row, &title_line)?;
    row = row.saturating_add(1);
    print_inverted(writer, start_col, row, &border)?;
    row = row.saturating_add(1);

    if window.is_empty() {
        let content = truncate_with_ellipsis(&format!("  {EMPTY_MESSAGE}"), inner_width);
        let line = format!("|{content}|");
        print_inverted(writer, start_col, row, &line)?;
        row = row.saturating_add(1);
    } else {
        let end = (window.scroll_offset + content_height).min(window.hits.len());
        for index in window.scroll_offset..end {
            let selected = index == window.selected;
            let content = format_result_line(&window.hits[index], selected, inner_width);
            print_inverted(writer, start_col, row, &format!("|{content}|"))?;
            row = row.saturating_add(1);
        }
    }
    print_inverted(writer, start_col, row, &border)?;
    Ok(())
}

fn format_result_line(hit: &Hit, selected: bool, inner_width: usize) -> String {
    let marker = if selected { '>' } else { ' ' };
    let snippet = hit.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_ellipsis(
        &format!("{marker} p{:<4} {snippet}", hit.page_number),
        inner_width,
    )
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn draw_status_line(writer: &mut impl Write, status: &str, cols: u16, rows: u16) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        Clear(ClearType::CurrentLine)
    )?;
    let line = truncate_with_ellipsis(status, usize::from(cols.saturating_sub(1)));
    write_status_line(writer, line.trim_end())?;
    Ok(())
}

fn document_status(session: &Session, app: &App) -> Option<String> {
    let mut status = session
        .active()
        .map(|tab| format_document_status(tab.view.as_ref()));
    if let Some(notice) = &app.notice {
        status = Some(match status {
            Some(base) => format!("{base} · {}", notice.message),
            None => notice.message.clone(),
        });
    }
    status
}

fn format_document_status(view: &dyn DocumentView) -> String {
    let mut status = view.title().to_string();
    let location = view.location_label();
    if !location.is_empty() {
        status.push_str(" · ");
        status.push_str(&location);
    }
    let query = view.query();
    if !query.trim().is_empty() {
        let matches = view.match_status();
        status.push_str(" · /");
        status.push_str(query);
        match matches.current {
            Some(index) if matches.total > 0 => {
                status.push_str(&format!(" ({}/{})", index + 1, matches.total))
            }
            _ => status.push_str(" (no matches)"),
        }
    }
    status
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "kbview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout belongs to the renderer, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
