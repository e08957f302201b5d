use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use kbview_core::{Command, ViewAction};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    BeginSearch,
    /// Leaves the search field; the query and its highlights stay.
    SearchBlur,
    OpenResults,
    CloseOverlay,
    ResultsMoveSelection { delta: isize },
    ResultsActivateSelection,
    ScrollLines { delta: isize },
    Download,
    CloseDocument,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    Results,
}

/// Turns key events into session commands, keeping a numeric count prefix
/// and the search field's text between events.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Seeds the search field, e.g. with the active document's query.
    pub fn set_search_buffer(&mut self, query: &str) {
        self.search_buffer = query.to_string();
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(key) = event else {
            return UiEvent::None;
        };
        if key.kind == KeyEventKind::Release {
            return UiEvent::None;
        }
        match self.mode {
            InputMode::Normal => self.map_key_normal(key),
            InputMode::Search => self.map_key_search(key),
            InputMode::Results => self.map_key_results(key),
        }
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        let shortcut = modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER);
        match (code, modifiers) {
            (KeyCode::Char('f'), _) if shortcut => {
                self.reset_count();
                self.start_search();
                UiEvent::BeginSearch
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('/'), _) => {
                self.reset_count();
                self.start_search();
                UiEvent::BeginSearch
            }
            (KeyCode::Char('n'), KeyModifiers::NONE)
            | (KeyCode::Right, KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::NextMatch)
            }
            (KeyCode::Char('N'), _)
            | (KeyCode::Char('p'), KeyModifiers::NONE)
            | (KeyCode::Left, KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::PrevMatch)
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::PageDown, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::View(ViewAction::NextPage { count }))
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::View(ViewAction::PrevPage { count }))
            }
            (KeyCode::Char('J'), _) => UiEvent::ScrollLines {
                delta: self.take_count() as isize,
            },
            (KeyCode::Char('K'), _) => UiEvent::ScrollLines {
                delta: -(self.take_count() as isize),
            },
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.pending_count.take().unwrap_or(1);
                self.pending_digits.clear();
                UiEvent::Command(Command::View(ViewAction::GotoPage { page }))
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                let page = self.pending_count.take().unwrap_or(usize::MAX);
                self.pending_digits.clear();
                UiEvent::Command(Command::View(ViewAction::GotoPage { page }))
            }
            (KeyCode::Char('+'), _) => self.view(ViewAction::ZoomIn),
            (KeyCode::Char('-'), _) => self.view(ViewAction::ZoomOut),
            (KeyCode::Char('='), _) => self.view(ViewAction::FitWidth),
            (KeyCode::Char('L'), _) => self.view(ViewAction::LoadMoreRows),
            (KeyCode::Char(']'), _) => self.view(ViewAction::NextSheet),
            (KeyCode::Char('['), _) => self.view(ViewAction::PrevSheet),
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.reset_count();
                self.set_mode(InputMode::Results);
                UiEvent::OpenResults
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Download
            }
            (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::Command(Command::NextDocument)
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CloseDocument
            }
            (KeyCode::Esc, _) => {
                let had_count = self.pending_count.is_some();
                self.reset_count();
                if had_count {
                    UiEvent::None
                } else {
                    UiEvent::Command(Command::ClearQuery)
                }
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_search(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchBlur
            }
            (KeyCode::Enter, _) => {
                let query = self.search_buffer.clone();
                self.set_mode(InputMode::Normal);
                UiEvent::Command(Command::SubmitQuery { query })
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                self.query_changed()
            }
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.search_buffer.clear();
                self.query_changed()
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.search_buffer.push(c);
                self.query_changed()
            }
            _ => UiEvent::None,
        }
    }

    fn map_key_results(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('r'), _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::CloseOverlay
            }
            (KeyCode::Enter, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::ResultsActivateSelection
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::ResultsMoveSelection { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::ResultsMoveSelection { delta: -1 }
            }
            (KeyCode::PageDown, _) => UiEvent::ResultsMoveSelection { delta: 10 },
            (KeyCode::PageUp, _) => UiEvent::ResultsMoveSelection { delta: -10 },
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn view(&mut self, action: ViewAction) -> UiEvent {
        self.reset_count();
        UiEvent::Command(Command::View(action))
    }

    fn query_changed(&self) -> UiEvent {
        UiEvent::Command(Command::SetQuery {
            query: self.search_buffer.clone(),
        })
    }

    fn start_search(&mut self) {
        self.set_mode(InputMode::Search);
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_text(mapper: &mut EventMapper, text: &str) -> UiEvent {
        let mut last = UiEvent::None;
        for c in text.chars() {
            last = mapper.map_event(key_event(KeyCode::Char(c)));
        }
        last
    }

    #[test]
    fn numeric_prefix_applies_to_next_page() {
        let mut mapper = EventMapper::new();
        type_text(&mut mapper, "12");
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::View(ViewAction::NextPage { count })) => {
                assert_eq!(count, 12)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());

        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::View(ViewAction::PrevPage { count })) => {
                assert_eq!(count, 1)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn prefix_is_dropped_by_other_commands() {
        let mut mapper = EventMapper::new();
        type_text(&mut mapper, "4");
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(Command::View(ViewAction::ZoomIn))
        ));
        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::View(ViewAction::NextPage { count })) => {
                assert_eq!(count, 1)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn count_before_g_jumps_to_that_page() {
        let mut mapper = EventMapper::new();
        type_text(&mut mapper, "7");
        match mapper.map_event(key_event(KeyCode::Char('G'))) {
            UiEvent::Command(Command::View(ViewAction::GotoPage { page })) => assert_eq!(page, 7),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::End)) {
            UiEvent::Command(Command::View(ViewAction::GotoPage { page })) => {
                assert_eq!(page, usize::MAX)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Char('g'))) {
            UiEvent::Command(Command::View(ViewAction::GotoPage { page })) => assert_eq!(page, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn arrows_and_letters_move_the_match_cursor() {
        let mut mapper = EventMapper::new();
        for code in [KeyCode::Char('n'), KeyCode::Right, KeyCode::Down] {
            assert!(matches!(
                mapper.map_event(key_event(code)),
                UiEvent::Command(Command::NextMatch)
            ));
        }
        for code in [KeyCode::Char('p'), KeyCode::Left, KeyCode::Up] {
            assert!(matches!(
                mapper.map_event(key_event(code)),
                UiEvent::Command(Command::PrevMatch)
            ));
        }
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('N'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::PrevMatch)
        ));
    }

    #[test]
    fn ctrl_f_focuses_search_and_typing_debounces() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('f'),
                KeyModifiers::CONTROL
            )),
            UiEvent::BeginSearch
        ));
        assert_eq!(mapper.mode(), InputMode::Search);

        match type_text(&mut mapper, "rev") {
            UiEvent::Command(Command::SetQuery { ref query }) => assert_eq!(query, "rev"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.pending_input().as_deref(), Some("/rev"));

        match mapper.map_event(key_event(KeyCode::Backspace)) {
            UiEvent::Command(Command::SetQuery { ref query }) => assert_eq!(query, "re"),
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::Command(Command::SubmitQuery { ref query }) => assert_eq!(query, "re"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn search_field_keeps_text_across_focus() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));
        type_text(&mut mapper, "q3");
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::SearchBlur
        ));
        mapper.map_event(key_event(KeyCode::Char('/')));
        assert_eq!(mapper.pending_input().as_deref(), Some("/q3"));

        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('u'),
            KeyModifiers::CONTROL,
        )) {
            UiEvent::Command(Command::SetQuery { ref query }) => assert!(query.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn results_mode_maps_navigation_keys() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::OpenResults
        ));
        assert_eq!(mapper.mode(), InputMode::Results);

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::ResultsMoveSelection { delta } => assert_eq!(delta, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Up)) {
            UiEvent::ResultsMoveSelection { delta } => assert_eq!(delta, -1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::ResultsActivateSelection
        ));
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn fallback_actions_have_bindings() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('L'))),
            UiEvent::Command(Command::View(ViewAction::LoadMoreRows))
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(']'))),
            UiEvent::Command(Command::View(ViewAction::NextSheet))
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('s'))),
            UiEvent::Download
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Tab)),
            UiEvent::Command(Command::NextDocument)
        ));
    }

    #[test]
    fn escape_clears_count_before_query() {
        let mut mapper = EventMapper::new();
        type_text(&mut mapper, "3");
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::ClearQuery)
        ));
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert!(matches!(mapper.map_event(release), UiEvent::None));
    }
}
