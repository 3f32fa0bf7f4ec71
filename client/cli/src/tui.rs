use crate::api::{ApiClient, ApiError, MediaStore};
use crate::config::Config;
use crate::editor::{CropRegion, EditorSession};
use crate::library::{validate_folder_name, AssetView, FetchOutcome, Snapshot, ViewMode};
use crate::model::{format_size, FileId, FolderId, MediaFile, NewFolder};
use crate::upload::{parse_dropped_text, resolve_dropped_paths, UploadEvent, UploadPipeline, UploadReport, UploadSource};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

const GRID_COLUMNS: usize = 3;
const GRID_CELL_WIDTH: usize = 26;

#[derive(Clone, PartialEq, Debug)]
enum Screen {
    Browse,
    Search,
    NewFolder(String),
    ConfirmDelete(Target),
    Editor,
    Crop(String),
    Finished,
}

#[derive(Clone, PartialEq, Debug)]
enum Target {
    File(FileId, String),
    Folder(FolderId, String),
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Pane {
    Folders,
    Files,
}

/// Work the event loop performs on behalf of a key press or message.
#[derive(Debug)]
enum Action {
    Refresh,
    Open(MediaFile),
    CreateFolder(NewFolder),
    Delete(Target),
    Upload(Vec<UploadSource>),
    SaveEdit,
}

/// Results coming back from spawned tasks.
enum Message {
    Listing {
        request_id: u64,
        result: Result<Snapshot, ApiError>,
    },
    Progress(String),
    Uploaded(UploadReport),
    /// A folder was created or something was deleted. Carries the status line.
    Mutated(Result<String, String>),
    Opened {
        request_id: u64,
        name: String,
        result: Result<Vec<u8>, ApiError>,
    },
}

struct App {
    screen: Screen,
    view: AssetView,
    pane: Pane,
    folder_index: usize,
    file_index: usize,
    search_input: String,
    editor: EditorSession,
    editing: Option<MediaFile>,
    open_request: u64,
    uploading: bool,
    status: Option<String>,
}

impl App {
    fn new(page_size: u32) -> Self {
        Self {
            screen: Screen::Browse,
            view: AssetView::new(page_size),
            pane: Pane::Folders,
            folder_index: 0,
            file_index: 0,
            search_input: String::new(),
            editor: EditorSession::new(),
            editing: None,
            open_request: 0,
            uploading: false,
            status: None,
        }
    }

    /// Reset the selection and ask for a re-fetch when the view changed.
    fn changed(&mut self, changed: bool) -> Option<Action> {
        if !changed {
            return None;
        }
        self.folder_index = 0;
        self.file_index = 0;
        Some(Action::Refresh)
    }

    fn clamp_selection(&mut self) {
        self.folder_index = self.folder_index.min(self.view.folders().len().saturating_sub(1));
        self.file_index = self.file_index.min(self.view.files().len().saturating_sub(1));
    }

    fn move_selection(&mut self, delta: isize) {
        let (index, len) = match self.pane {
            Pane::Folders => (&mut self.folder_index, self.view.folders().len()),
            Pane::Files => (&mut self.file_index, self.view.files().len()),
        };
        if len == 0 {
            return;
        }
        *index = index.saturating_add_signed(delta).min(len - 1);
    }

    fn selected_file(&self) -> Option<&MediaFile> {
        self.view.files().get(self.file_index)
    }

    fn open_selected(&mut self) -> Option<Action> {
        let file = self.selected_file()?.clone();
        if !file.is_image() {
            self.status = Some(format!("{} is not an image", file.original_filename));
            return None;
        }
        Some(Action::Open(file))
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match self.screen.clone() {
            Screen::Browse => self.browse_key(key),
            Screen::Search => self.search_key(key),
            Screen::NewFolder(name) => self.new_folder_key(key, name),
            Screen::ConfirmDelete(target) => {
                self.screen = Screen::Browse;
                match key.code {
                    KeyCode::Char('y') => Some(Action::Delete(target)),
                    _ => None,
                }
            }
            Screen::Editor => self.editor_key(key),
            Screen::Crop(input) => self.crop_key(key, input),
            Screen::Finished => None,
        }
    }

    fn browse_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.screen = Screen::Finished;
                None
            }
            KeyCode::Tab => {
                self.pane = match self.pane {
                    Pane::Folders => Pane::Files,
                    Pane::Files => Pane::Folders,
                };
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                None
            }
            KeyCode::Enter => match self.pane {
                Pane::Folders => {
                    let folder = self.view.folders().get(self.folder_index)?.clone();
                    let changed = self.view.state_mut().enter_folder(&folder);
                    self.changed(changed)
                }
                Pane::Files => self.open_selected(),
            },
            KeyCode::Backspace | KeyCode::Char('h') => {
                let changed = self.view.state_mut().exit_to_root();
                self.changed(changed)
            }
            KeyCode::Right | KeyCode::Char('n') => {
                let total_pages = self.view.total_pages();
                let changed = self.view.state_mut().next_page(total_pages);
                self.changed(changed)
            }
            KeyCode::Left | KeyCode::Char('p') => {
                let changed = self.view.state_mut().prev_page();
                self.changed(changed)
            }
            KeyCode::Char('t') => {
                let changed = self.view.state_mut().cycle_file_type();
                self.changed(changed)
            }
            KeyCode::Char('v') => {
                self.view.state_mut().toggle_view_mode();
                None
            }
            KeyCode::Char('/') => {
                self.search_input = self.view.state().search().to_string();
                self.screen = Screen::Search;
                None
            }
            KeyCode::Char('m') => {
                self.screen = Screen::NewFolder(String::new());
                None
            }
            KeyCode::Char('d') => {
                let target = match self.pane {
                    Pane::Folders => self
                        .view
                        .folders()
                        .get(self.folder_index)
                        .map(|f| Target::Folder(f.id, f.name.clone())),
                    Pane::Files => self
                        .selected_file()
                        .map(|f| Target::File(f.id, f.original_filename.clone())),
                }?;
                self.screen = Screen::ConfirmDelete(target);
                None
            }
            KeyCode::Char('e') => self.open_selected(),
            KeyCode::Char('r') => Some(Action::Refresh),
            _ => None,
        }
    }

    fn search_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Enter => {
                self.screen = Screen::Browse;
                None
            }
            KeyCode::Esc => {
                self.screen = Screen::Browse;
                self.search_input.clear();
                let changed = self.view.state_mut().set_search("");
                self.changed(changed)
            }
            KeyCode::Char(c) => {
                self.search_input.push(c);
                let changed = self.view.state_mut().set_search(&self.search_input);
                self.changed(changed)
            }
            KeyCode::Backspace => {
                self.search_input.pop();
                let changed = self.view.state_mut().set_search(&self.search_input);
                self.changed(changed)
            }
            _ => None,
        }
    }

    fn new_folder_key(&mut self, key: KeyEvent, mut name: String) -> Option<Action> {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Browse;
                None
            }
            KeyCode::Enter => {
                self.screen = Screen::Browse;
                match validate_folder_name(&name) {
                    Ok(name) => Some(Action::CreateFolder(NewFolder {
                        name,
                        parent_folder_id: self.view.state().folder_id(),
                    })),
                    Err(e) => {
                        self.status = Some(format!("could not create folder: {}", e));
                        None
                    }
                }
            }
            KeyCode::Char(c) => {
                name.push(c);
                self.screen = Screen::NewFolder(name);
                None
            }
            KeyCode::Backspace => {
                name.pop();
                self.screen = Screen::NewFolder(name);
                None
            }
            _ => None,
        }
    }

    fn editor_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.close_editor();
                None
            }
            KeyCode::Char('r') => {
                self.editor.rotate_quarter();
                None
            }
            KeyCode::Char('[') => {
                self.editor.nudge_rotation(-1.0);
                None
            }
            KeyCode::Char(']') => {
                self.editor.nudge_rotation(1.0);
                None
            }
            KeyCode::Char('-') => {
                self.editor.step_scale(-1);
                None
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.editor.step_scale(1);
                None
            }
            KeyCode::Char('0') => {
                self.editor.reset_scale();
                None
            }
            KeyCode::Char('x') => {
                let input = self
                    .editor
                    .crop()
                    .map(|c| format!("{},{},{},{}", c.x, c.y, c.width, c.height))
                    .unwrap_or_default();
                self.screen = Screen::Crop(input);
                None
            }
            KeyCode::Char('c') => {
                self.editor.clear_crop();
                None
            }
            KeyCode::Char('s') => Some(Action::SaveEdit),
            _ => None,
        }
    }

    /// Crop prompt, in pixels of the image as shown.
    fn crop_key(&mut self, key: KeyEvent, mut input: String) -> Option<Action> {
        match key.code {
            KeyCode::Esc => self.screen = Screen::Editor,
            KeyCode::Enter => {
                self.screen = Screen::Editor;
                let result = CropRegion::parse(&input)
                    .and_then(|crop| self.editor.set_crop(crop).map_err(|e| e.to_string()));
                self.status = match result {
                    Ok(()) => None,
                    Err(e) => Some(e),
                };
            }
            KeyCode::Char(c) => {
                input.push(c);
                self.screen = Screen::Crop(input);
            }
            KeyCode::Backspace => {
                input.pop();
                self.screen = Screen::Crop(input);
            }
            _ => {}
        }
        None
    }

    fn begin_open(&mut self, file: &MediaFile) -> u64 {
        self.open_request += 1;
        self.editing = Some(file.clone());
        self.status = Some(format!("opening {}...", file.original_filename));
        self.open_request
    }

    fn close_editor(&mut self) {
        self.editor.close();
        self.editing = None;
        self.screen = Screen::Browse;
    }

    /// Pasted text. In the browser this is the drop gesture.
    fn handle_paste(&mut self, text: &str) -> Option<Action> {
        match self.screen.clone() {
            Screen::Search => {
                self.search_input.push_str(text.trim());
                let changed = self.view.state_mut().set_search(&self.search_input);
                self.changed(changed)
            }
            Screen::NewFolder(mut name) => {
                name.push_str(text.trim());
                self.screen = Screen::NewFolder(name);
                None
            }
            Screen::Crop(mut input) => {
                input.push_str(text.trim());
                self.screen = Screen::Crop(input);
                None
            }
            Screen::Browse => {
                let sources = resolve_dropped_paths(&parse_dropped_text(text));
                if sources.is_empty() {
                    self.status = Some("nothing to upload".to_string());
                    return None;
                }
                Some(Action::Upload(sources))
            }
            _ => None,
        }
    }

    fn handle_message(&mut self, message: Message) -> Option<Action> {
        match message {
            Message::Listing { request_id, result } => {
                if self.view.complete_fetch(request_id, result) == FetchOutcome::Applied {
                    self.clamp_selection();
                }
                None
            }
            Message::Progress(line) => {
                self.status = Some(line);
                None
            }
            Message::Uploaded(report) => {
                self.uploading = false;
                let mut status = report.summary();
                for failure in &report.failed {
                    status.push_str(&format!("; {}: {}", failure.name, failure.error));
                }
                self.status = Some(status);
                Some(Action::Refresh)
            }
            Message::Mutated(result) => {
                let (status, action) = match result {
                    Ok(status) => (status, Some(Action::Refresh)),
                    Err(status) => (status, None),
                };
                self.status = Some(status);
                action
            }
            Message::Opened {
                request_id,
                name,
                result,
            } => {
                if request_id != self.open_request || self.editing.is_none() {
                    tracing::debug!(request_id, latest = self.open_request, "Discarding superseded open of {}", name);
                    return None;
                }
                match result.map_err(|e| e.to_string()).and_then(|bytes| {
                    self.editor.load_bytes(&bytes).map_err(|e| e.to_string())
                }) {
                    Ok(()) => {
                        self.screen = Screen::Editor;
                        self.status = None;
                    }
                    Err(e) => {
                        self.editing = None;
                        self.status = Some(format!("could not open {}: {}", name, e));
                    }
                }
                None
            }
        }
    }
}

pub async fn run_browser(config: &Config) -> anyhow::Result<()> {
    let client = Arc::new(ApiClient::from_config(config)?);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config.page_size());
    let result = run_app(&mut terminal, &mut app, client, config.max_upload_bytes()).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    client: Arc<ApiClient>,
    max_upload_bytes: Option<u64>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = Runner {
        client,
        tx,
        max_upload_bytes,
    };
    runner.execute(app, Action::Refresh);

    loop {
        terminal.draw(|f| ui(f, app))?;

        while let Ok(message) = rx.try_recv() {
            if let Some(action) = app.handle_message(message) {
                runner.execute(app, action);
            }
        }

        if app.screen == Screen::Finished {
            return Ok(());
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            let action = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Paste(text) => app.handle_paste(&text),
                _ => None,
            };
            if let Some(action) = action {
                runner.execute(app, action);
            }
        }
    }
}

struct Runner {
    client: Arc<ApiClient>,
    tx: mpsc::UnboundedSender<Message>,
    max_upload_bytes: Option<u64>,
}

impl Runner {
    fn execute(&self, app: &mut App, action: Action) {
        match action {
            Action::Refresh => {
                let ticket = app.view.begin_fetch();
                let client = self.client.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = ticket.fetch(&*client).await;
                    let _ = tx.send(Message::Listing {
                        request_id: ticket.id(),
                        result,
                    });
                });
            }
            Action::Open(file) => {
                let request_id = app.begin_open(&file);
                let client = self.client.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = client.download(&file).await;
                    let _ = tx.send(Message::Opened {
                        request_id,
                        name: file.original_filename,
                        result,
                    });
                });
            }
            Action::CreateFolder(folder) => {
                app.status = Some(format!("creating folder {}...", folder.name));
                self.spawn_mutation(move |client| async move {
                    match client.create_folder(&folder).await {
                        Ok(created) => {
                            tracing::info!(folder_id = %created.id, "Created folder {}", created.name);
                            Ok(format!("created folder {}", created.name))
                        }
                        Err(e) => Err(format!("could not create folder '{}': {}", folder.name, e)),
                    }
                });
            }
            Action::Delete(target) => {
                self.spawn_mutation(move |client| async move {
                    let (result, name) = match target {
                        Target::File(id, name) => (client.delete_file(id).await, name),
                        Target::Folder(id, name) => (client.delete_folder(id).await, name),
                    };
                    match result {
                        Ok(()) => Ok(format!("deleted {}", name)),
                        Err(e) => Err(format!("could not delete {}: {}", name, e)),
                    }
                });
            }
            Action::Upload(sources) => self.spawn_upload(app, sources),
            Action::SaveEdit => match app.editor.edit() {
                Ok(Some(encoded)) => {
                    app.close_editor();
                    self.spawn_upload(app, vec![UploadSource::Encoded(encoded)]);
                }
                Ok(None) => app.status = Some("nothing to save".to_string()),
                Err(e) => app.status = Some(format!("could not save edit: {}", e)),
            },
        }
    }

    fn spawn_mutation<F, Fut>(&self, mutate: F)
    where
        F: FnOnce(Arc<ApiClient>) -> Fut,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let task = mutate(self.client.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Message::Mutated(task.await));
        });
    }

    fn spawn_upload(&self, app: &mut App, sources: Vec<UploadSource>) {
        app.uploading = true;
        let folder_id = app.view.state().folder_id();
        let client = self.client.clone();
        let tx = self.tx.clone();
        let max_bytes = self.max_upload_bytes;
        tokio::spawn(async move {
            let pipeline = UploadPipeline::new(&*client, folder_id).with_size_limit(max_bytes);
            let report = pipeline
                .upload_batch(sources, |event| {
                    if let UploadEvent::Started { index, total, name } = event {
                        let _ = tx.send(Message::Progress(format!(
                            "uploading {}/{}: {}",
                            index + 1,
                            total,
                            name
                        )));
                    }
                })
                .await;
            let _ = tx.send(Message::Uploaded(report));
        });
    }
}

fn ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(2), Constraint::Min(0), Constraint::Length(2)])
        .split(area);

    f.render_widget(Paragraph::new(header_lines(app)), layout[0]);

    if matches!(app.screen, Screen::Editor | Screen::Crop(_)) {
        f.render_widget(
            Paragraph::new(editor_lines(app)).block(Block::default().borders(Borders::ALL).title("edit")),
            layout[1],
        );
    } else {
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(layout[1]);
        f.render_widget(
            Paragraph::new(folder_lines(app)).block(pane_block("folders", app.pane == Pane::Folders)),
            panes[0],
        );
        f.render_widget(
            Paragraph::new(file_lines(app)).block(pane_block("files", app.pane == Pane::Files)),
            panes[1],
        );
    }

    f.render_widget(Paragraph::new(footer_lines(app)), layout[2]);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Block::default().borders(Borders::ALL).title(Span::styled(title, style))
}

fn header_lines(app: &App) -> Vec<Line<'static>> {
    let state = app.view.state();
    let mut info = format!(
        "{}  type: {}  page {}/{}  {} files",
        if state.navigator().is_root() {
            "/ (all folders)".to_string()
        } else {
            state.navigator().location()
        },
        state.file_type().map(|t| t.as_str()).unwrap_or("all"),
        state.page(),
        app.view.total_pages().max(1),
        app.view.total()
    );
    if !state.search().is_empty() {
        info.push_str(&format!("  search: {}", state.search()));
    }
    if app.view.is_loading() {
        info.push_str("  loading...");
    }
    if app.uploading {
        info.push_str("  uploading...");
    }
    vec![
        Line::from(Span::styled("mediadesk", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(info),
    ]
}

fn marker(selected: bool) -> &'static str {
    if selected {
        "> "
    } else {
        "  "
    }
}

fn folder_lines(app: &App) -> Vec<Line<'static>> {
    if app.view.folders().is_empty() {
        return vec![Line::from("  no folders")];
    }
    app.view
        .folders()
        .iter()
        .enumerate()
        .map(|(i, folder)| {
            Line::from(format!(
                "{}{}  ({} files, {} folders)",
                marker(app.pane == Pane::Folders && i == app.folder_index),
                folder.name,
                folder.file_count,
                folder.subfolder_count
            ))
        })
        .collect()
}

fn file_lines(app: &App) -> Vec<Line<'static>> {
    let files = app.view.files();
    if files.is_empty() {
        return vec![Line::from("  no files")];
    }
    let selected = |i: usize| app.pane == Pane::Files && i == app.file_index;

    match app.view.state().view_mode() {
        ViewMode::List => files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let dims = file
                    .dimensions()
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .unwrap_or_default();
                Line::from(format!(
                    "{}{:>10}  {:<9} {:<10} {}",
                    marker(selected(i)),
                    format_size(file.file_size),
                    file.file_type.as_str(),
                    dims,
                    file.original_filename
                ))
            })
            .collect(),
        ViewMode::Grid => files
            .chunks(GRID_COLUMNS)
            .enumerate()
            .map(|(row, chunk)| {
                let cells: String = chunk
                    .iter()
                    .enumerate()
                    .map(|(col, file)| {
                        let name: String = file.original_filename.chars().take(GRID_CELL_WIDTH - 4).collect();
                        format!(
                            "{}{:<width$}",
                            marker(selected(row * GRID_COLUMNS + col)),
                            name,
                            width = GRID_CELL_WIDTH - 2
                        )
                    })
                    .collect();
                Line::from(cells)
            })
            .collect(),
    }
}

fn editor_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if let Some(file) = &app.editing {
        lines.push(Line::from(format!("* file: {}", file.original_filename)));
    }
    if let Some(source) = app.editor.source() {
        let (w, h) = source.natural_size();
        lines.push(Line::from(format!("* size: {}x{}", w, h)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(format!("  rotation: {}°", app.editor.rotation())));
    lines.push(Line::from(format!("  scale: {:.1}x", app.editor.scale())));
    if let Some(crop) = app.editor.crop() {
        lines.push(Line::from(format!(
            "  crop: {},{} {}x{}",
            crop.x, crop.y, crop.width, crop.height
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "[x] crop  [c] clear crop  [r] 90°  [ [ ] ] ±1°  [-/+] scale  [0] reset scale  [s] save  [esc] cancel",
    ));
    lines
}

fn footer_lines(app: &App) -> Vec<Line<'static>> {
    let prompt = match &app.screen {
        Screen::Search => format!("> search: {}_", app.search_input),
        Screen::NewFolder(name) => format!("> folder name: {}_", name),
        Screen::ConfirmDelete(Target::File(_, name)) | Screen::ConfirmDelete(Target::Folder(_, name)) => {
            format!("delete {}? [y/n]", name)
        }
        Screen::Crop(input) => format!("> crop x,y,width,height: {}_", input),
        Screen::Editor => String::new(),
        _ => "[enter] open  [h] root  [n/p] page  [t] type  [/] search  [v] view  [m] new folder  [d] delete  [e] edit  [r] refresh  [q] quit"
            .to_string(),
    };
    let status = app
        .status
        .clone()
        .or_else(|| app.view.last_error().map(|e| format!("! {}", e)))
        .unwrap_or_default();
    vec![Line::from(prompt), Line::from(status)]
}
