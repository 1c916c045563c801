use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::DashConfig;
use crate::dispatcher::{ActionState, Completion, Dispatcher, Phase, RegionContent, binding_for};
use crate::domain::{DashError, Message};
use crate::inputter::{EditEnd, EditState, Inputter};
use crate::router::{ControlId, FilterControl, RegionId, Tab, TabLayout, TriggerId, layout_for};
use crate::table::{Cell, RenderedTable};
use crate::ui::table_reserved_height;

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modus {
    BROWSE,
    INPUT,
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    tab: Tab,
    layout: Option<TabLayout>,
    values: HashMap<ControlId, String>,
    clicks: HashMap<TriggerId, u64>,
    regions: HashMap<RegionId, RegionContent>,
    filter_error: Option<String>,
    dispatcher: Dispatcher,
    input: Inputter,
    last_input: EditState,
    editing: Option<ControlId>,
    clipboard: Option<Clipboard>,
    selected_row: usize,
    offset_row: usize,
    ui_height: usize,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &DashConfig, dispatcher: Dispatcher, ui_height: usize) -> Self {
        let clipboard = match Clipboard::new() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Clipboard not available: {e}");
                None
            }
        };
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::BROWSE,
            tab: Tab::Home,
            layout: None,
            values: HashMap::new(),
            clicks: HashMap::new(),
            regions: HashMap::new(),
            filter_error: None,
            dispatcher,
            input: Inputter::default(),
            last_input: EditState::default(),
            editing: None,
            clipboard,
            selected_row: 0,
            offset_row: 0,
            ui_height,
            status_message: "Started jobdash!".to_string(),
            last_status_message_update: Instant::now(),
        };
        model.show_tab(config.start_tab);
        model
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DashError> {
        let Some(msg) = message else {
            return Ok(());
        };
        match (self.modus, msg) {
            (_, Message::Completed(completion)) => self.apply(completion),
            (_, Message::Resize(height)) => self.ui_resize(height),
            (Modus::INPUT, Message::RawKey(key)) => self.raw_input(key),
            (Modus::INPUT, _) => (),
            (Modus::BROWSE, msg) => match msg {
                Message::Quit => self.quit(),
                Message::NextTab => self.select_tab(self.tab.next()),
                Message::PrevTab => self.select_tab(self.tab.prev()),
                Message::SelectTab(tab) => self.select_tab(tab),
                Message::NextOption => self.cycle_option(1),
                Message::PrevOption => self.cycle_option(-1),
                Message::EditFilter => self.enter_input_mode(),
                Message::Submit => self.submit(),
                Message::Cancel => self.cancel(),
                Message::MoveUp => self.move_selection_up(1),
                Message::MoveDown => self.move_selection_down(1),
                Message::MovePageUp => self.move_selection_up(self.page_height()),
                Message::MovePageDown => self.move_selection_down(self.page_height()),
                Message::CopyLink => self.copy_selected_row(),
                _ => (),
            },
        }
        Ok(())
    }

    // ------------------------------ Accessors ------------------------------ //

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn layout(&self) -> Option<&TabLayout> {
        self.layout.as_ref()
    }

    pub fn region(&self, id: RegionId) -> &RegionContent {
        static EMPTY: RegionContent = RegionContent::Empty;
        self.regions.get(&id).unwrap_or(&EMPTY)
    }

    pub fn value(&self, control: ControlId) -> &str {
        self.values.get(&control).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn filter_error(&self) -> Option<&str> {
        self.filter_error.as_deref()
    }

    pub fn editing(&self) -> Option<(ControlId, &EditState)> {
        self.editing.map(|c| (c, &self.last_input))
    }

    pub fn phase(&self) -> Phase {
        self.dispatcher.phase(self.tab)
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::INPUT
    }

    pub fn selected_row(&self) -> usize {
        self.selected_row
    }

    pub fn offset_row(&self) -> usize {
        self.offset_row
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    // --------------------------- Tab handling ------------------------------ //

    fn select_tab(&mut self, tab: Tab) {
        if tab == self.tab {
            return;
        }
        self.dispatcher.reset(self.tab);
        self.show_tab(tab);
    }

    // The layout comes back fresh: default filter values and empty regions.
    fn show_tab(&mut self, tab: Tab) {
        trace!("Showing tab {}", tab.id());
        self.tab = tab;
        self.layout = layout_for(tab);
        self.regions.clear();
        self.values.clear();
        self.filter_error = None;
        self.selected_row = 0;
        self.offset_row = 0;
        if let Some(layout) = &self.layout {
            for filter in &layout.filters {
                self.values.insert(filter.id(), filter.default_value());
            }
            for region in layout.regions() {
                self.regions.insert(region, RegionContent::Empty);
            }
        }
        self.set_status_message(format!("{} tab", tab.label()));
    }

    fn cycle_option(&mut self, step: isize) {
        let Some(FilterControl::Dropdown { id, options, .. }) =
            self.layout.as_ref().and_then(|l| l.filters.first())
        else {
            return;
        };
        let current = self.value(*id);
        let idx = options.iter().position(|(_, v)| *v == current).unwrap_or(0) as isize;
        let next = (idx + step).rem_euclid(options.len() as isize) as usize;
        let (label, value) = options[next];
        self.values.insert(*id, value.to_string());
        self.set_status_message(format!("Board: {label}"));
    }

    // --------------------------- Input handling ---------------------------- //

    fn text_control(&self) -> Option<ControlId> {
        self.layout.as_ref()?.filters.iter().find_map(|f| match f {
            FilterControl::TextInput { id, .. } => Some(*id),
            FilterControl::Dropdown { .. } => None,
        })
    }

    fn enter_input_mode(&mut self) {
        let Some(control) = self.text_control() else {
            return;
        };
        let current = self.value(control).to_string();
        self.input.start(&current);
        self.last_input = self.input.state();
        self.editing = Some(control);
        self.modus = Modus::INPUT;
        self.filter_error = None;
    }

    fn raw_input(&mut self, key: KeyEvent) {
        let state = self.input.read(key);
        self.last_input = state.clone();
        let Some(end) = state.end else {
            return;
        };
        self.modus = Modus::BROWSE;
        let control = self.editing.take();
        if end == EditEnd::Canceled {
            return;
        }
        if let Some(control) = control {
            debug!("{} = {:?}", control.as_str(), state.text);
            self.values.insert(control, state.text);
            // Enter in the search box works like pressing Submit.
            self.submit();
        }
    }

    // --------------------------- Action handling --------------------------- //

    fn submit(&mut self) {
        let Some(layout) = &self.layout else {
            return;
        };
        let Some(trigger) = layout.trigger else {
            self.set_status_message("Nothing to run on this tab");
            return;
        };
        let values: Vec<(ControlId, String)> = layout
            .filters
            .iter()
            .map(|f| (f.id(), self.value(f.id()).to_string()))
            .collect();
        let clicks = self.clicks.entry(trigger).or_insert(0);
        *clicks += 1;
        let clicks = *clicks;

        let action = ActionState {
            trigger,
            clicks,
            values,
        };
        match self.dispatcher.trigger(&action) {
            Ok(ticket) => {
                self.filter_error = None;
                for region in ticket.regions {
                    self.regions.insert(region, RegionContent::Loading);
                }
                self.selected_row = 0;
                self.offset_row = 0;
                self.set_status_message(format!("Running {} ...", trigger.label()));
            }
            Err(DashError::Validation(msg)) => {
                debug!("Rejected input for {}: {msg}", trigger.as_str());
                self.filter_error = Some(msg);
            }
            Err(e) => {
                warn!("Could not start {}: {e}", trigger.as_str());
                self.set_status_message(e.to_string());
            }
        }
    }

    fn cancel(&mut self) {
        if self.dispatcher.cancel(self.tab) {
            let regions = binding_for(self.tab).map(|b| b.regions()).unwrap_or_default();
            for region in regions {
                if let Some(content) = self.regions.get_mut(&region) {
                    *content = RegionContent::Empty;
                }
            }
            self.set_status_message("Canceled");
        }
    }

    fn apply(&mut self, completion: Completion) {
        let Some(completion) = self.dispatcher.settle(completion) else {
            return;
        };
        let failed = completion.failed;
        for (region, content) in completion.outputs {
            if let RegionContent::Table(table) = &content {
                info!("{} shows {} rows", region.as_str(), table.rows.len());
            }
            self.regions.insert(region, content);
        }
        self.selected_row = 0;
        self.offset_row = 0;
        if failed {
            self.set_status_message("Query failed");
        } else {
            self.set_status_message("Done");
        }
    }

    // --------------------------- Table navigation -------------------------- //

    fn current_table(&self) -> Option<&RenderedTable> {
        let region = self.layout.as_ref()?.table_region?;
        match self.regions.get(&region)? {
            RegionContent::Table(table) => Some(table),
            _ => None,
        }
    }

    fn ui_resize(&mut self, height: usize) {
        self.ui_height = height;
        trace!("UI was resized, table page is {} rows", self.page_height());
    }

    /// Table body rows visible on the current tab.
    pub fn page_height(&self) -> usize {
        let has_chart = self
            .layout
            .as_ref()
            .is_some_and(|l| l.chart_region.is_some());
        self.ui_height
            .saturating_sub(table_reserved_height(has_chart))
            .max(1)
    }

    fn move_selection_up(&mut self, size: usize) {
        self.selected_row = self.selected_row.saturating_sub(size);
        if self.selected_row < self.offset_row {
            self.offset_row = self.selected_row;
        }
    }

    fn move_selection_down(&mut self, size: usize) {
        let nrows = self.current_table().map(|t| t.rows.len()).unwrap_or(0);
        if nrows == 0 {
            return;
        }
        self.selected_row = std::cmp::min(self.selected_row + size, nrows - 1);
        let height = self.page_height();
        if self.selected_row >= self.offset_row + height {
            self.offset_row = self.selected_row + 1 - height;
        }
    }

    fn copy_selected_row(&mut self) {
        let Some(row) = self
            .current_table()
            .and_then(|t| t.rows.get(self.selected_row))
        else {
            return;
        };
        let content = match row.iter().find_map(|c| match c {
            Cell::Link { href, .. } => Some(href.clone()),
            Cell::Plain(_) => None,
        }) {
            Some(href) => href,
            None => row
                .iter()
                .map(|c| Model::wrap_cell_content(c.text()))
                .collect::<Vec<String>>()
                .join(","),
        };

        let copied = match self.clipboard.as_mut() {
            Some(clipboard) => match clipboard.set_text(content.clone()) {
                Ok(_) => true,
                Err(e) => {
                    trace!("Error copying to clipboard: {:?}", e);
                    false
                }
            },
            None => false,
        };
        if copied {
            self.set_status_message(format!("Copied {content}"));
        } else {
            self.set_status_message("Clipboard not available");
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        if c.contains(',') || c.contains('"') {
            format!("\"{}\"", c.replace('"', "\"\""))
        } else {
            c.to_string()
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    pub fn max_column_width(&self) -> usize {
        self.config.max_column_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::PipelineOptions;
    use crate::gateway::{CsvSource, TIMESTAMP_COLUMN};
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn model() -> (Model, UnboundedReceiver<Completion>) {
        let cfg = DashConfig::default();
        let source = CsvSource::new("tests/fixtures/offers.csv".into()).unwrap();
        let (tx, rx) = unbounded_channel();
        let dispatcher = Dispatcher::new(
            Arc::new(source),
            PipelineOptions::from(&cfg),
            Handle::current(),
            tx,
        );
        (Model::init(&cfg, dispatcher, 40), rx)
    }

    async fn deliver(model: &mut Model, rx: &mut UnboundedReceiver<Completion>) {
        let completion = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        model.update(Some(Message::Completed(completion))).unwrap();
    }

    fn key(model: &mut Model, code: KeyCode) {
        model
            .update(Some(Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE))))
            .unwrap();
    }

    #[tokio::test]
    async fn starts_on_home_with_nothing_to_run() {
        let (mut model, _rx) = model();
        assert_eq!(model.tab(), Tab::Home);
        assert!(model.layout().unwrap().regions().is_empty());
        model.update(Some(Message::Submit)).unwrap();
        assert_eq!(model.status_message(), "Nothing to run on this tab");
    }

    #[tokio::test]
    async fn jobs_search_fills_all_regions() {
        let (mut model, mut rx) = model();
        model.update(Some(Message::SelectTab(Tab::Jobs))).unwrap();
        model.update(Some(Message::EditFilter)).unwrap();
        assert!(model.raw_keyevents());
        for c in "engineer".chars() {
            key(&mut model, KeyCode::Char(c));
        }
        key(&mut model, KeyCode::Enter);
        assert!(!model.raw_keyevents());
        assert_eq!(model.value(ControlId::JobsQuery), "engineer");
        assert_eq!(*model.region(RegionId::JobsTable), RegionContent::Loading);

        deliver(&mut model, &mut rx).await;
        assert_eq!(model.phase(), Phase::Rendered);
        match model.region(RegionId::JobsInfo) {
            RegionContent::Stats(stats) => {
                assert_eq!(stats.total_count, 5);
                assert_eq!(stats.salaried_count, 4);
                assert_eq!(stats.average_salary, Some(4800.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        match model.region(RegionId::JobsChart) {
            // January, March and April: only March is a full month.
            RegionContent::Chart(buckets) => {
                assert_eq!(buckets.len(), 1);
                assert_eq!(buckets[0].bucket_start.to_string(), "2024-03-01");
                assert_eq!(buckets[0].count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        match model.region(RegionId::JobsTable) {
            RegionContent::Table(table) => {
                assert_eq!(table.rows.len(), 5);
                assert_eq!(table.headers[0], TIMESTAMP_COLUMN);
            }
            other => panic!("unexpected {other:?}"),
        }

        model.update(Some(Message::MoveDown)).unwrap();
        model.update(Some(Message::MovePageDown)).unwrap();
        assert_eq!(model.selected_row(), 4);
    }

    #[tokio::test]
    async fn empty_search_is_rejected_inline() {
        let (mut model, mut rx) = model();
        model.update(Some(Message::SelectTab(Tab::Companies))).unwrap();
        model.update(Some(Message::Submit)).unwrap();
        assert!(model.filter_error().is_some());
        assert_eq!(model.phase(), Phase::Idle);
        assert_eq!(*model.region(RegionId::CompaniesTable), RegionContent::Empty);
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn boards_dropdown_cycles_and_runs() {
        let (mut model, mut rx) = model();
        model.update(Some(Message::SelectTab(Tab::Boards))).unwrap();
        assert_eq!(model.value(ControlId::BoardsDropdown), "v_jobboard_data_offers_2w");
        model.update(Some(Message::PrevOption)).unwrap();
        assert_eq!(model.value(ControlId::BoardsDropdown), "v_jobboard_sofia_all_1w");
        model.update(Some(Message::NextOption)).unwrap();
        model.update(Some(Message::NextOption)).unwrap();
        assert_eq!(
            model.value(ControlId::BoardsDropdown),
            "v_jobboard_extended_targets_2w"
        );
        model.update(Some(Message::Submit)).unwrap();
        deliver(&mut model, &mut rx).await;
        match model.region(RegionId::BoardsTable) {
            RegionContent::Table(table) => assert_eq!(table.rows.len(), 12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn switching_tabs_drops_results_and_in_flight_work() {
        let (mut model, mut rx) = model();
        model.update(Some(Message::SelectTab(Tab::Boards))).unwrap();
        model.update(Some(Message::Submit)).unwrap();
        let completion = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        model.update(Some(Message::NextTab)).unwrap();
        assert_eq!(model.tab(), Tab::Jobs);
        model.update(Some(Message::PrevTab)).unwrap();
        // The old result belongs to a layout that is gone.
        model.update(Some(Message::Completed(completion))).unwrap();
        assert_eq!(*model.region(RegionId::BoardsTable), RegionContent::Empty);
        assert_eq!(model.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn paging_follows_the_drawn_table_height() {
        let (mut model, mut rx) = model();
        model.update(Some(Message::Resize(20))).unwrap();
        model.update(Some(Message::SelectTab(Tab::Jobs))).unwrap();
        assert_eq!(model.page_height(), 1);

        // No chart on the boards tab, its table gets those rows.
        model.update(Some(Message::SelectTab(Tab::Boards))).unwrap();
        assert_eq!(model.page_height(), 7);
        model.update(Some(Message::Submit)).unwrap();
        deliver(&mut model, &mut rx).await;
        model.update(Some(Message::MovePageDown)).unwrap();
        assert_eq!(model.selected_row(), 7);
        assert_eq!(model.offset_row(), 1);
        model.update(Some(Message::MovePageUp)).unwrap();
        assert_eq!(model.selected_row(), 0);
        assert_eq!(model.offset_row(), 0);
    }

    #[tokio::test]
    async fn escape_leaves_value_untouched() {
        let (mut model, _rx) = model();
        model.update(Some(Message::SelectTab(Tab::Jobs))).unwrap();
        model.update(Some(Message::EditFilter)).unwrap();
        key(&mut model, KeyCode::Char('x'));
        key(&mut model, KeyCode::Esc);
        assert_eq!(model.value(ControlId::JobsQuery), "");
        assert_eq!(model.phase(), Phase::Idle);
        assert!(model.editing().is_none());
    }

    #[test]
    fn csv_cells_are_quoted() {
        assert_eq!(Model::wrap_cell_content("Sofia"), "Sofia");
        assert_eq!(Model::wrap_cell_content("1,5"), "\"1,5\"");
        assert_eq!(Model::wrap_cell_content("a\"b"), "\"a\"\"b\"");
    }
}
