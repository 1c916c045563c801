use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::DataFrame;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::DashConfig;
use crate::domain::DashError;
use crate::gateway::{BoardView, QueryDescriptor, TableSource};
use crate::resample::{TimeBucket, resample_monthly};
use crate::router::{ControlId, RegionId, Tab, TriggerId};
use crate::stats::{AggregateStats, compute_stats};
use crate::table::{RenderedTable, TableSpec, render_table};

const MAX_KEYWORD_CHARS: usize = 200;

pub const JOB_COLUMNS: &[&str] = &[
    "subm_date",
    "job_id",
    "job_title",
    "company",
    "job_location",
    "salary",
    "norm_salary",
];

/// What ends up in an output region.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RegionContent {
    #[default]
    Empty,
    Loading,
    Stats(AggregateStats),
    Chart(Vec<TimeBucket>),
    Table(RenderedTable),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Board,
    TitleKeyword,
    CompanyKeyword,
}

impl QueryKind {
    fn build(self, value: &str) -> Result<QueryDescriptor, DashError> {
        match self {
            QueryKind::Board => BoardView::from_view_name(value)
                .map(QueryDescriptor::Board)
                .ok_or_else(|| DashError::Validation(format!("unknown board {value:?}"))),
            QueryKind::TitleKeyword => validate_keyword(value).map(QueryDescriptor::TitleKeyword),
            QueryKind::CompanyKeyword => {
                validate_keyword(value).map(QueryDescriptor::CompanyKeyword)
            }
        }
    }
}

pub fn validate_keyword(value: &str) -> Result<String, DashError> {
    let keyword = value.trim();
    if keyword.is_empty() {
        return Err(DashError::Validation("enter a search term".into()));
    }
    if keyword.chars().count() > MAX_KEYWORD_CHARS {
        return Err(DashError::Validation(format!(
            "search term is longer than {MAX_KEYWORD_CHARS} characters"
        )));
    }
    if keyword.chars().any(char::is_control) {
        return Err(DashError::Validation(
            "search term contains control characters".into(),
        ));
    }
    Ok(keyword.to_string())
}

/// Wiring of one tab: which control feeds which query, and which stages
/// fill which region.
#[derive(Debug)]
pub struct Binding {
    pub tab: Tab,
    pub trigger: TriggerId,
    pub control: ControlId,
    pub query: QueryKind,
    pub stats: Option<RegionId>,
    pub chart: Option<RegionId>,
    pub table: Option<(RegionId, TableSpec)>,
}

impl Binding {
    pub fn regions(&self) -> Vec<RegionId> {
        [self.stats, self.chart, self.table.map(|(r, _)| r)]
            .into_iter()
            .flatten()
            .collect()
    }
}

static BINDINGS: [Binding; 3] = [
    Binding {
        tab: Tab::Boards,
        trigger: TriggerId::BoardsRun,
        control: ControlId::BoardsDropdown,
        query: QueryKind::Board,
        stats: None,
        chart: None,
        table: Some((RegionId::BoardsTable, TableSpec::all_columns())),
    },
    Binding {
        tab: Tab::Jobs,
        trigger: TriggerId::JobsSubmit,
        control: ControlId::JobsQuery,
        query: QueryKind::TitleKeyword,
        stats: Some(RegionId::JobsInfo),
        chart: Some(RegionId::JobsChart),
        table: Some((
            RegionId::JobsTable,
            TableSpec::new(JOB_COLUMNS)
                .with_link_column("job_id")
                .with_order_by("subm_date", true),
        )),
    },
    Binding {
        tab: Tab::Companies,
        trigger: TriggerId::CompaniesSubmit,
        control: ControlId::CompaniesQuery,
        query: QueryKind::CompanyKeyword,
        stats: None,
        chart: None,
        table: Some((RegionId::CompaniesTable, TableSpec::all_columns())),
    },
];

pub fn binding_for(tab: Tab) -> Option<&'static Binding> {
    BINDINGS.iter().find(|b| b.tab == tab)
}

pub fn binding_for_trigger(trigger: TriggerId) -> &'static Binding {
    match trigger {
        TriggerId::BoardsRun => &BINDINGS[0],
        TriggerId::JobsSubmit => &BINDINGS[1],
        TriggerId::CompaniesSubmit => &BINDINGS[2],
    }
}

/// Input captured when a trigger fires.
#[derive(Debug, Clone)]
pub struct ActionState {
    pub trigger: TriggerId,
    pub clicks: u64,
    pub values: Vec<(ControlId, String)>,
}

impl ActionState {
    pub fn value(&self, control: ControlId) -> Option<&str> {
        self.values
            .iter()
            .find(|(id, _)| *id == control)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Rendered,
    Failed,
}

#[derive(Debug)]
pub struct Completion {
    pub tab: Tab,
    pub seq: u64,
    pub failed: bool,
    pub outputs: Vec<(RegionId, RegionContent)>,
}

/// Returned by a successful trigger, the regions now waiting for data.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub tab: Tab,
    pub seq: u64,
    pub regions: Vec<RegionId>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_rows: usize,
    pub url_template: String,
}

impl From<&DashConfig> for PipelineOptions {
    fn from(cfg: &DashConfig) -> Self {
        Self {
            max_rows: cfg.max_rows,
            url_template: cfg.job_url_template.clone(),
        }
    }
}

struct Tracker {
    seq: u64,
    phase: Phase,
    /// The fetch and pipeline work, not its supervisor. Aborting it makes the
    /// supervisor return without reporting.
    task: Option<AbortHandle>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            seq: 0,
            phase: Phase::Idle,
            task: None,
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct Dispatcher {
    source: Arc<dyn TableSource>,
    options: PipelineOptions,
    runtime: Handle,
    sender: UnboundedSender<Completion>,
    trackers: HashMap<Tab, Tracker>,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn TableSource>,
        options: PipelineOptions,
        runtime: Handle,
        sender: UnboundedSender<Completion>,
    ) -> Self {
        Self {
            source,
            options,
            runtime,
            sender,
            trackers: HashMap::new(),
        }
    }

    pub fn phase(&self, tab: Tab) -> Phase {
        self.trackers
            .get(&tab)
            .map(|t| t.phase)
            .unwrap_or(Phase::Idle)
    }

    /// Starts the fetch for `action`. Invalid input is rejected before any
    /// query is issued and leaves the binding untouched.
    pub fn trigger(&mut self, action: &ActionState) -> Result<Ticket, DashError> {
        let binding = binding_for_trigger(action.trigger);
        let value = action.value(binding.control).unwrap_or_default();
        let query = binding.query.build(value)?;

        let tracker = self.trackers.entry(binding.tab).or_insert_with(Tracker::new);
        // A newer trigger always wins, the older fetch is no longer wanted.
        tracker.abort();
        tracker.seq += 1;
        tracker.phase = Phase::Fetching;
        let seq = tracker.seq;
        info!(
            "{} click #{} -> {query:?} (seq {seq})",
            action.trigger.as_str(),
            action.clicks
        );

        let source = Arc::clone(&self.source);
        let options = self.options.clone();
        let work = self.runtime.spawn(async move {
            let start_time = Instant::now();
            let fetched = source.fetch_table(&query).await;
            let completion = complete(binding, seq, fetched, &options);
            debug!(
                "{} seq {seq} finished in {}ms",
                binding.tab.id(),
                start_time.elapsed().as_millis()
            );
            completion
        });
        tracker.task = Some(work.abort_handle());

        // A crashed worker still has to leave its regions in a final state.
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            let completion = match work.await {
                Ok(completion) => completion,
                Err(e) if e.is_cancelled() => {
                    trace!("{} seq {seq} was aborted", binding.tab.id());
                    return;
                }
                Err(e) => failure(binding, seq, &DashError::from(e)),
            };
            if sender.send(completion).is_err() {
                trace!("Receiver gone, dropping completion");
            }
        });

        Ok(Ticket {
            tab: binding.tab,
            seq,
            regions: binding.regions(),
        })
    }

    /// Accepts a completion only if it belongs to the latest trigger of its
    /// tab. Stale completions are dropped.
    pub fn settle(&mut self, completion: Completion) -> Option<Completion> {
        let tracker = self.trackers.get_mut(&completion.tab)?;
        if completion.seq != tracker.seq || tracker.phase != Phase::Fetching {
            debug!(
                "Discarding stale result for {} (seq {}, latest {})",
                completion.tab.id(),
                completion.seq,
                tracker.seq
            );
            return None;
        }
        tracker.task = None;
        tracker.phase = if completion.failed {
            Phase::Failed
        } else {
            Phase::Rendered
        };
        Some(completion)
    }

    /// Drops the in-flight fetch of `tab`, if any.
    pub fn cancel(&mut self, tab: Tab) -> bool {
        match self.trackers.get_mut(&tab) {
            Some(tracker) if tracker.phase == Phase::Fetching => {
                tracker.abort();
                tracker.seq += 1;
                tracker.phase = Phase::Idle;
                info!("Canceled running query of {}", tab.id());
                true
            }
            _ => false,
        }
    }

    /// Called when the tab's layout is rebuilt; everything it showed is gone.
    pub fn reset(&mut self, tab: Tab) {
        if let Some(tracker) = self.trackers.get_mut(&tab) {
            tracker.abort();
            tracker.seq += 1;
            tracker.phase = Phase::Idle;
        }
    }
}

fn complete(
    binding: &Binding,
    seq: u64,
    fetched: Result<DataFrame, DashError>,
    options: &PipelineOptions,
) -> Completion {
    match fetched.and_then(|df| run_pipeline(binding, &df, options)) {
        Ok(outputs) => Completion {
            tab: binding.tab,
            seq,
            failed: false,
            outputs,
        },
        Err(e) => failure(binding, seq, &e),
    }
}

fn failure(binding: &Binding, seq: u64, e: &DashError) -> Completion {
    if e.is_recoverable() {
        warn!("{} seq {seq} failed: {e}", binding.tab.id());
    } else {
        error!("{} seq {seq} failed: {e}", binding.tab.id());
    }
    Completion {
        tab: binding.tab,
        seq,
        failed: true,
        outputs: binding
            .regions()
            .into_iter()
            .map(|r| (r, RegionContent::Failed(e.to_string())))
            .collect(),
    }
}

/// Fans one result out to the stages wired for the binding.
pub fn run_pipeline(
    binding: &Binding,
    df: &DataFrame,
    options: &PipelineOptions,
) -> Result<Vec<(RegionId, RegionContent)>, DashError> {
    let mut outputs = Vec::with_capacity(3);
    if let Some(region) = binding.stats {
        outputs.push((region, RegionContent::Stats(compute_stats(df)?)));
    }
    if let Some(region) = binding.chart {
        outputs.push((region, RegionContent::Chart(resample_monthly(df)?)));
    }
    if let Some((region, spec)) = &binding.table {
        let table = render_table(df, spec, options.max_rows, &options.url_template)?;
        outputs.push((*region, RegionContent::Table(table)));
    }
    Ok(outputs)
}
