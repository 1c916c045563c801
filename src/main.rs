use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod controller;
mod dispatcher;
mod domain;
mod gateway;
mod inputter;
mod model;
mod resample;
mod router;
mod stats;
mod table;
mod ui;

use config::{DEFAULT_JOB_URL_TEMPLATE, DEFAULT_MAX_ROWS, DashConfig, DbConfig};
use controller::Controller;
use dispatcher::{Completion, Dispatcher, PipelineOptions};
use domain::{DashError, Message};
use gateway::{CsvSource, PgGateway, TableSource};
use model::{Model, Status};
use router::layout_for_id;
use ui::DashUI;

/// Browse job board postings from the terminal.
///
/// Database credentials are read from DBNAME, USERNAME, PASSWORD, DBHOST and
/// DBPORT unless --fixture is given.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Answer queries from a CSV export instead of the database
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Maximum number of rows shown in a table
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    max_rows: usize,

    /// Link target for job ids, `{job_id}` is replaced by the id
    #[arg(long, default_value = DEFAULT_JOB_URL_TEMPLATE)]
    job_url_template: String,

    /// Log file, the terminal is taken by the UI
    #[arg(long, default_value = "~/.jobdash.log")]
    log_file: String,

    /// Tab shown at startup: hometab, boardtab, jobtab or companiestab
    #[arg(long, default_value = "hometab")]
    tab: String,

    /// Event poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run() -> Result<(), DashError> {
    let args = Args::parse();
    init_logging(&args.log_file)?;
    info!("Starting jobdash with {args:?}");

    let start_tab = layout_for_id(&args.tab)
        .map(|layout| layout.tab)
        .ok_or_else(|| DashError::Configuration(format!("unknown tab {:?}", args.tab)))?;
    let cfg = DashConfig::default()
        .start_tab(start_tab)
        .event_poll_time(args.poll_ms)
        .max_rows(args.max_rows)
        .job_url_template(args.job_url_template.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("jobdash-worker")
        .build()?;
    let _guard = runtime.enter();

    // Configuration problems end the program here, before the UI takes over.
    let source: Arc<dyn TableSource> = match &args.fixture {
        Some(path) => Arc::new(CsvSource::new(path.clone())?),
        None => Arc::new(PgGateway::new(&DbConfig::from_env()?)),
    };

    let (sender, receiver) = unbounded_channel();
    let dispatcher = Dispatcher::new(
        source,
        PipelineOptions::from(&cfg),
        runtime.handle().clone(),
        sender,
    );

    let mut terminal = ratatui::init();
    let result = terminal
        .size()
        .map_err(DashError::from)
        .and_then(|size| {
            let model = Model::init(&cfg, dispatcher, size.height as usize);
            event_loop(&mut terminal, model, receiver, &cfg)
        });
    ratatui::restore();
    info!("Bye!");
    result
}

fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    mut model: Model,
    mut receiver: UnboundedReceiver<Completion>,
    cfg: &DashConfig,
) -> Result<(), DashError> {
    let mut ui = DashUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Apply finished queries
        while let Ok(completion) = receiver.try_recv() {
            model.update(Some(Message::Completed(completion)))?;
        }

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(Some(message))?;
        };
    }
    Ok(())
}

fn init_logging(log_file: &str) -> Result<(), DashError> {
    let path = shellexpand::full(log_file)
        .map_err(|e| DashError::Configuration(format!("cannot expand {log_file}: {e}")))?;
    let file = File::create(path.as_ref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| DashError::Configuration(format!("cannot install logger: {e}")))
}
