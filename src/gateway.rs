use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use rayon::prelude::*;
use sqlx::postgres::{PgColumn, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column as _, Executor, Row, TypeInfo};
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::domain::DashError;

pub const TIMESTAMP_COLUMN: &str = "subm_date";

const MAX_CONNECTIONS: u32 = 5;
const TITLE_SEARCH_SQL: &str = "SELECT * FROM f_offers_by_title_kw($1)";
const COMPANY_SEARCH_SQL: &str = "SELECT * FROM f_offers_by_company_kw($1)";

/// The stored views a board query may read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardView {
    DataOffers2w,
    ExtendedTargets2w,
    SofiaAll1w,
}

impl BoardView {
    pub const ALL: [BoardView; 3] = [
        BoardView::DataOffers2w,
        BoardView::ExtendedTargets2w,
        BoardView::SofiaAll1w,
    ];

    pub fn view_name(self) -> &'static str {
        match self {
            BoardView::DataOffers2w => "v_jobboard_data_offers_2w",
            BoardView::ExtendedTargets2w => "v_jobboard_extended_targets_2w",
            BoardView::SofiaAll1w => "v_jobboard_sofia_all_1w",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BoardView::DataOffers2w => "data jobs 2 weeks",
            BoardView::ExtendedTargets2w => "extended targets 2 weeks",
            BoardView::SofiaAll1w => "sofia all 1 week",
        }
    }

    pub fn from_view_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.view_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryDescriptor {
    Board(BoardView),
    TitleKeyword(String),
    CompanyKeyword(String),
}

impl QueryDescriptor {
    /// SQL text sent to the store. User input never appears in it.
    pub fn sql(&self) -> String {
        match self {
            QueryDescriptor::Board(view) => format!("SELECT * FROM {}", view.view_name()),
            QueryDescriptor::TitleKeyword(_) => TITLE_SEARCH_SQL.to_string(),
            QueryDescriptor::CompanyKeyword(_) => COMPANY_SEARCH_SQL.to_string(),
        }
    }

    /// The value bound as `$1`, if the query takes one.
    pub fn keyword(&self) -> Option<&str> {
        match self {
            QueryDescriptor::Board(_) => None,
            QueryDescriptor::TitleKeyword(kw) | QueryDescriptor::CompanyKeyword(kw) => Some(kw),
        }
    }
}

#[async_trait]
pub trait TableSource: Send + Sync {
    async fn fetch_table(&self, query: &QueryDescriptor) -> Result<DataFrame, DashError>;
}

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    /// Must be called inside a tokio runtime context, the pool spawns its
    /// maintenance tasks on creation. No connection is opened until the first
    /// query.
    pub fn new(config: &DbConfig) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(config.connect_options());
        Self { pool }
    }

    #[cfg(test)]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TableSource for PgGateway {
    async fn fetch_table(&self, query: &QueryDescriptor) -> Result<DataFrame, DashError> {
        let sql = query.sql();
        debug!("Running query: {sql}");
        let start_time = Instant::now();

        // Connection goes back to the pool when `conn` drops, on every path.
        let mut conn = self.pool.acquire().await?;
        let mut statement = sqlx::query(&sql);
        if let Some(keyword) = query.keyword() {
            statement = statement.bind(keyword.to_owned());
        }
        let rows = statement.fetch_all(&mut *conn).await?;

        let columns = match rows.first() {
            Some(row) => column_kinds(row.columns()),
            None => {
                let description = (&mut *conn).describe(&sql).await?;
                column_kinds(description.columns())
            }
        };
        drop(conn);

        let df = rows_to_frame(&rows, &columns)?;
        info!(
            "Query returned {} rows in {}ms",
            df.height(),
            start_time.elapsed().as_millis()
        );
        normalize_timestamp(df)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PgKind {
    Text,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Bool,
    Date,
    Timestamp,
    TimestampTz,
    Other,
}

impl PgKind {
    fn from_type_name(name: &str) -> Self {
        match name {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => PgKind::Text,
            "INT2" => PgKind::Int2,
            "INT4" => PgKind::Int4,
            "INT8" => PgKind::Int8,
            "FLOAT4" => PgKind::Float4,
            "FLOAT8" => PgKind::Float8,
            "NUMERIC" => PgKind::Numeric,
            "BOOL" => PgKind::Bool,
            "DATE" => PgKind::Date,
            "TIMESTAMP" => PgKind::Timestamp,
            "TIMESTAMPTZ" => PgKind::TimestampTz,
            _ => PgKind::Other,
        }
    }
}

fn column_kinds(columns: &[PgColumn]) -> Vec<(String, PgKind)> {
    columns
        .iter()
        .map(|c| {
            (
                c.name().to_string(),
                PgKind::from_type_name(c.type_info().name()),
            )
        })
        .collect()
}

fn values<'r, T>(rows: &'r [PgRow], idx: usize) -> Result<Vec<Option<T>>, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    rows.iter()
        .map(|row| row.try_get::<Option<T>, _>(idx))
        .collect()
}

fn millis_column(name: PlSmallStr, millis: Vec<Option<i64>>) -> Result<Column, PolarsError> {
    Ok(Series::new(name, millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .into_column())
}

// Each column is converted on its own rayon worker, rows are already in memory.
fn rows_to_frame(rows: &[PgRow], columns: &[(String, PgKind)]) -> Result<DataFrame, DashError> {
    let loaded: Result<Vec<Column>, DashError> = columns
        .par_iter()
        .enumerate()
        .map(|(idx, (name, kind))| load_column(rows, idx, name, *kind))
        .collect();
    Ok(DataFrame::new(loaded?)?)
}

fn load_column(
    rows: &[PgRow],
    idx: usize,
    name: &str,
    kind: PgKind,
) -> Result<Column, DashError> {
    let col_name: PlSmallStr = name.into();
    let column = match kind {
        PgKind::Text => Series::new(col_name, values::<String>(rows, idx)?).into_column(),
        PgKind::Int2 => {
            let v: Vec<Option<i64>> = values::<i16>(rows, idx)?
                .into_iter()
                .map(|v| v.map(i64::from))
                .collect();
            Series::new(col_name, v).into_column()
        }
        PgKind::Int4 => {
            let v: Vec<Option<i64>> = values::<i32>(rows, idx)?
                .into_iter()
                .map(|v| v.map(i64::from))
                .collect();
            Series::new(col_name, v).into_column()
        }
        PgKind::Int8 => Series::new(col_name, values::<i64>(rows, idx)?).into_column(),
        PgKind::Float4 => {
            let v: Vec<Option<f64>> = values::<f32>(rows, idx)?
                .into_iter()
                .map(|v| v.map(f64::from))
                .collect();
            Series::new(col_name, v).into_column()
        }
        PgKind::Float8 => Series::new(col_name, values::<f64>(rows, idx)?).into_column(),
        PgKind::Numeric => {
            let v: Vec<Option<f64>> = values::<sqlx::types::Decimal>(rows, idx)?
                .into_iter()
                .map(|v| v.and_then(|d| d.to_string().parse::<f64>().ok()))
                .collect();
            Series::new(col_name, v).into_column()
        }
        PgKind::Bool => Series::new(col_name, values::<bool>(rows, idx)?).into_column(),
        PgKind::Date => {
            let millis = values::<NaiveDate>(rows, idx)?
                .into_iter()
                .map(|v| {
                    v.and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc().timestamp_millis())
                })
                .collect();
            millis_column(col_name, millis)?
        }
        PgKind::Timestamp => {
            let millis = values::<NaiveDateTime>(rows, idx)?
                .into_iter()
                .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
                .collect();
            millis_column(col_name, millis)?
        }
        PgKind::TimestampTz => {
            let millis = values::<DateTime<Utc>>(rows, idx)?
                .into_iter()
                .map(|v| v.map(|dt| dt.timestamp_millis()))
                .collect();
            millis_column(col_name, millis)?
        }
        PgKind::Other => match values::<String>(rows, idx) {
            Ok(v) => Series::new(col_name, v).into_column(),
            Err(e) => {
                warn!("Column {name} has an unsupported type, leaving it empty: {e}");
                Series::new(col_name, vec![None::<String>; rows.len()]).into_column()
            }
        },
    };
    Ok(column)
}

/// Makes sure `subm_date` exists and is a naive millisecond timestamp.
pub fn normalize_timestamp(mut df: DataFrame) -> Result<DataFrame, DashError> {
    let column = df.column(TIMESTAMP_COLUMN).map_err(|_| {
        DashError::Schema(format!("result has no {TIMESTAMP_COLUMN} column"))
    })?;
    match column.dtype().clone() {
        DataType::Date | DataType::Datetime(_, _) => {
            let converted =
                column.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            df.with_column(converted)?;
            Ok(df)
        }
        other => Err(DashError::Schema(format!(
            "{TIMESTAMP_COLUMN} has type {other}, expected a timestamp"
        ))),
    }
}

/// Offline source answering the same queries from a CSV export.
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: PathBuf) -> Result<Self, DashError> {
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DashError::Configuration(format!(
                "fixture {} does not exist",
                path.display()
            )),
            _ => DashError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(DashError::Configuration(format!(
                "fixture {} is not a file",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    // Polars drives its own runtime while collecting, so this has to run
    // off the async workers.
    fn load(path: &Path, query: &QueryDescriptor) -> Result<DataFrame, DashError> {
        let df = LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()?
            .collect()?;
        let df = match query {
            QueryDescriptor::Board(_) => df,
            QueryDescriptor::TitleKeyword(kw) => filter_contains(&df, "job_title", kw)?,
            QueryDescriptor::CompanyKeyword(kw) => filter_contains(&df, "company", kw)?,
        };
        normalize_timestamp(df)
    }
}

#[async_trait]
impl TableSource for CsvSource {
    async fn fetch_table(&self, query: &QueryDescriptor) -> Result<DataFrame, DashError> {
        debug!("Answering {query:?} from {}", self.path.display());
        let path = self.path.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || CsvSource::load(&path, &query)).await?
    }
}

// Case insensitive literal substring match.
fn filter_contains(df: &DataFrame, column: &str, keyword: &str) -> Result<DataFrame, DashError> {
    let needle = keyword.to_lowercase();
    let values = df.column(column)?.cast(&DataType::String)?;
    let mask: BooleanChunked = values
        .str()?
        .into_iter()
        .map(|v| Some(v.is_some_and(|s| s.to_lowercase().contains(&needle))))
        .collect();
    Ok(df.filter(&mask)?)
}
