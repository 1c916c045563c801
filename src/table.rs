use polars::prelude::*;
use tracing::trace;

use crate::domain::DashError;
use crate::gateway::TIMESTAMP_COLUMN;

pub const NULL_CELL: &str = "∅";
const LINK_PLACEHOLDER: &str = "{job_id}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Plain(String),
    Link { text: String, href: String },
}

impl Cell {
    pub fn text(&self) -> &str {
        match self {
            Cell::Plain(s) => s,
            Cell::Link { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// How a tab turns a result into a table. Fixed at build time.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    /// `None` keeps every column of the result, in result order.
    pub projection: Option<&'static [&'static str]>,
    pub link_column: Option<&'static str>,
    /// Column to sort by before truncating, `true` for descending.
    pub order_by: Option<(&'static str, bool)>,
}

impl TableSpec {
    pub const fn new(projection: &'static [&'static str]) -> Self {
        Self {
            projection: Some(projection),
            link_column: None,
            order_by: None,
        }
    }

    pub const fn all_columns() -> Self {
        Self {
            projection: None,
            link_column: None,
            order_by: None,
        }
    }

    pub const fn with_link_column(mut self, column: &'static str) -> Self {
        self.link_column = Some(column);
        self
    }

    pub const fn with_order_by(mut self, column: &'static str, descending: bool) -> Self {
        self.order_by = Some((column, descending));
        self
    }
}

pub fn render_table(
    df: &DataFrame,
    spec: &TableSpec,
    max_rows: usize,
    url_template: &str,
) -> Result<RenderedTable, DashError> {
    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    let headers: Vec<String> = match spec.projection {
        Some(projection) => {
            let missing = projection
                .iter()
                .find(|c| !present.iter().any(|p| p.as_str() == **c));
            if let Some(missing) = missing {
                return Err(DashError::Schema(format!("result has no {missing} column")));
            }
            projection.iter().map(|c| c.to_string()).collect()
        }
        None => present,
    };

    let mut projected = df.select(headers.iter().map(String::as_str))?;
    if let Some((column, descending)) = spec.order_by {
        projected = projected.sort(
            [column],
            SortMultipleOptions::default()
                .with_order_descending(descending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )?;
    }
    let projected = projected.head(Some(max_rows));

    let mut columns = Vec::with_capacity(headers.len());
    for name in &headers {
        let link = spec.link_column == Some(name.as_str());
        columns.push(format_column(&projected, name, link, url_template)?);
    }

    let rows = (0..projected.height())
        .map(|ridx| columns.iter().map(|c| c[ridx].clone()).collect())
        .collect::<Vec<Vec<Cell>>>();
    trace!(
        "Rendered {} of {} rows into {} columns",
        rows.len(),
        df.height(),
        columns.len()
    );

    Ok(RenderedTable { headers, rows })
}

fn format_column(
    df: &DataFrame,
    name: &str,
    link: bool,
    url_template: &str,
) -> Result<Vec<Cell>, DashError> {
    let column = df.column(name)?;
    let column = if name == TIMESTAMP_COLUMN && column.dtype().is_temporal() {
        column.cast(&DataType::Date)?.cast(&DataType::String)?
    } else {
        column.cast(&DataType::String)?
    };

    let cells = column
        .str()?
        .into_iter()
        .map(|value| match value {
            Some(s) if link => Cell::Link {
                text: s.to_string(),
                href: url_template.replace(LINK_PLACEHOLDER, s),
            },
            Some(s) => Cell::Plain(s.replace("\r\n", " ↵ ").replace('\n', " ↵ ")),
            None => Cell::Plain(NULL_CELL.to_string()),
        })
        .collect();
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_JOB_URL_TEMPLATE;
    use crate::gateway::normalize_timestamp;
    use chrono::NaiveDate;

    const PROJECTION: &[&str] = &["subm_date", "job_id", "job_title", "norm_salary"];

    fn jobs(n: usize) -> DataFrame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        let millis: Vec<i64> = (0..n as i64).map(|i| base + i * 86_400_000).collect();
        let ts = Series::new("subm_date".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let ids: Vec<String> = (0..n).map(|i| format!("{}", 1000 + i)).collect();
        let titles: Vec<String> = (0..n).map(|i| format!("Job {i}")).collect();
        let salary: Vec<Option<f64>> = (0..n)
            .map(|i| if i % 2 == 0 { Some(1000.0) } else { None })
            .collect();
        let df = DataFrame::new(vec![
            Series::new("company".into(), vec!["Acme"; n]).into_column(),
            Series::new("job_title".into(), titles).into_column(),
            ts.into_column(),
            Series::new("job_id".into(), ids).into_column(),
            Series::new("norm_salary".into(), salary).into_column(),
        ])
        .unwrap();
        normalize_timestamp(df).unwrap()
    }

    #[test]
    fn projects_in_order_and_truncates() {
        let spec = TableSpec::new(PROJECTION);
        for n in [0, 3, 100, 150] {
            let table = render_table(&jobs(n), &spec, 100, DEFAULT_JOB_URL_TEMPLATE).unwrap();
            assert_eq!(table.headers, PROJECTION);
            assert_eq!(table.rows.len(), n.min(100));
            assert!(table.rows.iter().all(|r| r.len() == PROJECTION.len()));
        }
    }

    #[test]
    fn formats_dates_and_nulls() {
        let spec = TableSpec::new(PROJECTION);
        let table = render_table(&jobs(2), &spec, 100, DEFAULT_JOB_URL_TEMPLATE).unwrap();
        assert_eq!(table.rows[0][0], Cell::Plain("2024-01-01".into()));
        assert_eq!(table.rows[1][0], Cell::Plain("2024-01-02".into()));
        assert_eq!(table.rows[1][3], Cell::Plain(NULL_CELL.into()));
    }

    #[test]
    fn wraps_link_column() {
        let spec = TableSpec::new(PROJECTION).with_link_column("job_id");
        let table = render_table(&jobs(1), &spec, 100, "https://jobs.example/{job_id}/view").unwrap();
        assert_eq!(
            table.rows[0][1],
            Cell::Link {
                text: "1000".into(),
                href: "https://jobs.example/1000/view".into()
            }
        );
        assert!(matches!(table.rows[0][2], Cell::Plain(_)));
    }

    #[test]
    fn orders_before_truncating() {
        let spec = TableSpec::new(PROJECTION).with_order_by("subm_date", true);
        let table = render_table(&jobs(5), &spec, 2, DEFAULT_JOB_URL_TEMPLATE).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0].text(), "2024-01-05");
        assert_eq!(table.rows[1][0].text(), "2024-01-04");
    }

    #[test]
    fn all_columns_keeps_result_order() {
        let table = render_table(
            &jobs(2),
            &TableSpec::all_columns(),
            100,
            DEFAULT_JOB_URL_TEMPLATE,
        )
        .unwrap();
        assert_eq!(
            table.headers,
            ["company", "job_title", "subm_date", "job_id", "norm_salary"]
        );
        assert_eq!(table.rows[0][2], Cell::Plain("2024-01-01".into()));
        assert_eq!(table.rows[1][4], Cell::Plain(NULL_CELL.into()));
    }

    #[test]
    fn missing_column_is_schema_error() {
        let spec = TableSpec::new(&["subm_date", "job_location"]);
        let err = render_table(&jobs(1), &spec, 100, DEFAULT_JOB_URL_TEMPLATE)
            .err()
            .unwrap();
        assert!(matches!(err, DashError::Schema(ref m) if m.contains("job_location")));
    }

    #[test]
    fn rendering_is_idempotent() {
        let spec = TableSpec::new(PROJECTION).with_link_column("job_id");
        let df = jobs(7);
        let first = render_table(&df, &spec, 100, DEFAULT_JOB_URL_TEMPLATE).unwrap();
        let second = render_table(&df, &spec, 100, DEFAULT_JOB_URL_TEMPLATE).unwrap();
        assert_eq!(first, second);
    }
}
