use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate};
use polars::prelude::*;
use tracing::{trace, warn};

use crate::domain::DashError;
use crate::gateway::TIMESTAMP_COLUMN;

/// One bar of the postings-per-month chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub bucket_start: NaiveDate,
    pub count: u64,
}

/// Counts rows per calendar month of `subm_date`.
///
/// The oldest and newest month only cover part of the query window, so both
/// are dropped. Months without any row are not emitted. The result runs from
/// the most recent month to the oldest; fewer than three distinct months
/// give an empty series.
pub fn resample_monthly(df: &DataFrame) -> Result<Vec<TimeBucket>, DashError> {
    let millis = df
        .column(TIMESTAMP_COLUMN)
        .map_err(|_| DashError::Schema(format!("result has no {TIMESTAMP_COLUMN} column")))?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .cast(&DataType::Int64)?;

    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for value in millis.i64()?.into_iter().flatten() {
        match DateTime::from_timestamp_millis(value).and_then(|dt| month_start(dt.date_naive())) {
            Some(start) => *counts.entry(start).or_insert(0) += 1,
            None => warn!("Skipping out of range timestamp {value}"),
        }
    }

    let months = counts.len();
    let buckets: Vec<TimeBucket> = counts
        .into_iter()
        .rev()
        .skip(1)
        .take(months.saturating_sub(2))
        .map(|(bucket_start, count)| TimeBucket {
            bucket_start,
            count,
        })
        .collect();
    trace!("Resampled {} rows into {} buckets", df.height(), buckets.len());
    Ok(buckets)
}

fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}
