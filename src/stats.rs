use polars::prelude::*;
use tracing::trace;

use crate::domain::DashError;

pub const SALARY_COLUMN: &str = "norm_salary";

/// Numbers shown on the stat cards of the jobs tab.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStats {
    pub total_count: usize,
    pub salaried_count: usize,
    /// Mean of the present `norm_salary` values, rounded to cents.
    /// `None` when no row carries a salary.
    pub average_salary: Option<f64>,
}

pub fn compute_stats(df: &DataFrame) -> Result<AggregateStats, DashError> {
    let salary = df
        .column(SALARY_COLUMN)
        .map_err(|_| DashError::Schema(format!("result has no {SALARY_COLUMN} column")))?
        .cast(&DataType::Float64)?;
    let salary = salary.f64()?;

    let total_count = df.height();
    let salaried_count = salary.len() - salary.null_count();
    let average_salary = if salaried_count > 0 {
        salary.mean().map(round2)
    } else {
        None
    };

    let stats = AggregateStats {
        total_count,
        salaried_count,
        average_salary,
    };
    trace!("Computed {stats:?}");
    Ok(stats)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
