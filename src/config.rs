use derive_setters::Setters;
use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::PgConnectOptions;
use tracing::debug;

use crate::domain::DashError;
use crate::router::Tab;

pub const DEFAULT_MAX_ROWS: usize = 100;
pub const DEFAULT_JOB_URL_TEMPLATE: &str = "https://www.jobs.bg/job/{job_id}";

/// Connection settings for the job board database.
///
/// Built once at startup and handed to the gateway; nothing in the pipeline
/// reads the environment after that.
#[derive(Clone)]
pub struct DbConfig {
    pub dbname: String,
    pub user: String,
    pub password: Secret<String>,
    pub host: String,
    pub port: u16,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DashError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DashError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut read = |key: &'static str| match lookup(key) {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let dbname = read("DBNAME");
        let user = read("USERNAME");
        let password = read("PASSWORD");
        let host = read("DBHOST");
        let port = read("DBPORT");

        if !missing.is_empty() {
            return Err(DashError::Configuration(format!(
                "missing environment variables: {}",
                missing.join(", ")
            )));
        }

        let port = port.trim().parse::<u16>().map_err(|_| {
            DashError::Configuration(format!("DBPORT is not a valid port: {port:?}"))
        })?;

        debug!("Database config: {user}@{host}:{port}/{dbname}");
        Ok(Self {
            dbname,
            user,
            password: Secret::new(password),
            host,
            port,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.dbname)
    }
}

/// Runtime options of the dashboard itself.
#[derive(Debug, Clone, Setters)]
pub struct DashConfig {
    pub event_poll_time: u64,
    pub max_rows: usize,
    pub job_url_template: String,
    pub max_column_width: usize,
    pub start_tab: Tab,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_rows: DEFAULT_MAX_ROWS,
            job_url_template: DEFAULT_JOB_URL_TEMPLATE.to_string(),
            max_column_width: 40,
            start_tab: Tab::Home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_all_credentials() {
        let vars = env(&[
            ("DBNAME", "jobs"),
            ("USERNAME", "reader"),
            ("PASSWORD", "hunter2"),
            ("DBHOST", "localhost"),
            ("DBPORT", "5433"),
        ]);
        let cfg = DbConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.dbname, "jobs");
        assert_eq!(cfg.user, "reader");
        assert_eq!(cfg.password.expose_secret(), "hunter2");
        assert_eq!(cfg.port, 5433);
    }

    #[test]
    fn missing_values_fail_fast() {
        let vars = env(&[("DBNAME", "jobs"), ("PASSWORD", " ")]);
        let err = DbConfig::from_lookup(|k| vars.get(k).cloned())
            .err()
            .unwrap();
        match err {
            DashError::Configuration(msg) => {
                assert!(msg.contains("USERNAME"));
                assert!(msg.contains("PASSWORD"));
                assert!(msg.contains("DBHOST"));
                assert!(msg.contains("DBPORT"));
                assert!(!msg.contains("DBNAME"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn invalid_port_is_a_configuration_error() {
        let vars = env(&[
            ("DBNAME", "jobs"),
            ("USERNAME", "reader"),
            ("PASSWORD", "pw"),
            ("DBHOST", "localhost"),
            ("DBPORT", "fivefourthreetwo"),
        ]);
        let err = DbConfig::from_lookup(|k| vars.get(k).cloned())
            .err()
            .unwrap();
        assert!(matches!(err, DashError::Configuration(_)));
    }

    #[test]
    fn dash_config_setters() {
        let cfg = DashConfig::default().max_rows(5usize);
        assert_eq!(cfg.max_rows, 5);
        assert_eq!(cfg.job_url_template, DEFAULT_JOB_URL_TEMPLATE);
    }
}
