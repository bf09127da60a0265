use crate::{Config, Result};

use super::Pool;

const DEFAULT_MAX_CONNECTION: usize = 10;

/// Pool configuration builder.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub(crate) conn: Config,
    pub(crate) max_conn: usize,
}

impl PoolConfig {
    /// Connection config from environment, see [`Config::from_env`].
    pub fn from_env() -> PoolConfig {
        Self::new(Config::from_env())
    }

    pub fn new(conn: Config) -> PoolConfig {
        Self { conn, max_conn: DEFAULT_MAX_CONNECTION }
    }

    /// Connection config from url, see [`Config::parse`].
    pub fn parse(url: &str) -> Result<PoolConfig> {
        Ok(Self::new(Config::parse(url)?))
    }

    /// Get connection config.
    pub fn connection(&self) -> &Config {
        &self.conn
    }

    /// Set max connection value, default is 10.
    ///
    /// Zero is treated as one.
    pub fn max_connection(mut self, value: usize) -> Self {
        self.max_conn = value.max(1);
        self
    }

    pub async fn connect(self) -> Result<Pool> {
        Pool::connect_with(self).await
    }

    pub fn connect_lazy(self) -> Pool {
        Pool::connect_lazy_with(self)
    }
}

impl From<Config> for PoolConfig {
    fn from(conn: Config) -> Self {
        Self::new(conn)
    }
}
