//! Connection string parsing.

use std::fmt;

use crate::store::StoreError;

const DEFAULT_PORT: u16 = 27017;

/// A parsed `mongodb://` / `mongodb+srv://` connection string.
///
/// Credentials are kept out of `Display` so the value can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    srv: bool,
    has_credentials: bool,
    hosts: Vec<(String, u16)>,
    database: Option<String>,
}

impl ConnectionString {
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let uri = uri.trim();
        let (srv, rest) = if let Some(rest) = uri.strip_prefix("mongodb+srv://") {
            (true, rest)
        } else if let Some(rest) = uri.strip_prefix("mongodb://") {
            (false, rest)
        } else {
            return Err(StoreError::UnsupportedScheme(uri.to_string()));
        };

        let split_at = rest.find(&['/', '?'][..]).unwrap_or(rest.len());
        let (authority, remainder) = rest.split_at(split_at);

        let (has_credentials, host_list) = match authority.rsplit_once('@') {
            Some((_, hosts)) => (true, hosts),
            None => (false, authority),
        };

        let mut hosts = Vec::new();
        for entry in host_list.split(',').filter(|h| !h.is_empty()) {
            hosts.push(parse_host(entry)?);
        }
        if hosts.is_empty() {
            return Err(StoreError::MissingHost);
        }

        let database = remainder
            .strip_prefix('/')
            .map(|db| db.split('?').next().unwrap_or_default())
            .filter(|db| !db.is_empty())
            .map(str::to_string);

        Ok(Self {
            srv,
            has_credentials,
            hosts,
            database,
        })
    }

    /// `(host, port)` pairs in connection-string order.
    ///
    /// SRV records are not resolved; an SRV name is probed on the default port.
    pub fn hosts(&self) -> &[(String, u16)] {
        &self.hosts
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

fn parse_host(entry: &str) -> Result<(String, u16), StoreError> {
    // Bracketed IPv6 literal: [::1]:27017
    if let Some(rest) = entry.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| StoreError::InvalidPort(entry.to_string()))?;
        let port = match after.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None => DEFAULT_PORT,
        };
        return Ok((host.to_string(), port));
    }

    match entry.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(StoreError::MissingHost);
            }
            Ok((host.to_string(), parse_port(port)?))
        }
        None => Ok((entry.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(raw: &str) -> Result<u16, StoreError> {
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(StoreError::InvalidPort(raw.to_string())),
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.srv { "mongodb+srv://" } else { "mongodb://" })?;
        if self.has_credentials {
            f.write_str("***@")?;
        }
        let hosts: Vec<String> = self
            .hosts
            .iter()
            .map(|(host, port)| {
                if host.contains(':') {
                    format!("[{}]:{}", host, port)
                } else {
                    format!("{}:{}", host, port)
                }
            })
            .collect();
        f.write_str(&hosts.join(","))?;
        if let Some(db) = &self.database {
            write!(f, "/{}", db)?;
        }
        Ok(())
    }
}
