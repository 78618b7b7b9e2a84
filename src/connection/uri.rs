//! Connection URI parsing and rewriting.

use crate::helpers::validate::parse_bool;

/// Query parameters that mark a URI as TLS-only.
const TLS_MARKERS: [&str; 2] = ["ssl", "tls"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionUri {
    scheme: String,
    user: Option<String>,
    password: Option<String>,
    hosts: String,
    database: Option<String>,
    query: Vec<(String, String)>,
}

impl ConnectionUri {
    pub fn parse(input: &str) -> Result<Self, String> {
        let raw = input.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| "URI must include a scheme (mongodb:// or mongodb+srv://)".to_string())?;
        if rest.is_empty() {
            return Err("URI is missing host".to_string());
        }
        let (base, query) = rest.split_once('?').unwrap_or((rest, ""));

        let (userinfo, after_at) =
            base.rsplit_once('@').map(|(u, h)| (Some(u), h)).unwrap_or((None, base));
        let (hosts, database) = after_at.split_once('/').unwrap_or((after_at, ""));

        if hosts.trim().is_empty() {
            return Err("URI is missing host".to_string());
        }

        let (user, password) = match userinfo {
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(userinfo.to_string()), None),
            },
            None => (None, None),
        };

        let database = if database.trim().is_empty() { None } else { Some(database.to_string()) };

        let mut query_pairs = Vec::new();
        for pair in query.split('&') {
            if pair.trim().is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => query_pairs.push((key.to_string(), value.to_string())),
                None => query_pairs.push((pair.to_string(), String::new())),
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            user,
            password,
            hosts: hosts.to_string(),
            database,
            query: query_pairs,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hosts(&self) -> &str {
        &self.hosts
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn set_database(&mut self, database: impl Into<String>) {
        self.database = Some(database.into());
    }

    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
    }

    /// Remove every truthy `ssl`/`tls` parameter and report whether one was found.
    ///
    /// Only the marker parameters are removed; every other query parameter keeps
    /// its position.
    pub fn take_tls_marker(&mut self) -> bool {
        let before = self.query.len();
        self.query.retain(|(key, value)| {
            !(TLS_MARKERS.iter().any(|marker| key.eq_ignore_ascii_case(marker)) && parse_bool(value))
        });
        self.query.len() != before
    }

    pub fn to_uri(&self) -> String {
        let mut output = format!("{}://", self.scheme);
        if let Some(user) = &self.user {
            output.push_str(user);
            if let Some(password) = &self.password {
                output.push(':');
                output.push_str(password);
            }
            output.push('@');
        }
        output.push_str(&self.hosts);
        output.push('/');
        if let Some(database) = &self.database {
            output.push_str(database);
        }
        if !self.query.is_empty() {
            output.push('?');
            let pairs: Vec<String> = self
                .query
                .iter()
                .map(|(key, value)| {
                    if value.is_empty() { key.clone() } else { format!("{key}={value}") }
                })
                .collect();
            output.push_str(&pairs.join("&"));
        }
        output
    }
}
