//! Thin synchronous adapter over the `snmp2` session types.
//!
//! Checks are single-shot batch processes, so everything here blocks with
//! an explicit UDP timeout. Values are converted to the owned
//! [`SnmpValue`] model as soon as a response is decoded; nothing borrows
//! from the receive buffer past a single call.

use std::fmt;
use std::time::Duration;

use log::debug;
use snmp2::{Oid, SyncSession, Value};

/// Common SNMP arguments shared by every SNMP-speaking checker.
#[derive(clap::Args, Clone, Debug)]
pub struct SnmpOpts {
    /// Hostname or address of the device to query.
    #[arg(short = 'H', long)]
    pub hostname: String,

    /// UDP port of the SNMP agent.
    #[arg(short = 'p', long, default_value_t = 161)]
    pub port: u16,

    /// SNMP community string.
    #[arg(short = 'C', long, default_value = "public")]
    pub community: String,

    /// Use SNMP v2c instead of v1.
    #[arg(short = '2', long = "v2c")]
    pub v2c: bool,

    /// Give up on an unanswering device after this many seconds.
    #[arg(short = 't', long, default_value_t = 10)]
    pub timeout: u64,

    /// Log debug information to stderr.
    #[arg(short = 'd', long)]
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SnmpError {
    #[error("invalid OID `{0}`")]
    InvalidOid(String),
    #[error("cannot open SNMP session to {target}: {detail}")]
    Session { target: String, detail: String },
    #[error("SNMP {op} on {oid} failed: {detail}")]
    Request {
        op: &'static str,
        oid: String,
        detail: String,
    },
    #[error("SNMP response for {0} contained no value")]
    EmptyResponse(String),
    #[error("no such object: {0}")]
    NoSuchObject(String),
}

/// A single decoded SNMP value, owned by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum SnmpValue {
    Int(i64),
    Counter32(u32),
    Counter64(u64),
    Gauge(u32),
    Ticks(u32),
    Str(String),
    Oid(String),
    Address(String),
    Null,
    Other(String),
}

impl SnmpValue {
    fn decode(value: &Value) -> SnmpValue {
        match value {
            Value::Integer(i) => SnmpValue::Int(*i),
            Value::Counter32(c) => SnmpValue::Counter32(*c),
            Value::Counter64(c) => SnmpValue::Counter64(*c),
            Value::Unsigned32(g) => SnmpValue::Gauge(*g),
            Value::Timeticks(t) => SnmpValue::Ticks(*t),
            Value::OctetString(bytes) => {
                SnmpValue::Str(String::from_utf8_lossy(bytes).into_owned())
            }
            Value::ObjectIdentifier(oid) => SnmpValue::Oid(oid.to_string()),
            Value::IpAddress(octets) => SnmpValue::Address(
                octets
                    .iter()
                    .map(|o| o.to_string())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            Value::Null => SnmpValue::Null,
            other => SnmpValue::Other(format!("{:?}", other)),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Int(i) => Some(*i),
            SnmpValue::Counter32(c) => Some(i64::from(*c)),
            SnmpValue::Counter64(c) => i64::try_from(*c).ok(),
            SnmpValue::Gauge(g) => Some(i64::from(*g)),
            SnmpValue::Ticks(t) => Some(i64::from(*t)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SnmpValue::Int(i) => u64::try_from(*i).ok(),
            SnmpValue::Counter32(c) => Some(u64::from(*c)),
            SnmpValue::Counter64(c) => Some(*c),
            SnmpValue::Gauge(g) => Some(u64::from(*g)),
            SnmpValue::Ticks(t) => Some(u64::from(*t)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SnmpValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Int(i) => write!(f, "{}", i),
            SnmpValue::Counter32(c) => write!(f, "{}", c),
            SnmpValue::Counter64(c) => write!(f, "{}", c),
            SnmpValue::Gauge(g) => write!(f, "{}", g),
            SnmpValue::Ticks(t) => write!(f, "{}", t),
            SnmpValue::Str(s) => f.write_str(s),
            SnmpValue::Oid(o) => f.write_str(o),
            SnmpValue::Address(a) => f.write_str(a),
            SnmpValue::Null => Ok(()),
            SnmpValue::Other(o) => f.write_str(o),
        }
    }
}

/// One row fragment from a table walk: the OID suffix below the walked
/// prefix plus the decoded value.
#[derive(Clone, Debug, PartialEq)]
pub struct TableEntry {
    pub index: Vec<u64>,
    pub value: SnmpValue,
}

fn parse_parts(oid: &str) -> Result<Vec<u64>, SnmpError> {
    let parts: Result<Vec<u64>, _> = oid
        .trim()
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>())
        .collect();
    match parts {
        Ok(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(SnmpError::InvalidOid(oid.to_string())),
    }
}

fn make_oid(parts: &[u64], text: &str) -> Result<Oid<'static>, SnmpError> {
    Oid::from(parts)
        .map(|oid| oid.to_owned())
        .map_err(|_| SnmpError::InvalidOid(text.to_string()))
}

/// Blocking SNMP client for one target device.
pub struct SnmpClient {
    session: SyncSession,
    target: String,
}

impl SnmpClient {
    pub fn connect(opts: &SnmpOpts) -> Result<Self, SnmpError> {
        let target = format!("{}:{}", opts.hostname, opts.port);
        let community = opts.community.as_bytes();
        let timeout = Some(Duration::from_secs(opts.timeout));

        let session = if opts.v2c {
            SyncSession::new_v2c(target.as_str(), community, timeout, 0)
        } else {
            SyncSession::new_v1(target.as_str(), community, timeout, 0)
        }
        .map_err(|e| SnmpError::Session {
            target: target.clone(),
            detail: format!("{:?}", e),
        })?;

        Ok(SnmpClient { session, target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// GET a single value. A missing object is an error; use
    /// [`SnmpClient::try_get`] where "not there" is an expected answer.
    pub fn get(&mut self, oid: &str) -> Result<SnmpValue, SnmpError> {
        match self.try_get(oid)? {
            Some(value) => Ok(value),
            None => Err(SnmpError::NoSuchObject(oid.to_string())),
        }
    }

    /// GET a single value, mapping noSuchObject/noSuchInstance/endOfMibView
    /// to `None` so lookups with a fallback stay normal control flow.
    pub fn try_get(&mut self, oid: &str) -> Result<Option<SnmpValue>, SnmpError> {
        let parts = parse_parts(oid)?;
        let parsed = make_oid(&parts, oid)?;

        let mut pdu = self
            .session
            .get(&parsed)
            .map_err(|e| SnmpError::Request {
                op: "get",
                oid: oid.to_string(),
                detail: format!("{:?}", e),
            })?;

        let (_, value) = pdu
            .varbinds
            .next()
            .ok_or_else(|| SnmpError::EmptyResponse(oid.to_string()))?;

        let decoded = match value {
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => None,
            ref v => Some(SnmpValue::decode(v)),
        };
        debug!("get {} -> {:?}", oid, decoded);
        Ok(decoded)
    }

    /// GET `base.<index components>`.
    pub fn get_indexed(
        &mut self,
        base: &str,
        index: &[u64],
    ) -> Result<Option<SnmpValue>, SnmpError> {
        let mut oid = base.trim_end_matches('.').to_string();
        for part in index {
            oid.push('.');
            oid.push_str(&part.to_string());
        }
        self.try_get(&oid)
    }

    /// Walk a table with repeated GETNEXT, collecting every row under the
    /// prefix. Stops at the first OID outside the prefix, at end-of-MIB,
    /// and on a non-advancing agent. An empty result is not an error here;
    /// each checker decides what an absent table means.
    pub fn walk(&mut self, base: &str) -> Result<Vec<TableEntry>, SnmpError> {
        let base_parts = parse_parts(base)?;
        let mut current_parts = base_parts.clone();
        let mut current = make_oid(&current_parts, base)?;
        let mut entries = Vec::new();

        loop {
            let mut pdu = self
                .session
                .getnext(&current)
                .map_err(|e| SnmpError::Request {
                    op: "getnext",
                    oid: base.to_string(),
                    detail: format!("{:?}", e),
                })?;

            let Some((oid, value)) = pdu.varbinds.next() else {
                break;
            };
            if matches!(value, Value::EndOfMibView) {
                break;
            }

            let parts: Vec<u64> = match oid.iter() {
                Some(iter) => iter.collect(),
                None => break,
            };
            if parts.len() <= base_parts.len() || parts[..base_parts.len()] != base_parts[..] {
                break;
            }
            // An agent that does not advance lexicographically would loop
            // forever; bail out instead.
            if parts == current_parts {
                break;
            }

            entries.push(TableEntry {
                index: parts[base_parts.len()..].to_vec(),
                value: SnmpValue::decode(&value),
            });

            current = make_oid(&parts, base)?;
            current_parts = parts;
        }

        debug!("walk {} -> {} rows", base, entries.len());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        assert_eq!(
            parse_parts("1.3.6.1.2.1.1.5.0").unwrap(),
            vec![1, 3, 6, 1, 2, 1, 1, 5, 0]
        );
        // Leading dots are tolerated, as in `.1.3.6`.
        assert_eq!(parse_parts(".1.3.6").unwrap(), vec![1, 3, 6]);
        assert!(parse_parts("").is_err());
        assert!(parse_parts("1.3.abc").is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(SnmpValue::Int(-4).as_i64(), Some(-4));
        assert_eq!(SnmpValue::Int(-4).as_u64(), None);
        assert_eq!(SnmpValue::Counter32(7).as_u64(), Some(7));
        assert_eq!(SnmpValue::Counter64(u64::MAX).as_i64(), None);
        assert_eq!(SnmpValue::Str("Fan 1".into()).as_str(), Some("Fan 1"));
        assert_eq!(SnmpValue::Str("Fan 1".into()).as_i64(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(SnmpValue::Gauge(42).to_string(), "42");
        assert_eq!(SnmpValue::Address("10.0.0.1".into()).to_string(), "10.0.0.1");
        assert_eq!(SnmpValue::Str("PowerA".into()).to_string(), "PowerA");
    }
}
