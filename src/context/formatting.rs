//! Wire encoding of context data for transport hops.
//!
//! The format is a flat string of sections, one per data direction:
//!
//! ```text
//! d|key:value|key:value||b|key:value||u|key:value
//! ```
//!
//! - `d` downstream, `b` bidirectional, `u` upstream
//! - sections are joined with `||`, entries within a section with `|`
//! - an entry is written as `:base64(key):base64(value)` when its key is
//!   empty, when its key or value contains `|`, `:` or anything outside
//!   printable ASCII, or when either starts or ends with a space; this keeps
//!   the result a valid header value that survives whitespace trimming
//! - every other entry is written as plain `key:value`, byte for byte
//!
//! Only entries scoped [`ContextDataScope::AcrossTransports`] are encoded, and
//! an empty set encodes to `None` so transports can omit the header entirely.
//! A receiver may see several header values; each one is decoded and the
//! entries accumulate.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::conqueror_context::ConquerorContext;
use super::data::{ContextData, ContextDataScope};
use super::error::ContextError;

/// Which context view an encoded entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextDirection {
    Downstream,
    Upstream,
    Bidirectional,
}

impl ContextDirection {
    fn tag(self) -> char {
        match self {
            ContextDirection::Downstream => 'd',
            ContextDirection::Upstream => 'u',
            ContextDirection::Bidirectional => 'b',
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "d" => Some(ContextDirection::Downstream),
            "u" => Some(ContextDirection::Upstream),
            "b" => Some(ContextDirection::Bidirectional),
            _ => None,
        }
    }
}

/// One decoded (or to-be-encoded) context entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEntry {
    pub direction: ContextDirection,
    pub key: String,
    pub value: String,
}

impl WireEntry {
    pub fn new(direction: ContextDirection, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            direction,
            key: key.into(),
            value: value.into(),
        }
    }
}

fn is_plain(s: &str) -> bool {
    !s.starts_with(' ')
        && !s.ends_with(' ')
        && s.chars()
            .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '|' && c != ':')
}

fn needs_escaping(key: &str, value: &str) -> bool {
    key.is_empty() || !is_plain(key) || !is_plain(value)
}

/// Encode entries into the wire format.
///
/// Entries are grouped by direction in first-seen order. Returns `None` when
/// there is nothing to encode.
pub fn encode(entries: &[WireEntry]) -> Option<String> {
    let mut directions: Vec<ContextDirection> = Vec::new();
    for entry in entries {
        if !directions.contains(&entry.direction) {
            directions.push(entry.direction);
        }
    }

    let mut out = String::new();
    for direction in directions {
        if !out.is_empty() {
            out.push_str("||");
        }
        out.push(direction.tag());

        for entry in entries.iter().filter(|e| e.direction == direction) {
            out.push('|');
            if needs_escaping(&entry.key, &entry.value) {
                out.push(':');
                out.push_str(&STANDARD.encode(&entry.key));
                out.push(':');
                out.push_str(&STANDARD.encode(&entry.value));
            } else {
                out.push_str(&entry.key);
                out.push(':');
                out.push_str(&entry.value);
            }
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Decode one or more wire values. Empty values are ignored.
pub fn decode<I, S>(values: I) -> Result<Vec<WireEntry>, ContextError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = Vec::new();
    for value in values {
        decode_value(value.as_ref(), &mut entries).map_err(|reason| {
            tracing::debug!(reason, "rejected formatted context data");
            ContextError::FormattedContextDataInvalid
        })?;
    }
    Ok(entries)
}

fn decode_value(value: &str, entries: &mut Vec<WireEntry>) -> Result<(), &'static str> {
    if value.is_empty() {
        return Ok(());
    }

    for section in value.split("||") {
        let mut parts = section.split('|');
        let direction = parts
            .next()
            .and_then(ContextDirection::from_tag)
            .ok_or("unknown section tag")?;

        for part in parts {
            let (key, value) = if let Some(escaped) = part.strip_prefix(':') {
                let (key, value) = escaped.split_once(':').ok_or("missing separator")?;
                (decode_base64(key)?, decode_base64(value)?)
            } else {
                let (key, value) = part.split_once(':').ok_or("missing separator")?;
                if key.is_empty() || value.contains(':') {
                    return Err("unescaped reserved character");
                }
                (key.to_string(), value.to_string())
            };
            entries.push(WireEntry {
                direction,
                key,
                value,
            });
        }
    }
    Ok(())
}

fn decode_base64(encoded: &str) -> Result<String, &'static str> {
    let bytes = STANDARD.decode(encoded).map_err(|_| "invalid base64")?;
    String::from_utf8(bytes).map_err(|_| "invalid utf-8")
}

fn collect(direction: ContextDirection, data: &ContextData, out: &mut Vec<WireEntry>) {
    out.extend(
        data.where_scope_is_across_transports()
            .into_iter()
            .map(|(key, value)| WireEntry::new(direction, key, value)),
    );
}

impl ConquerorContext {
    /// Encode data travelling to a remote handler (downstream + bidirectional).
    pub fn encode_downstream(&self) -> Option<String> {
        let mut entries = Vec::new();
        collect(ContextDirection::Downstream, self.downstream(), &mut entries);
        collect(ContextDirection::Bidirectional, self.bidirectional(), &mut entries);
        encode(&entries)
    }

    /// Encode data travelling back to a remote caller (upstream + bidirectional).
    pub fn encode_upstream(&self) -> Option<String> {
        let mut entries = Vec::new();
        collect(ContextDirection::Upstream, self.upstream(), &mut entries);
        collect(ContextDirection::Bidirectional, self.bidirectional(), &mut entries);
        encode(&entries)
    }

    /// Decode wire values into this context's views.
    ///
    /// Decoded entries are scoped [`ContextDataScope::AcrossTransports`] so they
    /// keep travelling on further hops. Nothing is written if any value is
    /// malformed.
    pub fn decode_into<I, S>(&self, values: I) -> Result<(), ContextError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in decode(values)? {
            let target = match entry.direction {
                ContextDirection::Downstream => self.downstream(),
                ContextDirection::Upstream => self.upstream(),
                ContextDirection::Bidirectional => self.bidirectional(),
            };
            target.set(entry.key, entry.value, ContextDataScope::AcrossTransports);
        }
        Ok(())
    }
}
