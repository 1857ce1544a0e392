use bytes::{BufMut, Bytes, BytesMut};

/// Protocol version string plus an ordered multimap of header name to
/// string value.
///
/// Serialized form: `<version>\r\n(<key>:<value>\r\n)*\r\n`. Keys must not
/// contain `:`; values may (the split uses the first `:` only). Lines
/// lacking a `:`, or whose `:` is the first character, are silently
/// skipped during parsing rather than treated as an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    version: String,
    pairs: Vec<(String, String)>,
}

impl Header {
    pub const DEFAULT_VERSION: &'static str = "NATS/1.0";

    pub fn new() -> Self {
        Header {
            version: Self::DEFAULT_VERSION.to_owned(),
            pairs: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Append a key/value pair. Duplicate keys are preserved in order
    /// (this is a multimap, not a map).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.version.len() + 2 + self.pairs.len() * 16 + 2);
        buf.put_slice(self.version.as_bytes());
        buf.put_slice(b"\r\n");
        for (k, v) in &self.pairs {
            buf.put_slice(k.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Parse a header blob of the form `<version>\r\n(<key>:<value>\r\n)*\r\n`.
    ///
    /// Only the version line is taken as-is; subsequent lines missing a
    /// `:`, or with `:` as the first character, are silently dropped.
    pub fn from_bytes(bytes: &[u8]) -> Header {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.split("\r\n");
        let version = lines.next().unwrap_or(Self::DEFAULT_VERSION).to_owned();
        let mut pairs = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.find(':') {
                Some(0) | None => continue,
                Some(idx) => {
                    let key = &line[..idx];
                    let value = &line[idx + 1..];
                    pairs.push((key.to_owned(), value.to_owned()));
                }
            }
        }
        Header { version, pairs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ordered_multimap() {
        let mut h = Header::new();
        h.insert("Nats-Msg-Id", "abc123");
        h.insert("X-Trace", "one:two:three");
        h.insert("X-Trace", "second-value");

        let bytes = h.to_bytes();
        let parsed = Header::from_bytes(&bytes);

        assert_eq!(parsed.version(), "NATS/1.0");
        assert_eq!(parsed.get("Nats-Msg-Id"), Some("abc123"));
        assert_eq!(
            parsed.get_all("X-Trace").collect::<Vec<_>>(),
            vec!["one:two:three", "second-value"]
        );
    }

    #[test]
    fn skips_malformed_lines() {
        let blob = b"NATS/1.0\r\nok:value\r\nno-colon-here\r\n:starts-with-colon\r\n\r\n";
        let h = Header::from_bytes(blob);
        assert_eq!(h.get("ok"), Some("value"));
        assert_eq!(h.iter().count(), 1);
    }

    #[test]
    fn value_may_contain_colon_split_on_first() {
        let blob = b"NATS/1.0\r\nkey:a:b:c\r\n\r\n";
        let h = Header::from_bytes(blob);
        assert_eq!(h.get("key"), Some("a:b:c"));
    }
}
