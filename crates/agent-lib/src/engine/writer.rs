//! Bounded, transactional JSON text writer
//!
//! Output never grows past a fixed capacity and is always well formed:
//! - every append either fits entirely or writes nothing
//! - the closing `}` of an open object is reserved when the object opens,
//!   so closing can never overflow
//! - members are written with a leading `,`; once an object is known to have
//!   at least one member, that first `,` is rewritten into `{`
//! - an object that ends up with no member is rolled back, key included
//!
//! On overflow, each enclosing object keeps its complete members, closes, and
//! passes the error up. The result is a strict prefix of complete units.

use crate::error::Overflow;

/// Position to roll back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    len: usize,
    reserved: usize,
}

#[derive(Debug)]
pub struct JsonWriter {
    buf: String,
    capacity: usize,
    reserved: usize,
}

impl JsonWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity.min(1 << 16)),
            capacity,
            reserved: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn mark(&self) -> Mark {
        Mark {
            len: self.buf.len(),
            reserved: self.reserved,
        }
    }

    pub fn rollback(&mut self, mark: Mark) {
        self.buf.truncate(mark.len);
        self.reserved = mark.reserved;
    }

    fn remaining(&self) -> usize {
        self.capacity
            .saturating_sub(self.buf.len())
            .saturating_sub(self.reserved)
    }

    /// Appends `fragment` whole, or nothing at all.
    pub fn push(&mut self, fragment: &str) -> Result<(), Overflow> {
        let remaining = self.remaining();
        if fragment.len() > remaining {
            return Err(Overflow {
                requested: fragment.len(),
                remaining,
            });
        }
        self.buf.push_str(fragment);
        Ok(())
    }

    /// Appends `,"key":value` as one unit. `value` must already be JSON.
    pub fn member(&mut self, key: &str, value: &str) -> Result<(), Overflow> {
        let key = quote(key);
        let mut unit = String::with_capacity(key.len() + value.len() + 2);
        unit.push(',');
        unit.push_str(&key);
        unit.push(':');
        unit.push_str(value);
        self.push(&unit)
    }

    /// Writes `,"key":{...}` with members produced by `body`.
    ///
    /// Returns `Ok(false)` when `body` wrote nothing, in which case the key is
    /// not emitted either.
    pub fn object<F>(&mut self, key: &str, body: F) -> Result<bool, Overflow>
    where
        F: FnOnce(&mut Self) -> Result<(), Overflow>,
    {
        let start = self.mark();
        let mut head = String::with_capacity(key.len() + 4);
        head.push(',');
        head.push_str(&quote(key));
        head.push(':');
        self.push(&head)?;
        self.scope(start, body)
    }

    /// Writes a top-level object whose members are produced by `body`.
    pub fn root<F>(&mut self, body: F) -> Result<bool, Overflow>
    where
        F: FnOnce(&mut Self) -> Result<(), Overflow>,
    {
        let start = self.mark();
        self.scope(start, body)
    }

    fn scope<F>(&mut self, start: Mark, body: F) -> Result<bool, Overflow>
    where
        F: FnOnce(&mut Self) -> Result<(), Overflow>,
    {
        let members = self.buf.len();
        self.reserved += 1;

        let result = body(self);

        self.reserved -= 1;
        if self.buf.len() == members {
            self.rollback(start);
            return result.map(|()| false);
        }
        self.retranscribe(members);
        self.buf.push('}');
        result.map(|()| true)
    }

    /// Rewrites the member separator at `at` into an object opener.
    fn retranscribe(&mut self, at: usize) {
        debug_assert_eq!(self.buf.as_bytes().get(at), Some(&b','));
        self.buf.replace_range(at..at + 1, "{");
    }
}

/// JSON string literal for `key`, escaped.
pub fn quote(key: &str) -> String {
    serde_json::to_string(key).unwrap_or_else(|_| String::from("\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap_or_else(|e| panic!("invalid JSON {text:?}: {e}"))
    }

    #[test]
    fn test_object_retranscribes_first_separator() {
        let mut w = JsonWriter::new(1024);
        w.root(|w| {
            w.member("period", "300")?;
            w.object("cpu", |w| {
                w.member("busy", "[1,2,\"%\"]")?;
                w.member("iowait", "[3,\"%\"]")
            })?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            w.as_str(),
            r#"{"period":300,"cpu":{"busy":[1,2,"%"],"iowait":[3,"%"]}}"#
        );
    }

    #[test]
    fn test_empty_object_is_rolled_back_with_its_key() {
        let mut w = JsonWriter::new(1024);
        w.root(|w| {
            w.member("period", "300")?;
            let wrote = w.object("disk", |w| {
                w.object("sda", |_| Ok(()))?;
                w.object("sdb", |_| Ok(()))?;
                Ok(())
            })?;
            assert!(!wrote);
            Ok(())
        })
        .unwrap();
        assert_eq!(w.as_str(), r#"{"period":300}"#);
    }

    #[test]
    fn test_empty_root_leaves_nothing() {
        let mut w = JsonWriter::new(64);
        assert_eq!(w.root(|_| Ok(())), Ok(false));
        assert!(w.is_empty());
    }

    #[test]
    fn test_keys_are_escaped() {
        let mut w = JsonWriter::new(256);
        w.root(|w| w.member("/mnt/with \"quote\"", "1")).unwrap();
        let value = parse(w.as_str());
        assert_eq!(value["/mnt/with \"quote\""], 1);
    }

    #[test]
    fn test_push_is_atomic() {
        let mut w = JsonWriter::new(5);
        assert!(w.push("abc").is_ok());
        let err = w.push("def").unwrap_err();
        assert_eq!(err.requested, 3);
        assert_eq!(err.remaining, 2);
        assert_eq!(w.as_str(), "abc");
    }

    #[test]
    fn test_overflow_keeps_complete_members_and_stays_valid() {
        let full = {
            let mut w = JsonWriter::new(4096);
            write_sample(&mut w).unwrap();
            w.into_string()
        };

        for capacity in 0..=full.len() + 2 {
            let mut w = JsonWriter::new(capacity);
            let result = write_sample(&mut w);
            let text = w.as_str();
            assert!(text.len() <= capacity);
            if text.is_empty() {
                assert!(result.is_err() || capacity >= full.len());
                continue;
            }
            let value = parse(text);
            if result.is_ok() {
                assert_eq!(text, full);
            } else {
                assert!(
                    full.starts_with(text.trim_end_matches('}')),
                    "{text:?} is not a prefix of complete units"
                );
                assert_contained(&value, &parse(&full));
            }
        }
    }

    fn write_sample(w: &mut JsonWriter) -> Result<bool, Overflow> {
        w.root(|w| {
            w.member("host", "\"box\"")?;
            w.object("disk", |w| {
                for device in ["sda", "sdb", "sdc"] {
                    w.object(device, |w| {
                        w.member("rdrate", "[1,5,9,\"r/s\"]")?;
                        w.member("wrrate", "[2,\"w/s\"]")
                    })?;
                }
                Ok(())
            })?;
            w.object("net", |w| {
                w.object("eth0", |w| w.member("rxrate", "[10,20,\"KB/s\"]"))?;
                Ok(())
            })?;
            Ok(())
        })
    }

    /// Every key of `partial` exists in `full`; objects recurse, leaves match.
    fn assert_contained(partial: &serde_json::Value, full: &serde_json::Value) {
        match partial {
            serde_json::Value::Object(map) => {
                let full_map = full.as_object().expect("object in full output");
                assert!(!map.is_empty(), "empty objects are never emitted");
                for (key, value) in map {
                    assert_contained(value, &full_map[key]);
                }
            }
            leaf => assert_eq!(leaf, full),
        }
    }
}
