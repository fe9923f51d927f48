//! Addressing sub-values inside JSON/YAML-shaped documents
//!
//! A [`Path`] is an ordered list of [`Segment`]s. String segments index object
//! keys; integer segments index arrays, or object keys in their decimal form.
//!
//! Paths are written either as a sequence (`[database, 0, password]`) or as a
//! dotted string (`database.0.password`) where `\.` and `\\` escape a literal
//! dot or backslash.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::DataError;

/// A single step of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key
    Key(String),
    /// Array index (or numeric object key)
    Index(usize),
}

impl Segment {
    fn as_key(&self) -> Cow<'_, str> {
        match self {
            Segment::Key(key) => Cow::Borrowed(key),
            Segment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Container created when this segment has to pass through a missing node
    fn empty_container(&self) -> Value {
        match self {
            Segment::Key(_) => Value::Object(Map::new()),
            Segment::Index(_) => Value::Array(Vec::new()),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => {
                for c in key.chars() {
                    if c == '.' || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{c}")?;
                }
                Ok(())
            }
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Segment::Key(key) => serializer.serialize_str(key),
            Segment::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawSegment {
            Index(u64),
            Key(String),
        }

        match RawSegment::deserialize(deserializer)? {
            RawSegment::Index(index) => usize::try_from(index)
                .map(Segment::Index)
                .map_err(serde::de::Error::custom),
            RawSegment::Key(key) => Ok(Segment::Key(key)),
        }
    }
}

/// Location of a sub-value inside a document; the empty path is the whole document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// The empty path, addressing the whole document
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Parse a dotted path such as `a.b\.c.0`
    ///
    /// Segments made only of digits (without leading zeros) become indexes;
    /// everything else is an object key. An empty string is the root path.
    pub fn parse_dotted(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root();
        }

        let mut segments = Vec::new();
        let mut scratch = String::new();
        let mut escaped = false;

        for c in raw.chars() {
            match (c, escaped) {
                ('\\', false) => escaped = true,
                ('\\', true) | ('.', true) => {
                    scratch.push(c);
                    escaped = false;
                }
                ('.', false) => segments.push(segment_from_text(std::mem::take(&mut scratch))),
                (_, true) => {
                    scratch.push('\\');
                    scratch.push(c);
                    escaped = false;
                }
                (_, false) => scratch.push(c),
            }
        }

        if escaped {
            scratch.push('\\');
        }
        segments.push(segment_from_text(scratch));

        Self(segments)
    }
}

fn segment_from_text(text: String) -> Segment {
    let canonical_number = !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit())
        && (text == "0" || !text.starts_with('0'));

    if canonical_number {
        if let Ok(index) = text.parse::<usize>() {
            return Segment::Index(index);
        }
    }
    Segment::Key(text)
}

impl FromStr for Path {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_dotted(s))
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.0)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPath {
            Segments(Vec<Segment>),
            Dotted(String),
        }

        Ok(match RawPath::deserialize(deserializer)? {
            RawPath::Segments(segments) => Path(segments),
            RawPath::Dotted(raw) => Path::parse_dotted(&raw),
        })
    }
}

/// Read the sub-value at `path`
///
/// Absent keys and out-of-range indexes yield [`DataError::MissingData`];
/// indexing a scalar, or an array with a key, yields [`DataError::Type`].
pub fn read<'a>(document: &'a Value, path: &Path) -> Result<&'a Value, DataError> {
    let mut node = document;

    for (depth, segment) in path.segments().iter().enumerate() {
        node = match (node, segment) {
            (Value::Object(map), segment) => {
                let key = segment.as_key();
                map.get(key.as_ref()).ok_or_else(|| {
                    DataError::MissingData(format!(
                        "object has no property '{key}' at '{}'",
                        prefix(path, depth)
                    ))
                })?
            }
            (Value::Array(items), Segment::Index(index)) => items.get(*index).ok_or_else(|| {
                DataError::MissingData(format!(
                    "array has no element at index {index} at '{}'",
                    prefix(path, depth)
                ))
            })?,
            (Value::Array(_), Segment::Key(key)) => {
                return Err(DataError::Type(format!(
                    "tried to index an array with key '{key}' at '{}'",
                    prefix(path, depth)
                )))
            }
            (_, _) => {
                return Err(DataError::Type(format!(
                    "tried to index into a non-array, non-object value at '{}'",
                    prefix(path, depth)
                )))
            }
        };
    }

    Ok(node)
}

/// Largest array [`write`] will grow by padding with `null`
pub const MAX_ARRAY_LEN: usize = 1 << 16;

/// Write `new_value` at `path`, creating intermediate containers as needed
///
/// Missing (or `null`) nodes along the way become a map or an array depending
/// on the segment that indexes them. Arrays are padded with `null` up to the
/// requested index, up to [`MAX_ARRAY_LEN`] elements. An empty path replaces
/// the whole document.
pub fn write(document: &mut Value, path: &Path, new_value: Value) -> Result<(), DataError> {
    write_at(document, path, 0, new_value)
}

fn write_at(node: &mut Value, path: &Path, depth: usize, new_value: Value) -> Result<(), DataError> {
    let Some(segment) = path.segments().get(depth) else {
        *node = new_value;
        return Ok(());
    };

    if node.is_null() {
        *node = segment.empty_container();
    }

    let child = match (node, segment) {
        (Value::Object(map), segment) => map
            .entry(segment.as_key().into_owned())
            .or_insert(Value::Null),
        (Value::Array(items), Segment::Index(index)) => {
            if *index >= items.len() {
                let len = index
                    .checked_add(1)
                    .filter(|len| *len <= MAX_ARRAY_LEN)
                    .ok_or_else(|| {
                        DataError::Type(format!(
                            "array index {index} at '{}' is larger than {MAX_ARRAY_LEN} elements",
                            prefix(path, depth)
                        ))
                    })?;
                items.resize(len, Value::Null);
            }
            &mut items[*index]
        }
        (Value::Array(_), Segment::Key(key)) => {
            return Err(DataError::Type(format!(
                "tried to index an array with key '{key}' at '{}'",
                prefix(path, depth)
            )))
        }
        (_, _) => {
            return Err(DataError::Type(format!(
                "tried to index into a non-array, non-object value at '{}'",
                prefix(path, depth)
            )))
        }
    };

    write_at(child, path, depth + 1, new_value)
}

fn prefix(path: &Path, depth: usize) -> Path {
    Path(path.segments()[..depth].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[Segment]) -> Path {
        Path::new(segments.to_vec())
    }

    #[test]
    fn test_parse_dotted() {
        let parsed = Path::parse_dotted("database.replicas.0.password");
        assert_eq!(
            parsed,
            path(&[
                "database".into(),
                "replicas".into(),
                0.into(),
                "password".into()
            ])
        );
    }

    #[test]
    fn test_parse_dotted_escapes() {
        let parsed = Path::parse_dotted(r"example\.com.back\\slash.lit\eral");
        assert_eq!(
            parsed,
            path(&["example.com".into(), r"back\slash".into(), r"lit\eral".into()])
        );
    }

    #[test]
    fn test_parse_dotted_keeps_leading_zero_keys() {
        let parsed = Path::parse_dotted("codes.007");
        assert_eq!(parsed, path(&["codes".into(), "007".into()]));
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert!(Path::parse_dotted("").is_empty());
    }

    #[test]
    fn test_display_escapes() {
        let p = path(&["a.b".into(), 3.into()]);
        assert_eq!(p.to_string(), r"a\.b.3");
        assert_eq!(Path::parse_dotted(&p.to_string()), p);
    }

    #[test]
    fn test_deserialize_sequence_and_dotted() {
        let from_seq: Path = serde_yaml::from_str("[db, 1, pass]").unwrap();
        let from_str: Path = serde_yaml::from_str("db.1.pass").unwrap();
        assert_eq!(from_seq, from_str);
        assert_eq!(serde_json::to_string(&from_seq).unwrap(), r#"["db",1,"pass"]"#);
    }

    #[test]
    fn test_read_nested() {
        let doc = json!({"db": {"hosts": ["a", "b"], "port": 5432}});
        let value = read(&doc, &Path::parse_dotted("db.hosts.1")).unwrap();
        assert_eq!(value, &json!("b"));
    }

    #[test]
    fn test_read_numeric_object_key() {
        let doc = json!({"2024": {"key": "v"}});
        let value = read(&doc, &Path::parse_dotted("2024.key")).unwrap();
        assert_eq!(value, &json!("v"));
    }

    #[test]
    fn test_read_missing_key_is_missing_data() {
        let doc = json!({"db": {}});
        let err = read(&doc, &Path::parse_dotted("db.password")).unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_read_out_of_range_is_missing_data() {
        let doc = json!({"list": [1, 2]});
        let err = read(&doc, &Path::parse_dotted("list.5")).unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_write_huge_index_is_type_error() {
        let mut doc = json!({"list": []});

        let err = write(&mut doc, &Path::parse_dotted("list.18446744073709551615"), json!(1)).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));

        let err = write(&mut doc, &Path::parse_dotted("list.4000000000"), json!(1)).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));

        let err = write(&mut doc, &Path::parse_dotted("fresh.65536"), json!(1)).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));
        assert_eq!(doc["list"], json!([]));
    }

    #[test]
    fn test_write_up_to_array_limit() {
        let mut doc = json!({});
        let index = MAX_ARRAY_LEN - 1;
        write(&mut doc, &Path::parse_dotted(&format!("list.{index}")), json!("last")).unwrap();

        let list = doc["list"].as_array().unwrap();
        assert_eq!(list.len(), MAX_ARRAY_LEN);
        assert_eq!(list[index], json!("last"));
    }

    #[test]
    fn test_read_through_scalar_is_type_error() {
        let doc = json!({"name": "x"});
        let err = read(&doc, &Path::parse_dotted("name.first")).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));
    }

    #[test]
    fn test_read_array_with_key_is_type_error() {
        let doc = json!({"list": [1]});
        let err = read(&doc, &Path::parse_dotted("list.first")).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));
    }

    #[test]
    fn test_write_creates_containers_from_next_segment() {
        let mut doc = json!({});
        write(&mut doc, &Path::parse_dotted("a.0.b"), json!(true)).unwrap();
        assert_eq!(doc, json!({"a": [{"b": true}]}));
    }

    #[test]
    fn test_write_pads_arrays_with_null() {
        let mut doc = json!({"list": ["x"]});
        write(&mut doc, &Path::parse_dotted("list.3"), json!("y")).unwrap();
        assert_eq!(doc, json!({"list": ["x", null, null, "y"]}));
    }

    #[test]
    fn test_write_root_array_growth() {
        let mut doc = json!([]);
        write(&mut doc, &path(&[2.into()]), json!(1)).unwrap();
        assert_eq!(doc, json!([null, null, 1]));
    }

    #[test]
    fn test_write_empty_path_replaces_document() {
        let mut doc = json!({"old": 1});
        write(&mut doc, &Path::root(), json!({"new": 2})).unwrap();
        assert_eq!(doc, json!({"new": 2}));
    }

    #[test]
    fn test_write_preserves_siblings() {
        let mut doc = json!({"db": {"user": "a", "pass": "b"}, "other": 1});
        write(&mut doc, &Path::parse_dotted("db.pass"), json!("c")).unwrap();
        assert_eq!(doc, json!({"db": {"user": "a", "pass": "c"}, "other": 1}));
    }

    #[test]
    fn test_write_through_scalar_is_type_error() {
        let mut doc = json!({"name": "x"});
        let err = write(&mut doc, &Path::parse_dotted("name.first"), json!(1)).unwrap_err();
        assert!(matches!(err, DataError::Type(_)));
    }

    #[test]
    fn test_write_then_read_from_empty_document() {
        let paths = [
            "a",
            "a.b.c",
            "list.0",
            "list.4.name",
            "m.2.3",
            r"dotted\.key.0",
        ];
        for raw in paths {
            let p = Path::parse_dotted(raw);
            for leaf in [json!("s"), json!(7), json!(null), json!({"k": [1]})] {
                let mut doc = Value::Object(Map::new());
                write(&mut doc, &p, leaf.clone()).unwrap();
                assert_eq!(read(&doc, &p).unwrap(), &leaf, "path {raw}");
            }
        }
    }
}
