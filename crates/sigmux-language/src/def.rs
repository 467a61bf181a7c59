use serde::ser::SerializeMap;
use serde::Serialize;

/// A single parsed connection clause, in source order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Definition {
    /// Data source → pipe.
    Stream(StreamDef),
    /// Pipe → data sink.
    Recording(RecordingDef),
}

impl Definition {
    pub fn pipe(&self) -> &str {
        match self {
            Definition::Stream(def) => &def.pipe,
            Definition::Recording(def) => &def.pipe,
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            Definition::Stream(def) => &def.recording,
            Definition::Recording(def) => &def.recording,
        }
    }
}

/// `stream <recording> "pipe" options ( signals )`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamDef {
    pub recording: String,
    pub pipe: String,
    pub options: OptionMap,
    pub signals: Vec<SignalRef>,
}

/// `recording <recording> "pipe" options ( signals ) { metadata }`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordingDef {
    pub recording: String,
    pub pipe: String,
    pub options: OptionMap,
    pub signals: Vec<SignalRef>,
    /// Raw metadata fragment, captured verbatim. Merged with generated
    /// statements, never replacing them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// One `sig:<uri>` clause with its own options.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalRef {
    pub uri: String,
    pub options: OptionMap,
}

/// An option value. Bare tokens keep their spelling; quoted and
/// bracketed forms are unwrapped.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Uri(String),
    Str(String),
    Number(f64),
    Flag(bool),
    Token(String),
}

impl Value {
    /// Textual content, for values that carry text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Uri(text) | Value::Str(text) | Value::Token(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            Value::Str(text) | Value::Token(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> bool {
        match self {
            Value::Flag(flag) => *flag,
            _ => false,
        }
    }
}

/// Ordered option mapping. Unknown keys are preserved and passed
/// through untouched (forward-compatibility contract).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionMap {
    entries: Vec<(String, Value)>,
}

impl OptionMap {
    /// Insert or replace. A key repeated in the source keeps its last
    /// value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// True when the key is present as a set flag.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).map(Value::as_flag).unwrap_or(false)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_number)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for OptionMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
