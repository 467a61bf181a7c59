use std::fmt::Write as _;

/// Dublin Core terms namespace.
pub const DCT: &str = "http://purl.org/dc/terms/";

/// sigmux vocabulary namespace.
pub const SMX: &str = "https://w3id.org/sigmux/ns#";

/// Provenance predicate linking a new recording to the recordings it
/// was derived from.
pub const DCT_SOURCE: &str = "http://purl.org/dc/terms/source";

/// Object position of a statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Uri(String),
    Literal(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

/// A small statement graph plus verbatim turtle fragments.
///
/// Fragments supplied in a recording definition are merged with the
/// generated statements, never replacing them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    uri: String,
    base: Option<String>,
    statements: Vec<Statement>,
    fragments: Vec<String>,
}

impl Graph {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// The resource this graph describes.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Set the `@base` emitted when serializing, used to anchor relative
    /// references in merged fragments.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn add(&mut self, subject: &str, predicate: &str, object: Object) {
        self.statements.push(Statement {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object,
        });
    }

    /// State that `subject` was derived from `source`.
    pub fn add_source(&mut self, subject: &str, source: &str) {
        self.add(subject, DCT_SOURCE, Object::Uri(source.to_string()));
    }

    /// Copy another graph's statements and fragments into this one.
    pub fn extend_from(&mut self, other: &Graph) {
        self.statements.extend(other.statements.iter().cloned());
        self.fragments.extend(other.fragments.iter().cloned());
    }

    /// Attach a verbatim turtle fragment.
    pub fn merge_fragment(&mut self, turtle: &str) {
        let turtle = turtle.trim();
        if !turtle.is_empty() {
            self.fragments.push(turtle.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.fragments.is_empty()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Render the graph as turtle: `@base`/`@prefix` headers, generated
    /// statements, then the verbatim fragments.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(base) = &self.base {
            let _ = writeln!(out, "@base <{base}> .");
        }
        let _ = writeln!(out, "@prefix dct: <{DCT}> .");
        let _ = writeln!(out, "@prefix smx: <{SMX}> .");
        for statement in &self.statements {
            let object = match &statement.object {
                Object::Uri(uri) => format!("<{uri}>"),
                Object::Literal(text) => format!("\"{}\"", text.replace('"', "\\\"")),
            };
            let _ = writeln!(
                out,
                "<{}> <{}> {object} .",
                statement.subject, statement.predicate
            );
        }
        for fragment in &self.fragments {
            out.push('\n');
            out.push_str(fragment);
            out.push('\n');
        }
        out
    }
}

/// Describe one source recording, optionally restricted to a temporal
/// segment. The returned graph's URI is the segment node when one is
/// present, otherwise the recording itself.
pub fn data_source(recording_uri: &str, segment: Option<(f64, Option<f64>)>) -> Graph {
    let Some((start, duration)) = segment else {
        return Graph::new(recording_uri);
    };
    let seg_uri = format!("{recording_uri}#segment");
    let mut graph = Graph::new(seg_uri.clone());
    graph.add(
        &seg_uri,
        &format!("{SMX}segment_of"),
        Object::Uri(recording_uri.to_string()),
    );
    graph.add(
        &seg_uri,
        &format!("{SMX}start"),
        Object::Literal(start.to_string()),
    );
    if let Some(duration) = duration {
        graph.add(
            &seg_uri,
            &format!("{SMX}duration"),
            Object::Literal(duration.to_string()),
        );
    }
    graph
}
