use crate::def::{Definition, OptionMap, RecordingDef, SignalRef, StreamDef, Value};
use crate::error::{LanguageError, Result};

/// Parse a connection definition text into clauses, preserving source
/// order.
///
/// Parsing is pure and deterministic: the same text always yields a
/// structurally equal definition sequence.
pub fn parse(text: &str) -> Result<Vec<Definition>> {
    let mut parser = Parser { src: text, pos: 0 };
    let mut definitions = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            break;
        }
        definitions.push(parser.definition()?);
    }
    Ok(definitions)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn error(&self, expected: &'static str) -> LanguageError {
        let fragment: String = self.rest().chars().take(24).collect();
        LanguageError::Syntax {
            offset: self.pos,
            expected,
            fragment,
        }
    }

    fn definition(&mut self) -> Result<Definition> {
        let at = self.pos;
        let keyword = self
            .ident()
            .ok_or_else(|| self.error("`stream` or `recording`"))?;
        match keyword {
            "stream" => self.stream().map(Definition::Stream),
            "recording" => self.recording().map(Definition::Recording),
            other => Err(LanguageError::Syntax {
                offset: at,
                expected: "`stream` or `recording`",
                fragment: other.to_string(),
            }),
        }
    }

    fn stream(&mut self) -> Result<StreamDef> {
        let recording = self.uri()?;
        let pipe = self.quoted()?;
        let options = self.options()?;
        let signals = self.signals()?;
        Ok(StreamDef {
            recording,
            pipe,
            options,
            signals,
        })
    }

    fn recording(&mut self) -> Result<RecordingDef> {
        let recording = self.uri()?;
        let pipe = self.quoted()?;
        let options = self.options()?;
        let signals = self.signals()?;
        let metadata = self.metadata_block()?;
        Ok(RecordingDef {
            recording,
            pipe,
            options,
            signals,
            metadata,
        })
    }

    /// `<...>`, content returned without the brackets.
    fn uri(&mut self) -> Result<String> {
        self.skip_trivia();
        if self.peek() != Some('<') {
            return Err(self.error("`<uri>`"));
        }
        let open = self.pos;
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '>' {
                let uri = self.src[start..self.pos].to_string();
                self.bump();
                return Ok(uri);
            }
            self.bump();
        }
        Err(LanguageError::Unterminated {
            what: "uri",
            offset: open,
        })
    }

    /// `"..."` with `\"` and `\\` escapes.
    fn quoted(&mut self) -> Result<String> {
        self.skip_trivia();
        if self.peek() != Some('"') {
            return Err(self.error("quoted string"));
        }
        let open = self.pos;
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => return Ok(out),
                '\\' => match self.bump() {
                    Some(escaped @ ('"' | '\\')) => out.push(escaped),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                _ => out.push(c),
            }
        }
        Err(LanguageError::Unterminated {
            what: "quoted string",
            offset: open,
        })
    }

    /// `key=value` and bare-flag options, until a structural delimiter
    /// or the next `sig:` clause.
    fn options(&mut self) -> Result<OptionMap> {
        let mut map = OptionMap::default();
        loop {
            self.skip_trivia();
            match self.peek() {
                None | Some('(') | Some(')') | Some('{') => break,
                _ => {}
            }
            if self.rest().starts_with("sig:") {
                break;
            }
            let key = match self.ident() {
                Some(key) => key.to_string(),
                None => return Err(self.error("option name")),
            };
            self.skip_trivia();
            if self.peek() == Some('=') {
                self.bump();
                let value = self.value()?;
                map.insert(key, value);
            } else {
                map.insert(key, Value::Flag(true));
            }
        }
        Ok(map)
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_trivia();
        match self.peek() {
            Some('<') => Ok(Value::Uri(self.uri()?)),
            Some('"') => Ok(Value::Str(self.quoted()?)),
            Some(_) => {
                let token = self.bare_token();
                if token.is_empty() {
                    return Err(self.error("option value"));
                }
                Ok(match token {
                    "true" => Value::Flag(true),
                    "false" => Value::Flag(false),
                    _ => match token.parse::<f64>() {
                        Ok(number) => Value::Number(number),
                        Err(_) => Value::Token(token.to_string()),
                    },
                })
            }
            None => Err(self.error("option value")),
        }
    }

    /// `( sig:<uri> options ... )`
    fn signals(&mut self) -> Result<Vec<SignalRef>> {
        self.skip_trivia();
        if self.peek() != Some('(') {
            return Err(self.error("`(`"));
        }
        self.bump();
        let mut signals = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            if !self.rest().starts_with("sig:") {
                return Err(self.error("`sig:<uri>` or `)`"));
            }
            self.pos += "sig:".len();
            let uri = self.uri()?;
            let options = self.options()?;
            signals.push(SignalRef { uri, options });
        }
        if signals.is_empty() {
            return Err(self.error("at least one `sig:<uri>` clause"));
        }
        Ok(signals)
    }

    /// Optional `{ ... }` metadata fragment, captured verbatim with
    /// nested braces balanced.
    fn metadata_block(&mut self) -> Result<Option<String>> {
        self.skip_trivia();
        if self.peek() != Some('{') {
            return Ok(None);
        }
        let open = self.pos;
        self.bump();
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos - 1;
                        return Ok(Some(self.src[start..end].to_string()));
                    }
                }
                _ => {}
            }
        }
        Err(LanguageError::Unterminated {
            what: "metadata block",
            offset: open,
        })
    }

    fn ident(&mut self) -> Option<&'a str> {
        self.skip_trivia();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            None
        } else {
            Some(&self.src[start..self.pos])
        }
    }

    fn bare_token(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}' | '<' | '>' | '"') {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::keys;

    #[test]
    fn parses_minimal_stream_clause() {
        let defs = parse(r#"stream <rec1> "/tmp/p1" (sig:<a> sig:<b>)"#)
            .expect("definition should parse");
        assert_eq!(defs.len(), 1);
        let Definition::Stream(def) = &defs[0] else {
            panic!("expected a stream definition");
        };
        assert_eq!(def.recording, "rec1");
        assert_eq!(def.pipe, "/tmp/p1");
        assert!(def.options.is_empty());
        let uris: Vec<_> = def.signals.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["a", "b"]);
    }

    #[test]
    fn parses_stream_then_recording_on_one_pipe() {
        let text = r#"
            stream <rec1> "/tmp/p1" (sig:<a> sig:<b>)
            recording <rec2> "/tmp/p1" (sig:<c> sig:<d>)
        "#;
        let defs = parse(text).expect("definitions should parse");
        assert_eq!(defs.len(), 2);
        assert!(matches!(defs[0], Definition::Stream(_)));
        assert!(matches!(defs[1], Definition::Recording(_)));
        assert_eq!(defs[0].pipe(), defs[1].pipe());
    }

    #[test]
    fn parses_options_at_both_levels() {
        let text = r#"
            stream <http://example.org/rec> "/run/sig.pipe" rate=256 binary x-vendor=abc (
                sig:<http://example.org/rec/ecg> units=mV label="lead II"
                sig:<http://example.org/rec/resp> units=<http://example.org/units/kPa>
            )
        "#;
        let defs = parse(text).expect("definitions should parse");
        let Definition::Stream(def) = &defs[0] else {
            panic!("expected a stream definition");
        };
        assert_eq!(def.options.number(keys::RATE), Some(256.0));
        assert!(def.options.flag(keys::BINARY));
        // Unknown key passes through untouched.
        assert_eq!(def.options.text("x-vendor"), Some("abc"));

        assert_eq!(def.signals[0].options.text(keys::UNITS), Some("mV"));
        assert_eq!(def.signals[0].options.text(keys::LABEL), Some("lead II"));
        assert_eq!(
            def.signals[1].options.get(keys::UNITS),
            Some(&Value::Uri("http://example.org/units/kPa".to_string()))
        );
    }

    #[test]
    fn recording_metadata_fragment_is_verbatim() {
        let text = r#"
            recording <rec2> "/tmp/p1" rate=100 (sig:<c>) {
                <> dct:title "weird {nested} braces" .
            }
        "#;
        let defs = parse(text).expect("definitions should parse");
        let Definition::Recording(def) = &defs[0] else {
            panic!("expected a recording definition");
        };
        let fragment = def.metadata.as_deref().expect("fragment should be kept");
        assert!(fragment.contains(r#"dct:title "weird {nested} braces""#));
    }

    #[test]
    fn recording_without_metadata_block() {
        let defs =
            parse(r#"recording <rec2> "/tmp/p1" rate=10 (sig:<c>)"#).expect("should parse");
        let Definition::Recording(def) = &defs[0] else {
            panic!("expected a recording definition");
        };
        assert!(def.metadata.is_none());
    }

    #[test]
    fn parsing_is_deterministic_and_idempotent() {
        let text = r#"
            # two-leg pipeline
            stream <rec1> "/tmp/p1" rate=100 segment=10:5 (sig:<a> dtype=f8 sig:<b>)
            recording <rec2> "/tmp/p1" rate=100 (sig:<c> sig:<d>) { <> dct:source <rec1> . }
        "#;
        let first = parse(text).expect("first parse should succeed");
        let second = parse(text).expect("second parse should succeed");
        assert_eq!(first, second);
    }

    #[test]
    fn reports_offending_fragment() {
        let err = parse(r#"stream <rec1> "/tmp/p1" (wrong:<a>)"#)
            .expect_err("bad signal clause should fail");
        match err {
            LanguageError::Syntax { fragment, .. } => assert!(fragment.starts_with("wrong:")),
            other => panic!("expected a syntax error, got {other}"),
        }
    }

    #[test]
    fn rejects_unknown_keyword() {
        let err = parse("pipeline <x> \"/tmp/p\" (sig:<a>)").expect_err("should fail");
        assert!(matches!(err, LanguageError::Syntax { .. }));
    }

    #[test]
    fn rejects_unterminated_uri_and_string() {
        assert!(matches!(
            parse("stream <rec1 \"/tmp/p\" (sig:<a>)"),
            Err(LanguageError::Unterminated { what: "uri", .. })
        ));
        assert!(matches!(
            parse("stream <rec1> \"/tmp/p (sig:<a>)"),
            Err(LanguageError::Unterminated {
                what: "quoted string",
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_signal_list() {
        let err = parse(r#"stream <rec1> "/tmp/p1" ()"#).expect_err("should fail");
        assert!(matches!(err, LanguageError::Syntax { .. }));
    }

    #[test]
    fn escaped_quotes_in_pipe_names() {
        let defs = parse(r#"stream <r> "/tmp/odd\"name" (sig:<a>)"#).expect("should parse");
        assert_eq!(defs[0].pipe(), "/tmp/odd\"name");
    }
}
