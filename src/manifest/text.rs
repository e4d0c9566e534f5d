//! The name/value manifest text format.
//!
//! A manifest starts with a `:` line carrying the format version (`: 1`);
//! a bare `:` separates manifests in a list, continuing the previous
//! version. Fields are `name: value` lines. Blank lines and lines whose
//! first non-whitespace character is `#` are ignored between fields. A
//! single trailing backslash continues a value onto the next line (the
//! lines are joined without a newline); a run of two or more trailing
//! backslashes collapses by one, producing literal backslashes. A value
//! of exactly `\` opens a multi-line block terminated by a line of
//! exactly `\`; block lines are preserved verbatim (including comment
//! lines) and joined with newlines, with the same trailing backslash
//! rules applied per line.
//!
//! The parser produces a stream of name/value pairs: the start of each
//! manifest is reported as a pair with an empty name and the version as
//! the value, the end as a pair with both empty. The serializer is the
//! exact inverse.

use crate::error::{PkgmetaError, Result};

/// One parsed name/value pair with its input positions (1-based).
#[derive(Debug, Clone, Default)]
pub struct NameValue {
    pub name: String,
    pub value: String,
    pub name_line: u64,
    pub name_column: u64,
    pub value_line: u64,
    pub value_column: u64,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Whether this is an end-of-manifest pair.
    pub fn is_end(&self) -> bool {
        self.name.is_empty() && self.value.is_empty()
    }
}

const WS: &[char] = &[' ', '\t'];

// Apply the trailing-backslash rules to one line of a value: a single
// trailing backslash requests continuation; two or more collapse by one.
fn unescape_trailing(line: &str) -> (String, bool) {
    let n = line.len() - line.trim_end_matches('\\').len();

    if n == 1 {
        (line[..line.len() - 1].to_string(), true)
    } else if n >= 2 {
        (line[..line.len() - 1].to_string(), false)
    } else {
        (line.to_string(), false)
    }
}

enum ParserState {
    Start,
    Fields,
    Eos,
}

/// Parser of the manifest text format.
pub struct ManifestParser {
    source_name: String,
    lines: Vec<String>,
    li: usize,
    state: ParserState,
    version: String,
}

impl ManifestParser {
    pub fn new(input: &str, source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            lines: input.lines().map(str::to_string).collect(),
            li: 0,
            state: ParserState::Start,
            version: String::new(),
        }
    }

    /// The input source name used in diagnostics.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn error(
        &self,
        line: u64,
        column: u64,
        description: impl Into<String>,
    ) -> PkgmetaError {
        PkgmetaError::parsing(&self.source_name, line, column, description)
    }

    // Skip blank and comment lines.
    fn skip_ignored(&mut self) {
        while let Some(l) = self.lines.get(self.li) {
            let t = l.trim_matches(WS);
            if t.is_empty() || t.starts_with('#') {
                self.li += 1;
            } else {
                break;
            }
        }
    }

    /// The next name/value pair. Returns end pairs indefinitely once
    /// the end of the input is reached.
    pub fn next(&mut self) -> Result<NameValue> {
        match self.state {
            ParserState::Start => self.next_start(),
            ParserState::Fields => self.next_field(),
            ParserState::Eos => Ok(NameValue::default()),
        }
    }

    fn next_start(&mut self) -> Result<NameValue> {
        self.skip_ignored();

        let Some(line) = self.lines.get(self.li).cloned() else {
            self.state = ParserState::Eos;
            return Ok(NameValue::default());
        };

        let ln = (self.li + 1) as u64;
        let indent = line.len() - line.trim_start_matches(WS).len();
        let t = line.trim_matches(WS);

        if !t.starts_with(':') {
            return Err(self.error(
                ln,
                (indent + 1) as u64,
                "start of manifest expected",
            ));
        }

        let v = t[1..].trim_matches(WS);

        let version = if v.is_empty() {
            if self.version.is_empty() {
                return Err(self.error(
                    ln,
                    (indent + 2) as u64,
                    "format version value expected",
                ));
            }
            self.version.clone()
        } else {
            v.to_string()
        };

        if version != "1" {
            return Err(self.error(
                ln,
                (indent + 2) as u64,
                "unsupported format version",
            ));
        }

        self.version = version.clone();
        self.li += 1;
        self.state = ParserState::Fields;

        Ok(NameValue {
            name: String::new(),
            value: version,
            name_line: ln,
            name_column: (indent + 1) as u64,
            value_line: ln,
            value_column: (indent + 2) as u64,
        })
    }

    fn next_field(&mut self) -> Result<NameValue> {
        self.skip_ignored();

        let Some(line) = self.lines.get(self.li).cloned() else {
            self.state = ParserState::Eos;
            return Ok(NameValue::default());
        };

        let ln = (self.li + 1) as u64;
        let t = line.trim_start_matches(WS);
        let indent = line.len() - t.len();

        // A ':' line ends this manifest and starts the next one.
        if t.starts_with(':') {
            self.state = ParserState::Start;
            return Ok(NameValue::default());
        }

        // Parse the name.
        let ne = t.find([' ', '\t', ':']).unwrap_or(t.len());
        let name = t[..ne].to_string();

        let rest = t[ne..].trim_start_matches(WS);

        if !rest.starts_with(':') {
            return Err(self.error(
                ln,
                (indent + ne + 1) as u64,
                "':' expected after name",
            ));
        }

        let vcol = (line.len() - rest.len() + 2) as u64;
        let rest = rest[1..].trim_matches(WS);

        self.li += 1;

        let value = if rest == "\\" {
            self.multi_line_value()?
        } else {
            self.single_line_value(rest)
        };

        Ok(NameValue {
            name,
            value,
            name_line: ln,
            name_column: (indent + 1) as u64,
            value_line: ln,
            value_column: vcol,
        })
    }

    fn single_line_value(&mut self, first: &str) -> String {
        let (mut value, mut cont) = unescape_trailing(first);

        while cont {
            let Some(line) = self.lines.get(self.li) else {
                break;
            };

            let t = line.trim_matches(WS).to_string();
            self.li += 1;

            let (v, c) = unescape_trailing(&t);
            value.push_str(&v);
            cont = c;
        }

        value
    }

    fn multi_line_value(&mut self) -> Result<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut cont = false;

        loop {
            let Some(line) = self.lines.get(self.li).cloned() else {
                break;
            };

            self.li += 1;

            if line == "\\" {
                break;
            }

            let (v, c) = unescape_trailing(&line);

            if cont {
                if let Some(l) = lines.last_mut() {
                    l.push_str(&v);
                }
            } else {
                lines.push(v);
            }

            cont = c;
        }

        Ok(lines.join("\n"))
    }
}

/// Split a trailing `; comment` off a value. The separator is the first
/// semicolon not escaped with a backslash; `\;` in the value part is
/// unescaped.
pub fn split_comment(value: &str) -> (String, String) {
    let bytes = value.as_bytes();
    let mut sep = None;

    for (i, b) in bytes.iter().enumerate() {
        if *b == b';' && (i == 0 || bytes[i - 1] != b'\\') {
            sep = Some(i);
            break;
        }
    }

    let (v, c) = match sep {
        Some(i) => (&value[..i], value[i + 1..].trim_start_matches(WS)),
        None => (value, ""),
    };

    (
        v.trim_end_matches(WS).replace("\\;", ";"),
        c.to_string(),
    )
}

/// Re-append a comment to a value, escaping the value's semicolons.
pub fn merge_comment(value: impl AsRef<str>, comment: &str) -> String {
    let value = value.as_ref().replace(';', "\\;");

    if comment.is_empty() {
        value
    } else if value.is_empty() {
        format!("; {comment}")
    } else {
        format!("{value} ; {comment}")
    }
}

// Escape a line of a serialized value: a trailing backslash run needs
// one more backslash so that the parser does not take it for a
// continuation (or collapse it short).
fn escape_trailing(line: &str) -> String {
    if line.ends_with('\\') {
        format!("{line}\\")
    } else {
        line.to_string()
    }
}

/// Serializer producing the manifest text format.
pub struct ManifestSerializer {
    source_name: String,
    long_lines: bool,
    out: String,
    manifests: usize,
}

impl ManifestSerializer {
    pub fn new(source_name: impl Into<String>, long_lines: bool) -> Self {
        Self {
            source_name: source_name.into(),
            long_lines,
            out: String::new(),
            manifests: 0,
        }
    }

    /// The output name used in diagnostics.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// The serialized text produced so far.
    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn into_output(self) -> String {
        self.out
    }

    /// Serialize the next name/value pair: an empty name with a
    /// non-empty value starts a manifest, an empty pair ends it.
    pub fn next(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            if !value.is_empty() {
                if self.manifests == 0 {
                    self.out.push_str(&format!(": {value}\n"));
                } else {
                    self.out.push_str(":\n");
                }
                self.manifests += 1;
            }
            return Ok(());
        }

        if name.contains([' ', '\t', ':', '\n']) {
            return Err(PkgmetaError::serialization(
                &self.source_name,
                format!("invalid name '{name}'"),
            ));
        }

        if value.contains('\n') {
            // The multi-line form.
            self.out.push_str(&format!("{name}:\\\n"));

            for l in value.split('\n') {
                let l = escape_trailing(l);

                // A line of a single backslash would terminate the
                // block; the trailing escape above already covers it.
                self.out.push_str(&l);
                self.out.push('\n');
            }

            self.out.push_str("\\\n");
            return Ok(());
        }

        let value = escape_trailing(value);

        if value.is_empty() {
            self.out.push_str(&format!("{name}:\n"));
            return Ok(());
        }

        let line = format!("{name}: {value}");

        if self.long_lines || line.len() <= 78 {
            self.out.push_str(&line);
            self.out.push('\n');
            return Ok(());
        }

        // Break the long line at spaces; the trailing backslash makes
        // the parser rejoin the pieces verbatim.
        let mut rest = line.as_str();

        while rest.len() > 78 {
            // Stay on a character boundary when slicing multibyte text.
            let limit = (0..=78)
                .rev()
                .find(|i| rest.is_char_boundary(*i))
                .unwrap_or(0);

            let brk = match rest[..limit].rfind(' ') {
                // Do not split inside the 'name: ' prefix on the first
                // pass; find a space to break at or give up.
                Some(p) if p > name.len() + 1 => p + 1,
                _ => match rest[limit..].find(' ') {
                    Some(p) => limit + p + 1,
                    None => break,
                },
            };

            self.out.push_str(&rest[..brk]);
            self.out.push_str("\\\n");
            rest = &rest[brk..];
        }

        self.out.push_str(rest);
        self.out.push('\n');

        Ok(())
    }
}
