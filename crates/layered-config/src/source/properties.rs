//! Java `.properties`-format parsing and the property-file [`Source`].

use std::{collections::HashMap, fmt, fs, path::Path};

use super::{MapSource, Source, DEFAULT_ORDINAL};

/// Reserved key that, if present, sets a property-file source's ordinal.
pub const ORDINAL_KEY: &str = "config_ordinal";

/// A [`Source`] loaded from a Java-style `.properties` resource. The source's display
/// [`Source::name`] is the resource path it was loaded from; its ordinal is [`DEFAULT_ORDINAL`]
/// unless the file sets [`ORDINAL_KEY`].
#[derive(Debug, Clone)]
pub struct PropertiesSource {
    inner: MapSource,
}

impl PropertiesSource {
    /// Parses `contents` (already read as bytes, decoded as ISO-8859-1) under the given display
    /// name.
    pub fn parse(name: impl Into<String>, contents: &[u8]) -> Result<Self, PropertiesError> {
        let decoded = decode_latin1(contents);
        let mut entries = parse_properties(&decoded)?;
        let ordinal = entries
            .remove(ORDINAL_KEY)
            .map(|raw| {
                raw.parse::<i32>()
                    .map_err(|_| PropertiesError::InvalidOrdinal(raw.clone()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_ORDINAL);
        Ok(Self {
            inner: MapSource::new(name, entries).with_ordinal(ordinal),
        })
    }
}

impl Source for PropertiesSource {
    fn name(&self) -> String {
        self.inner.name()
    }
    fn ordinal(&self) -> i32 {
        self.inner.ordinal()
    }
    fn property_names(&self) -> Vec<String> {
        self.inner.property_names()
    }
    fn value(&self, name: &str) -> Option<String> {
        self.inner.value(name)
    }
    fn properties(&self) -> HashMap<String, String> {
        self.inner.properties()
    }
}

/// Loads a single `config.properties`-style file from `path`. There is no classpath-style scan
/// for every copy of a well-known resource name; callers (ordinarily
/// [`crate::ConfigurationBuilder`]) supply the directories to search instead.
pub fn properties_file(path: impl AsRef<Path>) -> Result<PropertiesSource, PropertiesError> {
    let path = path.as_ref();
    let contents = fs::read(path).map_err(|err| PropertiesError::Io(path.display().to_string(), err))?;
    PropertiesSource::parse(path.display().to_string(), &contents)
}

/// Errors that can occur while loading or parsing a property file.
#[derive(Debug)]
#[non_exhaustive]
pub enum PropertiesError {
    Io(String, std::io::Error),
    InvalidOrdinal(String),
    DanglingEscape(usize),
}

impl fmt::Display for PropertiesError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, err) => write!(formatter, "failed reading `{path}`: {err}"),
            Self::InvalidOrdinal(raw) => {
                write!(formatter, "`{ORDINAL_KEY}` is not a valid integer: `{raw}`")
            }
            Self::DanglingEscape(line) => {
                write!(formatter, "dangling `\\` escape at end of input on line {line}")
            }
        }
    }
}

impl std::error::Error for PropertiesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, err) => Some(err),
            _ => None,
        }
    }
}

/// Each byte of ISO-8859-1 maps directly onto the identically-numbered Unicode code point.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| byte as char).collect()
}

/// Parses the Java `.properties` text format: `key = value` or `key: value`, `#`/`!` line
/// comments, `\`-continued lines, and the standard escape sequences.
fn parse_properties(text: &str) -> Result<HashMap<String, String>, PropertiesError> {
    let mut result = HashMap::new();
    let mut lines = text.lines().enumerate();

    while let Some((line_no, raw_line)) = lines.next() {
        let mut logical_line = String::new();
        let mut current = raw_line;
        loop {
            // Leading whitespace is stripped on every physical line joined into this logical
            // line, including continuations, matching `java.util.Properties`' line-reading rules.
            let trimmed_start = current.trim_start();
            if ends_with_unescaped_backslash(trimmed_start) {
                logical_line.push_str(&trimmed_start[..trimmed_start.len() - 1]);
                match lines.next() {
                    Some((_, next_line)) => current = next_line,
                    None => return Err(PropertiesError::DanglingEscape(line_no + 1)),
                }
            } else {
                logical_line.push_str(trimmed_start);
                break;
            }
        }

        let trimmed = logical_line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let (key, value) = split_key_value(trimmed);
        result.insert(unescape(key), unescape(value));
    }

    Ok(result)
}

fn ends_with_unescaped_backslash(line: &str) -> bool {
    let backslashes = line.chars().rev().take_while(|&ch| ch == '\\').count();
    line.ends_with('\\') && backslashes % 2 == 1
}

/// Splits on the first unescaped `=`, `:`, or run of whitespace separating key from value,
/// matching `java.util.Properties`' key/value separator rules.
fn split_key_value(line: &str) -> (&str, &str) {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut i = 0;
    let mut escaped = false;
    while i < chars.len() {
        let (byte_idx, ch) = chars[i];
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '=' || ch == ':' {
            let key = &line[..byte_idx];
            let value = line[byte_idx + ch.len_utf8()..].trim_start();
            return (key, value);
        } else if ch.is_whitespace() {
            let key = &line[..byte_idx];
            let rest = line[byte_idx..].trim_start();
            let rest = rest.strip_prefix(['=', ':']).map_or(rest, str::trim_start);
            return (key, rest);
        }
        i += 1;
    }
    (line, "")
}

/// Resolves `\\`, `\n`, `\t`, `\r`, `\f`, `\uXXXX`, and `\` before any other character (which
/// yields that character literally, e.g. `\:` -> `:`).
fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('f') => result.push('\u{0C}'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => result.push(decoded),
                    None => result.push_str(&hex),
                }
            }
            Some(other) => result.push(other),
            None => {}
        }
    }
    result
}
