//! RFC 4180 style CSV reading and writing.
//!
//! Fields may be quoted; inside quotes, `""` is a literal quote and commas
//! and line breaks are data. Unquoted fields are trimmed, quoted fields are
//! kept verbatim.

/// UTF-8 byte-order mark written at the start of exported CSV files.
pub const BOM: char = '\u{FEFF}';

/// Split one CSV line into fields.
///
/// A line that ends inside an open quote keeps the remainder as the last
/// field rather than failing.
#[must_use]
pub fn split_line(line: &str) -> Vec<String> {
    let mut reader = RecordReader::new(line);
    reader.next().unwrap_or_default()
}

/// Split a whole document into records, honouring quoted line breaks.
///
/// A leading BOM is skipped and blank lines are dropped.
#[must_use]
pub fn read_records(text: &str) -> Vec<Vec<String>> {
    RecordReader::new(text.strip_prefix(BOM).unwrap_or(text))
        .filter(|record| !(record.len() == 1 && record[0].is_empty()))
        .collect()
}

/// Quote a field when it contains a separator, quote or line break.
#[must_use]
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Join fields into one CSV line (no line terminator).
#[must_use]
pub fn join_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Iterator over CSV records of a document.
pub struct RecordReader<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> RecordReader<'a> {
    /// Read records from `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut was_quoted = false;

        let finish = |field: &mut String, was_quoted: bool| {
            let value = std::mem::take(field);
            if was_quoted {
                value
            } else {
                value.trim().to_string()
            }
        };

        while let Some(c) = self.chars.next() {
            if quoted {
                match c {
                    '"' if self.chars.peek() == Some(&'"') => {
                        self.chars.next();
                        field.push('"');
                    }
                    '"' => quoted = false,
                    other => field.push(other),
                }
                continue;
            }
            match c {
                '"' if field.trim().is_empty() && !was_quoted => {
                    field.clear();
                    quoted = true;
                    was_quoted = true;
                }
                ',' => {
                    fields.push(finish(&mut field, was_quoted));
                    was_quoted = false;
                }
                '\r' => {
                    if self.chars.peek() == Some(&'\n') {
                        self.chars.next();
                    }
                    fields.push(finish(&mut field, was_quoted));
                    return Some(fields);
                }
                '\n' => {
                    fields.push(finish(&mut field, was_quoted));
                    return Some(fields);
                }
                // Text after a closing quote is kept as data.
                other => field.push(other),
            }
        }

        fields.push(finish(&mut field, was_quoted));
        Some(fields)
    }
}
