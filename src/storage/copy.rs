//! Text-format encoder for PostgreSQL `COPY ... FROM STDIN`.
//!
//! One buffer per scratch table, one network round-trip for N rows. The
//! text format needs `\N` for NULL and backslash escapes for the field and
//! row delimiters; everything else passes through verbatim.

/// Builds the payload for one COPY statement.
#[derive(Default)]
pub struct CopyBuffer {
    buf: String,
    columns: usize,
    rows: usize,
}

impl CopyBuffer {
    pub fn new(columns: usize) -> Self {
        Self {
            buf: String::new(),
            columns,
            rows: 0,
        }
    }

    /// Append one row. Panics in debug builds if the field count does not
    /// match the column count declared at construction.
    pub fn push_row<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut count = 0;
        for (index, field) in fields.into_iter().enumerate() {
            if index > 0 {
                self.buf.push('\t');
            }
            match field {
                Some(value) => escape_into(&mut self.buf, value),
                None => self.buf.push_str("\\N"),
            }
            count += 1;
        }
        debug_assert_eq!(count, self.columns, "row width mismatch");
        self.buf.push('\n');
        self.rows += 1;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }
}

fn escape_into(buf: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            other => buf.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_rows_and_nulls() {
        let mut buf = CopyBuffer::new(3);
        buf.push_row([Some("a"), None, Some("c")]);
        buf.push_row([Some("d"), Some("e"), None]);

        assert_eq!(buf.rows(), 2);
        assert_eq!(
            std::str::from_utf8(buf.as_bytes()).unwrap(),
            "a\t\\N\tc\nd\te\t\\N\n"
        );
    }

    #[test]
    fn escapes_delimiters_and_backslashes() {
        let mut buf = CopyBuffer::new(1);
        buf.push_row([Some("tab\there\nnewline\\slash\rret")]);
        assert_eq!(
            std::str::from_utf8(buf.as_bytes()).unwrap(),
            "tab\\there\\nnewline\\\\slash\\rret\n"
        );
    }

    #[test]
    fn empty_buffer_has_no_rows() {
        let buf = CopyBuffer::new(2);
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), b"");
    }

    #[test]
    fn json_payloads_survive_encoding() {
        let json = serde_json::json!({"key": "line1\nline2\tend"}).to_string();
        let mut buf = CopyBuffer::new(1);
        buf.push_row([Some(json.as_str())]);
        // serde_json already escapes control characters, so the only COPY
        // escape applied is the backslash doubling
        assert!(std::str::from_utf8(buf.as_bytes())
            .unwrap()
            .contains("line1\\\\nline2\\\\tend"));
    }
}
