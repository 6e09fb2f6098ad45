//! Migration script handling - statement splitting and checksums
//!
//! Scripts are split with sqlparser's tokenizer rather than on raw `;`
//! characters, so semicolons inside string literals, quoted identifiers and
//! comments stay where they are.

use sha2::{Digest, Sha256};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, TokenizerError};

/// Split a script into its statements, in file order
///
/// Only top-level `;` tokens end a statement. Segments holding nothing but
/// whitespace or comments are dropped. The returned statements are the
/// original text of each segment, trimmed, without the trailing `;`.
pub fn split_statements(script: &str) -> Result<Vec<String>, TokenizerError> {
    let dialect = DuckDbDialect {};
    let tokens = Tokenizer::new(&dialect, script)
        .with_unescape(false)
        .tokenize_with_location()?;

    let lines = LineIndex::new(script);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;

    for token in &tokens {
        match &token.token {
            Token::SemiColon => {
                let end = lines.offset(token.span.start);
                if has_content {
                    statements.push(script[start..end].trim().to_string());
                }
                start = end + 1;
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }

    if has_content {
        statements.push(script[start..].trim().to_string());
    }

    Ok(statements)
}

/// SHA-256 of a script, hex encoded. Line endings are normalized first so a
/// CRLF checkout does not read as a modified migration.
pub fn checksum(script: &str) -> String {
    let normalized = script.replace("\r\n", "\n");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Maps tokenizer locations (1-based line/column, in chars) to byte offsets
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let column = (location.column as usize).saturating_sub(1);
        let line_start = match self.starts.get(line) {
            Some(start) => *start,
            None => return self.text.len(),
        };

        self.text[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
            .unwrap_or(self.text.len())
    }
}
