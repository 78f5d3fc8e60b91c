// Decoder for the serialized trait column
//
// Cells look like `['Overgrow', 'Chlorophyll']`: a bracketed list of quoted
// strings as a dataframe export renders it. Both quote styles appear, since
// names containing an apostrophe are written with double quotes.

use thiserror::Error;

/// Why a trait cell could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed trait list at byte {position}: {reason}")]
pub struct MalformedList {
    pub position: usize,
    pub reason: &'static str,
}

/// Outcome of decoding one trait cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraitList {
    /// The cell was null.
    Absent,
    /// A well-formed list, possibly empty.
    Terms(Vec<String>),
    /// Present but not a list of strings.
    Malformed(MalformedList),
}

impl TraitList {
    pub fn from_cell(cell: Option<&str>) -> Self {
        match cell {
            None => TraitList::Absent,
            Some(text) => match decode(text) {
                Ok(terms) => TraitList::Terms(terms),
                Err(err) => TraitList::Malformed(err),
            },
        }
    }

    /// Terms to link; empty for absent and malformed cells.
    pub fn terms(&self) -> &[String] {
        match self {
            TraitList::Terms(terms) => terms,
            _ => &[],
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, TraitList::Malformed(_))
    }
}

/// Decode a bracketed list of quoted strings.
///
/// Entries are trimmed, blank entries dropped, and repeats collapsed keeping
/// first-seen order. A trailing comma is accepted; anything else outside the
/// grammar is an error.
pub fn decode(text: &str) -> Result<Vec<String>, MalformedList> {
    let mut cursor = Cursor::new(text);
    cursor.skip_ws();

    let close = match cursor.bump() {
        Some('[') => ']',
        Some('(') => ')',
        _ => return Err(cursor.fail("expected '[' at start of list")),
    };

    let mut terms: Vec<String> = Vec::new();
    loop {
        cursor.skip_ws();
        match cursor.peek() {
            Some(c) if c == close => {
                cursor.bump();
                break;
            }
            Some('\'') | Some('"') => {
                let term = cursor.string()?;
                let term = term.trim();
                if !term.is_empty() && !terms.iter().any(|t| t == term) {
                    terms.push(term.to_string());
                }
            }
            Some(_) => return Err(cursor.fail("expected a quoted string")),
            None => return Err(cursor.fail("unterminated list")),
        }

        cursor.skip_ws();
        match cursor.bump() {
            Some(',') => continue,
            Some(c) if c == close => break,
            Some(_) => return Err(cursor.fail("expected ',' between entries")),
            None => return Err(cursor.fail("unterminated list")),
        }
    }

    cursor.skip_ws();
    if cursor.peek().is_some() {
        return Err(cursor.fail("trailing characters after list"));
    }
    Ok(terms)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { text, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn fail(&self, reason: &'static str) -> MalformedList {
        MalformedList {
            position: self.pos,
            reason,
        }
    }

    /// Quoted string starting at the cursor, with backslash escapes.
    fn string(&mut self) -> Result<String, MalformedList> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.fail("expected a quote")),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.fail("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(self.fail("unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
