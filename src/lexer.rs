//! Splitting of raw input lines into fields.
//!
//! The shell has no quoting or escaping: a field is any run of characters
//! that are not delimiters. Fields are trimmed and never empty.

/// Set of characters a line is split on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiters {
    /// The pipe operator, `|`, separating pipeline stages.
    Stage,
    /// Whitespace, separating the words of a single stage.
    Field,
}

impl Delimiters {
    fn contains(self, ch: char) -> bool {
        match self {
            Delimiters::Stage => ch == '|',
            Delimiters::Field => ch.is_whitespace(),
        }
    }
}

/// Splits `line` on `delimiters`, returning trimmed, non-empty fields in order.
///
/// Leading, trailing and repeated delimiters produce no empty fields.
pub fn tokenize(line: &str, delimiters: Delimiters) -> Vec<&str> {
    line.split(|ch| delimiters.contains(ch))
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect()
}
