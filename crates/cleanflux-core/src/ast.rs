//! The editable parse tree (spec §3 "ParsedQuery", §9 Design Notes).
//!
//! A query is a flat ordered sequence of [`Token`]s. Most tokens are plain
//! [`Token::Literal`] text (keywords, whitespace, punctuation, the WHERE
//! clause body); a handful are tagged [`Token::Structural`] nodes the
//! modifier knows how to locate and rewrite (the column list, the FROM
//! target, the GROUP BY list). Stringifying a [`ParsedQuery`] is always just
//! concatenating every token's text in order, which is what gives us the
//! "stringify(parse(q)) == q" invariant for free as long as tokenization
//! doesn't drop or duplicate any input bytes.
//!
//! Rewriting a structural token replaces its text and turns it into a
//! [`Token::Literal`] — a tagged variant rather than an inheritance
//! hierarchy, per the design notes — so a second pass over the tree treats
//! the edited region as opaque instead of re-interpreting it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Columns,
    From,
    Where,
    GroupBy,
    Keyword,
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Structural(TokenKind, String),
}

impl Token {
    pub fn text(&self) -> &str {
        match self {
            Token::Literal(s) => s,
            Token::Structural(_, s) => s,
        }
    }

    pub fn kind(&self) -> Option<TokenKind> {
        match self {
            Token::Structural(kind, _) => Some(*kind),
            Token::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedQuery {
    pub tokens: Vec<Token>,
    /// True iff the statement's top keyword is `SELECT` (case-insensitive).
    /// Non-SELECT statements still produce a `ParsedQuery` (a single
    /// `Literal` token holding the whole text) so the pipeline can
    /// short-circuit uniformly.
    pub is_select: bool,
}

impl ParsedQuery {
    pub fn stringify(&self) -> String {
        self.tokens.iter().map(Token::text).collect()
    }

    pub fn find_index(&self, kind: TokenKind) -> Option<usize> {
        self.tokens.iter().position(|t| t.kind() == Some(kind))
    }

    pub fn find_text(&self, kind: TokenKind) -> Option<&str> {
        self.find_index(kind).map(|i| self.tokens[i].text())
    }

    /// Replace a structural token's text, turning it opaque.
    pub fn replace_opaque(&mut self, index: usize, new_text: impl Into<String>) {
        self.tokens[index] = Token::Literal(new_text.into());
    }
}
