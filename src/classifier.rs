//! Cacheability classification
//!
//! The cache only stores results of statements that cannot change data. The
//! decision is made by a [`Classifier`]; [`ReadOnlyClassifier`] is a lexical
//! default that understands comments and every PostgreSQL quoting form, so a
//! keyword inside a string literal never changes the verdict.

use std::fmt;

/// Decides whether a query's result may be cached
pub trait Classifier: Send + Sync {
    fn is_cacheable(&self, query: &str) -> bool;
}

/// Outcome of classifying one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A single read-only statement
    Cacheable,
    /// Nothing but whitespace and comments
    Empty,
    /// More than one statement separated by `;`
    MultipleStatements(usize),
    /// The statement does not start with a read keyword
    NotARead(String),
    /// A mutating keyword appears outside any literal
    Mutating(String),
    /// A function that changes server state is called
    StateChanging(String),
    /// A string, identifier or comment is never closed
    Unterminated,
}

impl Classification {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Classification::Cacheable)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Cacheable => write!(f, "cacheable"),
            Classification::Empty => write!(f, "empty statement"),
            Classification::MultipleStatements(n) => write!(f, "{} statements", n),
            Classification::NotARead(word) => write!(f, "not a read: {}", word),
            Classification::Mutating(word) => write!(f, "mutating keyword: {}", word),
            Classification::StateChanging(name) => write!(f, "state-changing function: {}", name),
            Classification::Unterminated => write!(f, "unterminated literal or comment"),
        }
    }
}

/// Keywords a cacheable statement may start with
const READ_LEADING: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "SHOW"];

/// Keywords that disqualify a statement wherever they appear
///
/// `INTO` catches `SELECT ... INTO new_table`, `UPDATE` catches
/// `FOR UPDATE` row locks, the DML verbs catch data-modifying CTEs.
const MUTATING: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "REPLACE", "INTO", "CREATE", "ALTER",
    "DROP", "TRUNCATE", "GRANT", "REVOKE", "COPY", "CALL", "DO", "LOCK", "VACUUM", "ANALYZE",
    "REFRESH", "SET", "RESET", "NOTIFY", "LISTEN", "COMMIT", "ROLLBACK", "BEGIN",
];

/// Functions whose call changes sequences, locks or session state
const STATE_CHANGING: &[&str] = &[
    "NEXTVAL",
    "SETVAL",
    "PG_ADVISORY_LOCK",
    "PG_ADVISORY_LOCK_SHARED",
    "PG_ADVISORY_XACT_LOCK",
    "PG_ADVISORY_XACT_LOCK_SHARED",
    "PG_TRY_ADVISORY_LOCK",
    "PG_TRY_ADVISORY_LOCK_SHARED",
    "PG_TRY_ADVISORY_XACT_LOCK",
    "PG_TRY_ADVISORY_XACT_LOCK_SHARED",
    "PG_ADVISORY_UNLOCK",
    "PG_ADVISORY_UNLOCK_SHARED",
    "PG_ADVISORY_UNLOCK_ALL",
    "SET_CONFIG",
    "PG_NOTIFY",
    "DBLINK_EXEC",
    "LO_CREATE",
    "LO_IMPORT",
    "LO_UNLINK",
    "PG_CANCEL_BACKEND",
    "PG_TERMINATE_BACKEND",
    "PG_RELOAD_CONF",
];

/// Lexical read-only classifier
///
/// Cacheable iff the text holds exactly one statement (a trailing `;` is
/// allowed), it starts with `SELECT`, `WITH`, `VALUES`, `TABLE` or `SHOW`,
/// no mutating keyword appears outside literals and comments, and no known
/// state-changing function such as `nextval` is named. Functions that merely
/// vary, such as `now()` or `random()`, are not detected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyClassifier;

impl ReadOnlyClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a query, explaining a negative verdict
    pub fn classify(&self, query: &str) -> Classification {
        let scan = match Scanner::new(query).scan() {
            Some(scan) => scan,
            None => return Classification::Unterminated,
        };

        if scan.statements == 0 {
            return Classification::Empty;
        }
        if scan.statements > 1 {
            return Classification::MultipleStatements(scan.statements);
        }

        let first = match scan.words.first() {
            Some(word) => word,
            None => return Classification::NotARead(String::new()),
        };
        if !READ_LEADING.contains(&first.as_str()) {
            return Classification::NotARead(first.clone());
        }

        if let Some(word) = scan.words.iter().find(|w| MUTATING.contains(&w.as_str())) {
            return Classification::Mutating(word.clone());
        }

        if let Some(name) = scan.words.iter().find(|w| STATE_CHANGING.contains(&w.as_str())) {
            return Classification::StateChanging(name.clone());
        }

        Classification::Cacheable
    }
}

impl Classifier for ReadOnlyClassifier {
    fn is_cacheable(&self, query: &str) -> bool {
        self.classify(query).is_cacheable()
    }
}

/// Bare words (upper-cased) and statement count of a query
struct Scan {
    words: Vec<String>,
    statements: usize,
}

struct Scanner {
    input: Vec<char>,
    position: usize,
}

impl Scanner {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Returns `None` on an unterminated literal or comment
    fn scan(mut self) -> Option<Scan> {
        let mut words = Vec::new();
        let mut statements = 0;
        let mut in_statement = false;

        while let Some(ch) = self.current() {
            match ch {
                c if c.is_whitespace() => self.advance(),
                '-' if self.peek() == Some('-') => self.skip_line_comment(),
                '/' if self.peek() == Some('*') => self.skip_block_comment()?,
                '\'' => {
                    self.skip_quoted('\'', false)?;
                    in_statement = true;
                }
                '"' => {
                    self.skip_quoted('"', false)?;
                    in_statement = true;
                }
                '$' => {
                    self.skip_dollar()?;
                    in_statement = true;
                }
                ';' => {
                    if in_statement {
                        statements += 1;
                        in_statement = false;
                    }
                    self.advance();
                }
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.read_word();
                    // E'...' strings honour backslash escapes
                    if word.eq_ignore_ascii_case("e") && self.current() == Some('\'') {
                        self.skip_quoted('\'', true)?;
                    } else {
                        words.push(word.to_uppercase());
                    }
                    in_statement = true;
                }
                _ => {
                    self.advance();
                    in_statement = true;
                }
            }
        }

        if in_statement {
            statements += 1;
        }

        Some(Scan { words, statements })
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn read_word(&mut self) -> String {
        let start = self.position;
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].iter().collect()
    }

    /// Line comments end at either newline character
    fn skip_line_comment(&mut self) {
        while let Some(c) = self.current() {
            self.advance();
            if c == '\n' || c == '\r' {
                break;
            }
        }
    }

    /// Block comments nest in PostgreSQL
    fn skip_block_comment(&mut self) -> Option<()> {
        let mut depth = 0usize;
        loop {
            match (self.current()?, self.peek()) {
                ('/', Some('*')) => {
                    depth += 1;
                    self.position += 2;
                }
                ('*', Some('/')) => {
                    depth -= 1;
                    self.position += 2;
                    if depth == 0 {
                        return Some(());
                    }
                }
                _ => self.advance(),
            }
        }
    }

    /// Skip a quoted run; a doubled quote is an escaped quote
    fn skip_quoted(&mut self, quote: char, backslash_escapes: bool) -> Option<()> {
        self.advance();
        loop {
            let c = self.current()?;
            self.advance();
            if backslash_escapes && c == '\\' {
                self.current()?;
                self.advance();
            } else if c == quote {
                if self.current() == Some(quote) {
                    self.advance();
                } else {
                    return Some(());
                }
            }
        }
    }

    /// Skip `$tag$ ... $tag$`, or a positional parameter such as `$1`
    fn skip_dollar(&mut self) -> Option<()> {
        let start = self.position;
        self.advance();

        let mut end = self.position;
        while let Some(c) = self.input.get(end) {
            if c.is_alphanumeric() || *c == '_' {
                end += 1;
            } else {
                break;
            }
        }

        let tag_ok = self
            .input
            .get(start + 1)
            .map(|c| !c.is_ascii_digit())
            .unwrap_or(false);
        if !tag_ok || self.input.get(end) != Some(&'$') {
            // `$1` or a stray `$`
            self.position = end;
            return Some(());
        }

        let delimiter: Vec<char> = self.input[start..=end].to_vec();
        self.position = end + 1;
        while self.position + delimiter.len() <= self.input.len() {
            if self.input[self.position..self.position + delimiter.len()] == delimiter[..] {
                self.position += delimiter.len();
                return Some(());
            }
            self.advance();
        }
        None
    }
}
