//! Knowledge-base loading.
//!
//! A knowledge base is a text of parenthesized expressions, one declarative
//! fact or rule each. Expressions are split exactly at balanced-parenthesis
//! boundaries. Parentheses inside quoted strings do not count, a backslash
//! escapes the next character. Between expressions, and on lines whose first
//! non-blank character is `;`, a `;` starts a comment running to the end of
//! the line; inside an expression it is an ordinary character. A line whose
//! first non-blank character is `#` is skipped at the top level. A leading
//! `!` stays attached to the expression it prefixes.

use std::path::Path;
use std::sync::Arc;

/// Knowledge-base parsing errors
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Unbalanced expression starting at line {line}")]
    Unbalanced { line: usize },
    #[error("Unterminated string starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("Unexpected ')' at line {line}")]
    UnexpectedClose { line: usize },
    #[error("Failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed knowledge-base content shared by every backend connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
    expressions: Arc<[String]>,
}

impl KnowledgeBase {
    pub fn parse(content: &str) -> Result<Self, KnowledgeBaseError> {
        Ok(Self {
            expressions: parse_expressions(content)?.into(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeBaseError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

/// Read and parse a knowledge-base file
pub fn load_knowledge_base<P: AsRef<Path>>(path: P) -> Result<KnowledgeBase, KnowledgeBaseError> {
    KnowledgeBase::from_file(path)
}

/// Split knowledge-base content into complete top-level expressions
pub fn parse_expressions(content: &str) -> Result<Vec<String>, KnowledgeBaseError> {
    let mut parser = ExpressionParser::default();
    for c in content.chars() {
        parser.feed(c)?;
    }
    parser.finish()
}

struct ExpressionParser {
    expressions: Vec<String>,
    current: String,
    depth: usize,
    in_string: bool,
    escape_next: bool,
    in_comment: bool,
    /// Only blanks seen so far on the current line
    at_line_start: bool,
    line: usize,
    start_line: usize,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self {
            expressions: Vec::new(),
            current: String::new(),
            depth: 0,
            in_string: false,
            escape_next: false,
            in_comment: false,
            at_line_start: true,
            line: 1,
            start_line: 1,
        }
    }
}

impl ExpressionParser {
    fn feed(&mut self, c: char) -> Result<(), KnowledgeBaseError> {
        if c == '\n' {
            self.line += 1;
            self.at_line_start = true;
        }

        if self.in_comment {
            if c == '\n' {
                self.in_comment = false;
                self.end_of_token(c);
            }
            return Ok(());
        }

        if self.escape_next {
            self.escape_next = false;
            self.current.push(c);
            return Ok(());
        }

        if self.in_string {
            self.current.push(c);
            match c {
                '\\' => self.escape_next = true,
                '"' => self.in_string = false,
                _ => {}
            }
            return Ok(());
        }

        match c {
            ';' if self.depth == 0 || self.at_line_start => {
                self.in_comment = true;
                return Ok(());
            }
            '#' if self.depth == 0 && self.at_line_start => {
                self.in_comment = true;
                return Ok(());
            }
            _ => {}
        }

        if !c.is_whitespace() {
            self.at_line_start = false;
        }

        match c {
            '(' => {
                if self.depth == 0 {
                    self.flush_atom();
                    if self.current.is_empty() {
                        self.start_line = self.line;
                    }
                }
                self.depth += 1;
                self.current.push(c);
            }
            ')' => {
                if self.depth == 0 {
                    return Err(KnowledgeBaseError::UnexpectedClose { line: self.line });
                }
                self.depth -= 1;
                self.current.push(c);
                if self.depth == 0 {
                    self.expressions.push(self.current.trim().to_string());
                    self.current.clear();
                }
            }
            '"' => {
                if self.depth == 0 && self.current.is_empty() {
                    self.start_line = self.line;
                }
                self.in_string = true;
                self.current.push(c);
            }
            '\\' => {
                self.escape_next = true;
                self.current.push(c);
            }
            c if c.is_whitespace() => self.end_of_token(c),
            _ => {
                if self.depth == 0 && self.current.is_empty() {
                    self.start_line = self.line;
                }
                self.current.push(c);
            }
        }
        Ok(())
    }

    /// Whitespace inside an expression is kept; at the top level it ends a bare atom
    fn end_of_token(&mut self, c: char) {
        if self.depth > 0 {
            self.current.push(c);
        } else {
            self.flush_atom();
        }
    }

    /// Emit a pending top-level atom, keeping a lone `!` prefix for the next expression
    fn flush_atom(&mut self) {
        let atom = self.current.trim();
        if atom.is_empty() || atom == "!" {
            return;
        }
        self.expressions.push(atom.to_string());
        self.current.clear();
    }

    fn finish(mut self) -> Result<Vec<String>, KnowledgeBaseError> {
        if self.in_string {
            return Err(KnowledgeBaseError::UnterminatedString { line: self.start_line });
        }
        if self.depth > 0 {
            return Err(KnowledgeBaseError::Unbalanced { line: self.start_line });
        }
        self.flush_atom();
        Ok(self.expressions)
    }
}
