//! Character-level tokenizer
//!
//! Produces the token stream for one source file, ending in `EOF`.
//! Indentation is turned into synthetic `INDENT`/`DEDENT` tokens (four
//! spaces per level), logical line ends into `NEWLINE`. Interpolated
//! strings are lexed with an explicit mode stack: `"` switches to string
//! mode, `{` inside a string switches back to expression lexing until
//! the matching `}`.
//!
//! Comments and redundant newlines are routed to a discarded side
//! channel that only exists for debugging. Lexical errors are embedded
//! in the stream as `ERROR` tokens and carried as precise diagnostics on
//! the result.

use crate::errors::CompileError;
use crate::source_location::SourceLocation;
use crate::stream::Stream;
use crate::tokens::CommentKind;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use std::path::Path;
use std::path::PathBuf;

const INDENT_SPACES: usize = 4;

/// Lexing mode for interpolated strings
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Between `"` and `"`, buffering raw characters
    Str,
    /// Between `{` and the matching `}` inside a string; the depth counts
    /// nested braces opened inside the expression
    Expr { depth: usize },
}

/// Everything the tokenizer produces for one source file
#[derive(Debug)]
pub struct TokenizeResult {
    /// The live token stream, ending in `EOF`
    pub tokens: Stream<Token>,
    /// Comments and redundant newlines, kept for debugging only
    pub discarded: Vec<Token>,
    /// Diagnostics for the `ERROR` tokens embedded in the stream
    pub errors: Vec<CompileError>,
}

pub struct Tokenizer<'a> {
    source: &'a str,
    filename: PathBuf,
    /// Byte cursor into the source
    index: usize,
    at_start_of_line: bool,
    /// Number of INDENT_SPACES indentations currently open
    current_indent: usize,
    modes: Vec<Mode>,
    tokens: Stream<Token>,
    discarded: Vec<Token>,
    errors: Vec<CompileError>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str, filename: &Path) -> Self {
        Tokenizer {
            source,
            filename: filename.to_path_buf(),
            index: 0,
            at_start_of_line: true,
            current_indent: 0,
            modes: Vec::new(),
            tokens: Stream::new(),
            discarded: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the whole source and return the token stream
    pub fn tokenize(mut self) -> TokenizeResult {
        loop {
            // string mode buffers raw characters instead of lexing tokens
            if matches!(self.modes.last(), Some(Mode::Str)) {
                self.lex_string_chars();
                continue;
            }

            // process indent/dedent from spaces at start of line
            if self.at_start_of_line && self.modes.is_empty() {
                self.add_indent_dedent();
            }
            self.at_start_of_line = false;

            let start = self.index;
            let Some(char) = self.next_char() else {
                self.finish(start);
                break;
            };

            match char {
                '}' => match self.modes.last_mut() {
                    Some(Mode::Expr { depth }) if *depth == 0 => {
                        self.modes.pop();
                        self.add_token(TokenKind::StringExprEnd, start);
                    }
                    Some(Mode::Expr { depth }) => {
                        *depth -= 1;
                        self.add_token(TokenKind::BraceClose, start);
                    }
                    _ => self.add_token(TokenKind::BraceClose, start),
                },
                '{' => {
                    if let Some(Mode::Expr { depth }) = self.modes.last_mut() {
                        *depth += 1;
                    }
                    self.add_token(TokenKind::BraceOpen, start);
                }
                ']' => self.add_token(TokenKind::BracketClose, start),
                '[' => self.add_token(TokenKind::BracketOpen, start),
                ':' => self.add_token(TokenKind::Colon, start),
                ',' => self.add_token(TokenKind::Comma, start),
                '.' => self.add_token(TokenKind::Dot, start),
                '(' => self.add_token(TokenKind::ParenOpen, start),
                ')' => self.add_token(TokenKind::ParenClose, start),
                ';' => self.add_token(TokenKind::Semicolon, start),
                '~' => self.add_token(TokenKind::Tilde, start),
                '=' => {
                    if self.consume('=') {
                        self.add_token(TokenKind::EqualEqual, start);
                    } else {
                        self.add_token(TokenKind::Equal, start);
                    }
                }
                '>' => {
                    if self.consume('=') {
                        self.add_token(TokenKind::GreaterEqual, start);
                    } else {
                        self.add_token(TokenKind::Greater, start);
                    }
                }
                '<' => {
                    if self.consume('=') {
                        self.add_token(TokenKind::LessEqual, start);
                    } else {
                        self.add_token(TokenKind::Less, start);
                    }
                }
                '!' => {
                    if self.consume('=') {
                        self.add_token(TokenKind::NotEqual, start);
                    } else {
                        self.add_token(TokenKind::Not, start);
                    }
                }
                '+' => {
                    if self.consume('+') {
                        self.add_token(TokenKind::PlusPlus, start);
                    } else if self.consume('=') {
                        self.add_token(TokenKind::PlusEqual, start);
                    } else {
                        self.add_token(TokenKind::Plus, start);
                    }
                }
                '-' => {
                    if self.consume('-') {
                        self.add_token(TokenKind::MinusMinus, start);
                    } else if self.consume('=') {
                        self.add_token(TokenKind::MinusEqual, start);
                    } else {
                        self.add_token(TokenKind::Minus, start);
                    }
                }
                '*' => {
                    if self.consume('=') {
                        self.add_token(TokenKind::StarEqual, start);
                    } else {
                        self.add_token(TokenKind::Star, start);
                    }
                }
                '/' => {
                    if self.consume('/') {
                        self.add_inline_comment(start);
                    } else if self.consume('*') {
                        self.add_block_comment(start);
                    } else if self.consume('=') {
                        self.add_token(TokenKind::SlashEqual, start);
                    } else {
                        self.add_token(TokenKind::Slash, start);
                    }
                }
                '&' => {
                    if self.consume('&') {
                        self.add_token(TokenKind::AmpAmp, start);
                    } else {
                        self.add_token(TokenKind::Amp, start);
                    }
                }
                '|' => {
                    if self.consume('|') {
                        self.add_token(TokenKind::PipePipe, start);
                    } else {
                        self.add_token(TokenKind::Pipe, start);
                    }
                }
                '"' => {
                    self.add_token(TokenKind::StringStart, start);
                    self.modes.push(Mode::Str);
                }
                '\'' => self.add_character(start),
                digit if digit.is_ascii_digit() => self.add_number(digit, start),
                ident if ident.is_ascii_alphabetic() || ident == '_' => {
                    self.add_identifier(start);
                }
                ' ' => {}
                '\n' => {
                    self.add_newline(start);
                    // after \n we're at start of line, we can expect indent/dedent here
                    self.at_start_of_line = true;
                }
                '\r' => {}
                '\t' => {
                    self.lex_error("indentation with tabs is not supported!", start);
                }
                other => {
                    // unknown characters are skipped, kept only in the debug channel
                    self.discarded.push(Token::new(
                        TokenKind::Error,
                        SourceLocation::new(start, other.len_utf8()),
                    ));
                }
            }
        }

        TokenizeResult {
            tokens: self.tokens,
            discarded: self.discarded,
            errors: self.errors,
        }
    }

    /// Consume and return the next character
    fn next_char(&mut self) -> Option<char> {
        let char = self.source[self.index..].chars().next()?;
        self.index += char.len_utf8();
        Some(char)
    }

    /// Look at the next character without consuming it
    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    /// Consume the next character when it matches
    fn consume(&mut self, char: char) -> bool {
        if self.peek_char() == Some(char) {
            self.index += char.len_utf8();
            return true;
        }
        false
    }

    fn add_token(&mut self, kind: TokenKind, start: usize) {
        let location = SourceLocation::new(start, self.index - start);
        self.tokens.add(Token::new(kind, location));
    }

    fn lex_error(&mut self, message: &str, start: usize) {
        let location = SourceLocation::new(start, self.index.saturating_sub(start).max(1));
        self.errors
            .push(CompileError::at(message, &self.filename, self.source, location));
        self.tokens.add(Token::new(TokenKind::Error, location));
    }

    /// Add a NEWLINE, dropping it to the discarded channel when it would
    /// duplicate the previous one or open the file
    fn add_newline(&mut self, start: usize) {
        let token = Token::new(TokenKind::Newline, SourceLocation::new(start, 1));
        match self.tokens.last() {
            None => self.discarded.push(token),
            Some(last) if matches!(last.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent) => {
                self.discarded.push(token)
            }
            Some(_) => self.tokens.add(token),
        }
    }

    /// A NEWLINE directly before an INDENT/DEDENT is redundant; move it
    /// over to the discarded channel
    fn drop_newline_before_block_token(&mut self) {
        if matches!(self.tokens.last().map(|t| &t.kind), Some(TokenKind::Newline)) {
            let newline = self.tokens.pop().unwrap_or_else(|| {
                unreachable!("internal compiler error, newline vanished from the stream!")
            });
            self.discarded.push(newline);
        }
    }

    /// Count leading spaces and emit INDENT/DEDENT tokens for the change
    /// in indentation level
    fn add_indent_dedent(&mut self) {
        let start = self.index;
        let mut spaces = 0;
        while self.consume(' ') {
            spaces += 1;
        }

        // blank lines carry no indentation information
        if matches!(self.peek_char(), Some('\n') | Some('\r') | None) {
            return;
        }

        if spaces % INDENT_SPACES != 0 {
            self.lex_error(
                &format!("indentations must be a multiple of {INDENT_SPACES} spaces!"),
                start,
            );
            return;
        }

        let indent = spaces / INDENT_SPACES;
        let location = SourceLocation::new(start, spaces);
        if indent > self.current_indent {
            self.drop_newline_before_block_token();
            for _ in 0..indent - self.current_indent {
                self.tokens.add(Token::new(TokenKind::Indent, location));
            }
        } else if indent < self.current_indent {
            self.drop_newline_before_block_token();
            for _ in 0..self.current_indent - indent {
                self.tokens.add(Token::new(TokenKind::Dedent, location));
            }
        }
        self.current_indent = indent;
    }

    /// Close the stream: balance the open indentations and add EOF
    fn finish(&mut self, start: usize) {
        if !self.modes.is_empty() {
            self.lex_error("unterminated string!", start);
            self.modes.clear();
        }
        if self.current_indent > 0 {
            self.drop_newline_before_block_token();
            let location = SourceLocation::new(start, 0);
            for _ in 0..self.current_indent {
                self.tokens.add(Token::new(TokenKind::Dedent, location));
            }
            self.current_indent = 0;
        }
        self.tokens
            .add(Token::new(TokenKind::Eof, SourceLocation::new(start, 0)));
    }

    /// Buffer raw characters inside a string until `{`, `"` or EOF
    fn lex_string_chars(&mut self) {
        let start = self.index;
        loop {
            match self.peek_char() {
                None => {
                    self.flush_string_chars(start);
                    let at = self.index;
                    self.lex_error("unterminated string!", at);
                    self.modes.pop();
                    return;
                }
                Some('"') => {
                    self.flush_string_chars(start);
                    let at = self.index;
                    self.index += 1;
                    self.add_token(TokenKind::StringEnd, at);
                    self.modes.pop();
                    return;
                }
                Some('{') => {
                    self.flush_string_chars(start);
                    let at = self.index;
                    self.index += 1;
                    self.add_token(TokenKind::StringExprStart, at);
                    self.modes.push(Mode::Expr { depth: 0 });
                    return;
                }
                Some(char) => {
                    self.index += char.len_utf8();
                }
            }
        }
    }

    fn flush_string_chars(&mut self, start: usize) {
        if self.index > start {
            let text = self.source[start..self.index].to_string();
            self.tokens.add(Token::new(
                TokenKind::StringChars(text),
                SourceLocation::new(start, self.index - start),
            ));
        }
    }

    /// Lex a single-quoted character literal
    fn add_character(&mut self, start: usize) {
        let Some(char) = self.next_char() else {
            self.lex_error("unterminated character literal!", start);
            return;
        };
        let value = if char == '\\' {
            let Some(escaped) = self.next_char() else {
                self.lex_error("unterminated character literal!", start);
                return;
            };
            match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' | '\'' | '"' => escaped,
                other => {
                    self.lex_error(&format!("invalid escape sequence '\\{other}'!"), start);
                    return;
                }
            }
        } else {
            char
        };
        if !self.consume('\'') {
            self.lex_error("unterminated character literal!", start);
            return;
        }
        self.add_token(TokenKind::Character(value), start);
    }

    fn add_number(&mut self, first_char: char, start: usize) {
        // differentiate between binary, hexadecimal, 0-prefixed and plain numbers
        if first_char == '0' {
            match self.peek_char() {
                Some('b') => return self.add_radix_number(start, 2, |c| c == '0' || c == '1'),
                Some('x') => return self.add_radix_number(start, 16, |c| c.is_ascii_hexdigit()),
                Some(digit) if digit.is_ascii_digit() => {}
                // the literal zero, possibly at end of file
                _ => return self.add_token(TokenKind::Number(0), start),
            }
        }

        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.index += 1;
        }
        let text = &self.source[start..self.index];
        match text.parse::<u64>() {
            Ok(value) => self.add_token(TokenKind::Number(value), start),
            Err(_) => self.lex_error(&format!("number '{text}' is too large!"), start),
        }
    }

    /// Lex a `0b`/`0x` prefixed literal; an empty digit run is an error
    fn add_radix_number(&mut self, start: usize, radix: u32, is_digit: fn(char) -> bool) {
        // skip the radix character after the leading zero
        self.index += 1;
        let digits_start = self.index;
        while matches!(self.peek_char(), Some(c) if is_digit(c)) {
            self.index += 1;
        }
        let text = &self.source[start..self.index];
        if self.index == digits_start {
            self.lex_error(&format!("invalid numeric value \"{text}\"!"), start);
            return;
        }
        match u64::from_str_radix(&self.source[digits_start..self.index], radix) {
            Ok(value) => self.add_token(TokenKind::Number(value), start),
            Err(_) => self.lex_error(&format!("number '{text}' is too large!"), start),
        }
    }

    fn add_identifier(&mut self, start: usize) {
        while matches!(self.peek_char(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.index += 1;
        }
        let identifier = &self.source[start..self.index];

        // keywords win over identifiers
        if let Some(keyword) = TokenKind::keyword(identifier) {
            self.add_token(keyword, start);
            return;
        }
        self.add_token(TokenKind::Identifier(identifier.to_string()), start);
    }

    /// `//` comments run to just before the next newline
    fn add_inline_comment(&mut self, start: usize) {
        while !matches!(self.peek_char(), Some('\n') | None) {
            self.index += self.peek_char().map_or(0, char::len_utf8);
        }
        let text = self.source[start..self.index].to_string();
        self.discarded.push(Token::new(
            TokenKind::Comment(text, CommentKind::Inline),
            SourceLocation::new(start, self.index - start),
        ));
    }

    /// `/* ... */` comments run to the matching terminator, which may be
    /// several lines away
    fn add_block_comment(&mut self, start: usize) {
        loop {
            match self.next_char() {
                None => {
                    let text = &self.source[start..self.index];
                    self.lex_error(&format!("unterminated block comment \"{text}\"!"), start);
                    return;
                }
                Some('*') if self.consume('/') => break,
                Some(_) => {}
            }
        }
        let text = self.source[start..self.index].to_string();
        self.discarded.push(Token::new(
            TokenKind::Comment(text, CommentKind::Block),
            SourceLocation::new(start, self.index - start),
        ));
    }
}
