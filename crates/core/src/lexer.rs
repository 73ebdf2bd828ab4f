use crate::error::{CompileError, Position};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal, decimal or `0x`/`0o`/`0b` prefixed
    Int(i64),
    Float(f64),
    /// String literal with escapes resolved
    Str(String),
    Bool(bool),
    Id(String),
    // Keywords, reclassified from identifiers
    Levels,
    Soft,
    Vars,
    Consts,
    Rules,
    // Punctuation
    Question,
    Semi,
    Colon,
    LParen,
    RParen,
    Comma,
    Assign,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Bang,
    Tilde,
    Gt,
    Lt,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    GtEq,
    LtEq,
    /// `=>` or U+2192
    Then,
    /// `!>` or U+219B
    NotThen,
    Eof,
    /// Lexical error; the stream continues after it
    Bad(String),
}

impl Token {
    pub fn is_section_keyword(&self) -> bool {
        matches!(
            self,
            Token::Levels | Token::Vars | Token::Consts | Token::Rules
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Token::Int(_) | Token::Float(_) | Token::Str(_) | Token::Bool(_)
        )
    }

    pub fn is_unary_op(&self) -> bool {
        matches!(self, Token::Plus | Token::Minus | Token::Tilde | Token::Bang)
    }

    pub fn is_binary_op(&self) -> bool {
        matches!(
            self,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Percent
                | Token::Caret
                | Token::Amp
                | Token::Pipe
                | Token::Gt
                | Token::Lt
                | Token::AndAnd
                | Token::OrOr
                | Token::EqEq
                | Token::NotEq
                | Token::GtEq
                | Token::LtEq
        )
    }

    /// Tokens that may appear inside an expression.
    pub fn is_expr_token(&self) -> bool {
        self.is_literal()
            || self.is_binary_op()
            || matches!(
                self,
                Token::Id(_) | Token::LParen | Token::RParen | Token::Bang | Token::Tilde
            )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(v) => write!(f, "{}", v),
            Token::Float(v) => write!(f, "{:?}", v),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Id(s) => f.write_str(s),
            Token::Levels => f.write_str("levels"),
            Token::Soft => f.write_str("soft"),
            Token::Vars => f.write_str("vars"),
            Token::Consts => f.write_str("consts"),
            Token::Rules => f.write_str("rules"),
            Token::Question => f.write_str("?"),
            Token::Semi => f.write_str(";"),
            Token::Colon => f.write_str(":"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Assign => f.write_str("="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Caret => f.write_str("^"),
            Token::Amp => f.write_str("&"),
            Token::Pipe => f.write_str("|"),
            Token::Bang => f.write_str("!"),
            Token::Tilde => f.write_str("~"),
            Token::Gt => f.write_str(">"),
            Token::Lt => f.write_str("<"),
            Token::AndAnd => f.write_str("&&"),
            Token::OrOr => f.write_str("||"),
            Token::EqEq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::GtEq => f.write_str(">="),
            Token::LtEq => f.write_str("<="),
            Token::Then => f.write_str("=>"),
            Token::NotThen => f.write_str("!>"),
            Token::Eof => f.write_str("EOF"),
            Token::Bad(msg) => write!(f, "bad token: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    /// Source text of the token as written
    pub text: String,
    pub line: u32,
}

/// Streaming lexer with one token of lookahead.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    file: String,
    saved: Option<Spanned>,
}

impl Lexer {
    pub fn new(src: &str, filename: &str) -> Self {
        Lexer {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            file: filename.to_owned(),
            saved: None,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Position of the lookahead token if there is one, else of the scan point.
    pub fn position(&self) -> Position {
        let line = self.saved.as_ref().map_or(self.line, |s| s.line);
        Position::new(&self.file, line)
    }

    /// Consume and return the next token.
    pub fn lex(&mut self) -> Spanned {
        match self.saved.take() {
            Some(tok) => tok,
            None => self.scan(),
        }
    }

    /// Return the next token without consuming it.
    pub fn peek(&mut self) -> &Spanned {
        let tok = match self.saved.take() {
            Some(tok) => tok,
            None => self.scan(),
        };
        self.saved.insert(tok)
    }

    /// Discard tokens until `stop` holds for the next one, which is left
    /// unconsumed. End of input always stops.
    pub fn lex_while_not<F>(&mut self, stop: F) -> &Spanned
    where
        F: Fn(&Token) -> bool,
    {
        loop {
            let tok = &self.peek().token;
            if *tok == Token::Eof || stop(tok) {
                break;
            }
            self.lex();
        }
        self.peek()
    }

    // ── Character cursor ─────────────────────────────────────────────

    /// Advance one char; past the end yields `None` but still moves the
    /// cursor so `unget` stays symmetric.
    fn get(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        self.pos += 1;
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn unget(&mut self) {
        self.pos -= 1;
        if self.chars.get(self.pos) == Some(&'\n') {
            self.line -= 1;
        }
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn text_from(&self, start: usize) -> String {
        let end = self.pos.min(self.chars.len());
        self.chars[start..end].iter().collect()
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.cur() {
            if c == '#' {
                while let Some(c) = self.cur() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c.is_whitespace() {
                self.get();
            } else {
                break;
            }
        }
    }

    fn scan(&mut self) -> Spanned {
        self.skip_blank();
        let line = self.line;
        let start = self.pos;
        let c = match self.cur() {
            Some(c) => c,
            None => {
                return Spanned {
                    token: Token::Eof,
                    text: String::new(),
                    line,
                }
            }
        };
        let token = if c == '"' {
            self.lex_string()
        } else if c.is_ascii_digit() || c == '.' {
            self.lex_number()
        } else if c.is_alphabetic() || c == '_' {
            self.lex_id()
        } else {
            self.lex_op()
        };
        Spanned {
            token,
            text: self.text_from(start),
            line,
        }
    }

    fn lex_id(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.cur() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = self.text_from(start);
        match word.as_str() {
            "levels" => Token::Levels,
            "soft" => Token::Soft,
            "vars" => Token::Vars,
            "consts" => Token::Consts,
            "rules" => Token::Rules,
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            _ => Token::Id(word),
        }
    }

    fn lex_op(&mut self) -> Token {
        let c = match self.get() {
            Some(c) => c,
            None => return Token::Eof,
        };
        let single = match c {
            '?' => Token::Question,
            ';' => Token::Semi,
            ':' => Token::Colon,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '%' => Token::Percent,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '&' => Token::Amp,
            '|' => Token::Pipe,
            '=' => Token::Assign,
            '>' => Token::Gt,
            '<' => Token::Lt,
            ',' => Token::Comma,
            '!' => Token::Bang,
            '~' => Token::Tilde,
            '\u{2192}' => return Token::Then,
            '\u{219B}' => return Token::NotThen,
            other => return Token::Bad(format!("bad rune '{}'", other)),
        };
        if !matches!(c, '=' | '!' | '>' | '<' | '&' | '|') {
            return single;
        }
        let merged = match (c, self.cur()) {
            ('=', Some('=')) => Token::EqEq,
            ('=', Some('>')) => Token::Then,
            ('!', Some('=')) => Token::NotEq,
            ('!', Some('>')) => Token::NotThen,
            ('>', Some('=')) => Token::GtEq,
            ('<', Some('=')) => Token::LtEq,
            ('&', Some('&')) => Token::AndAnd,
            ('|', Some('|')) => Token::OrOr,
            _ => return single,
        };
        self.pos += 1;
        merged
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let mut has_dot = false;
        let mut radix: Option<u32> = None;

        let first = self.get();
        if first == Some('.') {
            has_dot = true;
            self.get();
        } else if first == Some('0') {
            match self.get() {
                Some('x') => radix = Some(16),
                Some('o') => radix = Some(8),
                Some('b') => radix = Some(2),
                _ => self.unget(),
            }
            if radix.is_some() {
                self.get();
            }
        }
        let mut r = self.get();
        while r.is_some_and(|c| is_digit_in(c, radix)) {
            r = self.get();
        }
        if r == Some('.') {
            if has_dot || radix.is_some() {
                return Token::Bad(format!("bad float [{}]", self.text_from(start)));
            }
            has_dot = true;
            r = self.get();
            while r.is_some_and(|c| c.is_ascii_digit()) {
                r = self.get();
            }
        }
        if matches!(r, Some('e') | Some('E')) {
            if matches!(self.get(), Some('+') | Some('-')) {
                self.get();
            }
        } else {
            self.unget();
            if !has_dot {
                let text = self.text_from(start);
                let parsed = match radix {
                    Some(base) => i64::from_str_radix(&text[2..], base),
                    None => text.parse::<i64>(),
                };
                return match parsed {
                    Ok(v) => Token::Int(v),
                    Err(_) => Token::Bad(format!("bad int [{}]", text)),
                };
            }
        }
        if radix.is_some() {
            return Token::Bad(format!("bad float with hex [{}]", self.text_from(start)));
        }
        let mut r = self.get();
        while r.is_some_and(|c| c.is_ascii_digit()) {
            r = self.get();
        }
        self.unget();
        let text = self.text_from(start);
        match text.parse::<f64>() {
            Ok(v) => Token::Float(v),
            Err(_) => Token::Bad(format!("bad float [{}]", text)),
        }
    }

    fn lex_string(&mut self) -> Token {
        let start_line = self.line;
        self.get();
        let mut raw = String::new();
        loop {
            match self.get() {
                None => {
                    return Token::Bad(format!("unterminated str [\"{}]", raw));
                }
                Some('"') => break,
                Some('\n') => raw.push_str("\\n"),
                Some('\\') => match self.get() {
                    Some(c) if c == '"' || is_str_char(c) => {
                        raw.push('\\');
                        raw.push(c);
                    }
                    Some(c) => return Token::Bad(format!("bad \\{} [\"{}]", c.escape_default(), raw)),
                    None => return Token::Bad(format!("unterminated str [\"{}]", raw)),
                },
                Some(c) if is_str_char(c) => raw.push(c),
                Some(c) => {
                    self.unget();
                    return Token::Bad(format!(
                        "unterminated str [\"{}] at {} (started line {})",
                        raw,
                        c.escape_default(),
                        start_line
                    ));
                }
            }
        }
        match unescape(&raw) {
            Ok(s) => Token::Str(s),
            Err(msg) => Token::Bad(format!("badly quoted str [\"{}\"]: {}", raw, msg)),
        }
    }
}

fn is_digit_in(c: char, radix: Option<u32>) -> bool {
    match radix {
        None => c.is_ascii_digit(),
        Some(16) => c.is_ascii_digit() || ('a'..='f').contains(&c),
        Some(8) => ('0'..='7').contains(&c),
        Some(2) => c == '0' || c == '1',
        Some(_) => false,
    }
}

fn is_str_char(c: char) -> bool {
    c != '"' && !c.is_control()
}

/// Resolve backslash escapes: `\a \b \f \n \r \t \v \\ \"`, `\xHH`,
/// three-digit octal, `\uHHHH` and `\UHHHHHHHH`. Byte escapes map to
/// the code point of the same value.
fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut it = raw.chars().peekable();
    while let Some(c) = it.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let e = it.next().ok_or("trailing backslash")?;
        let decoded = match e {
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0C}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{0B}',
            '\\' => '\\',
            '"' => '"',
            'x' => take_code(&mut it, 2, 16)?,
            'u' => take_code(&mut it, 4, 16)?,
            'U' => take_code(&mut it, 8, 16)?,
            '0'..='7' => {
                let mut digits = String::from(e);
                for _ in 0..2 {
                    match it.next() {
                        Some(d @ '0'..='7') => digits.push(d),
                        _ => return Err("invalid octal escape".into()),
                    }
                }
                let v = u32::from_str_radix(&digits, 8).map_err(|e| e.to_string())?;
                if v > 255 {
                    return Err("octal escape out of range".into());
                }
                char::from_u32(v).ok_or("invalid octal escape")?
            }
            other => return Err(format!("unknown escape \\{}", other)),
        };
        out.push(decoded);
    }
    Ok(out)
}

fn take_code<I>(it: &mut I, n: usize, radix: u32) -> Result<char, String>
where
    I: Iterator<Item = char>,
{
    let digits: String = it.take(n).collect();
    if digits.chars().count() != n || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(format!("invalid escape digits '{}'", digits));
    }
    let v = u32::from_str_radix(&digits, radix).map_err(|e| e.to_string())?;
    char::from_u32(v).ok_or_else(|| format!("invalid code point {:#x}", v))
}

/// Lex a whole source, failing on the first bad token.
pub fn tokenize(src: &str, filename: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut lexer = Lexer::new(src, filename);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.lex();
        if let Token::Bad(msg) = &tok.token {
            return Err(CompileError::lex(&Position::new(filename, tok.line), msg.clone()));
        }
        let done = tok.token == Token::Eof;
        tokens.push(tok);
        if done {
            break;
        }
    }
    Ok(tokens)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
