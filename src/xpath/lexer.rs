use super::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// NCName, QName or a wildcard name test such as `*:a` or `p:*`.
    Name(String),
    Str(String),
    Number(String),
    Star,
    Dollar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Slash,
    DoubleSlash,
    At,
    DoubleColon,
    Dot,
    DotDot,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LtLt,
    GtGt,
    Question,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, XPathError> {
    let mut lexer = Lexer {
        chars: input.char_indices().collect(),
        pos: 0,
        len: input.len(),
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<(usize, char)>,
    pos: usize,
    len: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_trivia(&mut self) -> Result<(), XPathError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.pos += 1;
                }
                Some('(') if self.peek_at(1) == Some(':') => self.skip_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), XPathError> {
        let start = self.offset();
        let mut depth = 0usize;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some('('), Some(':')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (Some(':'), Some(')')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (Some(_), _) => self.pos += 1,
                (None, _) => return Err(XPathError::new("unterminated comment", start)),
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, XPathError> {
        self.skip_trivia()?;
        let offset = self.offset();
        let Some(c) = self.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                offset,
            });
        };

        let token = match c {
            '"' | '\'' => self.string(c)?,
            '0'..='9' => self.number(),
            '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(),
            '.' => {
                self.pos += 1;
                if self.peek() == Some('.') {
                    self.pos += 1;
                    Token::DotDot
                } else {
                    Token::Dot
                }
            }
            '*' => {
                self.pos += 1;
                if self.peek() == Some(':') && self.peek_at(1).is_some_and(is_name_start) {
                    self.pos += 1;
                    let local = self.ncname();
                    Token::Name(format!("*:{local}"))
                } else {
                    Token::Star
                }
            }
            c if is_name_start(c) => self.name(),
            _ => {
                self.pos += 1;
                match c {
                    '$' => Token::Dollar,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '@' => Token::At,
                    '|' => Token::Pipe,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '=' => Token::Eq,
                    '?' => Token::Question,
                    '/' => self.follow('/', Token::DoubleSlash, Token::Slash),
                    ':' => {
                        if self.bump() == Some(':') {
                            Token::DoubleColon
                        } else {
                            return Err(XPathError::new("unexpected `:`", offset));
                        }
                    }
                    '!' => {
                        if self.bump() == Some('=') {
                            Token::NotEq
                        } else {
                            return Err(XPathError::new("expected `=` after `!`", offset));
                        }
                    }
                    '<' => match self.peek() {
                        Some('=') => {
                            self.pos += 1;
                            Token::LtEq
                        }
                        Some('<') => {
                            self.pos += 1;
                            Token::LtLt
                        }
                        _ => Token::Lt,
                    },
                    '>' => match self.peek() {
                        Some('=') => {
                            self.pos += 1;
                            Token::GtEq
                        }
                        Some('>') => {
                            self.pos += 1;
                            Token::GtGt
                        }
                        _ => Token::Gt,
                    },
                    other => {
                        return Err(XPathError::new(
                            format!("unexpected character `{other}`"),
                            offset,
                        ));
                    }
                }
            }
        };
        Ok(Spanned { token, offset })
    }

    fn follow(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        if self.peek() == Some(next) {
            self.pos += 1;
            matched
        } else {
            otherwise
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, XPathError> {
        let start = self.offset();
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.pos += 1;
                        value.push(quote);
                    } else {
                        return Ok(Token::Str(value));
                    }
                }
                Some(c) => value.push(c),
                None => return Err(XPathError::new("unterminated string literal", start)),
            }
        }
    }

    fn number(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        Token::Number(text)
    }

    fn ncname(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| is_name_char(*c)) {
            name.push(c);
            self.pos += 1;
        }
        name
    }

    fn name(&mut self) -> Token {
        let mut name = self.ncname();
        if self.peek() == Some(':') {
            match self.peek_at(1) {
                Some('*') => {
                    self.pos += 2;
                    name.push_str(":*");
                }
                Some(c) if is_name_start(c) => {
                    self.pos += 1;
                    name.push(':');
                    name.push_str(&self.ncname());
                }
                _ => {}
            }
        }
        Token::Name(name)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{b7}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn lexes_function_call_with_literal() {
        assert_eq!(
            tokens("doc('b.xml')/root"),
            vec![
                Token::Name("doc".into()),
                Token::LParen,
                Token::Str("b.xml".into()),
                Token::RParen,
                Token::Slash,
                Token::Name("root".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn axis_separator_is_not_part_of_a_name() {
        assert_eq!(
            tokens("child::x:a (: note :)"),
            vec![
                Token::Name("child".into()),
                Token::DoubleColon,
                Token::Name("x:a".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn doubled_quotes_escape() {
        assert_eq!(
            tokens("'it''s'"),
            vec![Token::Str("it's".into()), Token::Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let err = tokenize("concat('a', 'b").expect_err("unterminated");
        assert_eq!(err.position, 12);
    }
}
