use super::XPathError;
use super::ast::{Expr, NodeTest, PathRoot, Step};
use super::lexer::{Spanned, Token, tokenize};

/// Names that look like function calls but are node tests or keywords.
const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "attribute",
    "comment",
    "document-node",
    "element",
    "empty-sequence",
    "if",
    "item",
    "node",
    "processing-instruction",
    "schema-attribute",
    "schema-element",
    "text",
    "typeswitch",
];

const KIND_TESTS: &[&str] = &[
    "attribute",
    "comment",
    "document-node",
    "element",
    "node",
    "processing-instruction",
    "schema-attribute",
    "schema-element",
    "text",
];

/// Parses an XPath 2.0 expression.
pub fn parse(input: &str) -> Result<Expr, XPathError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {other:?} after expression"))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .or_else(|| self.tokens.last())
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.offset)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::new(message, self.offset())
    }

    fn expect(&mut self, expected: Token) -> Result<(), XPathError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(name) if name == keyword)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), XPathError> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected `{keyword}`")))
        }
    }

    fn expect_name(&mut self) -> Result<String, XPathError> {
        match self.advance() {
            Token::Name(name) => Ok(name),
            other => Err(self.error(format!("expected a name, found {other:?}"))),
        }
    }

    fn expr(&mut self) -> Result<Expr, XPathError> {
        let first = self.expr_single()?;
        if *self.peek() != Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while *self.peek() == Token::Comma {
            self.advance();
            items.push(self.expr_single()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn expr_single(&mut self) -> Result<Expr, XPathError> {
        if let Token::Name(name) = self.peek() {
            let name = name.clone();
            if matches!(name.as_str(), "for" | "some" | "every") && *self.peek_at(1) == Token::Dollar
            {
                return self.binding(name);
            }
            if name == "if" && *self.peek_at(1) == Token::LParen {
                return self.if_expr();
            }
        }
        self.or_expr()
    }

    fn binding(&mut self, keyword: String) -> Result<Expr, XPathError> {
        self.advance();
        let mut bindings = Vec::new();
        loop {
            self.expect(Token::Dollar)?;
            let var = self.expect_name()?;
            self.expect_keyword("in")?;
            bindings.push((var, self.expr_single()?));
            if *self.peek() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_keyword(if keyword == "for" { "return" } else { "satisfies" })?;
        let body = Box::new(self.expr_single()?);
        Ok(Expr::Binding {
            keyword,
            bindings,
            body,
        })
    }

    fn if_expr(&mut self) -> Result<Expr, XPathError> {
        self.advance();
        self.expect(Token::LParen)?;
        let condition = Box::new(self.expr()?);
        self.expect(Token::RParen)?;
        self.expect_keyword("then")?;
        let then_branch = Box::new(self.expr_single()?);
        self.expect_keyword("else")?;
        let else_branch = Box::new(self.expr_single()?);
        Ok(Expr::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn binary(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, XPathError>,
        operator: fn(&Token) -> Option<String>,
    ) -> Result<Expr, XPathError> {
        let mut left = next(self)?;
        while let Some(op) = operator(self.peek()) {
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::and_expr, |t| keyword_op(t, &["or"]))
    }

    fn and_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::comparison_expr, |t| keyword_op(t, &["and"]))
    }

    fn comparison_expr(&mut self) -> Result<Expr, XPathError> {
        let left = self.range_expr()?;
        let op = match self.peek() {
            Token::Eq => Some("=".to_string()),
            Token::NotEq => Some("!=".to_string()),
            Token::Lt => Some("<".to_string()),
            Token::LtEq => Some("<=".to_string()),
            Token::Gt => Some(">".to_string()),
            Token::GtEq => Some(">=".to_string()),
            Token::LtLt => Some("<<".to_string()),
            Token::GtGt => Some(">>".to_string()),
            other => keyword_op(other, &["eq", "ne", "lt", "le", "gt", "ge", "is"]),
        };
        let Some(op) = op else {
            return Ok(left);
        };
        self.advance();
        let right = self.range_expr()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn range_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::additive_expr, |t| keyword_op(t, &["to"]))
    }

    fn additive_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::multiplicative_expr, |t| match t {
            Token::Plus => Some("+".to_string()),
            Token::Minus => Some("-".to_string()),
            _ => None,
        })
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::union_expr, |t| match t {
            Token::Star => Some("*".to_string()),
            other => keyword_op(other, &["div", "idiv", "mod"]),
        })
    }

    fn union_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::intersect_expr, |t| match t {
            Token::Pipe => Some("|".to_string()),
            other => keyword_op(other, &["union"]),
        })
    }

    fn intersect_expr(&mut self) -> Result<Expr, XPathError> {
        self.binary(Self::type_expr, |t| keyword_op(t, &["intersect", "except"]))
    }

    fn type_expr(&mut self) -> Result<Expr, XPathError> {
        let mut operand = self.unary_expr()?;
        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Token::Name(a), Token::Name(b)) if a == "instance" && b == "of" => "instance of",
                (Token::Name(a), Token::Name(b)) if a == "treat" && b == "as" => "treat as",
                (Token::Name(a), Token::Name(b)) if a == "castable" && b == "as" => "castable as",
                (Token::Name(a), Token::Name(b)) if a == "cast" && b == "as" => "cast as",
                _ => return Ok(operand),
            };
            self.advance();
            self.advance();
            let type_name = self.sequence_type()?;
            operand = Expr::TypeOp {
                op: op.to_string(),
                operand: Box::new(operand),
                type_name,
            };
        }
    }

    fn sequence_type(&mut self) -> Result<String, XPathError> {
        let mut text = self.expect_name()?;
        if *self.peek() == Token::LParen {
            text.push_str(&self.balanced_parens()?);
        }
        match self.peek() {
            Token::Question => text.push('?'),
            Token::Star => text.push('*'),
            Token::Plus => text.push('+'),
            _ => return Ok(text),
        }
        self.advance();
        Ok(text)
    }

    /// Consumes a parenthesized group verbatim, for kind tests and types.
    fn balanced_parens(&mut self) -> Result<String, XPathError> {
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            let token = self.advance();
            match &token {
                Token::LParen => {
                    depth += 1;
                    text.push('(');
                }
                Token::RParen => {
                    depth -= 1;
                    text.push(')');
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                Token::Name(name) => text.push_str(name),
                Token::Star => text.push('*'),
                Token::Comma => text.push(','),
                Token::Question => text.push('?'),
                Token::Str(s) => {
                    text.push('\'');
                    text.push_str(s);
                    text.push('\'');
                }
                Token::Eof => return Err(self.error("unterminated parenthesized type")),
                other => return Err(self.error(format!("unexpected {other:?} in type"))),
            }
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, XPathError> {
        let op = match self.peek() {
            Token::Minus => '-',
            Token::Plus => '+',
            _ => return self.path_expr(),
        };
        self.advance();
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary_expr()?),
        })
    }

    fn path_expr(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Token::Slash => {
                self.advance();
                let steps = if starts_step(self.peek()) {
                    self.relative_path()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    root: Some(PathRoot::Root),
                    steps,
                })
            }
            Token::DoubleSlash => {
                self.advance();
                let steps = self.relative_path()?;
                Ok(Expr::Path {
                    root: Some(PathRoot::Descendant),
                    steps,
                })
            }
            _ => {
                let mut steps = self.relative_path()?;
                if steps.len() == 1 && matches!(steps[0], Step::Expr(_)) {
                    if let Some(Step::Expr(expr)) = steps.pop() {
                        return Ok(expr);
                    }
                }
                Ok(Expr::Path { root: None, steps })
            }
        }
    }

    fn relative_path(&mut self) -> Result<Vec<Step>, XPathError> {
        let mut steps = vec![self.step()?];
        loop {
            match self.peek() {
                Token::Slash => {
                    self.advance();
                }
                Token::DoubleSlash => {
                    self.advance();
                    steps.push(Step::DescendantOrSelf);
                }
                _ => return Ok(steps),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step, XPathError> {
        if self.starts_primary() {
            let primary = self.primary()?;
            let predicates = self.predicates()?;
            return Ok(Step::Expr(if predicates.is_empty() {
                primary
            } else {
                Expr::Filter {
                    primary: Box::new(primary),
                    predicates,
                }
            }));
        }

        let (axis, test) = match self.peek().clone() {
            Token::DotDot => {
                self.advance();
                ("parent".to_string(), NodeTest::Kind("node()".to_string()))
            }
            Token::At => {
                self.advance();
                ("attribute".to_string(), self.node_test()?)
            }
            Token::Name(name) if *self.peek_at(1) == Token::DoubleColon => {
                self.advance();
                self.advance();
                (name, self.node_test()?)
            }
            _ => ("child".to_string(), self.node_test()?),
        };
        let predicates = self.predicates()?;
        Ok(Step::Axis {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek().clone() {
            Token::Star => {
                self.advance();
                Ok(NodeTest::Wildcard)
            }
            Token::Name(name) => {
                self.advance();
                if KIND_TESTS.contains(&name.as_str()) && *self.peek() == Token::LParen {
                    let args = self.balanced_parens()?;
                    Ok(NodeTest::Kind(format!("{name}{args}")))
                } else {
                    Ok(NodeTest::Name(name))
                }
            }
            other => Err(self.error(format!("expected a node test, found {other:?}"))),
        }
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while *self.peek() == Token::LBracket {
            self.advance();
            predicates.push(self.expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Token::Str(_) | Token::Number(_) | Token::Dollar | Token::LParen | Token::Dot => true,
            Token::Name(name) => {
                *self.peek_at(1) == Token::LParen
                    && !RESERVED_FUNCTION_NAMES.contains(&name.as_str())
            }
            _ => false,
        }
    }

    fn primary(&mut self) -> Result<Expr, XPathError> {
        match self.advance() {
            Token::Str(value) => Ok(Expr::StringLiteral(value)),
            Token::Number(value) => Ok(Expr::NumberLiteral(value)),
            Token::Dollar => Ok(Expr::VarRef(self.expect_name()?)),
            Token::Dot => Ok(Expr::ContextItem),
            Token::LParen => {
                if *self.peek() == Token::RParen {
                    self.advance();
                    return Ok(Expr::Sequence(Vec::new()));
                }
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Name(name) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        args.push(self.expr_single()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::FunctionCall { name, args })
            }
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }
}

fn keyword_op(token: &Token, keywords: &[&str]) -> Option<String> {
    match token {
        Token::Name(name) if keywords.contains(&name.as_str()) => Some(name.clone()),
        _ => None,
    }
}

fn starts_step(token: &Token) -> bool {
    matches!(
        token,
        Token::Name(_)
            | Token::Star
            | Token::At
            | Token::Dot
            | Token::DotDot
            | Token::Dollar
            | Token::LParen
            | Token::Str(_)
            | Token::Number(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_call_inside_path() {
        let expr = parse("doc('b.xml')/root/item[@id = $x]").expect("parse");
        let Expr::Path { root, steps } = expr else {
            panic!("expected a path");
        };
        assert_eq!(root, None);
        assert!(matches!(
            &steps[0],
            Step::Expr(Expr::FunctionCall { name, args })
                if name == "doc" && args == &vec![Expr::StringLiteral("b.xml".into())]
        ));
    }

    #[test]
    fn operator_keywords_are_names_in_operand_position() {
        let expr = parse("div div mod * *").expect("parse");
        let Expr::Binary { op, .. } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, "*");
    }

    #[test]
    fn kind_tests_are_not_function_calls() {
        let expr = parse("//text()").expect("parse");
        assert!(matches!(
            expr,
            Expr::Path { root: Some(PathRoot::Descendant), ref steps }
                if matches!(&steps[0], Step::Axis { test: NodeTest::Kind(k), .. } if k == "text()")
        ));
    }

    #[test]
    fn control_flow_expressions() {
        parse("if (doc-available($u)) then doc($u) else ()").expect("if");
        parse("for $i in 1 to 3 return $i * 2").expect("for");
        parse("some $n in //a satisfies $n instance of element()").expect("some");
        parse("xs:integer('3') castable as xs:integer?").expect("castable");
    }

    #[test]
    fn syntax_errors_report_position() {
        let err = parse("document('a.xml'").expect_err("missing paren");
        assert_eq!(err.position, 16);
        assert!(parse("a ==").is_err());
    }
}
