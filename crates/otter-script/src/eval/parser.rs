//! Recursive descent parser

use std::rc::Rc;

use super::ast::{Arg, CmpOp, Expr, LambdaDef, Literal, Param, Stmt, StmtKind, UnaryOp};
use super::lexer::{Token, TokenKind, tokenize};
use crate::error::{ScriptError, ScriptResult};
use crate::ops::{BinaryOp, CompareOp};

/// Words that start constructs this language does not have.
const RESERVED: &[&str] = &[
    "async", "await", "break", "class", "continue", "def", "elif", "except", "finally", "for",
    "nonlocal", "return", "try", "while", "with", "yield",
];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "del", "else", "from", "global", "if",
    "import", "in", "is", "lambda", "not", "or", "pass", "raise",
];

/// Parse a whole source file into statements.
pub fn parse_module(source: &str, filename: &str) -> ScriptResult<Vec<Stmt>> {
    let tokens = tokenize(source, filename)?;
    let mut parser = Parser { tokens, pos: 0, source, filename };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parse a single expression.
pub fn parse_expression(source: &str, filename: &str) -> ScriptResult<Expr> {
    let tokens = tokenize(source, filename)?;
    let mut parser = Parser { tokens, pos: 0, source, filename };
    let expr = parser.testlist()?;
    parser.eat(&TokenKind::Newline);
    if !parser.at_eof() {
        return Err(parser.invalid());
    }
    Ok(expr)
}

struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'src str,
    filename: &'src str,
}

impl Parser<'_> {
    // -----------------------------------------------------------------
    // Token management
    // -----------------------------------------------------------------

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Op(o) if *o == op)
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Name(n) if n == word)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ScriptResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn error_at(&self, message: impl Into<String>, token: &Token) -> ScriptError {
        let text = self
            .source
            .lines()
            .nth(token.line.saturating_sub(1))
            .map(str::to_string);
        ScriptError::syntax_error(message, self.filename, token.line, token.col + 1, text)
    }

    fn invalid(&self) -> ScriptError {
        self.error_at("invalid syntax", self.current())
    }

    fn identifier(&mut self) -> ScriptResult<String> {
        match &self.current().kind {
            TokenKind::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let name = n.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.invalid()),
        }
    }

    fn end_of_statement(&mut self) -> ScriptResult<()> {
        if self.eat(&TokenKind::Newline) || self.at_eof() {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn statement(&mut self) -> ScriptResult<Stmt> {
        let start = self.current().clone();
        let kind = self.statement_kind()?;
        self.end_of_statement()?;
        Ok(Stmt {
            kind,
            line: start.line,
            col: start.col,
        })
    }

    fn statement_kind(&mut self) -> ScriptResult<StmtKind> {
        if let TokenKind::Name(word) = &self.current().kind {
            if RESERVED.contains(&word.as_str()) {
                return Err(self.invalid());
            }
        }
        if self.eat_word("pass") {
            return Ok(StmtKind::Pass);
        }
        if self.eat_word("del") {
            let mut targets = vec![self.bitor()?];
            while self.eat_op(",") {
                if self.check(&TokenKind::Newline) {
                    break;
                }
                targets.push(self.bitor()?);
            }
            for target in &targets {
                self.check_target(target, "delete")?;
            }
            return Ok(StmtKind::Delete(targets));
        }
        if self.eat_word("raise") {
            if self.statement_ends() {
                return Ok(StmtKind::Raise(None, None));
            }
            let exc = self.test()?;
            let cause = if self.eat_word("from") { Some(self.test()?) } else { None };
            return Ok(StmtKind::Raise(Some(exc), cause));
        }
        if self.eat_word("assert") {
            let test = self.test()?;
            let message = if self.eat_op(",") { Some(self.test()?) } else { None };
            return Ok(StmtKind::Assert(test, message));
        }
        if self.eat_word("global") {
            let mut names = vec![self.identifier()?];
            while self.eat_op(",") {
                names.push(self.identifier()?);
            }
            return Ok(StmtKind::Global(names));
        }
        if self.eat_word("import") {
            let mut names = Vec::new();
            loop {
                let module = self.dotted_name()?;
                let alias = if self.eat_word("as") { Some(self.identifier()?) } else { None };
                names.push((module, alias));
                if !self.eat_op(",") {
                    break;
                }
            }
            return Ok(StmtKind::Import(names));
        }
        if self.eat_word("from") {
            let module = self.dotted_name()?;
            if !self.eat_word("import") {
                return Err(self.invalid());
            }
            let parenthesized = self.eat_op("(");
            let mut names = Vec::new();
            loop {
                let name = self.identifier()?;
                let alias = if self.eat_word("as") { Some(self.identifier()?) } else { None };
                names.push((name, alias));
                if !self.eat_op(",") || (parenthesized && self.check_op(")")) {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            return Ok(StmtKind::FromImport(module, names));
        }

        let first = self.testlist()?;
        if self.check_op("=") {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat_op("=") {
                if let Some(previous) = value.take() {
                    targets.push(previous);
                }
                value = Some(self.testlist()?);
            }
            for target in &targets {
                self.check_target(target, "assign to")?;
            }
            let value = value.ok_or_else(|| self.invalid())?;
            return Ok(StmtKind::Assign(targets, value));
        }
        if let TokenKind::Op(op) = self.current().kind {
            let aug = match op {
                "+=" => Some(BinaryOp::Add),
                "-=" => Some(BinaryOp::Sub),
                "*=" => Some(BinaryOp::Mul),
                "/=" => Some(BinaryOp::TrueDiv),
                "//=" => Some(BinaryOp::FloorDiv),
                "%=" => Some(BinaryOp::Mod),
                "**=" => Some(BinaryOp::Pow),
                "&=" => Some(BinaryOp::And),
                "|=" => Some(BinaryOp::Or),
                "^=" => Some(BinaryOp::Xor),
                _ => None,
            };
            if let Some(aug) = aug {
                let token = self.advance();
                if !matches!(first, Expr::Name(_) | Expr::Attribute(..) | Expr::Subscript(..)) {
                    return Err(self.error_at(
                        "'tuple' is an illegal expression for augmented assignment",
                        &token,
                    ));
                }
                let value = self.testlist()?;
                return Ok(StmtKind::AugAssign(first, aug, value));
            }
        }
        Ok(StmtKind::Expr(first))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn statement_ends(&self) -> bool {
        matches!(self.current().kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn dotted_name(&mut self) -> ScriptResult<String> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn check_target(&self, target: &Expr, verb: &str) -> ScriptResult<()> {
        let what = match target {
            Expr::Name(_) | Expr::Attribute(..) | Expr::Subscript(..) => return Ok(()),
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.check_target(item, verb)?;
                }
                return Ok(());
            }
            Expr::Literal(_) => "literal",
            Expr::Call(..) => "function call",
            Expr::Lambda(_) => "lambda",
            Expr::Compare(..) => "comparison",
            Expr::IfElse(..) => "conditional expression",
            _ => "expression",
        };
        Err(self.error_at(format!("cannot {} {}", verb, what), self.current()))
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    /// Comma separated expressions; a trailing comma or several items make
    /// a tuple.
    fn testlist(&mut self) -> ScriptResult<Expr> {
        let first = self.test()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.statement_ends() || self.check_op("=") || self.check_op(")") {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn test(&mut self) -> ScriptResult<Expr> {
        if self.check_word("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if !self.eat_word("if") {
            return Ok(body);
        }
        let cond = self.or_test()?;
        if !self.eat_word("else") {
            return Err(self.invalid());
        }
        let orelse = self.test()?;
        Ok(Expr::IfElse(Box::new(cond), Box::new(body), Box::new(orelse)))
    }

    fn lambda(&mut self) -> ScriptResult<Expr> {
        let line = self.advance().line;
        let mut params: Vec<Param> = Vec::new();
        let mut varargs = None;
        let mut kwargs = None;
        while !self.check_op(":") {
            if self.eat_op("**") {
                kwargs = Some(self.identifier()?);
            } else if self.eat_op("*") {
                varargs = Some(self.identifier()?);
            } else {
                let token = self.current().clone();
                let name = self.identifier()?;
                let default = if self.eat_op("=") { Some(self.test()?) } else { None };
                if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error_at("non-default argument follows default argument", &token));
                }
                if params.iter().any(|p| p.name == name) {
                    return Err(self.error_at(
                        format!("duplicate argument '{}' in function definition", name),
                        &token,
                    ));
                }
                params.push(Param { name, default });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(":")?;
        let body = self.test()?;
        Ok(Expr::Lambda(Rc::new(LambdaDef {
            params,
            varargs,
            kwargs,
            body,
            line,
        })))
    }

    fn or_test(&mut self) -> ScriptResult<Expr> {
        let mut left = self.and_test()?;
        while self.eat_word("or") {
            let right = self.and_test()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> ScriptResult<Expr> {
        let mut left = self.not_test()?;
        while self.eat_word("and") {
            let right = self.not_test()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> ScriptResult<Expr> {
        if self.eat_word("not") {
            let operand = self.not_test()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match &self.current().kind {
            TokenKind::Op("<") => CmpOp::Rich(CompareOp::Lt),
            TokenKind::Op("<=") => CmpOp::Rich(CompareOp::Le),
            TokenKind::Op("==") => CmpOp::Rich(CompareOp::Eq),
            TokenKind::Op("!=") => CmpOp::Rich(CompareOp::Ne),
            TokenKind::Op(">") => CmpOp::Rich(CompareOp::Gt),
            TokenKind::Op(">=") => CmpOp::Rich(CompareOp::Ge),
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "is" => {
                self.advance();
                return Some(if self.eat_word("not") { CmpOp::IsNot } else { CmpOp::Is });
            }
            TokenKind::Name(n) if n == "not" => {
                let next = self.tokens.get(self.pos + 1)?;
                if !matches!(&next.kind, TokenKind::Name(w) if w == "in") {
                    return None;
                }
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> ScriptResult<Expr> {
        let left = self.bitor()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.bitor()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> ScriptResult<Expr>,
    ) -> ScriptResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_op(symbol) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn bitor(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[("|", BinaryOp::Or)], Self::bitxor)
    }

    fn bitxor(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[("^", BinaryOp::Xor)], Self::bitand)
    }

    fn bitand(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[("&", BinaryOp::And)], Self::arith)
    }

    fn arith(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::term)
    }

    fn term(&mut self) -> ScriptResult<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::TrueDiv),
                ("//", BinaryOp::FloorDiv),
                ("%", BinaryOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> ScriptResult<Expr> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else if self.eat_op("~") {
            UnaryOp::Invert
        } else {
            return self.power();
        };
        let operand = self.factor()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let name = self.identifier()?;
                expr = Expr::Attribute(Box::new(expr), name);
            } else if self.eat_op("(") {
                let args = self.call_args()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op("[") {
                let index = self.subscript_list()?;
                self.expect_op("]")?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> ScriptResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check_op(")") {
            let token = self.current().clone();
            if self.eat_op("**") {
                args.push(Arg::DoubleStar(self.test()?));
            } else if self.eat_op("*") {
                args.push(Arg::Star(self.test()?));
            } else {
                let is_keyword = matches!(token.kind, TokenKind::Name(_))
                    && matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Op("=")));
                if is_keyword {
                    let name = self.identifier()?;
                    self.expect_op("=")?;
                    args.push(Arg::Keyword(name, self.test()?));
                } else {
                    if args.iter().any(|a| matches!(a, Arg::Keyword(..) | Arg::DoubleStar(_))) {
                        return Err(self.error_at("positional argument follows keyword argument", &token));
                    }
                    args.push(Arg::Positional(self.test()?));
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(args)
    }

    fn subscript_list(&mut self) -> ScriptResult<Expr> {
        let first = self.subscript()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn slice_part(&mut self) -> ScriptResult<Option<Box<Expr>>> {
        if self.check_op(":") || self.check_op("]") || self.check_op(",") {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.test()?)))
        }
    }

    fn subscript(&mut self) -> ScriptResult<Expr> {
        let start = self.slice_part()?;
        if !self.eat_op(":") {
            return start.map(|e| *e).ok_or_else(|| self.invalid());
        }
        let stop = self.slice_part()?;
        let step = if self.eat_op(":") { self.slice_part()? } else { None };
        Ok(Expr::Slice(start, stop, step))
    }

    fn atom(&mut self) -> ScriptResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(i)))
            }
            TokenKind::Long(i) => {
                self.advance();
                Ok(Expr::Literal(Literal::Long(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(f)))
            }
            TokenKind::Str(_) | TokenKind::Bytes(_) => self.strings(),
            TokenKind::Name(name) => {
                let literal = match name.as_str() {
                    "None" => Some(Literal::None),
                    "True" => Some(Literal::Bool(true)),
                    "False" => Some(Literal::Bool(false)),
                    _ => None,
                };
                if let Some(literal) = literal {
                    self.advance();
                    return Ok(Expr::Literal(literal));
                }
                Ok(Expr::Name(self.identifier()?))
            }
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let inner = self.testlist()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            TokenKind::Op("[") => {
                self.advance();
                let items = self.items("]")?;
                Ok(Expr::List(items))
            }
            TokenKind::Op("{") => {
                self.advance();
                self.braces()
            }
            _ => Err(self.invalid()),
        }
    }

    fn items(&mut self, close: &str) -> ScriptResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check_op(close) {
            items.push(self.test()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn braces(&mut self) -> ScriptResult<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.test()?;
        if !self.eat_op(":") {
            let mut items = vec![first];
            if self.eat_op(",") {
                items.extend(self.items("}")?);
            } else {
                self.expect_op("}")?;
            }
            return Ok(Expr::Set(items));
        }
        let mut pairs = vec![(first, self.test()?)];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            let key = self.test()?;
            self.expect_op(":")?;
            pairs.push((key, self.test()?));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(pairs))
    }

    /// Adjacent literals concatenate; str and bytes do not mix.
    fn strings(&mut self) -> ScriptResult<Expr> {
        let mut text: Option<String> = None;
        let mut bytes: Option<Vec<u8>> = None;
        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::Str(s) if bytes.is_none() => text.get_or_insert_with(String::new).push_str(&s),
                TokenKind::Bytes(b) if text.is_none() => bytes.get_or_insert_with(Vec::new).extend(b),
                TokenKind::Str(_) | TokenKind::Bytes(_) => {
                    return Err(self.error_at("cannot mix bytes and nonbytes literals", &token));
                }
                _ => break,
            }
            self.advance();
        }
        Ok(Expr::Literal(match (text, bytes) {
            (_, Some(b)) => Literal::Bytes(b),
            (t, None) => Literal::Str(t.unwrap_or_default()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Stmt> {
        parse_module(source, "<test>").unwrap()
    }

    #[test]
    fn test_chained_assignment() {
        let stmts = parse("a = b = 1\n");
        let StmtKind::Assign(targets, Expr::Literal(Literal::Int(1))) = &stmts[0].kind else {
            panic!("expected an assignment");
        };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 ** 2", "<test>").unwrap();
        let Expr::Binary(BinaryOp::Add, _, right) = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_not_in_and_is_not() {
        let expr = parse_expression("a not in b is not c", "<test>").unwrap();
        let Expr::Compare(_, ops) = expr else {
            panic!("expected a comparison");
        };
        let ops: Vec<CmpOp> = ops.into_iter().map(|(op, _)| op).collect();
        assert_eq!(ops, vec![CmpOp::NotIn, CmpOp::IsNot]);
    }

    #[test]
    fn test_slices_and_calls() {
        let expr = parse_expression("f(x, *ys, k=1)[1:]", "<test>").unwrap();
        let Expr::Subscript(call, index) = expr else {
            panic!("expected a subscript");
        };
        assert!(matches!(*index, Expr::Slice(Some(_), None, None)));
        let Expr::Call(_, args) = *call else {
            panic!("expected a call");
        };
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_reserved_word_is_syntax_error() {
        let err = parse_module("x = 1\ndef f(): pass\n", "m.py").unwrap_err();
        let ScriptError::SyntaxError(info) = err else {
            panic!("expected a syntax error");
        };
        assert_eq!((info.message.as_str(), info.lineno), ("invalid syntax", 2));
    }

    #[test]
    fn test_cannot_assign_to_literal() {
        let err = parse_module("1 = x\n", "m.py").unwrap_err();
        assert!(err.to_string().contains("cannot assign to literal"));
    }
}
