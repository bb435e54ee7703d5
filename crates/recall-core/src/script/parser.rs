//! Recursive-descent parser for session scripts.

use crate::eval::{ErrorKind, EvalError};
use crate::value::Value;

use super::ast::{BinOp, CmpOp, Expr, FPart, Stmt, StmtKind, Target, UnaryOp};
use super::lexer::{FPiece, Tok, Token, tokenize};

/// Words that can never be used as names.
const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Statements the language deliberately lacks.
const UNSUPPORTED: &[&str] = &[
    "def", "class", "import", "from", "return", "try", "with", "lambda", "raise", "assert",
    "global", "nonlocal", "yield", "async", "await",
];

/// Deepest bracket or unary nesting accepted in one expression.
const MAX_NESTING: usize = 100;

/// Parse a whole program.
pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, EvalError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        loops: 0,
        nesting: 0,
    }
    .program()
}

/// Parse a standalone expression, as found inside an f-string field.
fn parse_expr(source: &str, line: usize) -> Result<Expr, EvalError> {
    let relocate = |mut e: EvalError| {
        e.line = Some(line);
        e
    };
    let tokens = tokenize(source.trim()).map_err(relocate)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        loops: 0,
        nesting: 0,
    };
    let expr = parser.expr().map_err(relocate)?;
    parser.eat(&Tok::Newline);
    if *parser.peek() != Tok::Eof {
        return Err(relocate(parser.error("f-string: invalid expression")));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Enclosing loop depth, for `break`/`continue` placement.
    loops: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_next(&self) -> &Tok {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), EvalError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        let message = message.into();
        let near = match self.peek() {
            Tok::Name(n) => format!(" near '{n}'"),
            Tok::Op(o) => format!(" near '{o}'"),
            Tok::Newline => " at end of line".to_string(),
            Tok::Eof => " at end of input".to_string(),
            _ => String::new(),
        };
        EvalError::new(ErrorKind::Syntax, format!("{message}{near}")).at_line(self.line())
    }

    fn program(&mut self) -> Result<Vec<Stmt>, EvalError> {
        let mut stmts = Vec::new();
        while *self.peek() != Tok::Eof {
            stmts.extend(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, EvalError> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Indent => return Err(self.error("unexpected indent")),
            Tok::Name(n) if UNSUPPORTED.contains(&n.as_str()) => {
                return Err(self.error(format!("'{n}' statements are not supported")));
            }
            Tok::Name(n) if n == "if" => self.if_stmt()?,
            Tok::Name(n) if n == "for" => self.for_stmt()?,
            Tok::Name(n) if n == "while" => self.while_stmt()?,
            _ => return self.simple_line(),
        };
        Ok(vec![Stmt { kind, line }])
    }

    /// One or more `;`-separated simple statements ending the line.
    fn simple_line(&mut self) -> Result<Vec<Stmt>, EvalError> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            stmts.push(Stmt {
                kind: self.simple_stmt()?,
                line,
            });
            if !self.eat_op(";") || matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
        }
        if !self.eat(&Tok::Newline) && *self.peek() != Tok::Eof {
            return Err(self.error("invalid syntax"));
        }
        Ok(stmts)
    }

    fn simple_stmt(&mut self) -> Result<StmtKind, EvalError> {
        if self.eat_kw("pass") {
            return Ok(StmtKind::Pass);
        }
        for (kw, kind) in [("break", StmtKind::Break), ("continue", StmtKind::Continue)] {
            if self.is_kw(kw) {
                if self.loops == 0 {
                    return Err(self.error(format!("'{kw}' outside loop")));
                }
                self.advance();
                return Ok(kind);
            }
        }
        if self.eat_kw("del") {
            let mut targets = Vec::new();
            loop {
                let expr = self.expr()?;
                targets.push(self.to_target(expr)?);
                if !self.eat_op(",") {
                    break;
                }
            }
            return Ok(StmtKind::Del(targets));
        }

        let first = self.expr_list()?;
        if self.is_op("=") {
            let mut targets = vec![self.to_target(first)?];
            self.advance();
            let mut value = self.expr_list()?;
            while self.eat_op("=") {
                targets.push(self.to_target(value)?);
                value = self.expr_list()?;
            }
            return Ok(StmtKind::Assign(targets, value));
        }

        let aug = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            let target = self.to_target(first)?;
            if matches!(target, Target::Unpack(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            self.advance();
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign(target, op, value));
        }

        Ok(StmtKind::Expr(first))
    }

    /// Indented block or a same-line simple statement after `:`.
    fn block(&mut self) -> Result<Vec<Stmt>, EvalError> {
        self.expect_op(":")?;
        if !self.eat(&Tok::Newline) {
            return self.simple_line();
        }
        if !self.eat(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !matches!(self.peek(), Tok::Dedent | Tok::Eof) {
            body.extend(self.statement()?);
        }
        self.eat(&Tok::Dedent);
        Ok(body)
    }

    fn if_stmt(&mut self) -> Result<StmtKind, EvalError> {
        self.advance();
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_kw("elif") {
                branches.push((self.expr()?, self.block()?));
            } else if self.eat_kw("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, EvalError> {
        self.advance();
        let target = self.loop_target()?;
        if !self.eat_kw("in") {
            return Err(self.error("expected 'in'"));
        }
        let iter = self.expr_list()?;
        let body = self.loop_body()?;
        Ok(StmtKind::For { target, iter, body })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, EvalError> {
        self.advance();
        let cond = self.expr()?;
        let body = self.loop_body()?;
        Ok(StmtKind::While { cond, body })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, EvalError> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        body
    }

    /// `name`, `a, b` or `(a, b)` before `in`.
    fn loop_target(&mut self) -> Result<Target, EvalError> {
        let mut targets = vec![self.loop_target_atom()?];
        while self.eat_op(",") {
            targets.push(self.loop_target_atom()?);
        }
        Ok(if targets.len() == 1 {
            targets.remove(0)
        } else {
            Target::Unpack(targets)
        })
    }

    fn loop_target_atom(&mut self) -> Result<Target, EvalError> {
        let close = if self.eat_op("(") {
            ")"
        } else if self.eat_op("[") {
            "]"
        } else {
            return match self.advance() {
                Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => Ok(Target::Name(n)),
                _ => {
                    self.pos -= 1;
                    Err(self.error("invalid loop variable"))
                }
            };
        };
        let target = self.loop_target()?;
        self.expect_op(close)?;
        Ok(match target {
            Target::Name(_) => Target::Unpack(vec![target]),
            other => other,
        })
    }

    fn to_target(&self, expr: Expr) -> Result<Target, EvalError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Subscript(..) => {
                let mut path = Vec::new();
                let mut current = expr;
                loop {
                    match current {
                        Expr::Subscript(base, index) => {
                            path.push(*index);
                            current = *base;
                        }
                        Expr::Name(root) => {
                            path.reverse();
                            return Ok(Target::Item { root, path });
                        }
                        _ => return Err(self.error("cannot assign to expression")),
                    }
                }
            }
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    /// Comma-separated expressions; more than one becomes a list.
    fn expr_list(&mut self) -> Result<Expr, EvalError> {
        let first = self.expr()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op("=" | ";" | ")" | ":")) {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::List(items))
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        let value = self.or_expr()?;
        if self.eat_kw("if") {
            let cond = self.or_expr()?;
            if !self.eat_kw("else") {
                return Err(self.error("expected 'else' in conditional expression"));
            }
            let orelse = self.expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(value),
                orelse: Box::new(orelse),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.and_expr()?;
        while self.eat_kw("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.not_expr()?;
        while self.eat_kw("and") {
            left = Expr::And(Box::new(left), Box::new(self.not_expr()?));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, EvalError> {
        if self.eat_kw("not") {
            return Ok(Expr::Not(Box::new(self.nested(Self::not_expr)?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::Ne,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::Le,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::Ge,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && matches!(self.peek_next(), Tok::Name(m) if m == "in") => {
                    self.advance();
                    CmpOp::NotIn
                }
                // Values have no identity, so `is` compares by equality.
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_next(), Tok::Name(m) if m == "not") {
                        self.advance();
                        CmpOp::Ne
                    } else {
                        CmpOp::Eq
                    }
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.arith()?));
        }
        Ok(if rest.is_empty() {
            left
        } else {
            Expr::Compare(Box::new(left), rest)
        })
    }

    fn arith(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::unary)?)));
        }
        if self.eat_op("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.nested(Self::unary)?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, EvalError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            // Right-associative and binds tighter than unary minus on its left
            let exponent = self.nested(Self::unary)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let name = match self.advance() {
                    Tok::Name(n) => n,
                    _ => return Err(self.error("expected attribute name")),
                };
                if !self.eat_op("(") {
                    return Err(self.error(format!(
                        "attribute '{name}' must be called; only method calls are supported"
                    )));
                }
                let (args, kwargs) = self.call_args()?;
                if !kwargs.is_empty() {
                    return Err(self.error("keyword arguments are not supported for methods"));
                }
                expr = Expr::Method {
                    receiver: Box::new(expr),
                    name,
                    args,
                };
            } else if self.is_op("(") {
                let Expr::Name(func) = expr else {
                    return Err(self.error("only builtin functions can be called"));
                };
                self.advance();
                let (args, kwargs) = self.call_args()?;
                expr = Expr::Call { func, args, kwargs };
            } else {
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr, EvalError> {
        let start = if self.is_op(":") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if self.eat_op(":") {
            let stop = if self.is_op("]") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op("]")?;
            return Ok(Expr::Slice {
                value: Box::new(value),
                start,
                stop,
            });
        }
        self.expect_op("]")?;
        let index = start.ok_or_else(|| self.error("expected index"))?;
        Ok(Expr::Subscript(Box::new(value), index))
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), EvalError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            if let (Tok::Name(name), Tok::Op("=")) = (self.peek(), self.peek_next()) {
                let name = name.clone();
                self.pos += 2;
                kwargs.push((name, self.expr()?));
            } else if !kwargs.is_empty() {
                return Err(self.error("positional argument follows keyword argument"));
            } else {
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, EvalError> {
        let line = self.line();
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Lit(Value::Int(i))),
            Tok::Float(f) => Ok(Expr::Lit(Value::Float(f))),
            Tok::Str(mut s) => {
                // Adjacent literals concatenate
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Lit(Value::Str(s)))
            }
            Tok::FStr(pieces) => {
                let parts = pieces
                    .into_iter()
                    .map(|piece| match piece {
                        FPiece::Lit(s) => Ok(FPart::Lit(s)),
                        FPiece::Expr { source, repr, spec } => Ok(FPart::Expr {
                            expr: parse_expr(&source, line)?,
                            repr,
                            spec,
                        }),
                    })
                    .collect::<Result<_, EvalError>>()?;
                Ok(Expr::FStr(parts))
            }
            Tok::Name(n) => match n.as_str() {
                "True" => Ok(Expr::Lit(Value::Bool(true))),
                "False" => Ok(Expr::Lit(Value::Bool(false))),
                "None" => Ok(Expr::Lit(Value::None)),
                kw if KEYWORDS.contains(&kw) => {
                    self.pos -= 1;
                    Err(self.error("invalid syntax"))
                }
                _ => Ok(Expr::Name(n)),
            },
            Tok::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                if self.is_op(",") {
                    let mut items = vec![first];
                    while self.eat_op(",") {
                        if self.is_op(")") {
                            break;
                        }
                        items.push(self.expr()?);
                    }
                    self.expect_op(")")?;
                    return Ok(Expr::List(items));
                }
                self.expect_op(")")?;
                Ok(first)
            }
            Tok::Op("[") => self.list_display(),
            Tok::Op("{") => self.dict_display(),
            Tok::Indent => {
                self.pos -= 1;
                Err(self.error("unexpected indent"))
            }
            _ => {
                self.pos -= 1;
                Err(self.error("invalid syntax"))
            }
        }
    }

    fn list_display(&mut self) -> Result<Expr, EvalError> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat_kw("for") {
            let target = self.loop_target()?;
            if !self.eat_kw("in") {
                return Err(self.error("expected 'in'"));
            }
            let iter = self.or_expr()?;
            let cond = if self.eat_kw("if") {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                target,
                iter: Box::new(iter),
                cond,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> Result<Expr, EvalError> {
        let mut entries = Vec::new();
        while !self.eat_op("}") {
            let key = self.expr()?;
            if !self.eat_op(":") {
                return Err(self.error("set literals are not supported; expected ':'"));
            }
            entries.push((key, self.expr()?));
            if !self.eat_op(",") {
                self.expect_op("}")?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }
}
