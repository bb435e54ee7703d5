//! Tree-walking interpreter for session scripts.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::eval::{ErrorKind, EvalError};
use crate::namespace::Namespace;
use crate::value::{Dict, Key, Number, Value};

use super::ast::{BinOp, CmpOp, Expr, FPart, Stmt, StmtKind, Target, UnaryOp};
use super::builtins::{
    self, as_index, check_len, format_with_spec, iterate, key_error, normalize_index, overflow,
    type_error, value_error,
};

/// Deepest expression evaluation allowed before giving up.
const MAX_EVAL_DEPTH: usize = 200;

enum Flow {
    Normal,
    Break,
    Continue,
}

pub(crate) struct Interpreter<'a> {
    namespace: &'a mut Namespace,
    /// Comprehension variables, innermost scope last.
    scopes: Vec<HashMap<String, Value>>,
    out: String,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(namespace: &'a mut Namespace) -> Self {
        Self {
            namespace,
            scopes: Vec::new(),
            out: String::new(),
            depth: 0,
        }
    }

    /// Execute `program`. Side effects of statements before a failure stay.
    pub(crate) fn run(&mut self, program: &[Stmt]) -> Result<(), EvalError> {
        self.exec_block(program).map(|_| ())
    }

    /// Everything printed so far.
    pub(crate) fn into_output(self) -> String {
        self.out
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec(stmt).map_err(|e| e.at_line(stmt.line))? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign(targets, value) => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign(target, op, value) => match target {
                Target::Name(name) => {
                    let current = self
                        .lookup(name)
                        .cloned()
                        .ok_or_else(|| name_error(name))?;
                    let updated = binary(*op, current, self.eval(value)?)?;
                    self.bind(name, updated)?;
                }
                Target::Item { root, path } => {
                    let keys = self.eval_each(path)?;
                    let current = self.load_item(root, &keys)?;
                    let updated = binary(*op, current, self.eval(value)?)?;
                    self.store_item(root, &keys, updated)?;
                }
                Target::Unpack(_) => {
                    return Err(EvalError::new(
                        ErrorKind::Syntax,
                        "illegal expression for augmented assignment",
                    ));
                }
            },
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For { target, iter, body } => {
                for item in iterate(self.eval(iter)?)? {
                    self.assign(target, item)?;
                    if let Flow::Break = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    if let Flow::Break = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.namespace.get(name))
    }

    /// Mutable access to a bound name, for in-place updates.
    fn place(&mut self, name: &str) -> Result<&mut Value, EvalError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(value) = scope.get_mut(name) {
                return Ok(value);
            }
        }
        self.namespace
            .get_mut(name)
            .ok_or_else(|| name_error(name))
    }

    fn bind(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
                Ok(())
            }
            None => self.namespace.bind(name, value),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), EvalError> {
        match target {
            Target::Name(name) => self.bind(name, value),
            Target::Item { root, path } => {
                let keys = self.eval_each(path)?;
                self.store_item(root, &keys, value)
            }
            Target::Unpack(targets) => {
                let items = iterate(value)?;
                if items.len() > targets.len() {
                    return Err(value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                if items.len() < targets.len() {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    fn delete(&mut self, target: &Target) -> Result<(), EvalError> {
        match target {
            Target::Name(name) => self.namespace.unbind(name).map(|_| ()),
            Target::Unpack(targets) => targets.iter().try_for_each(|t| self.delete(t)),
            Target::Item { root, path } => {
                let keys = self.eval_each(path)?;
                let (last, parents) = split_keys(&keys)?;
                let container = self.place_item(root, parents)?;
                match container {
                    Value::List(items) => {
                        let index = normalize_index(list_index(last)?, items.len())
                            .ok_or_else(|| index_error("list assignment index out of range"))?;
                        items.remove(index);
                        Ok(())
                    }
                    Value::Dict(map) => map
                        .shift_remove(&Key::try_from(last)?)
                        .map(|_| ())
                        .ok_or_else(|| key_error(last)),
                    other => Err(type_error(format!(
                        "'{}' object doesn't support item deletion",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn place_item(&mut self, root: &str, keys: &[Value]) -> Result<&mut Value, EvalError> {
        let mut current = self.place(root)?;
        for key in keys {
            current = item_mut(current, key)?;
        }
        Ok(current)
    }

    fn load_item(&self, root: &str, keys: &[Value]) -> Result<Value, EvalError> {
        let mut current = Cow::Borrowed(self.lookup(root).ok_or_else(|| name_error(root))?);
        for key in keys {
            current = match current {
                Cow::Borrowed(value) => subscript(value, key)?,
                Cow::Owned(value) => Cow::Owned(subscript(&value, key)?.into_owned()),
            };
        }
        Ok(current.into_owned())
    }

    fn store_item(&mut self, root: &str, keys: &[Value], value: Value) -> Result<(), EvalError> {
        let (last, parents) = split_keys(keys)?;
        let container = self.place_item(root, parents)?;
        match container {
            Value::List(items) => {
                let index = normalize_index(list_index(last)?, items.len())
                    .ok_or_else(|| index_error("list assignment index out of range"))?;
                items[index] = value;
                Ok(())
            }
            Value::Dict(map) => {
                map.insert(Key::try_from(last)?, value);
                Ok(())
            }
            other => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn eval_each<'e>(
        &mut self,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) -> Result<Vec<Value>, EvalError> {
        exprs.into_iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(overflow("maximum expression depth exceeded"));
        }
        self.depth += 1;
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Name(name) => match self.lookup(name) {
                Some(value) => Ok(value.clone()),
                None if builtins::is_builtin(name) => Err(type_error(format!(
                    "builtin '{name}' can only be called"
                ))),
                None => Err(name_error(name)),
            },
            Expr::FStr(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(literal) => text.push_str(literal),
                        FPart::Expr { expr, repr, spec } => {
                            let mut value = self.eval(expr)?;
                            if *repr {
                                value = Value::Str(value.repr());
                            }
                            match spec {
                                Some(spec) => text.push_str(&format_with_spec(&value, spec)?),
                                None => text.push_str(&value.to_string()),
                            }
                        }
                    }
                }
                Ok(Value::Str(text))
            }
            Expr::List(items) => self.eval_each(items).map(Value::List),
            Expr::Dict(entries) => {
                let mut map = Dict::new();
                for (key, value) in entries {
                    let key = Key::try_from(&self.eval(key)?)?;
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Ok(Value::Dict(map))
            }
            Expr::ListComp {
                elt,
                target,
                iter,
                cond,
            } => {
                let items = iterate(self.eval(iter)?)?;
                self.scopes.push(HashMap::new());
                let result = self.comprehension(elt, target, items, cond.as_deref());
                self.scopes.pop();
                result
            }
            Expr::Unary(op, operand) => unary(*op, self.eval(operand)?),
            Expr::Binary(..) => {
                // Left-deep chains such as `a + b + c` evaluate without recursion
                let mut operands = Vec::new();
                let mut leftmost = expr;
                while let Expr::Binary(op, left, right) = leftmost {
                    operands.push((*op, right));
                    leftmost = left.as_ref();
                }
                let mut acc = self.eval(leftmost)?;
                for (op, right) in operands.into_iter().rev() {
                    let rhs = self.eval(right)?;
                    acc = binary(op, acc, rhs)?;
                }
                Ok(acc)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, expr) in rest {
                    let right = self.eval(expr)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::IfElse { cond, then, orelse } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Subscript(base, index) => match subscript_path(expr) {
                // Walk stored values by reference instead of copying the root
                Some((root, path)) => {
                    let keys = self.eval_each(path)?;
                    self.load_item(root, &keys)
                }
                None => {
                    let container = self.eval(base)?;
                    let key = self.eval(index)?;
                    Ok(subscript(&container, &key)?.into_owned())
                }
            },
            Expr::Slice { value, start, stop } => {
                let container = self.eval(value)?;
                let start = self.slice_bound(start.as_deref())?;
                let stop = self.slice_bound(stop.as_deref())?;
                slice(&container, start, stop)
            }
            Expr::Call { func, args, kwargs } => {
                if let Some(value) = self.lookup(func) {
                    return Err(type_error(format!(
                        "'{}' object is not callable",
                        value.type_name()
                    )));
                }
                if !builtins::is_builtin(func) {
                    return Err(name_error(func));
                }
                let args = self.eval_each(args)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, expr)| Ok((name.clone(), self.eval(expr)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                builtins::call(func, args, kwargs, &mut self.out)
            }
            Expr::Method {
                receiver,
                name,
                args,
            } => {
                if builtins::is_mutating(name) {
                    if let Some((root, path)) = subscript_path(receiver) {
                        let keys = self.eval_each(path)?;
                        let args = self.eval_each(args)?;
                        let target = self.place_item(root, &keys)?;
                        return builtins::call_method(target, name, args);
                    }
                }
                let mut value = self.eval(receiver)?;
                let args = self.eval_each(args)?;
                builtins::call_method(&mut value, name, args)
            }
        }
    }

    fn comprehension(
        &mut self,
        elt: &Expr,
        target: &Target,
        items: Vec<Value>,
        cond: Option<&Expr>,
    ) -> Result<Value, EvalError> {
        let mut out = Vec::new();
        for item in items {
            self.assign(target, item)?;
            if let Some(cond) = cond {
                if !self.eval(cond)?.is_truthy() {
                    continue;
                }
            }
            out.push(self.eval(elt)?);
        }
        Ok(Value::List(out))
    }

    fn slice_bound(&mut self, bound: Option<&Expr>) -> Result<Option<i64>, EvalError> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::None => Ok(None),
                value => as_index(&value).map(Some),
            },
        }
    }
}

/// `name[a][b]...` as its root name and index expressions.
fn subscript_path(expr: &Expr) -> Option<(&str, Vec<&Expr>)> {
    let mut path = Vec::new();
    let mut current = expr;
    loop {
        match current {
            Expr::Name(name) => {
                path.reverse();
                return Some((name, path));
            }
            Expr::Subscript(base, index) => {
                path.push(index.as_ref());
                current = base.as_ref();
            }
            _ => return None,
        }
    }
}

fn split_keys(keys: &[Value]) -> Result<(&Value, &[Value]), EvalError> {
    keys.split_last()
        .ok_or_else(|| EvalError::new(ErrorKind::Syntax, "missing subscript"))
}

fn item_mut<'v>(container: &'v mut Value, key: &Value) -> Result<&'v mut Value, EvalError> {
    match container {
        Value::List(items) => {
            let index = normalize_index(list_index(key)?, items.len())
                .ok_or_else(|| index_error("list index out of range"))?;
            items
                .get_mut(index)
                .ok_or_else(|| index_error("list index out of range"))
        }
        Value::Dict(map) => map
            .get_mut(&Key::try_from(key)?)
            .ok_or_else(|| key_error(key)),
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `container[key]`, borrowing when the element already exists.
fn subscript<'v>(container: &'v Value, key: &Value) -> Result<Cow<'v, Value>, EvalError> {
    match container {
        Value::List(items) => {
            let index = normalize_index(list_index(key)?, items.len())
                .ok_or_else(|| index_error("list index out of range"))?;
            items
                .get(index)
                .map(Cow::Borrowed)
                .ok_or_else(|| index_error("list index out of range"))
        }
        Value::Dict(map) => map
            .get(&Key::try_from(key)?)
            .map(Cow::Borrowed)
            .ok_or_else(|| key_error(key)),
        Value::Str(s) => {
            let len = s.chars().count();
            let index = match key {
                Value::Int(_) | Value::Bool(_) => as_index(key)?,
                other => {
                    return Err(type_error(format!(
                        "string indices must be integers, not '{}'",
                        other.type_name()
                    )));
                }
            };
            normalize_index(index, len)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Cow::Owned(Value::Str(c.to_string())))
                .ok_or_else(|| index_error("string index out of range"))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn slice(container: &Value, start: Option<i64>, stop: Option<i64>) -> Result<Value, EvalError> {
    let bounds = |len: usize| {
        let len = len as i64;
        let clamp = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) };
        let lo = start.map_or(0, clamp);
        let hi = stop.map_or(len, clamp).max(lo);
        (lo as usize, hi as usize)
    };
    match container {
        Value::List(items) => {
            let (lo, hi) = bounds(items.len());
            Ok(Value::List(
                items.get(lo..hi).map(<[Value]>::to_vec).unwrap_or_default(),
            ))
        }
        Value::Str(s) => {
            let (lo, hi) = bounds(s.chars().count());
            Ok(Value::Str(s.chars().skip(lo).take(hi - lo).collect()))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn list_index(key: &Value) -> Result<i64, EvalError> {
    match key {
        Value::Int(_) | Value::Bool(_) => as_index(key),
        other => Err(type_error(format!(
            "list indices must be integers, not {}",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value.as_number()) {
        (UnaryOp::Neg, Some(Number::Int(i))) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow("integer overflow")),
        (UnaryOp::Neg, Some(Number::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Number::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Number::Float(f))) => Ok(Value::Float(f)),
        (op, None) => Err(type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

/// Apply a binary operator. Shared with `sum()`.
pub(crate) fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return arithmetic(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(mut a), Value::Str(b)) => {
            check_len(a.len() + b.len())?;
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (BinOp::Add, Value::List(mut a), Value::List(b)) => {
            check_len(a.len() + b.len())?;
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let n = usize::try_from(n).unwrap_or(0);
            check_len(s.len().saturating_mul(n))?;
            Ok(Value::Str(s.repeat(n)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            let n = usize::try_from(n).unwrap_or(0);
            let per_copy = items.iter().map(deep_len).fold(0, usize::saturating_add);
            check_len(per_copy.saturating_mul(n))?;
            Ok(Value::List(
                (0..n).flat_map(|_| items.iter().cloned()).collect(),
            ))
        }
        (op, left, right) => Err(type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Slots a copy of `value` allocates, nested elements and string bytes
/// included.
fn deep_len(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.len().max(1),
        Value::List(items) => items.iter().map(deep_len).fold(1, usize::saturating_add),
        Value::Dict(map) => map
            .iter()
            .map(|(key, value)| deep_len(value).saturating_add(key_len(key)))
            .fold(1, usize::saturating_add),
        _ => 1,
    }
}

fn key_len(key: &Key) -> usize {
    match key {
        Key::Str(s) => s.len().max(1),
        _ => 1,
    }
}

fn arithmetic(op: BinOp, a: Number, b: Number) -> Result<Value, EvalError> {
    let (Number::Int(x), Number::Int(y)) = (a, b) else {
        return float_arithmetic(op, a.to_f64(), b.to_f64());
    };
    let int_overflow = || overflow("integer overflow");
    match op {
        BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(int_overflow),
        BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(int_overflow),
        BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(int_overflow),
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let quotient = x.checked_div(y).ok_or_else(int_overflow)?;
            let floored = if x % y != 0 && ((x < 0) != (y < 0)) {
                quotient - 1
            } else {
                quotient
            };
            Ok(Value::Int(floored))
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division("integer modulo by zero"));
            }
            // i64::MIN % -1 is mathematically zero
            let rem = x.checked_rem(y).unwrap_or(0);
            Ok(Value::Int(if rem != 0 && ((rem < 0) != (y < 0)) {
                rem + y
            } else {
                rem
            }))
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            match (x, u32::try_from(y)) {
                (_, Ok(exp)) => x.checked_pow(exp).map(Value::Int).ok_or_else(int_overflow),
                (0 | 1, Err(_)) => Ok(Value::Int(x)),
                (-1, Err(_)) => Ok(Value::Int(if y % 2 == 0 { 1 } else { -1 })),
                _ => Err(int_overflow()),
            }
        }
    }
}

fn float_arithmetic(op: BinOp, x: f64, y: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo by zero"));
            }
            let rem = x % y;
            if rem != 0.0 && ((rem < 0.0) != (y < 0.0)) {
                rem + y
            } else {
                rem
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            let result = x.powf(y);
            if result.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(overflow("numerical result out of range"));
            }
            result
        }
    };
    Ok(Value::Float(result))
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering::{Greater, Less};

    Ok(match op {
        CmpOp::Eq => left.loose_eq(right),
        CmpOp::Ne => !left.loose_eq(right),
        CmpOp::Lt => left.compare(right)? == Less,
        CmpOp::Le => left.compare(right)? != Greater,
        CmpOp::Gt => left.compare(right)? == Greater,
        CmpOp::Ge => left.compare(right)? != Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::List(items) => Ok(items.iter().any(|x| x.loose_eq(item))),
        Value::Dict(map) => Ok(map.contains_key(&Key::try_from(item)?)),
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn name_error(name: &str) -> EvalError {
    EvalError::new(ErrorKind::Name, format!("name '{name}' is not defined"))
}

fn index_error(message: &str) -> EvalError {
    EvalError::new(ErrorKind::Index, message)
}

fn zero_division(message: &str) -> EvalError {
    EvalError::new(ErrorKind::ZeroDivision, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::RESULTS_KEY;
    use crate::script::parser::parse;

    fn run(ns: &mut Namespace, source: &str) -> (String, Result<(), EvalError>) {
        let program = parse(source).expect("Failed to parse");
        let mut interp = Interpreter::new(ns);
        let result = interp.run(&program);
        (interp.into_output(), result)
    }

    fn eval_one(source: &str) -> Value {
        let mut ns = Namespace::new();
        let (_, result) = run(&mut ns, &format!("_v = {source}"));
        result.expect("Failed to evaluate");
        ns.get("_v").cloned().expect("Missing result")
    }

    fn error_of(source: &str) -> EvalError {
        let mut ns = Namespace::new();
        run(&mut ns, source).1.unwrap_err()
    }

    #[test]
    fn test_arithmetic_semantics() {
        assert_eq!(eval_one("7 // 2"), Value::Int(3));
        assert_eq!(eval_one("-7 // 2"), Value::Int(-4));
        assert_eq!(eval_one("-7 % 3"), Value::Int(2));
        assert_eq!(eval_one("7 / 2"), Value::Float(3.5));
        assert_eq!(eval_one("2 ** 10"), Value::Int(1024));
        assert_eq!(eval_one("2 ** -1"), Value::Float(0.5));
        assert_eq!(eval_one("-2 ** 2"), Value::Int(-4));
        assert_eq!(eval_one("1 + 2.5"), Value::Float(3.5));
        assert_eq!(eval_one("True + 1"), Value::Int(2));
        assert_eq!(eval_one("'ab' * 3"), Value::from("ababab"));
        assert_eq!(eval_one("[0] * 2 + [1]"), Value::List(vec![Value::Int(0), Value::Int(0), Value::Int(1)]));
    }

    #[test]
    fn test_errors_carry_kind_and_line() {
        let err = error_of("x = 1\ny = x / 0");
        assert_eq!(err.kind, ErrorKind::ZeroDivision);
        assert_eq!(err.line, Some(2));

        assert_eq!(error_of("9223372036854775807 + 1").kind, ErrorKind::Overflow);
        assert_eq!(error_of("undefined_name").kind, ErrorKind::Name);
        assert_eq!(error_of("'a' + 1").kind, ErrorKind::Type);
        assert_eq!(error_of("[1][5]").kind, ErrorKind::Index);
        assert_eq!(error_of("{}['k']").kind, ErrorKind::Key);
        assert_eq!(error_of("int('x')").kind, ErrorKind::Value);
    }

    #[test]
    fn test_error_line_inside_block() {
        let err = error_of("for i in range(3):\n    if i == 2:\n        boom = 1 // 0\n");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_side_effects_before_error_persist() {
        let mut ns = Namespace::new();
        let (out, result) = run(&mut ns, "a = 1\nprint('before')\nb = 1 / 0\nc = 3");
        assert!(result.is_err());
        assert_eq!(out, "before\n");
        assert_eq!(ns.get("a"), Some(&Value::Int(1)));
        assert!(ns.get("c").is_none());
    }

    #[test]
    fn test_results_store_mutates_in_place() {
        let mut ns = Namespace::new();
        let (_, result) = run(
            &mut ns,
            "results['a'] = {'n': 1}\nresults['a']['n'] += 2\nresults.update({'b': [1]})\nresults['b'].append(2)",
        );
        result.unwrap();
        let results = ns.results().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results.get(&Key::Str("b".into())),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(Value::Dict(results.clone()).repr(), "{'a': {'n': 3}, 'b': [1, 2]}");
    }

    #[test]
    fn test_results_cannot_be_rebound() {
        let mut ns = Namespace::new();
        let (_, result) = run(&mut ns, "results['keep'] = 1\nresults = {}");
        assert_eq!(result.unwrap_err().kind, ErrorKind::ReservedName);
        assert_eq!(ns.get(RESULTS_KEY).map(Value::repr).as_deref(), Some("{'keep': 1}"));

        let (_, result) = run(&mut ns, "del results");
        assert_eq!(result.unwrap_err().kind, ErrorKind::ReservedName);
        let (_, result) = run(&mut ns, "del results['keep']");
        result.unwrap();
        assert!(ns.results().unwrap().is_empty());
    }

    #[test]
    fn test_assignment_copies_values() {
        let mut ns = Namespace::new();
        let (_, result) = run(&mut ns, "a = [1]\nb = a\nb.append(2)");
        result.unwrap();
        assert_eq!(ns.get("a"), Some(&Value::List(vec![Value::Int(1)])));
        assert_eq!(ns.get("b").map(Value::repr).as_deref(), Some("[1, 2]"));
    }

    #[test]
    fn test_control_flow() {
        let mut ns = Namespace::new();
        let source = "\
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while True:
    n += 1
    if n >= 3: break
";
        run(&mut ns, source).1.unwrap();
        assert_eq!(ns.get("total"), Some(&Value::Int(1 + 3 + 5 + 7)));
        assert_eq!(ns.get("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_comprehension_does_not_leak() {
        let mut ns = Namespace::new();
        run(&mut ns, "x = 'outer'\nsquares = [x * x for x in range(4) if x]").1.unwrap();
        assert_eq!(ns.get("x"), Some(&Value::from("outer")));
        assert_eq!(ns.get("squares").map(Value::repr).as_deref(), Some("[1, 4, 9]"));
    }

    #[test]
    fn test_unpacking_and_items() {
        let mut ns = Namespace::new();
        let source = "d = {'a': 1, 'b': 2}\nout = []\nfor k, v in d.items():\n    out.append(f'{k}={v}')\nx, y = 1, 2\nx, y = y, x";
        run(&mut ns, source).1.unwrap();
        assert_eq!(ns.get("out").map(Value::repr).as_deref(), Some("['a=1', 'b=2']"));
        assert_eq!(ns.get("x"), Some(&Value::Int(2)));
        assert_eq!(error_of("a, b = [1, 2, 3]").kind, ErrorKind::Value);
    }

    #[test]
    fn test_strings_and_slices() {
        assert_eq!(eval_one("'hello'[1:3]"), Value::from("el"));
        assert_eq!(eval_one("'hello'[-1]"), Value::from("o"));
        assert_eq!(eval_one("[1, 2, 3, 4][:-2]").repr(), "[1, 2]");
        assert_eq!(eval_one("'a,b'.split(',')").repr(), "['a', 'b']");
        assert_eq!(eval_one("f'{3.14159:.2f}|{\"x\"!r}|{{}}'"), Value::from("3.14|'x'|{}"));
        assert_eq!(eval_one("'lo' in 'hello' and 3 not in [1, 2]"), Value::Bool(true));
        assert_eq!(eval_one("1 < 2 < 3 > 2"), Value::Bool(true));
    }

    #[test]
    fn test_string_keyed_dicts() {
        let mut ns = Namespace::new();
        let source = "d = {'found': 1}\nd['k'] = 2\nd['found'] += 10\nhit = 'k' in d\nresults['w'] = d.get('k')";
        run(&mut ns, source).1.unwrap();
        assert_eq!(ns.get("d").map(Value::repr).as_deref(), Some("{'found': 11, 'k': 2}"));
        assert_eq!(ns.get("hit"), Some(&Value::Bool(true)));
        assert_eq!(eval_one("{'a': 1}['a']"), Value::Int(1));
        assert_eq!(error_of("{'a': 1}['b']").kind, ErrorKind::Key);
    }

    #[test]
    fn test_repetition_counts_nested_elements() {
        assert_eq!(error_of("[[0] * 1000] * 100000").kind, ErrorKind::Overflow);
        assert_eq!(error_of("['x' * 1000] * 100000").kind, ErrorKind::Overflow);
        assert_eq!(error_of("[0] * 10000001").kind, ErrorKind::Overflow);
        assert_eq!(eval_one("len([[0] * 3] * 4)"), Value::Int(4));
    }

    #[test]
    fn test_del_and_boolean_operands() {
        let mut ns = Namespace::new();
        run(&mut ns, "a = 1\nxs = [1, 2, 3]\ndel a, xs[0]\nv = 0 or 'fallback'").1.unwrap();
        assert!(ns.get("a").is_none());
        assert_eq!(ns.get("xs").map(Value::repr).as_deref(), Some("[2, 3]"));
        assert_eq!(ns.get("v"), Some(&Value::from("fallback")));
    }

    #[test]
    fn test_calling_a_bound_name_fails() {
        assert_eq!(error_of("len = 3\nlen([1])").kind, ErrorKind::Type);
        assert_eq!(error_of("frobnicate(1)").kind, ErrorKind::Name);
    }

    #[test]
    fn test_long_chains_evaluate() {
        let source = vec!["1"; 5000].join(" + ");
        assert_eq!(eval_one(&source), Value::Int(5000));
    }
}
