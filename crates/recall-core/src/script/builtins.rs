//! Builtin functions and methods available to session scripts.

use std::cmp::Ordering;

use crate::eval::{ErrorKind, EvalError};
use crate::value::{Dict, Key, Number, Value, format_float};

use super::ast::BinOp;
use super::interp::binary;

/// Longest list or string a single operation may build.
pub(crate) const MAX_SEQUENCE_LEN: usize = 10_000_000;

const FUNCTIONS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "enumerate", "float", "int", "len", "list", "max", "min",
    "print", "range", "repr", "reversed", "round", "sorted", "str", "sum", "type", "zip",
];

type Kwargs = Vec<(String, Value)>;

pub(crate) fn is_builtin(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// Methods that modify their receiver in place.
pub(crate) fn is_mutating(method: &str) -> bool {
    matches!(
        method,
        "append"
            | "extend"
            | "insert"
            | "pop"
            | "remove"
            | "clear"
            | "sort"
            | "reverse"
            | "update"
            | "setdefault"
    )
}

/// Call builtin `name`. Output of `print` is appended to `out`.
pub(crate) fn call(
    name: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
    out: &mut String,
) -> Result<Value, EvalError> {
    let result = match name {
        "print" => {
            let sep = text_kwarg(&mut kwargs, "sep", " ")?;
            let end = text_kwarg(&mut kwargs, "end", "\n")?;
            reject_kwargs(name, &kwargs)?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(&sep);
                }
                out.push_str(&arg.to_string());
            }
            out.push_str(&end);
            Ok(Value::None)
        }
        "sorted" => {
            let [items] = exactly(name, args)?;
            let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.is_truthy());
            sort_values(iterate(items)?, reverse).map(Value::List)
        }
        "enumerate" => {
            let mut args = between(name, args, 1, 2)?.into_iter();
            let items = iterate(args.next().unwrap_or(Value::None))?;
            let start = match args.next().or_else(|| take_kwarg(&mut kwargs, "start")) {
                Some(v) => as_index(&v)?,
                None => 0,
            };
            let mut pairs = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let n = start
                    .checked_add(i as i64)
                    .ok_or_else(|| overflow("enumerate() index overflow"))?;
                pairs.push(Value::List(vec![Value::Int(n), item]));
            }
            Ok(Value::List(pairs))
        }
        "dict" => {
            let mut args = between(name, args, 0, 1)?.into_iter();
            let mut map = match args.next() {
                Some(source) => to_dict(source)?,
                None => Dict::new(),
            };
            for (key, value) in kwargs.drain(..) {
                map.insert(Key::Str(key), value);
            }
            Ok(Value::Dict(map))
        }
        _ => {
            reject_kwargs(name, &kwargs)?;
            call_positional(name, args)
        }
    }?;
    reject_kwargs(name, &kwargs)?;
    Ok(result)
}

fn reject_kwargs(name: &str, kwargs: &Kwargs) -> Result<(), EvalError> {
    match kwargs.first() {
        Some((key, _)) => Err(type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

fn call_positional(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "len" => {
            let [value] = exactly(name, args)?;
            let len = match &value {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Dict(map) => map.len(),
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        "str" => Ok(Value::Str(
            optional(name, args)?
                .map(|v| v.to_string())
                .unwrap_or_default(),
        )),
        "repr" => {
            let [value] = exactly(name, args)?;
            Ok(Value::Str(value.repr()))
        }
        "bool" => Ok(Value::Bool(
            optional(name, args)?.is_some_and(|v| v.is_truthy()),
        )),
        "int" => match optional(name, args)? {
            Some(value) => to_int(value),
            None => Ok(Value::Int(0)),
        },
        "float" => match optional(name, args)? {
            Some(value) => to_float(value),
            None => Ok(Value::Float(0.0)),
        },
        "list" => match optional(name, args)? {
            Some(value) => iterate(value).map(Value::List),
            None => Ok(Value::List(Vec::new())),
        },
        "type" => {
            let [value] = exactly(name, args)?;
            Ok(Value::from(value.type_name()))
        }
        "abs" => {
            let [value] = exactly(name, args)?;
            match value.as_number() {
                Some(Number::Int(i)) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| overflow("integer overflow in abs()")),
                Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
                None => Err(type_error(format!(
                    "bad operand type for abs(): '{}'",
                    value.type_name()
                ))),
            }
        }
        "round" => round(args),
        "range" => range(args),
        "sum" => {
            let mut args = between(name, args, 1, 2)?.into_iter();
            let items = iterate(args.next().unwrap_or(Value::None))?;
            let start = args.next().unwrap_or(Value::Int(0));
            if matches!(start, Value::Str(_)) {
                return Err(type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            items
                .into_iter()
                .try_fold(start, |acc, item| binary(BinOp::Add, acc, item))
        }
        "min" | "max" => {
            let items = if args.len() == 1 {
                iterate(args.into_iter().next().unwrap_or(Value::None))?
            } else {
                args
            };
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut items = items.into_iter();
            let mut best = items
                .next()
                .ok_or_else(|| value_error(format!("{name}() arg is an empty sequence")))?;
            for item in items {
                if item.compare(&best)? == wanted {
                    best = item;
                }
            }
            Ok(best)
        }
        "any" | "all" => {
            let [items] = exactly(name, args)?;
            let items = iterate(items)?;
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            }))
        }
        "reversed" => {
            let [items] = exactly(name, args)?;
            let mut items = iterate(items)?;
            items.reverse();
            Ok(Value::List(items))
        }
        "zip" => {
            let columns = args
                .into_iter()
                .map(iterate)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
            let rows = (0..len)
                .map(|_| Value::List(columns.iter_mut().filter_map(Iterator::next).collect()))
                .collect();
            Ok(Value::List(rows))
        }
        _ => Err(EvalError::new(
            ErrorKind::Name,
            format!("name '{name}' is not defined"),
        )),
    }
}

/// Call method `name` on `receiver`, mutating it for in-place methods.
pub(crate) fn call_method(
    receiver: &mut Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    match receiver {
        Value::List(items) => list_method(items, name, args),
        Value::Dict(map) => dict_method(map, name, args),
        Value::Str(s) => str_method(s, name, args),
        other => Err(no_attribute(other.type_name(), name)),
    }
}

fn list_method(items: &mut Vec<Value>, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "append" => {
            let [value] = exactly(name, args)?;
            check_len(items.len() + 1)?;
            items.push(value);
            Ok(Value::None)
        }
        "extend" => {
            let [more] = exactly(name, args)?;
            let more = iterate(more)?;
            check_len(items.len() + more.len())?;
            items.extend(more);
            Ok(Value::None)
        }
        "insert" => {
            let [index, value] = exactly(name, args)?;
            check_len(items.len() + 1)?;
            let len = items.len() as i64;
            let index = as_index(&index)?;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, value);
            Ok(Value::None)
        }
        "pop" => {
            let index = match optional(name, args)? {
                Some(v) => as_index(&v)?,
                None => -1,
            };
            if items.is_empty() {
                return Err(EvalError::new(ErrorKind::Index, "pop from empty list"));
            }
            let index = normalize_index(index, items.len())
                .ok_or_else(|| EvalError::new(ErrorKind::Index, "pop index out of range"))?;
            Ok(items.remove(index))
        }
        "remove" => {
            let [value] = exactly(name, args)?;
            let position = items
                .iter()
                .position(|item| item.loose_eq(&value))
                .ok_or_else(|| value_error("list.remove(x): x not in list"))?;
            items.remove(position);
            Ok(Value::None)
        }
        "index" => {
            let [value] = exactly(name, args)?;
            items
                .iter()
                .position(|item| item.loose_eq(&value))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| value_error(format!("{} is not in list", value.repr())))
        }
        "count" => {
            let [value] = exactly(name, args)?;
            Ok(Value::Int(
                items.iter().filter(|item| item.loose_eq(&value)).count() as i64,
            ))
        }
        "clear" => {
            exactly::<0>(name, args)?;
            items.clear();
            Ok(Value::None)
        }
        "copy" => {
            exactly::<0>(name, args)?;
            Ok(Value::List(items.clone()))
        }
        "sort" => {
            exactly::<0>(name, args)?;
            *items = sort_values(items.clone(), false)?;
            Ok(Value::None)
        }
        "reverse" => {
            exactly::<0>(name, args)?;
            items.reverse();
            Ok(Value::None)
        }
        _ => Err(no_attribute("list", name)),
    }
}

fn dict_method(map: &mut Dict, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "keys" => {
            exactly::<0>(name, args)?;
            Ok(Value::List(map.keys().cloned().map(Value::from).collect()))
        }
        "values" => {
            exactly::<0>(name, args)?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        "items" => {
            exactly::<0>(name, args)?;
            Ok(Value::List(
                map.iter()
                    .map(|(k, v)| Value::List(vec![Value::from(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        "get" => {
            let mut args = between(name, args, 1, 2)?.into_iter();
            let key = Key::try_from(&args.next().unwrap_or(Value::None))?;
            let default = args.next().unwrap_or(Value::None);
            Ok(map.get(&key).cloned().unwrap_or(default))
        }
        "update" => {
            let [other] = exactly(name, args)?;
            map.extend(to_dict(other)?);
            Ok(Value::None)
        }
        "pop" => {
            let mut args = between(name, args, 1, 2)?.into_iter();
            let key_value = args.next().unwrap_or(Value::None);
            let key = Key::try_from(&key_value)?;
            match (map.shift_remove(&key), args.next()) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default),
                (None, None) => Err(key_error(&key_value)),
            }
        }
        "setdefault" => {
            let mut args = between(name, args, 1, 2)?.into_iter();
            let key = Key::try_from(&args.next().unwrap_or(Value::None))?;
            let default = args.next().unwrap_or(Value::None);
            Ok(map.entry(key).or_insert(default).clone())
        }
        "clear" => {
            exactly::<0>(name, args)?;
            map.clear();
            Ok(Value::None)
        }
        "copy" => {
            exactly::<0>(name, args)?;
            Ok(Value::Dict(map.clone()))
        }
        _ => Err(no_attribute("dict", name)),
    }
}

fn str_method(s: &str, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "upper" => {
            exactly::<0>(name, args)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            exactly::<0>(name, args)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = match optional(name, args)? {
                None | Some(Value::None) => None,
                Some(v) => Some(str_arg(name, v)?),
            };
            let matches = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let stripped = match name {
                "lstrip" => s.trim_start_matches(matches),
                "rstrip" => s.trim_end_matches(matches),
                _ => s.trim_matches(matches),
            };
            Ok(Value::from(stripped))
        }
        "split" => {
            let mut args = between(name, args, 0, 2)?.into_iter();
            let sep = match args.next() {
                None | Some(Value::None) => None,
                Some(v) => Some(str_arg(name, v)?),
            };
            let limit = match args.next() {
                Some(v) => usize::try_from(as_index(&v)?).ok(),
                None => None,
            };
            split(s, sep.as_deref(), limit).map(Value::List)
        }
        "splitlines" => {
            exactly::<0>(name, args)?;
            Ok(Value::List(s.lines().map(Value::from).collect()))
        }
        "join" => {
            let [items] = exactly(name, args)?;
            let parts = iterate(items)?
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Str(part) => Ok(part),
                    other => Err(type_error(format!(
                        "sequence item {i}: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let joined = parts.join(s);
            check_len(joined.len())?;
            Ok(Value::Str(joined))
        }
        "replace" => {
            let mut args = between(name, args, 2, 3)?.into_iter();
            let old = str_arg(name, args.next().unwrap_or(Value::None))?;
            let new = str_arg(name, args.next().unwrap_or(Value::None))?;
            let replaced = match args.next() {
                Some(count) => match usize::try_from(as_index(&count)?) {
                    Ok(count) => s.replacen(&old, &new, count),
                    Err(_) => s.replace(&old, &new),
                },
                None => s.replace(&old, &new),
            };
            check_len(replaced.len())?;
            Ok(Value::Str(replaced))
        }
        "startswith" | "endswith" => {
            let [affix] = exactly(name, args)?;
            let candidates = match affix {
                Value::List(items) => items
                    .into_iter()
                    .map(|v| str_arg(name, v))
                    .collect::<Result<Vec<_>, _>>()?,
                other => vec![str_arg(name, other)?],
            };
            Ok(Value::Bool(candidates.iter().any(|c| {
                if name == "startswith" {
                    s.starts_with(c.as_str())
                } else {
                    s.ends_with(c.as_str())
                }
            })))
        }
        "find" => {
            let [sub] = exactly(name, args)?;
            let sub = str_arg(name, sub)?;
            Ok(Value::Int(match s.find(&sub) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "count" => {
            let [sub] = exactly(name, args)?;
            let sub = str_arg(name, sub)?;
            let count = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&sub).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" => {
            exactly::<0>(name, args)?;
            Ok(Value::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        }
        _ => Err(no_attribute("str", name)),
    }
}

fn split(s: &str, sep: Option<&str>, limit: Option<usize>) -> Result<Vec<Value>, EvalError> {
    match sep {
        Some("") => Err(value_error("empty separator")),
        Some(sep) => Ok(match limit {
            Some(limit) => s.splitn(limit + 1, sep).map(Value::from).collect(),
            None => s.split(sep).map(Value::from).collect(),
        }),
        None => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if limit == Some(parts.len()) {
                    parts.push(Value::from(rest));
                    break;
                }
                match rest.find(char::is_whitespace) {
                    Some(i) => {
                        parts.push(Value::from(&rest[..i]));
                        rest = rest[i..].trim_start();
                    }
                    None => {
                        parts.push(Value::from(rest));
                        break;
                    }
                }
            }
            Ok(parts)
        }
    }
}

fn round(args: Vec<Value>) -> Result<Value, EvalError> {
    let mut args = between("round", args, 1, 2)?.into_iter();
    let value = args.next().unwrap_or(Value::None);
    let digits = match args.next() {
        None | Some(Value::None) => None,
        Some(v) => Some(as_index(&v)?),
    };
    match (value.as_number(), digits) {
        (Some(Number::Int(i)), None) => Ok(Value::Int(i)),
        (Some(Number::Int(i)), Some(d)) if d >= 0 => Ok(Value::Int(i)),
        (Some(Number::Int(i)), Some(d)) => {
            let scale = 10f64.powi(d.unsigned_abs().min(300) as i32);
            float_to_int((i as f64 / scale).round_ties_even() * scale).map(Value::Int)
        }
        (Some(Number::Float(f)), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Some(Number::Float(f)), Some(d)) => {
            let scale = 10f64.powi(d.clamp(-300, 300) as i32);
            let rounded = (f * scale).round_ties_even() / scale;
            Ok(Value::Float(if rounded.is_finite() { rounded } else { f }))
        }
        (None, _) => Err(type_error(format!(
            "type {} doesn't define __round__ method",
            value.type_name()
        ))),
    }
}

fn range(args: Vec<Value>) -> Result<Value, EvalError> {
    let bounds = between("range", args, 1, 3)?
        .iter()
        .map(as_index)
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(type_error("range expected at most 3 arguments")),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / -step + 1
    } else {
        0
    };
    if len > MAX_SEQUENCE_LEN as i128 {
        return Err(overflow("range() result too large"));
    }
    // Every element lies between start and stop, so it fits in i64
    Ok(Value::List(
        (0..len)
            .map(|i| Value::Int((start + i * step) as i64))
            .collect(),
    ))
}

/// Elements visited by `for` and by builtins taking an iterable.
pub(crate) fn iterate(value: Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(map) => Ok(map.into_keys().map(Value::from).collect()),
        other => Err(type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Stable merge sort that reports incomparable elements instead of panicking.
pub(crate) fn sort_values(mut items: Vec<Value>, reverse: bool) -> Result<Vec<Value>, EvalError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = sort_values(items, reverse)?;
    let right = sort_values(right, reverse)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        let right_first = if reverse {
            a.compare(b)? == Ordering::Less
        } else {
            b.compare(a)? == Ordering::Less
        };
        if right_first {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

/// Render `value` under an f-string format spec:
/// `[[fill]align][+][0][width][,][.precision][type]` with types `s d f %`.
pub(crate) fn format_with_spec(value: &Value, spec: &str) -> Result<String, EvalError> {
    let invalid = || {
        value_error(format!(
            "invalid format specifier '{spec}' for object of type '{}'",
            value.type_name()
        ))
    };
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if let Some(&c @ ('<' | '>' | '^')) = chars.first() {
        align = Some(c);
        i = 1;
    }
    let plus = chars.get(i) == Some(&'+');
    if plus {
        i += 1;
    }
    if chars.get(i) == Some(&'0') && align.is_none() {
        fill = '0';
        align = Some('=');
        i += 1;
    }
    let width = take_digits(&chars, &mut i).unwrap_or(0);
    let grouping = chars.get(i) == Some(&',');
    if grouping {
        i += 1;
    }
    let precision = if chars.get(i) == Some(&'.') {
        i += 1;
        Some(take_digits(&chars, &mut i).ok_or_else(invalid)?)
    } else {
        None
    };
    let kind = chars.get(i).copied();
    if kind.is_some() {
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    if width > MAX_SEQUENCE_LEN || precision.is_some_and(|p| p > MAX_SEQUENCE_LEN) {
        return Err(overflow("format width or precision too large"));
    }

    let number = match value {
        Value::Bool(_) if kind.is_none() => None,
        other => other.as_number(),
    };
    let fixed = |f: f64, precision: usize| {
        if f.is_finite() {
            format!("{:.*}", precision, f.abs())
        } else {
            format_float(f.abs())
        }
    };
    let (negative, mut body, numeric) = match (kind, number) {
        (Some('s'), _) | (None, None) => {
            if !matches!(value, Value::Str(_)) && kind.is_some() {
                return Err(invalid());
            }
            let text = value.to_string();
            let text = match precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            (false, text, false)
        }
        (Some('d'), Some(Number::Int(n))) | (None, Some(Number::Int(n))) if precision.is_none() => {
            (n < 0, n.unsigned_abs().to_string(), true)
        }
        (None, Some(Number::Float(f))) if precision.is_none() => {
            (f.is_sign_negative(), format_float(f.abs()), true)
        }
        (None | Some('f' | 'F'), Some(n)) => {
            let f = n.to_f64();
            (f.is_sign_negative(), fixed(f, precision.unwrap_or(6)), true)
        }
        (Some('%'), Some(n)) => {
            let f = n.to_f64() * 100.0;
            (f.is_sign_negative(), fixed(f, precision.unwrap_or(6)), true)
        }
        _ => return Err(invalid()),
    };
    if grouping && numeric {
        body = group_thousands(&body);
    }
    if kind == Some('%') {
        body.push('%');
    }

    let sign = if negative {
        "-"
    } else if plus && numeric {
        "+"
    } else {
        ""
    };
    let len = sign.chars().count() + body.chars().count();
    let pad = width.saturating_sub(len);
    let padding = |n: usize| fill.to_string().repeat(n);
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '=' => format!("{sign}{}{body}", padding(pad)),
        '<' => format!("{sign}{body}{}", padding(pad)),
        '^' => format!("{}{sign}{body}{}", padding(pad / 2), padding(pad - pad / 2)),
        _ => format!("{}{sign}{body}", padding(pad)),
    })
}

fn take_digits(chars: &[char], i: &mut usize) -> Option<usize> {
    let start = *i;
    while chars.get(*i).is_some_and(char::is_ascii_digit) {
        *i += 1;
    }
    if *i == start {
        return None;
    }
    let digits: String = chars[start..*i].iter().collect();
    Some(digits.parse().unwrap_or(usize::MAX))
}

fn group_thousands(digits: &str) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(dot) => digits.split_at(dot),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

pub(crate) fn float_to_int(f: f64) -> Result<i64, EvalError> {
    if f.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(overflow("cannot convert float infinity to integer"));
    }
    let truncated = f.trunc();
    if !(-9.223_372_036_854_776e18..9.223_372_036_854_776e18).contains(&truncated) {
        return Err(overflow("int too large to convert"));
    }
    Ok(truncated as i64)
}

fn to_int(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) => float_to_int(f).map(Value::Int),
        Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
            value_error(format!(
                "invalid literal for int() with base 10: {}",
                Value::Str(s.clone()).repr()
            ))
        }),
        other => Err(type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Value) -> Result<Value, EvalError> {
    match value.as_number() {
        Some(n) => Ok(Value::Float(n.to_f64())),
        None => match value {
            Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                value_error(format!(
                    "could not convert string to float: {}",
                    Value::Str(s.clone()).repr()
                ))
            }),
            other => Err(type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn to_dict(source: Value) -> Result<Dict, EvalError> {
    match source {
        Value::Dict(map) => Ok(map),
        Value::List(items) => {
            let mut map = Dict::new();
            for (i, item) in items.into_iter().enumerate() {
                let pair = iterate(item)?;
                let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
                    value_error(format!(
                        "dictionary update sequence element #{i} has length {}; 2 is required",
                        pair.len()
                    ))
                })?;
                map.insert(Key::try_from(&key)?, value);
            }
            Ok(map)
        }
        other => Err(type_error(format!(
            "cannot convert '{}' object to a dict",
            other.type_name()
        ))),
    }
}

/// Integer view of an index or count argument.
pub(crate) fn as_index(value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

pub(crate) fn check_len(len: usize) -> Result<(), EvalError> {
    if len > MAX_SEQUENCE_LEN {
        return Err(overflow("result too large"));
    }
    Ok(())
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    args.try_into().map_err(|args: Vec<Value>| {
        type_error(format!(
            "{name}() takes exactly {N} argument{} ({} given)",
            if N == 1 { "" } else { "s" },
            args.len()
        ))
    })
}

fn between(name: &str, args: Vec<Value>, min: usize, max: usize) -> Result<Vec<Value>, EvalError> {
    if args.len() < min {
        return Err(type_error(format!(
            "{name}() takes at least {min} argument{} ({} given)",
            if min == 1 { "" } else { "s" },
            args.len()
        )));
    }
    if args.len() > max {
        return Err(type_error(format!(
            "{name}() takes at most {max} argument{} ({} given)",
            if max == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(args)
}

fn optional(name: &str, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
    Ok(between(name, args, 0, 1)?.into_iter().next())
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let position = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(position).1)
}

fn text_kwarg(kwargs: &mut Kwargs, key: &str, default: &str) -> Result<String, EvalError> {
    match take_kwarg(kwargs, key) {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(type_error(format!(
            "{key} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

fn str_arg(method: &str, value: Value) -> Result<String, EvalError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn key_error(key: &Value) -> EvalError {
    EvalError::new(ErrorKind::Key, key.repr())
}

fn no_attribute(type_name: &str, name: &str) -> EvalError {
    type_error(format!("'{type_name}' object has no attribute '{name}'"))
}

pub(crate) fn type_error(message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::Type, message)
}

pub(crate) fn value_error(message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::Value, message)
}

pub(crate) fn overflow(message: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::Overflow, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_simple(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        call(name, args, Vec::new(), &mut String::new())
    }

    fn list(items: &[i64]) -> Value {
        Value::List(items.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_print_with_sep_and_end() {
        let mut out = String::new();
        let kwargs = vec![
            ("sep".to_string(), Value::from("-")),
            ("end".to_string(), Value::from("!")),
        ];
        call("print", vec![Value::Int(1), Value::from("a")], kwargs, &mut out).unwrap();
        assert_eq!(out, "1-a!");
    }

    #[test]
    fn test_unexpected_kwarg() {
        let err = call(
            "len",
            vec![list(&[1])],
            vec![("x".to_string(), Value::None)],
            &mut String::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(call_simple("range", vec![Value::Int(3)]).unwrap(), list(&[0, 1, 2]));
        assert_eq!(
            call_simple("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            list(&[5, 3, 1])
        );
        let err = call_simple("range", vec![Value::Int(0), Value::Int(1), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        let err = call_simple("range", vec![Value::Int(i64::MAX)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn test_sorted_is_stable_and_reports_mixed_types() {
        let kwargs = vec![("reverse".to_string(), Value::Bool(true))];
        let sorted = call("sorted", vec![list(&[2, 3, 1])], kwargs, &mut String::new()).unwrap();
        assert_eq!(sorted, list(&[3, 2, 1]));

        let mixed = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(call_simple("sorted", vec![mixed]).unwrap_err().kind, ErrorKind::Type);
    }

    #[test]
    fn test_sum_min_max() {
        assert_eq!(call_simple("sum", vec![list(&[1, 2, 3])]).unwrap(), Value::Int(6));
        assert_eq!(call_simple("max", vec![list(&[1, 7, 3])]).unwrap(), Value::Int(7));
        assert_eq!(
            call_simple("min", vec![Value::Int(4), Value::Int(2)]).unwrap(),
            Value::Int(2)
        );
        let err = call_simple("max", vec![list(&[])]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[test]
    fn test_round_is_half_even() {
        assert_eq!(call_simple("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call_simple("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(
            call_simple("round", vec![Value::Float(1.234), Value::Int(2)]).unwrap(),
            Value::Float(1.23)
        );
    }

    #[test]
    fn test_int_and_float_conversions() {
        assert_eq!(call_simple("int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call_simple("int", vec![Value::Float(-3.9)]).unwrap(), Value::Int(-3));
        assert_eq!(
            call_simple("int", vec![Value::from("x")]).unwrap_err().kind,
            ErrorKind::Value
        );
        assert_eq!(
            call_simple("float", vec![Value::from("1.5")]).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_dict_from_pairs_and_kwargs() {
        let pairs = Value::List(vec![Value::List(vec![Value::from("a"), Value::Int(1)])]);
        let kwargs = vec![("b".to_string(), Value::Int(2))];
        let Value::Dict(map) = call("dict", vec![pairs], kwargs, &mut String::new()).unwrap() else {
            panic!("expected dict");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Key::Str("b".into())), Some(&Value::Int(2)));
    }

    #[test]
    fn test_list_methods_mutate() {
        let mut value = list(&[1, 2]);
        call_method(&mut value, "append", vec![Value::Int(3)]).unwrap();
        assert_eq!(call_method(&mut value, "pop", vec![]).unwrap(), Value::Int(3));
        assert_eq!(
            call_method(&mut value, "index", vec![Value::Int(2)]).unwrap(),
            Value::Int(1)
        );
        let err = call_method(&mut value, "index", vec![Value::Int(9)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert_eq!(value, list(&[1, 2]));
    }

    #[test]
    fn test_dict_methods() {
        let mut value = Value::Dict(Dict::new());
        call_method(
            &mut value,
            "setdefault",
            vec![Value::from("k"), Value::List(vec![])],
        )
        .unwrap();
        assert_eq!(
            call_method(&mut value, "get", vec![Value::from("missing"), Value::Int(0)]).unwrap(),
            Value::Int(0)
        );
        let err = call_method(&mut value, "pop", vec![Value::from("missing")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Key);
        assert_eq!(err.message, "'missing'");
        assert_eq!(
            call_method(&mut value, "keys", vec![]).unwrap(),
            Value::List(vec![Value::from("k")])
        );
    }

    #[test]
    fn test_str_methods() {
        let mut value = Value::from("  a b  c ");
        assert_eq!(
            call_method(&mut value, "split", vec![]).unwrap(),
            Value::List(vec![Value::from("a"), Value::from("b"), Value::from("c")])
        );
        assert_eq!(
            call_method(&mut value, "split", vec![Value::None, Value::Int(1)]).unwrap(),
            Value::List(vec![Value::from("a"), Value::from("b  c ")])
        );
        let mut sep = Value::from(", ");
        assert_eq!(
            call_method(&mut sep, "join", vec![Value::List(vec![Value::from("x"), Value::from("y")])])
                .unwrap(),
            Value::from("x, y")
        );
        let mut word = Value::from("héllo");
        assert_eq!(
            call_method(&mut word, "find", vec![Value::from("l")]).unwrap(),
            Value::Int(2)
        );
        let err = call_method(&mut word, "nope", vec![]).unwrap_err();
        assert_eq!(err.message, "'str' object has no attribute 'nope'");
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(format_with_spec(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_with_spec(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_with_spec(&Value::Int(-42), "05").unwrap(), "-0042");
        assert_eq!(format_with_spec(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_with_spec(&Value::from("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_with_spec(&Value::Float(0.25), ".0%").unwrap(), "25%");
        assert_eq!(format_with_spec(&Value::Bool(true), "").unwrap(), "True");
        assert!(format_with_spec(&Value::from("x"), "d").is_err());
    }

    #[test]
    fn test_format_spec_rejects_huge_width_and_precision() {
        for spec in [">100000000000", ".100000000000f", "99999999999999999999999"] {
            let err = format_with_spec(&Value::Int(1), spec).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Overflow, "spec {spec}");
        }
        let err = format_with_spec(&Value::from("ab"), ".100000000000").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);
        assert_eq!(format_with_spec(&Value::Int(7), ">3").unwrap(), "  7");
    }
}
