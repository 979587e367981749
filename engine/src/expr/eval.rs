use super::parser::{BinaryOp, Node, UnaryOp};
use super::Scope;
use errors::{ExprError, Result};
use serde_json::Value;
use std::time::Instant;

/// JS-flavored truthiness over JSON values.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn eval(node: &Node, scope: &dyn Scope, deadline: Instant) -> Result<Value> {
    if Instant::now() >= deadline {
        return Err(ExprError::Budget.into());
    }
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Ident(name) => Ok(scope.lookup(name).unwrap_or(Value::Null)),
        Node::Unary { op, operand } => {
            let value = eval(operand, scope, deadline)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!truthy(&value)),
                UnaryOp::Neg => match value.as_f64() {
                    Some(n) => number(-n),
                    None => Value::Null,
                },
            })
        }
        Node::Binary { op, left, right } => eval_binary(*op, left, right, scope, deadline),
        Node::Ternary { cond, then, other } => {
            let cond = eval(cond, scope, deadline)?;
            if truthy(&cond) {
                eval(then, scope, deadline)
            } else {
                eval(other, scope, deadline)
            }
        }
        Node::Call { name, args } => eval_call(name, args, scope, deadline),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Node,
    right: &Node,
    scope: &dyn Scope,
    deadline: Instant,
) -> Result<Value> {
    let l = eval(left, scope, deadline)?;

    // Short-circuit before touching the right side.
    match op {
        BinaryOp::And if !truthy(&l) => return Ok(Value::Bool(false)),
        BinaryOp::Or if truthy(&l) => return Ok(Value::Bool(true)),
        _ => {}
    }

    let r = eval(right, scope, deadline)?;

    Ok(match op {
        BinaryOp::And => Value::Bool(truthy(&r)),
        BinaryOp::Or => Value::Bool(truthy(&r)),
        BinaryOp::Eq | BinaryOp::Ne => {
            // Any comparison against null is false, != included.
            if l.is_null() || r.is_null() {
                Value::Bool(false)
            } else {
                let eq = loose_eq(&l, &r);
                Value::Bool(if op == BinaryOp::Eq { eq } else { !eq })
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Value::Bool(ordered(&l, &r, op))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }),
                _ => Value::Null,
            }
        }
    })
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}

fn ordered(l: &Value, r: &Value, op: BinaryOp) -> bool {
    let cmp = match (l, r) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match cmp {
        Some(ordering) => match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Le => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Ge => ordering.is_ge(),
            _ => false,
        },
        None => false,
    }
}

fn eval_call(name: &str, args: &[Node], scope: &dyn Scope, deadline: Instant) -> Result<Value> {
    let func = name
        .strip_prefix("Math.")
        .ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?;

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match eval(arg, scope, deadline)?.as_f64() {
            Some(n) => values.push(n),
            None => return Ok(Value::Null),
        }
    }

    let arity = |n: usize| -> Result<()> {
        if values.len() == n {
            Ok(())
        } else {
            Err(ExprError::Arity(name.to_string()).into())
        }
    };

    let result = match func {
        "abs" => {
            arity(1)?;
            values[0].abs()
        }
        "sign" => {
            arity(1)?;
            if values[0] == 0.0 {
                0.0
            } else {
                values[0].signum()
            }
        }
        "min" => {
            if values.is_empty() {
                return Err(ExprError::Arity(name.to_string()).into());
            }
            values.iter().cloned().fold(f64::INFINITY, f64::min)
        }
        "max" => {
            if values.is_empty() {
                return Err(ExprError::Arity(name.to_string()).into());
            }
            values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        }
        "floor" => {
            arity(1)?;
            values[0].floor()
        }
        "ceil" => {
            arity(1)?;
            values[0].ceil()
        }
        "round" => {
            arity(1)?;
            values[0].round()
        }
        "sqrt" => {
            arity(1)?;
            values[0].sqrt()
        }
        "pow" => {
            arity(2)?;
            values[0].powf(values[1])
        }
        "log" => {
            arity(1)?;
            values[0].ln()
        }
        "exp" => {
            arity(1)?;
            values[0].exp()
        }
        _ => return Err(ExprError::UnknownFunction(name.to_string()).into()),
    };

    Ok(number(result))
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
