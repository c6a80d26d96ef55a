//! PostScript calculator programs, the body of a type 4 function.
//!
//! Only the operator subset allowed in PDF type 4 functions is supported:
//! arithmetic, relational / boolean / bitwise, stack operators and the
//! conditionals `if` / `ifelse`.

use std::fmt::Write as _;

use crate::errors::{GrayscaleError, Result};

/// Operators of the PostScript calculator language
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PsOperator {
    Abs,
    Add,
    Atan,
    Ceiling,
    Cos,
    Cvi,
    Cvr,
    Div,
    Exp,
    Floor,
    Idiv,
    Ln,
    Log,
    Mod,
    Mul,
    Neg,
    Round,
    Sin,
    Sqrt,
    Sub,
    Truncate,
    And,
    Bitshift,
    Eq,
    False,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Not,
    Or,
    True,
    Xor,
    If,
    IfElse,
    Copy,
    Dup,
    Exch,
    Index,
    Pop,
    Roll,
}

impl PsOperator {
    pub fn from_name(name: &str) -> Option<Self> {
        use self::PsOperator::*;
        Some(match name {
            "abs" => Abs,
            "add" => Add,
            "atan" => Atan,
            "ceiling" => Ceiling,
            "cos" => Cos,
            "cvi" => Cvi,
            "cvr" => Cvr,
            "div" => Div,
            "exp" => Exp,
            "floor" => Floor,
            "idiv" => Idiv,
            "ln" => Ln,
            "log" => Log,
            "mod" => Mod,
            "mul" => Mul,
            "neg" => Neg,
            "round" => Round,
            "sin" => Sin,
            "sqrt" => Sqrt,
            "sub" => Sub,
            "truncate" => Truncate,
            "and" => And,
            "bitshift" => Bitshift,
            "eq" => Eq,
            "false" => False,
            "ge" => Ge,
            "gt" => Gt,
            "le" => Le,
            "lt" => Lt,
            "ne" => Ne,
            "not" => Not,
            "or" => Or,
            "true" => True,
            "xor" => Xor,
            "if" => If,
            "ifelse" => IfElse,
            "copy" => Copy,
            "dup" => Dup,
            "exch" => Exch,
            "index" => Index,
            "pop" => Pop,
            "roll" => Roll,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use self::PsOperator::*;
        match self {
            Abs => "abs",
            Add => "add",
            Atan => "atan",
            Ceiling => "ceiling",
            Cos => "cos",
            Cvi => "cvi",
            Cvr => "cvr",
            Div => "div",
            Exp => "exp",
            Floor => "floor",
            Idiv => "idiv",
            Ln => "ln",
            Log => "log",
            Mod => "mod",
            Mul => "mul",
            Neg => "neg",
            Round => "round",
            Sin => "sin",
            Sqrt => "sqrt",
            Sub => "sub",
            Truncate => "truncate",
            And => "and",
            Bitshift => "bitshift",
            Eq => "eq",
            False => "false",
            Ge => "ge",
            Gt => "gt",
            Le => "le",
            Lt => "lt",
            Ne => "ne",
            Not => "not",
            Or => "or",
            True => "true",
            Xor => "xor",
            If => "if",
            IfElse => "ifelse",
            Copy => "copy",
            Dup => "dup",
            Exch => "exch",
            Index => "index",
            Pop => "pop",
            Roll => "roll",
        }
    }
}

/// One instruction of a calculator program
#[derive(Debug, Clone, PartialEq)]
pub enum PsOp {
    Int(i64),
    Real(f64),
    Operator(PsOperator),
    /// `{ ... }` procedure, consumed by a following `if` / `ifelse`
    Proc(PsProgram),
}

/// Ordered list of calculator instructions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsProgram {
    pub ops: Vec<PsOp>,
}

#[derive(Debug, Copy, Clone)]
enum Item<'a> {
    Int(i64),
    Real(f64),
    Bool(bool),
    Proc(&'a PsProgram),
}

impl Item<'_> {
    fn as_f64(&self) -> Result<f64> {
        match *self {
            Item::Int(i) => Ok(i as f64),
            Item::Real(r) => Ok(r),
            ref other => Err(GrayscaleError::Function(format!(
                "expected number, found {other:?}"
            ))),
        }
    }
}

impl PsProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_real(&mut self, v: f64) -> &mut Self {
        self.ops.push(PsOp::Real(v));
        self
    }

    pub fn push_op(&mut self, op: PsOperator) -> &mut Self {
        self.ops.push(PsOp::Operator(op));
        self
    }

    pub fn push_proc(&mut self, proc_: PsProgram) -> &mut Self {
        self.ops.push(PsOp::Proc(proc_));
        self
    }

    /// Parses the body of a type 4 function stream, e.g. `{ 0.5 mul }`
    pub fn parse(src: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(src);
        let mut tokens = tokenize(&text).into_iter();
        match tokens.next() {
            Some(ref t) if t == "{" => {}
            other => {
                return Err(GrayscaleError::Function(format!(
                    "calculator program must start with '{{', found {other:?}"
                )))
            }
        }
        parse_proc(&mut tokens)
    }

    /// Serializes the program, including the outer braces
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        write_proc(self, &mut out);
        out.into_bytes()
    }

    /// Runs the program on `inputs` and returns the operand stack as outputs.
    pub fn execute(&self, inputs: &[f64]) -> Result<Vec<f64>> {
        let mut stack: Vec<Item<'_>> = inputs.iter().map(|v| Item::Real(*v)).collect();
        exec(self, &mut stack)?;
        stack.iter().map(|i| i.as_f64()).collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '{' | '}' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_proc(tokens: &mut impl Iterator<Item = String>) -> Result<PsProgram> {
    let mut program = PsProgram::new();
    while let Some(token) = tokens.next() {
        match token.as_str() {
            "}" => return Ok(program),
            "{" => {
                let inner = parse_proc(tokens)?;
                program.ops.push(PsOp::Proc(inner));
            }
            t => {
                if let Ok(i) = t.parse::<i64>() {
                    program.ops.push(PsOp::Int(i));
                } else if let Ok(r) = t.parse::<f64>() {
                    program.ops.push(PsOp::Real(r));
                } else if let Some(op) = PsOperator::from_name(t) {
                    program.ops.push(PsOp::Operator(op));
                } else {
                    return Err(GrayscaleError::Function(format!(
                        "unknown calculator operator `{t}`"
                    )));
                }
            }
        }
    }
    Err(GrayscaleError::Function(
        "unterminated calculator procedure".to_string(),
    ))
}

fn write_proc(program: &PsProgram, out: &mut String) {
    out.push('{');
    for op in &program.ops {
        out.push(' ');
        match op {
            PsOp::Int(i) => {
                let _ = write!(out, "{i}");
            }
            PsOp::Real(r) if r.fract() == 0.0 => {
                let _ = write!(out, "{r:.1}");
            }
            PsOp::Real(r) => {
                let _ = write!(out, "{r}");
            }
            PsOp::Operator(o) => out.push_str(o.name()),
            PsOp::Proc(p) => write_proc(p, out),
        }
    }
    out.push_str(" }");
}

fn pop<'a>(stack: &mut Vec<Item<'a>>) -> Result<Item<'a>> {
    stack
        .pop()
        .ok_or_else(|| GrayscaleError::Function("calculator stack underflow".to_string()))
}

fn pop_num(stack: &mut Vec<Item<'_>>) -> Result<f64> {
    pop(stack)?.as_f64()
}

fn pop_int(stack: &mut Vec<Item<'_>>) -> Result<i64> {
    match pop(stack)? {
        Item::Int(i) => Ok(i),
        Item::Real(r) if r.fract() == 0.0 => Ok(r as i64),
        other => Err(GrayscaleError::Function(format!(
            "expected integer, found {other:?}"
        ))),
    }
}

fn pop_bool(stack: &mut Vec<Item<'_>>) -> Result<bool> {
    match pop(stack)? {
        Item::Bool(b) => Ok(b),
        other => Err(GrayscaleError::Function(format!(
            "expected boolean, found {other:?}"
        ))),
    }
}

fn pop_proc<'a>(stack: &mut Vec<Item<'a>>) -> Result<&'a PsProgram> {
    match pop(stack)? {
        Item::Proc(p) => Ok(p),
        other => Err(GrayscaleError::Function(format!(
            "expected procedure, found {other:?}"
        ))),
    }
}

fn exec<'a>(program: &'a PsProgram, stack: &mut Vec<Item<'a>>) -> Result<()> {
    use self::PsOperator::*;

    for op in &program.ops {
        let o = match op {
            PsOp::Int(i) => {
                stack.push(Item::Int(*i));
                continue;
            }
            PsOp::Real(r) => {
                stack.push(Item::Real(*r));
                continue;
            }
            PsOp::Proc(p) => {
                stack.push(Item::Proc(p));
                continue;
            }
            PsOp::Operator(o) => *o,
        };

        match o {
            Abs | Neg | Ceiling | Floor | Round | Truncate => {
                let item = pop(stack)?;
                let result = match item {
                    Item::Int(i) => Item::Int(match o {
                        Abs => i.abs(),
                        Neg => -i,
                        _ => i,
                    }),
                    other => {
                        let v = other.as_f64()?;
                        Item::Real(match o {
                            Abs => v.abs(),
                            Neg => -v,
                            Ceiling => v.ceil(),
                            Floor => v.floor(),
                            Round => (v + 0.5).floor(),
                            _ => v.trunc(),
                        })
                    }
                };
                stack.push(result);
            }
            Add | Sub | Mul => {
                let b = pop(stack)?;
                let a = pop(stack)?;
                let result = match (a, b) {
                    (Item::Int(x), Item::Int(y)) => Item::Int(match o {
                        Add => x.wrapping_add(y),
                        Sub => x.wrapping_sub(y),
                        _ => x.wrapping_mul(y),
                    }),
                    (a, b) => {
                        let (x, y) = (a.as_f64()?, b.as_f64()?);
                        Item::Real(match o {
                            Add => x + y,
                            Sub => x - y,
                            _ => x * y,
                        })
                    }
                };
                stack.push(result);
            }
            Div => {
                let y = pop_num(stack)?;
                let x = pop_num(stack)?;
                if y == 0.0 {
                    return Err(GrayscaleError::Function("division by zero".to_string()));
                }
                stack.push(Item::Real(x / y));
            }
            Idiv | Mod => {
                let y = pop_int(stack)?;
                let x = pop_int(stack)?;
                if y == 0 {
                    return Err(GrayscaleError::Function("division by zero".to_string()));
                }
                stack.push(Item::Int(if o == Idiv { x / y } else { x % y }));
            }
            Atan => {
                let den = pop_num(stack)?;
                let num = pop_num(stack)?;
                let mut angle = num.atan2(den).to_degrees();
                if angle < 0.0 {
                    angle += 360.0;
                }
                stack.push(Item::Real(angle));
            }
            Cos | Sin => {
                let v = pop_num(stack)?.to_radians();
                stack.push(Item::Real(if o == Cos { v.cos() } else { v.sin() }));
            }
            Exp => {
                let e = pop_num(stack)?;
                let base = pop_num(stack)?;
                stack.push(Item::Real(base.powf(e)));
            }
            Ln | Log | Sqrt => {
                let v = pop_num(stack)?;
                stack.push(Item::Real(match o {
                    Ln => v.ln(),
                    Log => v.log10(),
                    _ => v.sqrt(),
                }));
            }
            Cvi => {
                let v = pop_num(stack)?;
                stack.push(Item::Int(v.trunc() as i64));
            }
            Cvr => {
                let v = pop_num(stack)?;
                stack.push(Item::Real(v));
            }
            Eq | Ne | Ge | Gt | Le | Lt => {
                let b = pop(stack)?;
                let a = pop(stack)?;
                let result = match (a, b) {
                    (Item::Bool(x), Item::Bool(y)) if o == Eq => x == y,
                    (Item::Bool(x), Item::Bool(y)) if o == Ne => x != y,
                    (a, b) => {
                        let (x, y) = (a.as_f64()?, b.as_f64()?);
                        match o {
                            Eq => x == y,
                            Ne => x != y,
                            Ge => x >= y,
                            Gt => x > y,
                            Le => x <= y,
                            _ => x < y,
                        }
                    }
                };
                stack.push(Item::Bool(result));
            }
            And | Or | Xor => {
                let b = pop(stack)?;
                let a = pop(stack)?;
                let result = match (a, b) {
                    (Item::Bool(x), Item::Bool(y)) => Item::Bool(match o {
                        And => x && y,
                        Or => x || y,
                        _ => x ^ y,
                    }),
                    (Item::Int(x), Item::Int(y)) => Item::Int(match o {
                        And => x & y,
                        Or => x | y,
                        _ => x ^ y,
                    }),
                    (a, b) => {
                        return Err(GrayscaleError::Function(format!(
                            "`{}` on mismatched operands {a:?} {b:?}",
                            o.name()
                        )))
                    }
                };
                stack.push(result);
            }
            Not => {
                let result = match pop(stack)? {
                    Item::Bool(b) => Item::Bool(!b),
                    Item::Int(i) => Item::Int(!i),
                    other => {
                        return Err(GrayscaleError::Function(format!(
                            "`not` on {other:?}"
                        )))
                    }
                };
                stack.push(result);
            }
            Bitshift => {
                let shift = pop_int(stack)?;
                let v = pop_int(stack)?;
                stack.push(Item::Int(if shift >= 0 { v << shift } else { v >> -shift }));
            }
            True => stack.push(Item::Bool(true)),
            False => stack.push(Item::Bool(false)),
            If => {
                let proc_ = pop_proc(stack)?;
                if pop_bool(stack)? {
                    exec(proc_, stack)?;
                }
            }
            IfElse => {
                let else_proc = pop_proc(stack)?;
                let then_proc = pop_proc(stack)?;
                if pop_bool(stack)? {
                    exec(then_proc, stack)?;
                } else {
                    exec(else_proc, stack)?;
                }
            }
            Copy => {
                let n = pop_int(stack)?;
                if n < 0 || n as usize > stack.len() {
                    return Err(GrayscaleError::Function("`copy` out of range".to_string()));
                }
                let start = stack.len() - n as usize;
                let copied = stack[start..].to_vec();
                stack.extend(copied);
            }
            Dup => {
                let top = pop(stack)?;
                stack.push(top);
                stack.push(top);
            }
            Exch => {
                let b = pop(stack)?;
                let a = pop(stack)?;
                stack.push(b);
                stack.push(a);
            }
            Index => {
                let n = pop_int(stack)?;
                if n < 0 || n as usize >= stack.len() {
                    return Err(GrayscaleError::Function("`index` out of range".to_string()));
                }
                let item = stack[stack.len() - 1 - n as usize];
                stack.push(item);
            }
            Pop => {
                pop(stack)?;
            }
            Roll => {
                let j = pop_int(stack)?;
                let n = pop_int(stack)?;
                if n < 0 || n as usize > stack.len() {
                    return Err(GrayscaleError::Function("`roll` out of range".to_string()));
                }
                if n > 0 {
                    let start = stack.len() - n as usize;
                    let shift = j.rem_euclid(n) as usize;
                    stack[start..].rotate_right(shift);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_print_roundtrip_keeps_structure() {
        let program = PsProgram::parse(b"{ dup 1.0 ge { pop 1.0 } if }").unwrap();
        assert_eq!(program.ops.len(), 5);
        assert!(matches!(program.ops[3], PsOp::Proc(_)));
        assert_eq!(
            String::from_utf8(program.to_bytes()).unwrap(),
            "{ dup 1.0 ge { pop 1.0 } if }"
        );
    }

    #[test]
    fn ifelse_picks_branch() {
        let program = PsProgram::parse(b"{ 0.5 gt { 1 } { 0 } ifelse }").unwrap();
        assert_eq!(program.execute(&[0.7]).unwrap(), vec![1.0]);
        assert_eq!(program.execute(&[0.2]).unwrap(), vec![0.0]);
    }

    #[test]
    fn roll_and_index() {
        let program = PsProgram::parse(b"{ 3 1 roll 2 index }").unwrap();
        // 1 2 3 -> 3 1 2 -> 3 1 2 3
        assert_eq!(program.execute(&[1.0, 2.0, 3.0]).unwrap(), vec![3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn underflow_is_an_error() {
        let program = PsProgram::parse(b"{ add }").unwrap();
        assert!(program.execute(&[1.0]).is_err());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(PsProgram::parse(b"{ 1 2 frobnicate }").is_err());
    }
}
