use crate::error::{DomainError, EquationError};
use crate::traits::{Scalar, ScalarFunction};
use std::cell::RefCell;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of the independent variable onto the stack.
    LoadVar,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b). Fails if b == 0.
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes func(a).
    Call(Function),
}

/// Built-in single-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
        }
    }

    fn apply<T: Scalar>(self, a: T) -> Result<T, DomainError> {
        let invalid = || DomainError::InvalidArgument {
            function: self.name(),
            value: a.to_f64().unwrap_or(f64::NAN),
        };
        match self {
            Function::Sin => Ok(a.sin()),
            Function::Cos => Ok(a.cos()),
            Function::Tan => {
                // Within rounding of a pole, cos(a) is noise and tan(a) is meaningless.
                if a.cos().abs() <= T::epsilon() * a.sin().abs() {
                    Err(invalid())
                } else {
                    Ok(a.tan())
                }
            }
            Function::Exp => Ok(a.exp()),
            Function::Ln => {
                if a <= T::zero() {
                    Err(invalid())
                } else {
                    Ok(a.ln())
                }
            }
            Function::Sqrt => {
                if a < T::zero() {
                    Err(invalid())
                } else {
                    Ok(a.sqrt())
                }
            }
            Function::Abs => Ok(a.abs()),
        }
    }
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based Virtual Machine for evaluating expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `x`: Value of the independent variable.
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the value left on the stack, or the first domain error encountered.
pub struct VM;

impl VM {
    /// Executes the bytecode.
    ///
    /// # Type Parameters
    /// * `T`: The scalar type (e.g., `f64` or `f32`).
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        x: T,
        stack: &mut Vec<T>,
    ) -> Result<T, DomainError> {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => {
                    let c = T::from_f64(val).ok_or(DomainError::NonFinite(val))?;
                    stack.push(c);
                }
                OpCode::LoadVar => stack.push(x),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    if b == T::zero() {
                        return Err(DomainError::DivisionByZero);
                    }
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    let value = a.powf(b);
                    if value.is_nan() {
                        return Err(DomainError::InvalidArgument {
                            function: "pow",
                            value: a.to_f64().unwrap_or(f64::NAN),
                        });
                    }
                    stack.push(value);
                }
                OpCode::Neg => {
                    let a = pop(stack)?;
                    stack.push(-a);
                }
                OpCode::Call(func) => {
                    let a = pop(stack)?;
                    stack.push(func.apply(a)?);
                }
            }
        }

        let result = pop(stack)?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(DomainError::NonFinite(result.to_f64().unwrap_or(f64::NAN)))
        }
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> Result<T, DomainError> {
    stack
        .pop()
        .ok_or_else(|| DomainError::Evaluation("stack underflow".to_string()))
}

fn pop_pair<T: Scalar>(stack: &mut Vec<T>) -> Result<(T, T), DomainError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // functions like sin(x)
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves the variable name and the named constants `pi` and `e`.
pub struct Compiler {
    pub var_name: String,
}

impl Compiler {
    pub fn new(var_name: &str) -> Self {
        Self {
            var_name: var_name.to_string(),
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, EquationError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EquationError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if *name == self.var_name {
                    ops.push(OpCode::LoadVar);
                } else {
                    match name.as_str() {
                        "pi" => ops.push(OpCode::LoadConst(std::f64::consts::PI)),
                        "e" => ops.push(OpCode::LoadConst(std::f64::consts::E)),
                        _ => return Err(EquationError::UnknownSymbol(name.clone())),
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                match op {
                    '+' => ops.push(OpCode::Add),
                    '-' => ops.push(OpCode::Sub),
                    '*' => ops.push(OpCode::Mul),
                    '/' => ops.push(OpCode::Div),
                    '^' => ops.push(OpCode::Pow),
                    _ => return Err(EquationError::UnexpectedToken(op.to_string())),
                }
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => return Err(EquationError::UnexpectedToken(op.to_string())),
                }
            }
            Expr::Call(func, arg) => {
                let function = Function::from_name(func)
                    .ok_or_else(|| EquationError::UnknownFunction(func.clone()))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
///
/// Precedence, lowest first: `+ -`, `* /`, unary `-`, `^` (right-associative).
pub fn parse(input: &str) -> Result<Expr, EquationError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(EquationError::TrailingInput(token.to_string()));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EquationError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else if d == 'e' || d == 'E' {
                    // Exponent only if followed by a digit or a signed digit.
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let next = lookahead.next();
                    let signed_digit = matches!(next, Some('+') | Some('-'))
                        && matches!(lookahead.next(), Some(c) if c.is_ascii_digit());
                    if matches!(next, Some(c) if c.is_ascii_digit()) || signed_digit {
                        num_str.push(d);
                        chars.next();
                        if let Some(&sign) = chars.peek() {
                            if sign == '+' || sign == '-' {
                                num_str.push(sign);
                                chars.next();
                            }
                        }
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| EquationError::InvalidNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(EquationError::InvalidCharacter(other)),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expression(&mut self) -> Result<Expr, EquationError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EquationError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, EquationError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EquationError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => Ok(Expr::Call(name, Box::new(arg))),
                        _ => Err(EquationError::MissingParen),
                    }
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(EquationError::MissingParen),
                }
            }
            Some(token) => Err(EquationError::UnexpectedToken(token.to_string())),
            None => Err(EquationError::UnexpectedEnd),
        }
    }
}

// --- CompiledFunction ---

/// A single-variable expression compiled to bytecode, usable as a search target.
pub struct CompiledFunction<T: Scalar = f64> {
    pub source: String,
    pub bytecode: Bytecode,
    // Interior mutability for VM stack to avoid allocation per evaluation.
    // Note: This makes the function !Sync; clone it per thread instead.
    stack: RefCell<Vec<T>>,
}

impl<T: Scalar> CompiledFunction<T> {
    pub fn new(source: &str, bytecode: Bytecode) -> Self {
        Self {
            source: source.to_string(),
            bytecode,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }
}

impl<T: Scalar> Clone for CompiledFunction<T> {
    fn clone(&self) -> Self {
        Self::new(&self.source, self.bytecode.clone())
    }
}

impl<T: Scalar> std::fmt::Debug for CompiledFunction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompiledFunction({})", self.source)
    }
}

impl<T: Scalar> ScalarFunction<T> for CompiledFunction<T> {
    fn evaluate(&self, x: T) -> Result<T, DomainError> {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, x, &mut stack)
    }
}

/// Parses and compiles `expression` as a function of `var_name`.
pub fn compile_function<T: Scalar>(
    expression: &str,
    var_name: &str,
) -> Result<CompiledFunction<T>, EquationError> {
    let parsed = parse(expression)?;
    let bytecode = Compiler::new(var_name).compile(&parsed)?;
    Ok(CompiledFunction::new(expression, bytecode))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, x: f64) -> Result<f64, DomainError> {
        compile_function::<f64>(expression, "x")
            .expect("expression should compile")
            .evaluate(x)
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        assert_eq!(eval("1 + 2 * x", 3.0), Ok(7.0));
        assert_eq!(eval("(1 + 2) * x", 3.0), Ok(9.0));
        assert_eq!(eval("x - 1 - 1", 3.0), Ok(1.0));
        assert_eq!(eval("8 / x / 2", 2.0), Ok(2.0));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus_and_is_right_associative() {
        assert_eq!(eval("-x^2", 3.0), Ok(-9.0));
        assert_eq!(eval("2^3^2", 0.0), Ok(512.0));
        assert_eq!(eval("x^-1", 4.0), Ok(0.25));
    }

    #[test]
    fn evaluates_functions_and_constants() {
        let v = eval("exp(x)/sqrt(sin(x)^3 + cos(x)^3)", 1.0).unwrap();
        let expected = 1.0_f64.exp() / (1.0_f64.sin().powi(3) + 1.0_f64.cos().powi(3)).sqrt();
        assert!((v - expected).abs() < 1e-12);
        assert!((eval("sin(pi / 2) + ln(e)", 0.0).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(eval("abs(x)", -2.5), Ok(2.5));
    }

    #[test]
    fn parses_scientific_notation() {
        assert_eq!(eval("1e3 * x", 2.0), Ok(2000.0));
        assert_eq!(eval("2.5E-2", 0.0), Ok(0.025));
        assert_eq!(eval("1e+2", 0.0), Ok(100.0));
    }

    #[test]
    fn e_after_number_without_digits_is_not_an_exponent() {
        let parsed = parse("2e");
        assert!(matches!(parsed, Err(EquationError::TrailingInput(ref t)) if t == "e"));
    }

    #[test]
    fn tan_rejects_arguments_at_a_pole() {
        assert!(matches!(
            eval("tan(pi / 2)", 0.0),
            Err(DomainError::InvalidArgument { function: "tan", .. })
        ));
        assert!(matches!(
            eval("tan(x)", -std::f64::consts::FRAC_PI_2),
            Err(DomainError::InvalidArgument { function: "tan", .. })
        ));
        let near = eval("tan(x)", 1.57).unwrap();
        assert!((near - 1.57_f64.tan()).abs() < 1e-9);
        assert_eq!(eval("tan(x)", 0.0), Ok(0.0));
    }

    #[test]
    fn reports_domain_errors() {
        assert_eq!(eval("1 / x", 0.0), Err(DomainError::DivisionByZero));
        assert!(matches!(
            eval("sqrt(x)", -1.0),
            Err(DomainError::InvalidArgument { function: "sqrt", .. })
        ));
        assert!(matches!(
            eval("ln(x)", 0.0),
            Err(DomainError::InvalidArgument { function: "ln", .. })
        ));
        assert!(matches!(
            eval("x^0.5", -4.0),
            Err(DomainError::InvalidArgument { function: "pow", .. })
        ));
        assert!(matches!(eval("exp(x)", 1000.0), Err(DomainError::NonFinite(v)) if v.is_infinite()));
    }

    #[test]
    fn rejects_unknown_symbols_and_functions() {
        let err = compile_function::<f64>("x + y", "x").expect_err("unknown symbol should fail");
        assert_eq!(err, EquationError::UnknownSymbol("y".to_string()));
        assert!(err.to_string().contains("unknown"));

        let err = compile_function::<f64>("erf(x)", "x").expect_err("unknown function should fail");
        assert_eq!(err, EquationError::UnknownFunction("erf".to_string()));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse("(x + 1"), Err(EquationError::MissingParen));
        assert_eq!(parse("x +"), Err(EquationError::UnexpectedEnd));
        assert_eq!(parse("x $ 1"), Err(EquationError::InvalidCharacter('$')));
        assert!(matches!(parse("x 1"), Err(EquationError::TrailingInput(_))));
        assert!(matches!(parse("1..2"), Err(EquationError::InvalidNumber(_))));
        assert!(matches!(parse("* x"), Err(EquationError::UnexpectedToken(_))));
    }

    #[test]
    fn custom_variable_name() {
        let f = compile_function::<f64>("t^2 + 1", "t").unwrap();
        assert_eq!(f.evaluate(2.0), Ok(5.0));
        assert!(compile_function::<f64>("x", "t").is_err());
    }

    #[test]
    fn compiles_to_expected_bytecode() {
        let expr = parse("-sin(x) + 2").unwrap();
        let code = Compiler::new("x").compile(&expr).unwrap();
        assert_eq!(
            code.ops,
            vec![
                OpCode::LoadVar,
                OpCode::Call(Function::Sin),
                OpCode::Neg,
                OpCode::LoadConst(2.0),
                OpCode::Add,
            ]
        );
    }

    #[test]
    fn clones_evaluate_independently() {
        let f = compile_function::<f32>("x * 2", "x").unwrap();
        let g = f.clone();
        assert_eq!(f.evaluate(1.5), Ok(3.0));
        assert_eq!(g.evaluate(2.0), Ok(4.0));
        assert_eq!(format!("{:?}", g), "CompiledFunction(x * 2)");
    }
}
