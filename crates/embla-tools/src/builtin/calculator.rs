// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{require_str, Tool, ToolArgs, ToolError, ToolOutput};

/// Arithmetic expression evaluator.
///
/// Supports `+ - * / % ^`, parentheses, and unary minus.  The reply echoes
/// the expression in normalized spacing so the model can quote it back
/// verbatim, e.g. `2 + 2 = 4`.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, ^ and \
         parentheses. Use this for any math instead of computing yourself."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The arithmetic expression to evaluate, e.g. '2+2' or '(17.5*3)^2'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let expression = require_str(args, "expression")?;
        let tokens = tokenize(expression)
            .map_err(|e| ToolError::InvalidArguments(format!("bad expression: {e}")))?;
        if tokens.is_empty() {
            return Err(ToolError::InvalidArguments("empty expression".into()));
        }
        let value = Parser::new(&tokens)
            .parse()
            .map_err(|e| ToolError::ExecutionFailed(format!("cannot evaluate: {e}")))?;
        if !value.is_finite() {
            return Err(ToolError::ExecutionFailed("result is not a finite number".into()));
        }
        Ok(ToolOutput::ok(format!("{} = {}", render(&tokens), format_number(value))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed = number
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{number}'"))?;
                tokens.push(Token::Number(parsed));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// Recursive-descent evaluator with conventional precedence:
/// `+ -` < `* / %` < unary minus < `^` (right-associative).
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<f64, String> {
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(t) => Err(format!("unexpected trailing {t:?}")),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.next();
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                '/' => {
                    if rhs == 0.0 {
                        return Err("division by zero".into());
                    }
                    value / rhs
                }
                _ => {
                    if rhs == 0.0 {
                        return Err("modulo by zero".into());
                    }
                    value % rhs
                }
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if let Some(Token::Op('-')) = self.peek() {
            self.next();
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            Some(t) => Err(format!("unexpected {t:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

/// Re-render the token stream with normalized spacing: binary operators
/// get one space on each side, unary minus and parentheses bind tight.
fn render(tokens: &[Token]) -> String {
    fn is_unary_minus(tokens: &[Token], i: usize) -> bool {
        matches!(tokens[i], Token::Op('-'))
            && (i == 0 || matches!(tokens[i - 1], Token::Op(_) | Token::LParen))
    }

    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let tight = matches!(token, Token::RParen)
            || (i > 0 && matches!(tokens[i - 1], Token::LParen))
            || (i > 0 && is_unary_minus(tokens, i - 1));
        if i > 0 && !tight {
            out.push(' ');
        }
        match token {
            Token::Number(n) => out.push_str(&format_number(*n)),
            Token::Op(op) => out.push(*op),
            Token::LParen => out.push('('),
            Token::RParen => out.push(')'),
        }
    }
    out
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(expression: &str) -> Result<ToolOutput, ToolError> {
        let mut args = ToolArgs::new();
        args.insert("expression".into(), json!(expression));
        CalculatorTool.execute(&args).await
    }

    #[tokio::test]
    async fn two_plus_two() {
        let out = run("2+2").await.unwrap();
        assert_eq!(out.content, "2 + 2 = 4");
    }

    #[tokio::test]
    async fn respects_precedence() {
        assert_eq!(run("2+3*4").await.unwrap().content, "2 + 3 * 4 = 14");
        assert_eq!(run("(2+3)*4").await.unwrap().content, "(2 + 3) * 4 = 20");
    }

    #[tokio::test]
    async fn power_is_right_associative() {
        assert_eq!(run("2^3^2").await.unwrap().content, "2 ^ 3 ^ 2 = 512");
    }

    #[tokio::test]
    async fn unary_minus_binds_tight() {
        assert_eq!(run("-3+5").await.unwrap().content, "-3 + 5 = 2");
        assert_eq!(run("2*-3").await.unwrap().content, "2 * -3 = -6");
    }

    #[tokio::test]
    async fn modulo_and_division() {
        assert_eq!(run("17%5").await.unwrap().content, "17 % 5 = 2");
        assert_eq!(run("7/2").await.unwrap().content, "7 / 2 = 3.5");
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        let err = run("1/0").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn garbage_is_invalid_arguments() {
        assert!(matches!(run("2+&3").await.unwrap_err(), ToolError::InvalidArguments(_)));
        assert!(matches!(run("").await.unwrap_err(), ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unbalanced_parens_fail() {
        assert!(run("(1+2").await.is_err());
        assert!(run("1+2)").await.is_err());
    }

    #[tokio::test]
    async fn missing_expression_argument() {
        let err = CalculatorTool.execute(&ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn schema_declares_expression_required() {
        let schema = CalculatorTool.parameters_schema();
        assert_eq!(schema["required"][0], "expression");
    }
}
