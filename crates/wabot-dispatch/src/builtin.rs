//! Commands every deployment ships with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wabot_guard::ArgKind;

use crate::command::{
    Command, CommandContext, CommandDescriptor, CommandError, CommandRegistry, RegistryError,
};

pub struct Ping {
    desc: CommandDescriptor,
}

impl Ping {
    pub(crate) fn new() -> Self {
        Self {
            desc: CommandDescriptor::new("ping", "general").describe("check that the bot is alive"),
        }
    }
}

#[async_trait]
impl Command for Ping {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.desc
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        ctx.reply("🏓 Pong!").await?;
        Ok(())
    }
}

pub struct Menu {
    desc: CommandDescriptor,
}

impl Menu {
    pub(crate) fn new() -> Self {
        Self {
            desc: CommandDescriptor::new("menu", "general")
                .aliases(&["help"])
                .describe("list available commands"),
        }
    }
}

#[async_trait]
impl Command for Menu {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.desc
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        let show_owner = ctx.security.is_owner(ctx.sender());
        let mut out = format!("📋 *{} menu*\n", ctx.bot_name);
        let mut current = "";
        for desc in ctx.commands.descriptors() {
            let owner_only =
                desc.owner_only || ctx.security.permissions().is_owner_only(desc.name);
            if !show_owner && owner_only {
                continue;
            }
            if desc.category != current {
                current = desc.category;
                out.push_str(&format!("\n*{}*\n", current.to_uppercase()));
            }
            out.push_str(&format!("• {}{}", ctx.prefix, desc.name));
            if !desc.description.is_empty() {
                out.push_str(&format!(" - {}", desc.description));
            }
            out.push('\n');
        }
        ctx.reply(out.trim_end()).await?;
        Ok(())
    }
}

pub struct Calc {
    desc: CommandDescriptor,
}

impl Calc {
    pub(crate) fn new() -> Self {
        Self {
            desc: CommandDescriptor::new("calc", "tools")
                .aliases(&["math"])
                .describe("evaluate an arithmetic expression")
                .cooldown(Duration::from_secs(2))
                .args(ArgKind::Expression),
        }
    }
}

#[async_trait]
impl Command for Calc {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.desc
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        let expr = ctx.command.rest.as_str();
        if expr.is_empty() {
            return Err(CommandError::Usage(format!("{}calc <expression>", ctx.prefix)));
        }
        match evaluate(expr) {
            Ok(value) => ctx.reply(&format!("🧮 {expr} = {}", format_number(value))).await?,
            Err(reason) => ctx.reply(&format!("❌ {reason}")).await?,
        }
        Ok(())
    }
}

/// Register `ping`, `menu` and `calc`.
pub fn register_builtins(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(Ping::new()))?;
    registry.register(Arc::new(Menu::new()))?;
    registry.register(Arc::new(Calc::new()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// Evaluate `+ - * / % ^` with parentheses and unary minus. `^` binds
/// tightest and is right-associative.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("unexpected input after expression".into());
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.10}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {text:?}"))?;
                tokens.push(Token::Num(n));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op != '*' && rhs == 0.0 {
                return Err("division by zero".into());
            }
            value = match op {
                '*' => value * rhs,
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            Some(_) => Err("unexpected operator".into()),
            None => Err("incomplete expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(evaluate("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(evaluate("10 % 4 - 1").unwrap(), 1.0);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
    }

    #[test]
    fn errors_are_reported() {
        assert_eq!(evaluate("1 / 0").unwrap_err(), "division by zero");
        assert_eq!(evaluate("(1 + 2").unwrap_err(), "missing closing parenthesis");
        assert_eq!(evaluate("1 +").unwrap_err(), "incomplete expression");
        assert!(evaluate("1 2").is_err());
        assert!(evaluate("1..2").is_err());
    }

    #[test]
    fn numbers_formatted_compactly() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333");
    }
}
