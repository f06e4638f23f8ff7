// SPDX-License-Identifier: Apache-2.0

//! Parser for the textual IR.
//!
//! Text is split into tokens first. Every node line has the shape
//! `name: type = op(args)`; the argument list is read generically as
//! positional operands and `key=value` attributes, and only then interpreted
//! for the specific operator.

use crate::ir::{self, NodePayload, NodeRef, Type};
use crate::ir_node_env::{IrNodeEnv, NameOrId};
use crate::ir_validate;
use crate::ir_value::{IrBits, IrValue};

#[derive(Debug)]
pub struct ParseError {
    line: usize,
    msg: String,
}

impl ParseError {
    fn at(line: usize, msg: String) -> Self {
        ParseError { line, msg }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParseError: line {}: {}", self.line, self.msg)
    }
}

impl std::error::Error for ParseError {}

/// Failure of [`Parser::parse_and_validate_package`].
#[derive(Debug)]
pub enum ParseOrValidateError {
    Parse(ParseError),
    Validate(ir_validate::ValidationError),
}

impl std::fmt::Display for ParseOrValidateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseOrValidateError::Parse(e) => write!(f, "{}", e),
            ParseOrValidateError::Validate(e) => write!(f, "ValidationError: {}", e),
        }
    }
}

impl std::error::Error for ParseOrValidateError {}

impl From<ParseError> for ParseOrValidateError {
    fn from(e: ParseError) -> Self {
        ParseOrValidateError::Parse(e)
    }
}

impl From<ir_validate::ValidationError> for ParseOrValidateError {
    fn from(e: ir_validate::ValidationError) -> Self {
        ParseOrValidateError::Validate(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    /// Digits with any `0x`/`0b` prefix kept and underscores dropped.
    Number(String),
    Punct(char),
    Arrow,
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::Ident(s) | Tok::Number(s) => write!(f, "`{}`", s),
            Tok::Punct(c) => write!(f, "`{}`", c),
            Tok::Arrow => write!(f, "`->`"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '-' && chars.get(i + 1) == Some(&'>') {
            tokens.push(Token { tok: Tok::Arrow, line });
            i += 2;
        } else if c.is_ascii_digit() {
            let mut digits = String::new();
            while i < chars.len() && is_ident_char(chars[i]) {
                if chars[i] != '_' {
                    digits.push(chars[i]);
                }
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Number(digits),
                line,
            });
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(chars[start..i].iter().collect()),
                line,
            });
        } else if "()[]{},:=.".contains(c) {
            tokens.push(Token {
                tok: Tok::Punct(c),
                line,
            });
            i += 1;
        } else {
            return Err(ParseError::at(line, format!("unexpected character {:?}", c)));
        }
    }
    Ok(tokens)
}

fn parse_usize_text(text: &str) -> Option<usize> {
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        (bin, 2)
    } else {
        (text, 10)
    };
    usize::from_str_radix(digits, radix).ok()
}

/// One argument or attribute value before it is given a meaning.
#[derive(Debug, Clone)]
enum Raw {
    /// `name` or `op.id`.
    Ref(NameOrId),
    Number(String),
    /// `( ... )`
    Group(Vec<Raw>),
    /// `[ ... ]`
    List(Vec<Raw>),
}

/// The contents of a node's parentheses.
struct CallArgs {
    op: String,
    line: usize,
    positional: Vec<Raw>,
    attrs: Vec<(String, Raw)>,
}

impl CallArgs {
    fn error(&self, msg: String) -> ParseError {
        ParseError::at(self.line, format!("{}: {}", self.op, msg))
    }

    fn take(&mut self, key: &str) -> Option<Raw> {
        let index = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(index).1)
    }

    fn require(&mut self, key: &str) -> Result<Raw, ParseError> {
        self.take(key)
            .ok_or_else(|| self.error(format!("missing attribute `{}`", key)))
    }

    fn usize_attr(&mut self, key: &str) -> Result<usize, ParseError> {
        let raw = self.require(key)?;
        match &raw {
            Raw::Number(text) => parse_usize_text(text)
                .ok_or_else(|| self.error(format!("`{}` is not a valid count: {}", key, text))),
            other => Err(self.error(format!("`{}` expects a number, got {:?}", key, other))),
        }
    }

    fn bool_attr(&mut self, key: &str) -> Result<bool, ParseError> {
        match self.require(key)? {
            Raw::Ref(NameOrId::Name(s)) if s == "true" => Ok(true),
            Raw::Ref(NameOrId::Name(s)) if s == "false" => Ok(false),
            other => Err(self.error(format!("`{}` expects true or false, got {:?}", key, other))),
        }
    }

    fn operand(&self, env: &IrNodeEnv, index: usize) -> Result<NodeRef, ParseError> {
        resolve(self, env, &self.positional[index])
    }

    fn expect_positional(&self, count: usize) -> Result<(), ParseError> {
        if self.positional.len() != count {
            return Err(self.error(format!(
                "expected {} operand(s), got {}",
                count,
                self.positional.len()
            )));
        }
        Ok(())
    }
}

/// What a node line turned into.
enum Statement {
    Node(ir::Node),
    /// `param(name=...)` names a node that already exists for the signature.
    Param(NodeRef),
}

pub struct Parser {
    tokens: Vec<Token>,
    next: usize,
    lex_error: Option<ParseError>,
}

impl Parser {
    pub fn new(text: &str) -> Self {
        match tokenize(text) {
            Ok(tokens) => Parser {
                tokens,
                next: 0,
                lex_error: None,
            },
            Err(e) => Parser {
                tokens: Vec::new(),
                next: 0,
                lex_error: Some(e),
            },
        }
    }

    fn check_lexed(&mut self) -> Result<(), ParseError> {
        match self.lex_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.next).map(|t| &t.tok)
    }

    fn peek_nth(&self, n: usize) -> Option<&Tok> {
        self.tokens.get(self.next + n).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.next)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::at(self.line(), format!("expected {}, got {}", wanted, tok)),
            None => ParseError::at(self.line(), format!("expected {}, got end of input", wanted)),
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.next += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{}`", c)))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == keyword) {
            self.next += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{}`", keyword)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        if let Some(Tok::Ident(s)) = self.peek() {
            let s = s.clone();
            self.next += 1;
            return Ok(s);
        }
        Err(self.unexpected(what))
    }

    fn expect_number(&mut self, what: &str) -> Result<String, ParseError> {
        if let Some(Tok::Number(s)) = self.peek() {
            let s = s.clone();
            self.next += 1;
            return Ok(s);
        }
        Err(self.unexpected(what))
    }

    fn expect_usize(&mut self, what: &str) -> Result<usize, ParseError> {
        let line = self.line();
        let text = self.expect_number(what)?;
        parse_usize_text(&text)
            .ok_or_else(|| ParseError::at(line, format!("{} is not a valid {}", text, what)))
    }

    /// Reads `ident` or `ident.number`.
    fn parse_name_or_id(&mut self, what: &str) -> Result<(String, Option<usize>), ParseError> {
        let name = self.expect_ident(what)?;
        if self.peek() == Some(&Tok::Punct('.')) && matches!(self.peek_nth(1), Some(Tok::Number(_))) {
            self.next += 1;
            let id = self.expect_usize("node id")?;
            return Ok((name, Some(id)));
        }
        Ok((name, None))
    }

    pub fn parse_type(&mut self) -> Result<Type, ParseError> {
        self.check_lexed()?;
        if self.eat_punct('(') {
            let mut elements = Vec::new();
            while !self.eat_punct(')') {
                if !elements.is_empty() {
                    self.expect_punct(',')?;
                }
                elements.push(Box::new(self.parse_type()?));
            }
            return Ok(Type::Tuple(elements));
        }
        self.expect_keyword("bits")?;
        self.expect_punct('[')?;
        let width = self.expect_usize("bit count")?;
        self.expect_punct(']')?;
        Ok(Type::Bits(width))
    }

    fn parse_raw(&mut self) -> Result<Raw, ParseError> {
        let close = if self.eat_punct('(') {
            ')'
        } else if self.eat_punct('[') {
            ']'
        } else {
            return match self.peek() {
                Some(Tok::Number(_)) => Ok(Raw::Number(self.expect_number("number")?)),
                Some(Tok::Ident(_)) => {
                    let (name, id) = self.parse_name_or_id("operand")?;
                    Ok(Raw::Ref(match id {
                        Some(id) => NameOrId::Id(id),
                        None => NameOrId::Name(name),
                    }))
                }
                _ => Err(self.unexpected("operand or value")),
            };
        };
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            if !items.is_empty() {
                self.expect_punct(',')?;
            }
            items.push(self.parse_raw()?);
        }
        Ok(if close == ')' {
            Raw::Group(items)
        } else {
            Raw::List(items)
        })
    }

    fn parse_call_args(&mut self, op: String) -> Result<CallArgs, ParseError> {
        let mut args = CallArgs {
            op,
            line: self.line(),
            positional: Vec::new(),
            attrs: Vec::new(),
        };
        self.expect_punct('(')?;
        let mut first = true;
        while !self.eat_punct(')') {
            if !first {
                self.expect_punct(',')?;
            }
            first = false;
            let is_attr = matches!(self.peek(), Some(Tok::Ident(_)))
                && self.peek_nth(1) == Some(&Tok::Punct('='));
            if is_attr {
                let key = self.expect_ident("attribute")?;
                self.next += 1;
                let value = self.parse_raw()?;
                args.attrs.push((key, value));
            } else if args.attrs.is_empty() {
                args.positional.push(self.parse_raw()?);
            } else {
                return Err(self.unexpected("attribute after the first attribute"));
            }
        }
        Ok(args)
    }

    fn parse_param(&mut self, ordinal: usize) -> Result<ir::Param, ParseError> {
        let name = self.expect_ident("parameter name")?;
        self.expect_punct(':')?;
        let ty = self.parse_type()?;
        let raw_id = if matches!(self.peek(), Some(Tok::Ident(s)) if s == "id") {
            self.next += 1;
            self.expect_punct('=')?;
            self.expect_usize("parameter id")?
        } else {
            ordinal + 1
        };
        let Some(id) = ir::ParamId::new(raw_id) else {
            return Err(ParseError::at(
                self.line(),
                format!("parameter id must be greater than zero for {}", name),
            ));
        };
        Ok(ir::Param { name, ty, id })
    }

    fn parse_statement(&mut self, env: &IrNodeEnv, nodes: &[ir::Node]) -> Result<Statement, ParseError> {
        let line = self.line();
        let (name, dotted_id) = self.parse_name_or_id("node name")?;
        self.expect_punct(':')?;
        let ty = self.parse_type()?;
        self.expect_punct('=')?;
        let op = self.expect_ident("operator")?;
        let mut args = self.parse_call_args(op.clone())?;
        log::trace!("parse_statement; line {}: {} = {}(...)", line, name, op);

        let id = match args.take("id") {
            Some(Raw::Number(text)) => Some(
                parse_usize_text(&text).ok_or_else(|| args.error(format!("bad id {}", text)))?,
            ),
            Some(other) => return Err(args.error(format!("bad id {:?}", other))),
            None => dotted_id,
        };
        let Some(id) = id else {
            return Err(args.error(format!("node {} has no id", name)));
        };
        if let Some(dotted) = dotted_id {
            if name != op {
                return Err(args.error(format!(
                    "node name prefix `{}` does not match the operator",
                    name
                )));
            }
            if dotted != id {
                return Err(args.error(format!(
                    "node name id {} does not match id attribute {}",
                    dotted, id
                )));
            }
        }
        let pos = match args.take("pos") {
            Some(raw) => Some(positions(&args, &raw)?),
            None => None,
        };

        if op == "param" {
            let existing = match args.require("name")? {
                Raw::Ref(key @ NameOrId::Name(_)) => env.name_id_to_ref(&key),
                _ => None,
            }
            .ok_or_else(|| args.error("unknown parameter".to_string()))?;
            let node = &nodes[existing.index];
            if node.ty != ty || node.text_id != id {
                return Err(args.error(format!("param node {} does not match the signature", name)));
            }
            return Ok(Statement::Param(existing));
        }

        let payload = build_payload(&mut args, env, &ty)?;
        if let Some((key, _)) = args.attrs.first() {
            return Err(args.error(format!("unexpected attribute `{}`", key)));
        }
        Ok(Statement::Node(ir::Node {
            text_id: id,
            name: if dotted_id.is_some() { None } else { Some(name) },
            ty,
            payload,
            pos,
        }))
    }

    pub fn parse_fn(&mut self) -> Result<ir::Fn, ParseError> {
        self.check_lexed()?;
        self.expect_keyword("fn")?;
        let name = self.expect_ident("function name")?;
        self.expect_punct('(')?;
        let mut params = Vec::new();
        while !self.eat_punct(')') {
            if !params.is_empty() {
                self.expect_punct(',')?;
            }
            params.push(self.parse_param(params.len())?);
        }
        self.expect_punct_arrow()?;
        let ret_ty = self.parse_type()?;
        self.expect_punct('{')?;
        log::trace!("parse_fn {}; {} params", name, params.len());

        let mut env = IrNodeEnv::new();
        let mut nodes = vec![ir::Node {
            text_id: 0,
            name: Some("reserved_zero_node".to_string()),
            ty: Type::nil(),
            payload: NodePayload::Nil,
            pos: None,
        }];
        for param in params.iter() {
            let node_ref = NodeRef { index: nodes.len() };
            env.add(Some(param.name.clone()), param.id.get_wrapped_id(), node_ref)
                .map_err(|e| ParseError::at(self.line(), e))?;
            nodes.push(ir::Node {
                text_id: param.id.get_wrapped_id(),
                name: Some(param.name.clone()),
                ty: param.ty.clone(),
                payload: NodePayload::GetParam(param.id),
                pos: None,
            });
        }

        let mut ret_node_ref = None;
        while !self.eat_punct('}') {
            // `ret` is a marker only when a node name follows; a node may be
            // called `ret` itself.
            let is_ret = matches!(self.peek(), Some(Tok::Ident(s)) if s == "ret")
                && matches!(self.peek_nth(1), Some(Tok::Ident(_)));
            if is_ret {
                self.next += 1;
            }
            let line = self.line();
            let node_ref = match self.parse_statement(&env, &nodes)? {
                Statement::Param(existing) => existing,
                Statement::Node(node) => {
                    let node_ref = NodeRef { index: nodes.len() };
                    env.add(node.name.clone(), node.text_id, node_ref)
                        .map_err(|e| ParseError::at(line, e))?;
                    nodes.push(node);
                    node_ref
                }
            };
            if is_ret {
                ret_node_ref = Some(node_ref);
            }
        }

        Ok(ir::Fn {
            name,
            params,
            ret_ty,
            nodes,
            ret_node_ref,
        })
    }

    fn expect_punct_arrow(&mut self) -> Result<(), ParseError> {
        if self.peek() == Some(&Tok::Arrow) {
            self.next += 1;
            Ok(())
        } else {
            Err(self.unexpected("`->`"))
        }
    }

    pub fn parse_package(&mut self) -> Result<ir::Package, ParseError> {
        self.check_lexed()?;
        self.expect_keyword("package")?;
        let name = self.expect_ident("package name")?;
        log::trace!("parse_package {}", name);
        let mut members = Vec::new();
        let mut top_name = None;
        while self.peek().is_some() {
            let is_top = self.eat_keyword("top");
            let f = self.parse_fn()?;
            if is_top {
                top_name = Some(f.name.clone());
            }
            members.push(f);
        }
        Ok(ir::Package {
            name,
            members,
            top_name,
        })
    }

    pub fn parse_and_validate_package(&mut self) -> Result<ir::Package, ParseOrValidateError> {
        let package = self.parse_package()?;
        ir_validate::validate_package(&package)?;
        Ok(package)
    }
}

fn positions(args: &CallArgs, raw: &Raw) -> Result<ir::PosData, ParseError> {
    let Raw::List(items) = raw else {
        return Err(args.error("pos expects a list".to_string()));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let numbers: Option<Vec<usize>> = match item {
            Raw::Group(parts) => parts
                .iter()
                .map(|p| match p {
                    Raw::Number(text) => parse_usize_text(text),
                    _ => None,
                })
                .collect(),
            _ => None,
        };
        match numbers.as_deref() {
            Some(&[fileno, lineno, colno]) => out.push(ir::Pos {
                fileno,
                lineno,
                colno,
            }),
            _ => return Err(args.error(format!("bad pos entry {:?}", item))),
        }
    }
    Ok(out)
}

fn resolve(args: &CallArgs, env: &IrNodeEnv, raw: &Raw) -> Result<NodeRef, ParseError> {
    match raw {
        Raw::Ref(key) => env
            .name_id_to_ref(key)
            .ok_or_else(|| args.error(format!("undefined operand {}", key))),
        other => Err(args.error(format!("expected an operand, got {:?}", other))),
    }
}

fn resolve_list(args: &CallArgs, env: &IrNodeEnv, raw: &Raw) -> Result<Vec<NodeRef>, ParseError> {
    match raw {
        Raw::List(items) => items.iter().map(|item| resolve(args, env, item)).collect(),
        other => Err(args.error(format!("expected a list of operands, got {:?}", other))),
    }
}

fn value_of_type(args: &CallArgs, raw: &Raw, ty: &Type) -> Result<IrValue, ParseError> {
    match (raw, ty) {
        (Raw::Number(text), Type::Bits(width)) => IrBits::parse_with_width(text, *width)
            .map(IrValue::Bits)
            .map_err(|e| args.error(format!("literal {}: {}", text, e))),
        (Raw::Group(items), Type::Tuple(types)) if items.len() == types.len() => {
            let elements = items
                .iter()
                .zip(types.iter())
                .map(|(item, t)| value_of_type(args, item, t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(IrValue::make_tuple(&elements))
        }
        _ => Err(args.error(format!("literal {:?} does not fit type {}", raw, ty))),
    }
}

fn build_payload(args: &mut CallArgs, env: &IrNodeEnv, ty: &Type) -> Result<NodePayload, ParseError> {
    let op = args.op.clone();
    let payload = match op.as_str() {
        "literal" => {
            args.expect_positional(0)?;
            let raw = args.require("value")?;
            NodePayload::Literal(value_of_type(args, &raw, ty)?)
        }
        "tuple" => NodePayload::Tuple(
            (0..args.positional.len())
                .map(|i| args.operand(env, i))
                .collect::<Result<_, _>>()?,
        ),
        "tuple_index" => {
            args.expect_positional(1)?;
            NodePayload::TupleIndex {
                tuple: args.operand(env, 0)?,
                index: args.usize_attr("index")?,
            }
        }
        "sign_ext" | "zero_ext" => {
            args.expect_positional(1)?;
            let arg = args.operand(env, 0)?;
            let new_bit_count = args.usize_attr("new_bit_count")?;
            if op == "sign_ext" {
                NodePayload::SignExt { arg, new_bit_count }
            } else {
                NodePayload::ZeroExt { arg, new_bit_count }
            }
        }
        "bit_slice" => {
            args.expect_positional(1)?;
            NodePayload::BitSlice {
                arg: args.operand(env, 0)?,
                start: args.usize_attr("start")?,
                width: args.usize_attr("width")?,
            }
        }
        "one_hot" => {
            args.expect_positional(1)?;
            NodePayload::OneHot {
                arg: args.operand(env, 0)?,
                lsb_prio: args.bool_attr("lsb_prio")?,
            }
        }
        "sel" | "one_hot_sel" | "priority_sel" => {
            args.expect_positional(1)?;
            let selector = args.operand(env, 0)?;
            let raw_cases = args.require("cases")?;
            let cases = resolve_list(args, env, &raw_cases)?;
            match op.as_str() {
                "sel" => {
                    let default = match args.take("default") {
                        Some(raw) => Some(resolve(args, env, &raw)?),
                        None => None,
                    };
                    NodePayload::Sel {
                        selector,
                        cases,
                        default,
                    }
                }
                "one_hot_sel" => NodePayload::OneHotSel { selector, cases },
                _ => NodePayload::PrioritySel { selector, cases },
            }
        }
        keyword => match ir::Operator::from_keyword(keyword) {
            Some(ir::Operator::Binop(binop)) => {
                args.expect_positional(2)?;
                NodePayload::Binop(binop, args.operand(env, 0)?, args.operand(env, 1)?)
            }
            Some(ir::Operator::Unop(unop)) => {
                args.expect_positional(1)?;
                NodePayload::Unop(unop, args.operand(env, 0)?)
            }
            Some(ir::Operator::Nary(nary)) => NodePayload::Nary(
                nary,
                (0..args.positional.len())
                    .map(|i| args.operand(env, i))
                    .collect::<Result<_, _>>()?,
            ),
            None => return Err(args.error("unknown operator".to_string())),
        },
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_package_with_top_and_pos() {
        let input = r#"package test

fn foo(x: bits[8] id=1) -> bits[8] {
  ret not.2: bits[8] = not(x, id=2, pos=[(0,1,2)])
}

top fn bar(x: bits[8] id=3) -> bits[8] {
  ret x: bits[8] = param(name=x, id=3)
}
"#;
        let pkg = Parser::new(input).parse_and_validate_package().unwrap();
        assert_eq!(pkg.members.len(), 2);
        assert_eq!(pkg.top_name.as_deref(), Some("bar"));
        assert_eq!(pkg.get_top_fn().unwrap().name, "bar");
        let foo = &pkg.members[0];
        assert_eq!(
            foo.get_node(foo.ret_node_ref.unwrap()).pos,
            Some(vec![ir::Pos {
                fileno: 0,
                lineno: 1,
                colno: 2
            }])
        );
        assert_eq!(pkg.to_string(), input);
    }

    #[test]
    fn test_parse_sel_with_default_and_named_node() {
        let input = r#"fn f(s: bits[2] id=1, a: bits[4] id=2, b: bits[4] id=3) -> bits[4] {
  ret my_sel: bits[4] = sel(s, cases=[a, b], default=a, id=4)
}"#;
        let f = Parser::new(input).parse_fn().unwrap();
        let ret = f.get_node(f.ret_node_ref.unwrap());
        assert_eq!(ret.name.as_deref(), Some("my_sel"));
        assert_eq!(
            ret.payload,
            NodePayload::Sel {
                selector: NodeRef { index: 1 },
                cases: vec![NodeRef { index: 2 }, NodeRef { index: 3 }],
                default: Some(NodeRef { index: 2 }),
            }
        );
    }

    #[test]
    fn test_parse_tuple_literal() {
        let input = r#"fn f() -> (bits[8], bits[1]) {
  ret literal.1: (bits[8], bits[1]) = literal(value=(0xff, 1), id=1)
}"#;
        let f = Parser::new(input).parse_fn().unwrap();
        assert_eq!(
            f.get_node(f.ret_node_ref.unwrap()).payload,
            NodePayload::Literal(IrValue::make_tuple(&[
                IrValue::make_ubits(8, 255).unwrap(),
                IrValue::bool(true),
            ]))
        );
    }

    #[test]
    fn test_parse_errors() {
        let undefined = "fn f(x: bits[1] id=1) -> bits[1] {\n  ret not.2: bits[1] = not(y, id=2)\n}";
        assert!(Parser::new(undefined).parse_fn().is_err());

        let mismatched_id = "fn f(x: bits[1] id=1) -> bits[1] {\n  ret not.2: bits[1] = not(x, id=3)\n}";
        assert!(Parser::new(mismatched_id).parse_fn().is_err());

        let too_wide = "fn f() -> bits[2] {\n  ret literal.1: bits[2] = literal(value=4, id=1)\n}";
        assert!(Parser::new(too_wide).parse_fn().is_err());

        let unknown_op = "fn f(x: bits[1] id=1) -> bits[1] {\n  ret frob.2: bits[1] = frob(x, id=2)\n}";
        assert!(Parser::new(unknown_op).parse_fn().is_err());

        let stray_attr = "fn f(x: bits[1] id=1) -> bits[1] {\n  ret not.2: bits[1] = not(x, lsb_prio=true, id=2)\n}";
        assert!(Parser::new(stray_attr).parse_fn().is_err());

        let bad_char = "fn f(x: bits[1] id=1) -> bits[1] {\n  ret not.2: bits[1] = not(x, id=2) $\n}";
        let err = Parser::new(bad_char).parse_fn().unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_zero_param_id_is_a_parse_error() {
        let text = "fn f(x: bits[1] id=0) -> bits[1] {\n  ret not.2: bits[1] = not(x, id=2)\n}";
        let err = Parser::new(text).parse_fn().unwrap_err();
        assert!(err.to_string().contains("parameter id"), "{}", err);
    }

    #[test]
    fn test_parse_comments_and_node_names_starting_with_ret() {
        let input = r#"fn f(x: bits[1] id=1) -> bits[1] {
  // leading comment
  retval: bits[1] = not(x, id=2)
  ret not.3: bits[1] = not(retval, id=3)
}"#;
        let f = Parser::new(input).parse_fn().unwrap();
        assert_eq!(f.ret_node_ref, Some(NodeRef { index: 3 }));
        assert_eq!(f.get_node(NodeRef { index: 2 }).name.as_deref(), Some("retval"));
    }

    #[test]
    fn test_numbers_with_prefixes_and_underscores() {
        let input = r#"fn f() -> bits[16] {
  ret literal.0x3: bits[16] = literal(value=0b1010_0000_0000_0001, id=3)
}"#;
        let f = Parser::new(input).parse_fn().unwrap();
        let NodePayload::Literal(value) = &f.get_node(f.ret_node_ref.unwrap()).payload else {
            panic!("expected literal");
        };
        assert_eq!(value.to_u64().unwrap(), 0xa001);
        assert_eq!(f.get_node(f.ret_node_ref.unwrap()).text_id, 3);
    }
}
