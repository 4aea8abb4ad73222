//! Recursive-descent parser with Pratt-style expression climbing.
//!
//! Grounded in the source's `Parser` class: `ParseNextNode` tries a fixed
//! sequence of sub-parsers and stops at the first one that commits, and
//! expression parsing walks the operator tables rather than hard-coding
//! precedence in the grammar. Each sub-parser here returns
//! `Result<Option<NodeId>, Error>` instead of the source's `EParseResult`
//! tri-state: `Ok(Some(id))` is "parsed", `Ok(None)` is "not parsed, try the
//! next alternative", and `Err` aborts the translation unit.
use std::fmt;

use crate::ast::{Ast, ControlKind, Fixity, Node, NodeId};
use crate::operator::OperatorTables;
use crate::token::{Token, TokenKind, TokenStream};

#[derive(Debug)]
pub enum Error {
    UnexpectedToken { found: String, line: u32 },
    Expected { expected: String, found: String, line: u32 },
    InvalidStructName { found: String, line: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedToken { found, line } => write!(f, "unexpected token '{found}' at line {line}"),
            Error::Expected { expected, found, line } => {
                write!(f, "expected {expected} but found '{found}' at line {line}")
            }
            Error::InvalidStructName { found, line } => write!(f, "invalid struct name '{found}' at line {line}"),
        }
    }
}

impl std::error::Error for Error {}

pub struct Parser {
    stream: TokenStream,
    ast: Ast,
    operators: OperatorTables,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { stream: TokenStream::new(tokens), ast: Ast::new(), operators: OperatorTables::new() }
    }

    pub fn parse(mut self) -> Result<Ast, Error> {
        while self.stream.has_more() {
            let id = self.parse_next_node()?;
            self.ast.roots.push(id);
        }
        Ok(self.ast)
    }

    fn expect(&mut self, text: &str) -> Result<(), Error> {
        let current = self.stream.current().clone();
        if current.text != text {
            return Err(Error::Expected { expected: format!("'{text}'"), found: current.text, line: current.line });
        }
        self.stream.advance();
        Ok(())
    }

    // ---- declarations ----

    fn parse_next_node(&mut self) -> Result<NodeId, Error> {
        let token = self.stream.current().clone();
        if token.kind != TokenKind::Identifier {
            return Err(Error::UnexpectedToken { found: token.text, line: token.line });
        }

        if let Some(id) = self.parse_inline_asm()? {
            return Ok(id);
        }
        if let Some(id) = self.parse_struct_def()? {
            return Ok(id);
        }
        if let Some(id) = self.parse_func_def()? {
            return Ok(id);
        }
        if let Some(id) = self.parse_statement()? {
            return Ok(id);
        }

        Err(Error::UnexpectedToken { found: token.text, line: token.line })
    }

    fn parse_inline_asm(&mut self) -> Result<Option<NodeId>, Error> {
        if self.stream.current().text != "__asm" {
            return Ok(None);
        }
        self.stream.advance();
        let mnemonic = self.stream.current().text.clone();
        self.stream.advance();

        let mut operand1 = String::new();
        let mut operand2 = String::new();
        if self.stream.current().text != ";" {
            operand1 = self.stream.current().text.clone();
            self.stream.advance();
            if self.stream.current().text == "," {
                self.stream.advance();
                operand2 = self.stream.current().text.clone();
                self.stream.advance();
            }
        }
        self.expect(";")?;

        Ok(Some(self.ast.alloc(Node::InlineAsmStmt { mnemonic, operand1, operand2 })))
    }

    fn parse_struct_def(&mut self) -> Result<Option<NodeId>, Error> {
        if self.stream.current().text != "struct" {
            return Ok(None);
        }
        self.stream.advance();

        let name_token = self.stream.current().clone();
        if name_token.kind != TokenKind::Identifier {
            return Err(Error::InvalidStructName { found: name_token.text, line: name_token.line });
        }
        self.stream.advance();

        if self.stream.current().text == "{" {
            self.stream.advance();
            let mut body = Vec::new();
            while self.stream.current().text != "}" {
                body.push(self.parse_next_node()?);
            }
            self.stream.advance(); // '}'
            self.expect(";")?;
            Ok(Some(self.ast.alloc(Node::StructDef { name: name_token.text, body: Some(body) })))
        } else if self.stream.current().text == ";" {
            self.stream.advance();
            Ok(Some(self.ast.alloc(Node::StructDef { name: name_token.text, body: None })))
        } else {
            let found = self.stream.current().clone();
            Err(Error::Expected { expected: "'{' or ';'".into(), found: found.text, line: found.line })
        }
    }

    fn parse_func_def(&mut self) -> Result<Option<NodeId>, Error> {
        let type_token = self.stream.current().clone();
        if type_token.kind != TokenKind::Identifier {
            return Ok(None);
        }
        let name_token = self.stream.peek(1).clone();
        if name_token.kind != TokenKind::Identifier || self.stream.peek(2).text != "(" {
            return Ok(None);
        }

        self.stream.advance(); // name
        self.stream.advance(); // (
        self.stream.advance(); // first param, or )

        let mut params = Vec::new();
        while self.stream.current().text != ")" {
            let param_type = self.stream.current().clone();
            let param_name = self.stream.peek(1).clone();
            let delimiter = self.stream.peek(2).clone();
            if param_type.kind != TokenKind::Identifier
                || param_name.kind != TokenKind::Identifier
                || (delimiter.text != "," && delimiter.text != ")")
            {
                return Err(Error::Expected { expected: "a function parameter".into(), found: param_type.text, line: param_type.line });
            }
            params.push(self.ast.alloc(Node::VarDefStmt {
                type_name: param_type.text,
                name: param_name.text,
                initializer: None,
            }));
            self.stream.advance();
            self.stream.advance();
            if delimiter.text == "," {
                self.stream.advance();
            }
        }
        self.stream.advance(); // ')'

        if self.stream.current().text == ";" {
            self.stream.advance();
            return Ok(Some(self.ast.alloc(Node::FuncDef {
                return_type: type_token.text,
                name: name_token.text,
                params,
                body: None,
            })));
        }

        self.expect("{")?;
        let mut body = Vec::new();
        while self.stream.current().text != "}" {
            body.push(self.parse_next_node()?);
        }
        self.stream.advance(); // '}'

        Ok(Some(self.ast.alloc(Node::FuncDef {
            return_type: type_token.text,
            name: name_token.text,
            params,
            body: Some(body),
        })))
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Option<NodeId>, Error> {
        if let Some(id) = self.parse_var_def()? {
            return Ok(Some(id));
        }
        if let Some(id) = self.parse_control_statement()? {
            return Ok(Some(id));
        }
        if let Some(id) = self.parse_return_statement()? {
            return Ok(Some(id));
        }
        if let Some(id) = self.parse_expr_statement()? {
            return Ok(Some(id));
        }
        Ok(None)
    }

    fn parse_var_def(&mut self) -> Result<Option<NodeId>, Error> {
        let type_token = self.stream.current().clone();
        let name_token = self.stream.peek(1).clone();
        let third = self.stream.peek(2).clone();

        if type_token.kind != TokenKind::Identifier || name_token.kind != TokenKind::Identifier {
            return Ok(None);
        }
        if third.text != "=" && third.text != ";" {
            return Ok(None);
        }

        self.stream.advance(); // name
        self.stream.advance(); // third token ('=' or ';')
        self.stream.advance(); // past third token

        if third.text == ";" {
            return Ok(Some(self.ast.alloc(Node::VarDefStmt {
                type_name: type_token.text,
                name: name_token.text,
                initializer: None,
            })));
        }

        let expr = self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?;
        self.expect(";")?;

        Ok(Some(self.ast.alloc(Node::VarDefStmt {
            type_name: type_token.text,
            name: name_token.text,
            initializer: Some(expr),
        })))
    }

    fn parse_return_statement(&mut self) -> Result<Option<NodeId>, Error> {
        if self.stream.current().text != "return" {
            return Ok(None);
        }
        self.stream.advance();

        let value = if self.stream.current().text == ";" {
            None
        } else {
            Some(self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?)
        };
        self.expect(";")?;

        Ok(Some(self.ast.alloc(Node::ReturnStmt { function: None, value })))
    }

    fn parse_expr_statement(&mut self) -> Result<Option<NodeId>, Error> {
        let current = self.stream.current().clone();
        if current.kind != TokenKind::Identifier {
            return Ok(None);
        }
        let next = self.stream.peek(1).clone();
        if next.text != "=" && next.text != "(" {
            return Ok(None);
        }

        let expr = self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?;
        self.expect(";")?;
        Ok(Some(self.ast.alloc(Node::ExprStmt { expr })))
    }

    fn parse_control_statement(&mut self) -> Result<Option<NodeId>, Error> {
        let kind = match self.stream.current().text.as_str() {
            "if" => ControlKind::If,
            "while" => ControlKind::While,
            _ => return Ok(None),
        };
        self.stream.advance();
        self.expect("(")?;
        let cond = self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?;
        self.expect(")")?;
        let body = self.parse_body()?;
        let connected = if kind == ControlKind::If { self.parse_else_chain()? } else { None };

        Ok(Some(self.ast.alloc(Node::ControlStmt { kind, cond: Some(cond), body, connected })))
    }

    /// Parses an `else if (...) { ... }` / `else { ... }` tail following an
    /// `if`, recursing to collect an arbitrarily long `else if` chain.
    fn parse_else_chain(&mut self) -> Result<Option<NodeId>, Error> {
        if self.stream.current().text != "else" {
            return Ok(None);
        }
        self.stream.advance();

        if self.stream.current().text == "if" {
            self.stream.advance();
            self.expect("(")?;
            let cond = self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?;
            self.expect(")")?;
            let body = self.parse_body()?;
            let connected = self.parse_else_chain()?;
            Ok(Some(self.ast.alloc(Node::ControlStmt { kind: ControlKind::ElseIf, cond: Some(cond), body, connected })))
        } else {
            let body = self.parse_body()?;
            Ok(Some(self.ast.alloc(Node::ControlStmt { kind: ControlKind::Else, cond: None, body, connected: None })))
        }
    }

    fn parse_body(&mut self) -> Result<NodeId, Error> {
        if self.stream.current().text == "{" {
            self.stream.advance();
            let mut body = Vec::new();
            while self.stream.current().text != "}" {
                body.push(self.parse_next_node()?);
            }
            self.stream.advance();
            Ok(self.ast.alloc(Node::Block { body }))
        } else {
            let single = self.parse_next_node()?;
            Ok(self.ast.alloc(Node::Block { body: vec![single] }))
        }
    }

    // ---- expressions ----

    fn parse_expression(&mut self, outer: crate::operator::OperatorInfo) -> Result<NodeId, Error> {
        let mut left = self.parse_atom()?;

        loop {
            let op_text = self.stream.current().text.clone();
            let Some(op_info) = self.operators.binary(&op_text) else { break };
            let accepts = op_info.precedence < outer.precedence
                || (op_info.precedence == outer.precedence && op_info.associativity == crate::operator::Associativity::RightToLeft);
            if !accepts {
                break;
            }
            self.stream.advance();
            let right = self.parse_expression(op_info)?;
            left = self.ast.alloc(Node::BinaryOp { op: op_text, left, right, value_type: None });
        }

        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<NodeId, Error> {
        let prefix = self.operators.unary_prefix(&self.stream.current().text);
        let prefix_op = prefix.map(|_| self.stream.current().text.clone());
        if prefix_op.is_some() {
            self.stream.advance();
        }

        let mut node = self.parse_atom_inner()?;

        if let Some(op) = prefix_op {
            node = self.ast.alloc(Node::UnaryOp { op, operand: node, fixity: Fixity::Prefix, value_type: None });
        }

        if let Some(_info) = self.operators.unary_postfix(&self.stream.current().text) {
            let op = self.stream.current().text.clone();
            self.stream.advance();
            node = self.ast.alloc(Node::UnaryOp { op, operand: node, fixity: Fixity::Postfix, value_type: None });
        }

        Ok(node)
    }

    fn parse_atom_inner(&mut self) -> Result<NodeId, Error> {
        let token = self.stream.current().clone();

        match token.kind {
            TokenKind::IntLit | TokenKind::FloatLit | TokenKind::BoolLit => {
                self.stream.advance();
                Ok(self.ast.alloc(Node::Literal { token, value_type: None }))
            }
            TokenKind::Identifier => {
                if self.stream.peek(1).text == "(" {
                    self.stream.advance(); // name
                    self.stream.advance(); // '('
                    let mut args = Vec::new();
                    while self.stream.current().text != ")" {
                        args.push(self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?);
                        if self.stream.current().text == "," {
                            self.stream.advance();
                        }
                    }
                    self.stream.advance(); // ')'
                    Ok(self.ast.alloc(Node::Call { function: token.text, args, value_type: None }))
                } else {
                    self.stream.advance();
                    Ok(self.ast.alloc(Node::Identifier { name: token.text, value_type: None }))
                }
            }
            TokenKind::Operator if token.text == "(" => {
                self.stream.advance();
                let inner = self.parse_expression(crate::operator::OperatorInfo::OUTERMOST)?;
                self.expect(")")?;
                Ok(inner)
            }
            _ => Err(Error::UnexpectedToken { found: token.text, line: token.line }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize_all;

    fn parse(src: &str) -> Ast {
        Parser::new(tokenize_all(src).unwrap()).parse().unwrap()
    }

    #[test]
    fn parses_a_function_definition() {
        let ast = parse("uint8_t add(uint8_t a, uint8_t b) { return a + b; }");
        assert_eq!(ast.roots.len(), 1);
        match ast.get(ast.roots[0]) {
            Node::FuncDef { name, params, body, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(body.is_some());
            }
            other => panic!("expected FuncDef, got {other:?}"),
        }
    }

    #[test]
    fn parses_variable_definition_with_initializer() {
        let ast = parse("uint8_t x = 5;");
        match ast.get(ast.roots[0]) {
            Node::VarDefStmt { name, initializer, .. } => {
                assert_eq!(name, "x");
                assert!(initializer.is_some());
            }
            other => panic!("expected VarDefStmt, got {other:?}"),
        }
    }

    #[test]
    fn binary_precedence_groups_multiplication_before_addition() {
        let ast = parse("uint8_t x = 1 + 2 * 3;");
        let Node::VarDefStmt { initializer: Some(init), .. } = ast.get(ast.roots[0]) else { panic!() };
        match ast.get(*init) {
            Node::BinaryOp { op, right, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(ast.get(*right), Node::BinaryOp { op, .. } if op == "*"));
            }
            other => panic!("expected BinaryOp, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_chain() {
        let ast = parse("if (a == 1) { x = 1; } else if (a == 2) { x = 2; } else { x = 3; }");
        assert!(matches!(ast.get(ast.roots[0]), Node::ControlStmt { kind: ControlKind::If, connected: Some(_), .. }));
    }

    #[test]
    fn parses_inline_assembly_with_two_operands() {
        let ast = parse("__asm lda $00, x;");
        match ast.get(ast.roots[0]) {
            Node::InlineAsmStmt { mnemonic, operand1, operand2 } => {
                assert_eq!(mnemonic, "lda");
                assert_eq!(operand1, "$00");
                assert_eq!(operand2, "x");
            }
            other => panic!("expected InlineAsmStmt, got {other:?}"),
        }
    }

    #[test]
    fn unknown_token_is_a_parse_error() {
        let tokens = tokenize_all("1 + 2;").unwrap();
        assert!(Parser::new(tokens).parse().is_err());
    }
}
