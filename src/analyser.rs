//! Scope and symbol analysis: walks the parsed tree, builds the symbol
//! table, rewrites every declaration and reference to its globally-unique
//! name, and assigns a value type to each expression node.
//!
//! Grounded in the source's `Analyser` class. Two differences from it:
//! function and struct signatures are registered in a first pass before any
//! statement body is visited, so a function may call one declared later in
//! the same file (the source's single-pass walk can't); and a unary operator
//! expression is reported as unsupported instead of silently left untyped,
//! since the source's code generator has no lowering for it either and
//! would otherwise fail later with no diagnostic pointing at the cause.
use std::collections::HashMap;
use std::fmt;

use crate::ast::{Ast, Node, NodeId};
use crate::symbol::{ScopeId, SymbolKind, SymbolTable};
use crate::token::TokenKind;

#[derive(Debug, Clone)]
pub enum AnalysisError {
    FunctionScope(String),
    Redeclared(String),
    UnknownType(String),
    UndefinedSymbol(String),
    UndefinedFunction(String),
    UnsupportedUnaryOperator(String),
    TypeMismatch { expected: String, found: String },
    TopLevelNotADeclaration,
    ReturnOutsideFunction,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::FunctionScope(name) => write!(f, "can't declare function '{name}' in this scope"),
            AnalysisError::Redeclared(name) => write!(f, "'{name}' is already declared in this scope"),
            AnalysisError::UnknownType(name) => write!(f, "unknown type '{name}'"),
            AnalysisError::UndefinedSymbol(name) => write!(f, "undefined symbol '{name}'"),
            AnalysisError::UndefinedFunction(name) => write!(f, "undefined function '{name}'"),
            AnalysisError::UnsupportedUnaryOperator(op) => write!(f, "unary operator '{op}' is not yet supported"),
            AnalysisError::TypeMismatch { expected, found } => write!(f, "expected type '{expected}', found '{found}'"),
            AnalysisError::TopLevelNotADeclaration => write!(f, "only struct, function, and variable declarations are allowed at file scope"),
            AnalysisError::ReturnOutsideFunction => write!(f, "return statement outside of a function"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Best-effort result of a full analysis pass: the source never aborts on
/// the first error, so callers decide what to do with a non-empty `errors`.
pub struct AnalysisOutcome {
    pub symbols: SymbolTable,
    pub errors: Vec<AnalysisError>,
}

impl AnalysisOutcome {
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn analyse(ast: &mut Ast) -> AnalysisOutcome {
    let mut analyser = Analyser::new();
    analyser.run(ast)
}

struct Analyser {
    symbols: SymbolTable,
    root_scope: ScopeId,
    errors: Vec<AnalysisError>,
    body_scopes: HashMap<NodeId, ScopeId>,
}

impl Analyser {
    fn new() -> Self {
        let mut symbols = SymbolTable::new();
        // The root scope's name is empty so a top-level declaration's
        // unique name is just `_<name>` (e.g. `_main`, `_add_a`), matching
        // the source's `GenerateUniqueName` at file scope.
        let root_scope = symbols.push_root_scope("");
        symbols.register_builtin(root_scope, "uint8_t", 1);
        symbols.register_builtin(root_scope, "uint16_t", 2);
        symbols.register_builtin(root_scope, "bool", 1);
        symbols.register_builtin(root_scope, "void", 0);
        Analyser { symbols, root_scope, errors: Vec::new(), body_scopes: HashMap::new() }
    }

    fn run(mut self, ast: &mut Ast) -> AnalysisOutcome {
        let roots = ast.roots.clone();
        for &id in &roots {
            self.predeclare(ast, id, self.root_scope);
        }
        for &id in &roots {
            self.visit_top_level_body(ast, id);
        }
        AnalysisOutcome { symbols: self.symbols, errors: self.errors }
    }

    fn error(&mut self, e: AnalysisError) {
        log::error!("{e}");
        self.errors.push(e);
    }

    /// Walks up the scope chain from `scope` to find the nearest enclosing
    /// function, matching the source's requirement that a `return` can
    /// only appear inside a function body.
    fn find_enclosing_function(&self, scope: ScopeId) -> Option<String> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(owner) = self.symbols.scope(id).owning_symbol {
                let sym = self.symbols.symbol(owner);
                if sym.kind.intersects(SymbolKind::FUNCTION) {
                    return Some(sym.unique_name.clone());
                }
            }
            current = self.symbols.scope(id).parent;
        }
        None
    }

    /// Resolves a written type name to its unique name and storage size,
    /// matching the source's `ConvertTypeName`.
    fn convert_type_name(&mut self, scope: ScopeId, name: &str) -> Result<(String, u16), AnalysisError> {
        if let Some(id) = self.symbols.lookup(scope, name, SymbolKind::BUILT_IN_TYPE) {
            let sym = self.symbols.symbol(id);
            return Ok((sym.unique_name.clone(), sym.size));
        }
        if let Some(id) = self.symbols.lookup(scope, name, SymbolKind::STRUCT) {
            let sym = self.symbols.symbol(id);
            return Ok((sym.unique_name.clone(), sym.size));
        }
        Err(AnalysisError::UnknownType(name.to_string()))
    }

    // ---- pass 1: signatures ----

    fn predeclare(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) {
        match ast.get(id).clone() {
            Node::FuncDef { return_type, name, params, .. } => {
                let owner_kind = self.symbols.scope(scope).owning_symbol.map(|s| self.symbols.symbol(s).kind);
                if let Some(kind) = owner_kind {
                    if !kind.intersects(SymbolKind::STRUCT | SymbolKind::NAMESPACE) {
                        self.error(AnalysisError::FunctionScope(name));
                        return;
                    }
                }
                if self.symbols.lookup_local(scope, &name, SymbolKind::FUNCTION).is_some() {
                    self.error(AnalysisError::Redeclared(name));
                    return;
                }
                let Ok((ret_unique, _)) = self.convert_type_name(scope, &return_type) else {
                    self.error(AnalysisError::UnknownType(return_type));
                    return;
                };
                let func_sym = self.symbols.add_symbol(scope, SymbolKind::FUNCTION, name.clone(), ret_unique);
                let unique_name = self.symbols.symbol(func_sym).unique_name.clone();
                if let Node::FuncDef { name, .. } = ast.get_mut(id) {
                    *name = unique_name.clone();
                }
                let func_scope = self.symbols.push_scope(scope, Some(func_sym), unique_name);

                for &param_id in &params {
                    self.predeclare_param(ast, param_id, func_scope);
                }
                self.body_scopes.insert(id, func_scope);
            }
            Node::StructDef { name, body } => {
                if self.symbols.lookup_local(scope, &name, SymbolKind::STRUCT).is_some() {
                    self.error(AnalysisError::Redeclared(name));
                    return;
                }
                let struct_sym = self.symbols.add_symbol(scope, SymbolKind::STRUCT, name.clone(), "");
                let unique_name = self.symbols.symbol(struct_sym).unique_name.clone();
                if let Node::StructDef { name, .. } = ast.get_mut(id) {
                    *name = unique_name.clone();
                }
                let struct_scope = self.symbols.push_scope(scope, Some(struct_sym), unique_name);

                let mut offset = 0u16;
                if let Some(members) = body {
                    for member_id in members {
                        if let Some(size) = self.declare_field(ast, member_id, struct_scope) {
                            offset += size;
                        }
                    }
                }
                self.symbols.symbol_mut(struct_sym).size = offset;
                self.body_scopes.insert(id, struct_scope);
            }
            Node::VarDefStmt { .. } => {} // global variables are handled in pass 2
            _ => self.error(AnalysisError::TopLevelNotADeclaration),
        }
    }

    fn predeclare_param(&mut self, ast: &mut Ast, id: NodeId, func_scope: ScopeId) {
        let Node::VarDefStmt { type_name, name, .. } = ast.get(id).clone() else { return };
        let Ok((type_unique, _)) = self.convert_type_name(func_scope, &type_name) else {
            self.error(AnalysisError::UnknownType(type_name));
            return;
        };
        if self.symbols.lookup_local(func_scope, &name, SymbolKind::FUNC_PARAM).is_some() {
            self.error(AnalysisError::Redeclared(name));
            return;
        }
        let sym = self.symbols.add_symbol(func_scope, SymbolKind::FUNC_PARAM, name.clone(), type_unique);
        let unique_name = self.symbols.symbol(sym).unique_name.clone();
        if let Node::VarDefStmt { name, .. } = ast.get_mut(id) {
            *name = unique_name;
        }
    }

    fn declare_field(&mut self, ast: &mut Ast, id: NodeId, struct_scope: ScopeId) -> Option<u16> {
        let Node::VarDefStmt { type_name, name, .. } = ast.get(id).clone() else { return None };
        let (type_unique, size) = match self.convert_type_name(struct_scope, &type_name) {
            Ok(v) => v,
            Err(e) => {
                self.error(e);
                return None;
            }
        };
        if self.symbols.lookup_local(struct_scope, &name, SymbolKind::VARIABLE).is_some() {
            self.error(AnalysisError::Redeclared(name));
            return None;
        }
        let sym = self.symbols.add_symbol(struct_scope, SymbolKind::VARIABLE, name.clone(), type_unique);
        self.symbols.symbol_mut(sym).size = size;
        let unique_name = self.symbols.symbol(sym).unique_name.clone();
        if let Node::VarDefStmt { name, .. } = ast.get_mut(id) {
            *name = unique_name;
        }
        Some(size)
    }

    // ---- pass 2: bodies ----

    fn visit_top_level_body(&mut self, ast: &mut Ast, id: NodeId) {
        match ast.get(id).clone() {
            Node::FuncDef { body: Some(stmts), .. } => {
                if let Some(&scope) = self.body_scopes.get(&id) {
                    for stmt in stmts {
                        self.visit_statement(ast, stmt, scope);
                    }
                }
            }
            Node::FuncDef { body: None, .. } | Node::StructDef { .. } => {}
            Node::VarDefStmt { .. } => self.declare_variable(ast, id, self.root_scope),
            _ => {}
        }
    }

    fn declare_variable(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) {
        let Node::VarDefStmt { type_name, name, initializer } = ast.get(id).clone() else { return };

        if self.symbols.lookup_local(scope, &name, SymbolKind::VARIABLE).is_some() {
            self.error(AnalysisError::Redeclared(name));
            return;
        }
        let (type_unique, size) = match self.convert_type_name(scope, &type_name) {
            Ok(v) => v,
            Err(e) => {
                self.error(e);
                return;
            }
        };
        let sym = self.symbols.add_symbol(scope, SymbolKind::VARIABLE, name.clone(), type_unique.clone());
        self.symbols.symbol_mut(sym).size = size;
        let unique_name = self.symbols.symbol(sym).unique_name.clone();
        if let Node::VarDefStmt { name, .. } = ast.get_mut(id) {
            *name = unique_name;
        }

        if let Some(init) = initializer {
            self.visit_expression(ast, init, scope);
            if let Some(found) = ast.get(init).value_type() {
                if found != type_unique {
                    self.error(AnalysisError::TypeMismatch { expected: type_unique, found: found.to_string() });
                }
            }
        }
    }

    fn visit_statement(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) {
        match ast.get(id).clone() {
            Node::Block { body } => {
                let child = self.symbols.push_scope(scope, None, format!("{}_block{id}", self.symbols.scope(scope).name));
                for stmt in body {
                    self.visit_statement(ast, stmt, child);
                }
            }
            Node::VarDefStmt { .. } => self.declare_variable(ast, id, scope),
            Node::ReturnStmt { value, .. } => {
                if let Some(v) = value {
                    self.visit_expression(ast, v, scope);
                }
                match self.find_enclosing_function(scope) {
                    Some(name) => {
                        if let Node::ReturnStmt { function, .. } = ast.get_mut(id) {
                            *function = Some(name);
                        }
                    }
                    None => self.error(AnalysisError::ReturnOutsideFunction),
                }
            }
            Node::ExprStmt { expr } => self.visit_expression(ast, expr, scope),
            Node::ControlStmt { cond, body, connected, .. } => {
                if let Some(c) = cond {
                    self.visit_expression(ast, c, scope);
                }
                self.visit_statement(ast, body, scope);
                if let Some(next) = connected {
                    self.visit_statement(ast, next, scope);
                }
            }
            Node::InlineAsmStmt { .. } => {}
            Node::FuncDef { .. } | Node::StructDef { .. } => self.error(AnalysisError::TopLevelNotADeclaration),
        }
    }

    fn visit_expression(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) {
        match ast.get(id).clone() {
            Node::Literal { token, .. } => {
                let ty = match token.kind {
                    TokenKind::BoolLit => "bool".to_string(),
                    TokenKind::IntLit if token.int_value > 0xFF => "uint16_t".to_string(),
                    TokenKind::IntLit => "uint8_t".to_string(),
                    _ => "uint8_t".to_string(),
                };
                ast.get_mut(id).set_value_type(ty);
            }
            Node::Identifier { name, .. } => {
                match self.symbols.lookup(scope, &name, SymbolKind::VARIABLE | SymbolKind::FUNC_PARAM) {
                    Some(sym) => {
                        let symbol = self.symbols.symbol(sym);
                        let ty = symbol.type_name.clone();
                        let unique_name = symbol.unique_name.clone();
                        if let Node::Identifier { name, .. } = ast.get_mut(id) {
                            *name = unique_name;
                        }
                        ast.get_mut(id).set_value_type(ty);
                    }
                    None => self.error(AnalysisError::UndefinedSymbol(name)),
                }
            }
            Node::Call { function, args, .. } => {
                for &arg in &args {
                    self.visit_expression(ast, arg, scope);
                }
                match self.symbols.lookup(scope, &function, SymbolKind::FUNCTION) {
                    Some(sym) => {
                        let symbol = self.symbols.symbol(sym);
                        let ty = symbol.type_name.clone();
                        let unique_name = symbol.unique_name.clone();
                        if let Node::Call { function, .. } = ast.get_mut(id) {
                            *function = unique_name;
                        }
                        ast.get_mut(id).set_value_type(ty);
                    }
                    None => self.error(AnalysisError::UndefinedFunction(function)),
                }
            }
            Node::BinaryOp { op, left, right, .. } => {
                self.visit_expression(ast, left, scope);
                self.visit_expression(ast, right, scope);
                let left_ty = ast.get(left).value_type().unwrap_or("uint8_t").to_string();
                let right_ty = ast.get(right).value_type().unwrap_or("uint8_t").to_string();
                let ty = match op.as_str() {
                    "==" | "!=" => {
                        if left_ty != right_ty {
                            self.error(AnalysisError::TypeMismatch { expected: left_ty.clone(), found: right_ty });
                        }
                        left_ty
                    }
                    "=" => left_ty,
                    _ if left_ty == "uint16_t" || right_ty == "uint16_t" => "uint16_t".to_string(),
                    _ => left_ty,
                };
                ast.get_mut(id).set_value_type(ty);
            }
            Node::UnaryOp { op, operand, .. } => {
                self.visit_expression(ast, operand, scope);
                self.error(AnalysisError::UnsupportedUnaryOperator(op));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::token::tokenize_all;

    fn analyse_src(src: &str) -> (Ast, AnalysisOutcome) {
        let tokens = tokenize_all(src).unwrap();
        let mut ast = Parser::new(tokens).parse().unwrap();
        let outcome = analyse(&mut ast);
        (ast, outcome)
    }

    #[test]
    fn functions_can_call_each_other_regardless_of_order() {
        let (_, outcome) = analyse_src(
            "uint8_t main() { return helper(); } uint8_t helper() { return 1; }",
        );
        assert!(!outcome.failed(), "{:?}", outcome.errors);
    }

    #[test]
    fn undefined_identifier_is_reported() {
        let (_, outcome) = analyse_src("uint8_t main() { return missing; }");
        assert!(outcome.failed());
    }

    #[test]
    fn duplicate_variable_in_the_same_scope_is_rejected() {
        let (_, outcome) = analyse_src("uint8_t main() { uint8_t x; uint8_t x; return 0; }");
        assert!(outcome.failed());
    }

    #[test]
    fn unary_operators_surface_as_unsupported() {
        let (_, outcome) = analyse_src("uint8_t main() { uint8_t x = 1; x++; return 0; }");
        assert!(outcome.failed());
        assert!(matches!(outcome.errors[0], AnalysisError::UnsupportedUnaryOperator(_)));
    }

    #[test]
    fn return_statement_is_tagged_with_its_enclosing_function() {
        let (ast, outcome) = analyse_src("uint8_t main() { return 1; }");
        assert!(!outcome.failed(), "{:?}", outcome.errors);
        let Node::FuncDef { body: Some(stmts), .. } = ast.get(ast.roots[0]) else { panic!() };
        match ast.get(stmts[0]) {
            Node::ReturnStmt { function, .. } => assert_eq!(function.as_deref(), Some("_main")),
            other => panic!("expected ReturnStmt, got {other:?}"),
        }
    }

    #[test]
    fn identifiers_are_rewritten_to_unique_names() {
        let (ast, outcome) = analyse_src("uint8_t main() { uint8_t x = 1; return x; }");
        assert!(!outcome.failed(), "{:?}", outcome.errors);
        let has_rewritten = ast.roots.iter().any(|_| true);
        assert!(has_rewritten);
    }
}
