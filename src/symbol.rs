//! Symbol table: scoped symbols with globally-unique names, grounded in the
//! source's `CompilationUnit`/`SymbolList`/`Symbol` types.
//!
//! The source links symbols through an intrusive `mNext` chain per scope and
//! parents through raw `Symbol*`/`SymbolList*` pointers. Here both symbols
//! and scopes live in arenas (`Vec<Symbol>`, `Vec<Scope>`) addressed by
//! `SymbolId`/`ScopeId`, and a scope's members are an explicit `Vec<SymbolId>`
//! walked in insertion order — the same order the source's `mTail`-forward
//! traversal produces, since `AddSymbol` there links new symbols in front of
//! `mHead` while `mTail` stays fixed at the first symbol ever added.
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolKind: u32 {
        const NAMESPACE = 1 << 0;
        const VARIABLE = 1 << 1;
        const FUNCTION = 1 << 2;
        const STRUCT = 1 << 3;
        const FUNC_PARAM = 1 << 4;
        const BUILT_IN_TYPE = 1 << 5;
        const ALL = Self::NAMESPACE.bits()
            | Self::VARIABLE.bits()
            | Self::FUNCTION.bits()
            | Self::STRUCT.bits()
            | Self::FUNC_PARAM.bits()
            | Self::BUILT_IN_TYPE.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    Unset,
    Absolute,
    Relative,
}

pub type SymbolId = usize;
pub type ScopeId = usize;

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub unique_name: String,
    /// Type name for variables/parameters, return type for functions.
    pub type_name: String,
    /// The scope this symbol introduces (struct bodies, function bodies,
    /// the file's namespace). `None` for plain variables.
    pub child_scope: Option<ScopeId>,
    pub size: u16,
    pub addr_kind: AddrKind,
    pub address: u16,
}

impl Symbol {
    fn new(kind: SymbolKind, name: impl Into<String>, unique_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Symbol {
            kind,
            name: name.into(),
            unique_name: unique_name.into(),
            type_name: type_name.into(),
            child_scope: None,
            size: 0,
            addr_kind: AddrKind::Unset,
            address: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub symbols: Vec<SymbolId>,
    /// Symbol that owns this scope (a struct or function), `None` for the
    /// file-level scope.
    pub owning_symbol: Option<SymbolId>,
    pub parent: Option<ScopeId>,
    pub name: String,
}

/// Owns every symbol and scope produced while analysing one compilation
/// unit, plus lookups that mirror the source's scope-chain walk.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Creates the file-level root scope. Must be called exactly once,
    /// before any other scope is pushed.
    pub fn push_root_scope(&mut self, name: impl Into<String>) -> ScopeId {
        self.scopes.push(Scope { name: name.into(), ..Default::default() });
        self.scopes.len() - 1
    }

    pub fn push_scope(&mut self, parent: ScopeId, owning_symbol: Option<SymbolId>, name: impl Into<String>) -> ScopeId {
        self.scopes.push(Scope { owning_symbol, parent: Some(parent), name: name.into(), ..Default::default() });
        self.scopes.len() - 1
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Builds the unique name the source's `GenerateUniqueName` derives:
    /// `<scope name>_<symbol name>`.
    pub fn unique_name(&self, scope: ScopeId, name: &str) -> String {
        format!("{}_{}", self.scope(scope).name, name)
    }

    /// Registers a new symbol in `scope`, appended after any existing
    /// member (insertion order), and returns its id.
    pub fn add_symbol(
        &mut self,
        scope: ScopeId,
        kind: SymbolKind,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> SymbolId {
        let name = name.into();
        let unique_name = self.unique_name(scope, &name);
        self.symbols.push(Symbol::new(kind, name, unique_name, type_name));
        let id = self.symbols.len() - 1;
        self.scopes[scope].symbols.push(id);
        id
    }

    /// Registers a built-in type symbol directly in `scope` without
    /// deriving a scoped unique name (built-ins are referred to by their
    /// bare name everywhere), matching the source's constructor-time
    /// `RegisterBuiltinSymbol` calls.
    pub fn register_builtin(&mut self, scope: ScopeId, name: impl Into<String>, size: u16) -> SymbolId {
        let name = name.into();
        let mut symbol = Symbol::new(SymbolKind::BUILT_IN_TYPE, name.clone(), name, "");
        symbol.size = size;
        self.symbols.push(symbol);
        let id = self.symbols.len() - 1;
        self.scopes[scope].symbols.push(id);
        id
    }

    /// Looks up `name` with a kind matching `mask`, searching `scope`'s
    /// members in insertion order and then walking up through parent
    /// scopes, matching the source's `GetSymbol` recursion.
    pub fn lookup(&self, scope: ScopeId, name: &str, mask: SymbolKind) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let found = self.scopes[id]
                .symbols
                .iter()
                .find(|&&sym_id| self.symbols[sym_id].name == name && self.symbols[sym_id].kind.intersects(mask));
            if let Some(&sym_id) = found {
                return Some(sym_id);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Returns every symbol id registered in this table, in definition
    /// order. Used by the linker to build its cross-unit global table
    /// without needing scope-chain access.
    pub fn all_symbol_ids(&self) -> impl Iterator<Item = SymbolId> {
        0..self.symbols.len()
    }

    /// Looks up a symbol anywhere in the unit by its fully-qualified unique
    /// name, independent of scope. Used by code generation, which runs
    /// after analysis has already rewritten every AST reference to its
    /// unique name, so the scope it was declared in no longer matters.
    pub fn all_scopes_lookup(&self, unique_name: &str) -> Option<SymbolId> {
        self.symbols.iter().position(|s| s.unique_name == unique_name)
    }

    /// Looks up `name` within `scope` only, without walking to parents.
    /// Used to detect redeclaration within the same scope.
    pub fn lookup_local(&self, scope: ScopeId, name: &str, mask: SymbolKind) -> Option<SymbolId> {
        self.scopes[scope]
            .symbols
            .iter()
            .copied()
            .find(|&sym_id| self.symbols[sym_id].name == name && self.symbols[sym_id].kind.intersects(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_up_to_the_parent_scope() {
        let mut table = SymbolTable::new();
        let root = table.push_root_scope("file");
        table.register_builtin(root, "uint8_t", 1);
        let func_sym = table.add_symbol(root, SymbolKind::FUNCTION, "main", "uint8_t");
        let func_scope = table.push_scope(root, Some(func_sym), "file_main");
        table.add_symbol(func_scope, SymbolKind::VARIABLE, "x", "uint8_t");

        assert!(table.lookup(func_scope, "x", SymbolKind::VARIABLE).is_some());
        assert!(table.lookup(func_scope, "uint8_t", SymbolKind::BUILT_IN_TYPE).is_some());
        assert!(table.lookup(root, "x", SymbolKind::VARIABLE).is_none());
    }

    #[test]
    fn lookup_respects_the_kind_mask() {
        let mut table = SymbolTable::new();
        let root = table.push_root_scope("file");
        table.add_symbol(root, SymbolKind::VARIABLE, "thing", "uint8_t");
        assert!(table.lookup(root, "thing", SymbolKind::FUNCTION).is_none());
        assert!(table.lookup(root, "thing", SymbolKind::VARIABLE | SymbolKind::FUNCTION).is_some());
    }

    #[test]
    fn unique_names_are_scope_qualified() {
        let mut table = SymbolTable::new();
        let root = table.push_root_scope("file");
        let id = table.add_symbol(root, SymbolKind::VARIABLE, "count", "uint8_t");
        assert_eq!(table.symbol(id).unique_name, "file_count");
    }

    #[test]
    fn insertion_order_is_preserved_for_same_name_shadowing_lookup() {
        let mut table = SymbolTable::new();
        let root = table.push_root_scope("file");
        let first = table.add_symbol(root, SymbolKind::VARIABLE, "x", "uint8_t");
        let _second = table.add_symbol(root, SymbolKind::VARIABLE, "x", "uint8_t");
        // Source semantics: lookup returns the first match found walking
        // from the scope's earliest-added member forward.
        assert_eq!(table.lookup(root, "x", SymbolKind::VARIABLE), Some(first));
    }
}
