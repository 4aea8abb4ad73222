//! Operator precedence tables driving the Pratt-style expression parser.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorInfo {
    pub precedence: i32,
    pub associativity: Associativity,
}

impl OperatorInfo {
    /// Sentinel outer operator for the top-level `parse_expression` call:
    /// its precedence is weaker than every real operator, so the first
    /// expression parsed always accepts whatever binary operator follows.
    pub const OUTERMOST: OperatorInfo = OperatorInfo { precedence: 999, associativity: Associativity::LeftToRight };
}

/// The three lookup tables the parser consults: binary infix operators,
/// unary prefix operators, and unary postfix operators.
pub struct OperatorTables {
    binary: HashMap<&'static str, OperatorInfo>,
    unary_prefix: HashMap<&'static str, OperatorInfo>,
    unary_postfix: HashMap<&'static str, OperatorInfo>,
}

impl OperatorTables {
    pub fn new() -> Self {
        use Associativity::*;
        let mut binary = HashMap::new();
        for (op, prec) in [("=", 14), ("==", 9), ("!=", 9), ("+", 4), ("-", 4), ("*", 3), ("/", 3)] {
            let assoc = if op == "=" { RightToLeft } else { LeftToRight };
            binary.insert(op, OperatorInfo { precedence: prec, associativity: assoc });
        }

        let mut unary_prefix = HashMap::new();
        for op in ["-", "!"] {
            unary_prefix.insert(op, OperatorInfo { precedence: 2, associativity: RightToLeft });
        }

        let mut unary_postfix = HashMap::new();
        for op in ["++", "--"] {
            unary_postfix.insert(op, OperatorInfo { precedence: 1, associativity: LeftToRight });
        }

        OperatorTables { binary, unary_prefix, unary_postfix }
    }

    pub fn binary(&self, op: &str) -> Option<OperatorInfo> {
        self.binary.get(op).copied()
    }

    pub fn unary_prefix(&self, op: &str) -> Option<OperatorInfo> {
        self.unary_prefix.get(op).copied()
    }

    pub fn unary_postfix(&self, op: &str) -> Option<OperatorInfo> {
        self.unary_postfix.get(op).copied()
    }
}

impl Default for OperatorTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_binds_tighter_than_equality() {
        let tables = OperatorTables::new();
        let plus = tables.binary("+").unwrap();
        let eq = tables.binary("==").unwrap();
        assert!(plus.precedence < eq.precedence);
    }

    #[test]
    fn assignment_is_right_associative() {
        let tables = OperatorTables::new();
        assert_eq!(tables.binary("=").unwrap().associativity, Associativity::RightToLeft);
    }
}
