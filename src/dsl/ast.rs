//! Abstract Syntax Tree types for the netlist DSL.

use std::collections::HashMap;

use crate::error::{GatesimError, Result};

/// Complete AST representation of a parsed netlist.
#[derive(Debug, Clone, Default)]
pub struct NetlistAst {
    /// Circuits in source order
    pub circuits: Vec<CircuitDef>,
    /// Circuit named by `.main`, if any
    pub main: Option<String>,
}

impl NetlistAst {
    /// Create a new empty netlist AST.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn circuit(&self, name: &str) -> Option<&CircuitDef> {
        self.circuits.iter().find(|c| c.name == name)
    }

    /// Name of the top-level circuit: `.main`, else the first circuit.
    pub fn main_name(&self) -> Option<&str> {
        self.main
            .as_deref()
            .or_else(|| self.circuits.first().map(|c| c.name.as_str()))
    }
}

/// One `.circuit` section.
#[derive(Debug, Clone)]
pub struct CircuitDef {
    pub name: String,
    pub components: Vec<ComponentDef>,
    /// Source line of the `.circuit` directive (0 for the implicit section)
    pub line: usize,
}

/// A component line from the DSL.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub kind: ComponentKind,
    /// Optional instance name, given before the first location
    pub name: Option<String>,
    /// Grid locations in the order written
    pub locations: Vec<(i32, i32)>,
    /// Bare words after the locations (`in`, child circuit name, value)
    pub words: Vec<String>,
    /// `key=value` parameters, keys lowercased
    pub params: HashMap<String, ParamValue>,
    /// Source line number for error reporting
    pub line: usize,
}

/// Value of a `key=value` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Number(i64),
    Text(String),
}

impl ComponentDef {
    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.keyword().to_string())
    }

    /// Numeric parameter, or `default` when absent.
    pub fn number(&self, key: &str, default: i64) -> Result<i64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(ParamValue::Number(n)) => Ok(*n),
            Some(ParamValue::Text(t)) => t.trim().parse().map_err(|_| GatesimError::InvalidParameter {
                component: self.display_name(),
                param: key.to_string(),
                message: format!("expected a number, got '{}'", t),
            }),
        }
    }

    /// Parameter as text; numbers are rendered in decimal.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            ParamValue::Number(n) => Some(n.to_string()),
            ParamValue::Text(t) => Some(t.clone()),
        }
    }

    /// Fail with an `InvalidComponent` error for this line.
    pub fn invalid(&self, message: impl Into<String>) -> GatesimError {
        GatesimError::invalid_component(self.display_name(), self.line, message)
    }
}

/// Component kinds supported by the DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Wire,
    Pin,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    Buf,
    Splitter,
    Tunnel,
    Pull,
    Constant,
    Clock,
    Subcircuit,
}

impl ComponentKind {
    /// Parse a component kind from its keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "W" | "WIRE" => Some(Self::Wire),
            "PIN" => Some(Self::Pin),
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "XOR" => Some(Self::Xor),
            "NAND" => Some(Self::Nand),
            "NOR" => Some(Self::Nor),
            "XNOR" => Some(Self::Xnor),
            "NOT" => Some(Self::Not),
            "BUF" => Some(Self::Buf),
            "SPLIT" | "SPLITTER" => Some(Self::Splitter),
            "TUNNEL" => Some(Self::Tunnel),
            "PULL" => Some(Self::Pull),
            "CONST" => Some(Self::Constant),
            "CLOCK" => Some(Self::Clock),
            "SUB" => Some(Self::Subcircuit),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Wire => "W",
            Self::Pin => "PIN",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Nand => "NAND",
            Self::Nor => "NOR",
            Self::Xnor => "XNOR",
            Self::Not => "NOT",
            Self::Buf => "BUF",
            Self::Splitter => "SPLIT",
            Self::Tunnel => "TUNNEL",
            Self::Pull => "PULL",
            Self::Constant => "CONST",
            Self::Clock => "CLOCK",
            Self::Subcircuit => "SUB",
        }
    }

    /// Smallest number of locations a line of this kind needs.
    pub fn min_locations(&self) -> usize {
        match self {
            Self::Wire => 2,
            Self::And | Self::Or | Self::Xor | Self::Nand | Self::Nor | Self::Xnor => 2,
            Self::Not | Self::Buf => 2,
            Self::Splitter => 2, // combined end, then split ends
            Self::Pin | Self::Tunnel | Self::Pull | Self::Constant | Self::Clock => 1,
            Self::Subcircuit => 0,
        }
    }
}
