//! Netlist DSL parser for circuit descriptions.
//!
//! The DSL is line-oriented and human-editable. Components are placed on an
//! integer grid; anything that shares a grid point is connected.
//!
//! # Grammar Overview
//!
//! ```text
//! netlist     = { line }
//! line        = comment | directive | component | empty
//! comment     = ('#' | ';') { any_char }
//! directive   = ".circuit" identifier | ".main" identifier
//! component   = kind [name] { location } { word } { param }
//!
//! location    = '(' integer ',' integer ')'
//! word        = identifier | integer | string
//! param       = identifier '=' (identifier | integer | string)
//! string      = '"' { any_char_but_quote } '"'
//! ```
//!
//! Lines before the first `.circuit` go into an implicit circuit named
//! `main`. The top-level circuit is the one named by `.main`, else the first.
//!
//! # Component Kinds
//!
//! | Kind | Syntax |
//! |------|--------|
//! | W, WIRE | `W (x,y) (x,y) ...` polyline of axis-aligned segments |
//! | PIN | `PIN name (x,y) in\|out [width=N] [label="..."]` |
//! | AND, OR, XOR, NAND, NOR, XNOR | `AND [name] (out) (in) (in)... [width=N]` |
//! | NOT, BUF | `NOT [name] (out) (in) [width=N]` |
//! | SPLIT | `SPLIT [name] (combined) (end)... width=N [map="1,1,2,0"]` |
//! | TUNNEL | `TUNNEL [name] (x,y) label [width=N]` |
//! | PULL | `PULL [name] (x,y) 0\|1\|E` |
//! | CONST | `CONST [name] (x,y) value [width=N]` |
//! | CLOCK | `CLOCK [name] (x,y) [high=N] [low=N]` |
//! | SUB | `SUB name (port)... child_circuit` |
//!
//! # Example
//!
//! ```text
//! # half adder
//! PIN a (0,0) in
//! PIN b (0,20) in
//! XOR (60,0) (40,0) (40,20)
//! AND (60,40) (40,40) (40,60)
//! W (0,0) (40,0)
//! W (20,0) (20,40) (40,40)
//! W (0,20) (10,20) (40,20)
//! W (10,20) (10,60) (40,60)
//! W (60,0) (80,0)
//! W (60,40) (80,40)
//! PIN sum (80,0) out
//! PIN carry (80,40) out
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{parse_mapping, Lexer, Token, TokenKind};
pub use parser::{Parser, IMPLICIT_CIRCUIT};

use crate::error::Result;

/// Parse a netlist DSL string into an AST.
pub fn parse(input: &str) -> Result<NetlistAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a netlist DSL file.
#[cfg(feature = "cli")]
pub fn parse_file(path: &std::path::Path) -> Result<NetlistAst> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::error::GatesimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}
