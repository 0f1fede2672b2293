//! Parser for the netlist DSL.

use std::collections::HashMap;

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{GatesimError, Result};

/// Name of the circuit that collects components written outside any
/// `.circuit` section.
pub const IMPLICIT_CIRCUIT: &str = "main";

/// Parser for netlist DSL.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse the entire netlist.
    pub fn parse(&mut self) -> Result<NetlistAst> {
        let mut ast = NetlistAst::new();

        while self.current.kind != TokenKind::Eof {
            // Skip empty lines
            if self.current.kind == TokenKind::Newline {
                self.advance()?;
                continue;
            }

            match self.current.kind {
                TokenKind::Directive => self.parse_directive(&mut ast)?,
                TokenKind::Identifier => {
                    let component = self.parse_component()?;
                    if ast.circuits.is_empty() {
                        ast.circuits.push(CircuitDef {
                            name: IMPLICIT_CIRCUIT.to_string(),
                            components: Vec::new(),
                            line: 0,
                        });
                    }
                    if let Some(circuit) = ast.circuits.last_mut() {
                        circuit.components.push(component);
                    }
                }
                _ => {
                    return Err(GatesimError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            match self.current.kind {
                TokenKind::Newline => self.advance()?,
                TokenKind::Eof => {}
                _ => {
                    return Err(GatesimError::parse(
                        self.current.line,
                        format!("unexpected {:?} at end of line", self.current.text),
                    ));
                }
            }
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(GatesimError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    fn parse_directive(&mut self, ast: &mut NetlistAst) -> Result<()> {
        let directive = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        match directive.to_lowercase().as_str() {
            ".circuit" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                ast.circuits.push(CircuitDef {
                    name,
                    components: Vec::new(),
                    line,
                });
            }
            ".main" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                if let Some(previous) = &ast.main {
                    return Err(GatesimError::parse(
                        line,
                        format!("main circuit already set to '{}'", previous),
                    ));
                }
                ast.main = Some(name);
            }
            _ => {
                return Err(GatesimError::parse(
                    line,
                    format!("unknown directive: {}", directive),
                ));
            }
        }

        Ok(())
    }

    fn parse_location(&mut self) -> Result<(i32, i32)> {
        self.expect(TokenKind::OpenParen)?;
        let x = self.parse_coordinate()?;
        self.expect(TokenKind::Comma)?;
        let y = self.parse_coordinate()?;
        self.expect(TokenKind::CloseParen)?;
        Ok((x, y))
    }

    fn parse_coordinate(&mut self) -> Result<i32> {
        let tok = self.expect(TokenKind::Number)?;
        tok.text
            .parse()
            .map_err(|_| GatesimError::parse(tok.line, format!("coordinate out of range: {}", tok.text)))
    }

    fn parse_component(&mut self) -> Result<ComponentDef> {
        let keyword = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        let kind = ComponentKind::from_keyword(&keyword).ok_or_else(|| GatesimError::UnknownComponentType {
            component_type: keyword.clone(),
            line,
        })?;

        let name = if self.current.kind == TokenKind::Identifier {
            Some(self.expect(TokenKind::Identifier)?.text)
        } else {
            None
        };

        let mut locations = Vec::new();
        while self.current.kind == TokenKind::OpenParen {
            locations.push(self.parse_location()?);
        }

        let mut words = Vec::new();
        let mut params = HashMap::new();
        while self.current.kind != TokenKind::Newline && self.current.kind != TokenKind::Eof {
            let tok = self.current.clone();
            match tok.kind {
                TokenKind::Identifier | TokenKind::Number | TokenKind::Str => self.advance()?,
                _ => {
                    return Err(GatesimError::parse(
                        tok.line,
                        format!("unexpected {:?} in component line", tok.text),
                    ));
                }
            }

            // Check for param=value syntax
            if tok.kind == TokenKind::Identifier && self.current.kind == TokenKind::Equals {
                self.advance()?;
                let value = match self.current.kind {
                    TokenKind::Number => ParamValue::Number(self.current.text.parse().map_err(|_| {
                        GatesimError::parse(line, format!("invalid number: {}", self.current.text))
                    })?),
                    TokenKind::Identifier | TokenKind::Str => ParamValue::Text(self.current.text.clone()),
                    _ => return Err(GatesimError::parse(line, format!("expected a value for '{}'", tok.text))),
                };
                self.advance()?;
                params.insert(tok.text.to_lowercase(), value);
            } else {
                words.push(tok.text);
            }
        }

        let def = ComponentDef {
            kind,
            name,
            locations,
            words,
            params,
            line,
        };
        if def.locations.len() < kind.min_locations() {
            return Err(def.invalid(format!(
                "expected at least {} locations, got {}",
                kind.min_locations(),
                def.locations.len()
            )));
        }
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gate() {
        let input = "AND g1 (40,10) (20,0) (20,20) width=4";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.circuits.len(), 1);
        assert_eq!(ast.circuits[0].name, IMPLICIT_CIRCUIT);
        let gate = &ast.circuits[0].components[0];
        assert_eq!(gate.kind, ComponentKind::And);
        assert_eq!(gate.name.as_deref(), Some("g1"));
        assert_eq!(gate.locations, vec![(40, 10), (20, 0), (20, 20)]);
        assert_eq!(gate.params["width"], ParamValue::Number(4));
    }

    #[test]
    fn test_parse_sections_and_main() {
        let input = "\
.circuit inv
PIN a (0,0) in
NOT (30,0) (10,0)
PIN y (50,0) out label=\"not a\"
.circuit top
SUB u1 (100,0) (140,0) inv
.main top
";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.circuits.len(), 2);
        assert_eq!(ast.main_name(), Some("top"));
        let inv = ast.circuit("inv").unwrap();
        assert_eq!(inv.line, 1);
        assert_eq!(inv.components.len(), 3);
        assert_eq!(inv.components[1].name, None);
        assert_eq!(inv.components[2].words, vec!["out"]);
        assert_eq!(inv.components[2].text("label").as_deref(), Some("not a"));
        let sub = &ast.circuit("top").unwrap().components[0];
        assert_eq!(sub.words, vec!["inv"]);
        assert_eq!(sub.line, 6);
    }

    #[test]
    fn test_parse_numeric_words() {
        let ast = super::super::parse("PULL (0,0) 1\nCONST k (5,-5) 10 width=4").unwrap();
        let comps = &ast.circuits[0].components;
        assert_eq!(comps[0].words, vec!["1"]);
        assert_eq!(comps[1].locations, vec![(5, -5)]);
        assert_eq!(comps[1].words, vec!["10"]);
        assert_eq!(comps[1].number("width", 1).unwrap(), 4);
        assert_eq!(comps[1].number("missing", 7).unwrap(), 7);
    }

    #[test]
    fn test_parse_with_comments() {
        let input = "# a wire\nW (0,0) (10,0) (10,20) ; polyline\n";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.circuits[0].components.len(), 1);
        assert_eq!(ast.circuits[0].components[0].locations.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            super::super::parse("FOO (0,0)"),
            Err(GatesimError::UnknownComponentType { line: 1, .. })
        ));
        assert!(matches!(
            super::super::parse("\nW (0,0)"),
            Err(GatesimError::InvalidComponent { line: 2, .. })
        ));
        assert!(matches!(
            super::super::parse(".bogus x"),
            Err(GatesimError::ParseError { line: 1, .. })
        ));
        assert!(matches!(
            super::super::parse("PIN a (0 0)"),
            Err(GatesimError::ParseError { .. })
        ));
    }
}
