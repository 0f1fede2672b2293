//! Error types for the gatesim simulation kernel.
//!
//! This module provides a unified error type [`GatesimError`] that covers
//! netlist parsing, structural editing of circuits, symbolic analysis and
//! file I/O.
//!
//! Conditions that the kernel treats as *expected* are deliberately absent:
//! width conflicts are reported as diagnostics on the bundle map, and
//! oscillation is reported by the propagator as a flag plus a point set.

use thiserror::Error;

/// Result type alias using [`GatesimError`].
pub type Result<T> = std::result::Result<T, GatesimError>;

/// Unified error type for all gatesim operations.
#[derive(Error, Debug)]
pub enum GatesimError {
    // ============ Netlist Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Invalid component definition
    #[error("Invalid component '{name}' at line {line}: {message}")]
    InvalidComponent {
        name: String,
        line: usize,
        message: String,
    },

    /// Unknown component type
    #[error("Unknown component type '{component_type}' at line {line}")]
    UnknownComponentType { component_type: String, line: usize },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' for component '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// Reference to a circuit that does not exist
    #[error("Unknown circuit '{name}'")]
    UnknownCircuit { name: String },

    /// Two circuits share a name
    #[error("Duplicate circuit name '{name}'")]
    DuplicateCircuit { name: String },

    /// A circuit contains itself through subcircuit instances
    #[error("Circuit '{name}' contains itself as a subcircuit")]
    RecursiveCircuit { name: String },

    // ============ Structural Errors ============
    /// A structural mutation was attempted without holding the write lock
    #[error(
        "{operation} outside transaction on circuit '{circuit}' [lock serial {serial}] \
         by thread {thread}; write lock held by {holder}"
    )]
    LockViolation {
        operation: String,
        circuit: String,
        serial: u64,
        thread: String,
        holder: String,
    },

    /// A thread holding a read lock asked for the write lock on the same circuit
    #[error("Thread {thread} cannot upgrade its read lock on circuit '{circuit}' [lock serial {serial}]")]
    LockUpgrade {
        circuit: String,
        serial: u64,
        thread: String,
    },

    /// A replacement map was changed after being frozen
    #[error("Cannot change replacement map after it is frozen")]
    ReplacementFrozen,

    /// Component not present in the circuit
    #[error("Component {component} not found in circuit '{circuit}'")]
    UnknownComponent { component: String, circuit: String },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    /// The owner thread could not service a request
    #[error("Owner thread unavailable: {message}")]
    OwnerUnavailable { message: String },

    /// Internal failure while resolving wires into bundles
    #[error("Bundle map construction failed: {message}")]
    BundleMapFailure { message: String },

    // ============ Analysis Errors ============
    /// Expressions kept changing past the iteration bound, or referenced themselves
    #[error("Circuit contains a combinational cycle")]
    Circular,

    /// A component has no symbolic model
    #[error("Analysis cannot handle component '{component}'")]
    CannotHandle { component: String },

    /// Two unrelated drivers assert different expressions on one node
    #[error("Conflicting expressions drive the same node")]
    Conflict,

    /// Too many input bits for exhaustive enumeration
    #[error("Too many input bits for a truth table ({bits}, limit {limit})")]
    TooManyInputs { bits: usize, limit: usize },

    // ============ I/O Errors ============
    /// Error reading netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing command-line output
    #[error("Output error: {message}")]
    OutputError { message: String },

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl GatesimError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid component error
    pub fn invalid_component(name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidComponent {
            name: name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an invalid topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create a lock violation error
    pub fn lock_violation(
        operation: impl Into<String>,
        circuit: impl Into<String>,
        serial: u64,
        holder: Option<String>,
    ) -> Self {
        Self::LockViolation {
            operation: operation.into(),
            circuit: circuit.into(),
            serial,
            thread: crate::owner::describe_current_thread(),
            holder: holder.unwrap_or_else(|| "no thread".to_string()),
        }
    }

    /// Whether this error reports a mutation without the write lock.
    pub fn is_lock_violation(&self) -> bool {
        matches!(self, Self::LockViolation { .. })
    }
}
