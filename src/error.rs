//! Error types for the netlist simulator.
//!
//! This module provides a unified error type [`NetlistError`] that covers
//! all error conditions that can occur while parsing a netlist description,
//! wiring the device graph, building the analog solvers and restoring state.
//!
//! Setup errors are fatal: they describe a broken netlist, not a transient
//! condition. Convergence problems at run time are never reported here; the
//! solvers recover from them in-band and only count them.

use thiserror::Error;

/// Result type alias using [`NetlistError`].
pub type Result<T> = std::result::Result<T, NetlistError>;

fn format_links(links: &[(String, String)]) -> String {
    links
        .iter()
        .map(|(a, b)| format!("{} <==> {}", a, b))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unified error type for all netlist operations.
#[derive(Error, Debug)]
pub enum NetlistError {
    // ============ Description Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error in '{source_name}' at line {line}: {message}")]
    ParseError {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Netlist source requested by include was never registered
    #[error("Netlist source '{name}' not found")]
    SourceNotFound { name: String },

    // ============ Registration Errors ============
    /// Device class not known to the factory
    #[error("Class '{class}' not found")]
    UnknownDeviceClass { class: String },

    /// Duplicate device name
    #[error("Duplicate device name '{name}'")]
    DuplicateDevice { name: String },

    /// Duplicate alias name
    #[error("Duplicate alias '{alias}'")]
    DuplicateAlias { alias: String },

    /// Duplicate model name
    #[error("Duplicate model name '{name}'")]
    DuplicateModel { name: String },

    /// Parameter registered twice by a device
    #[error("Duplicate parameter '{name}'")]
    DuplicateParam { name: String },

    /// Terminal registered twice
    #[error("Duplicate terminal '{name}'")]
    DuplicateTerminal { name: String },

    /// Invalid parameter value
    #[error("Invalid value '{value}' for parameter '{param}': {message}")]
    InvalidParameter {
        param: String,
        value: String,
        message: String,
    },

    /// Parameter lookup failed
    #[error("Parameter '{name}' not found")]
    ParamNotFound { name: String },

    /// Link list with fewer than two members
    #[error("Link list '{list}' needs at least two terminals")]
    LinkTooShort { list: String },

    /// DIPPINS with an odd number of pins
    #[error("DIPPINS requires an even number of pins, got {count}")]
    OddDipPins { count: usize },

    /// remove_connections found nothing to remove
    #[error("remove_connections: found no occurrence of '{pin}'")]
    ConnectionNotFound { pin: String },

    /// Frontier attachment point not referenced by any link
    #[error("Frontier setup: found no occurrence of '{pin}'")]
    FrontierNotFound { pin: String },

    // ============ Model Errors ============
    /// Model referenced but never registered
    #[error("Model '{model}' not found")]
    UnknownModel { model: String },

    /// Malformed model string
    #[error("Model error in '{model}': {message}")]
    ModelSyntax { model: String, message: String },

    /// Model key not present in the expanded model
    #[error("Entity '{entity}' not found in model '{model}'")]
    UnknownModelEntity { model: String, entity: String },

    // ============ Wiring Errors ============
    /// Terminal lookup failed
    #[error("Terminal '{name}' not found")]
    TerminalNotFound { name: String },

    /// Terminal found but of the wrong kind
    #[error("Object '{name}' is not a {expected}")]
    TerminalKindMismatch { name: String, expected: String },

    /// Terminal added twice to the same net
    #[error("Net '{net}': duplicate terminal '{terminal}'")]
    DuplicateNetTerminal { net: String, terminal: String },

    /// Terminal removed from a net it does not belong to
    #[error("Cannot remove terminal '{terminal}' from net '{net}'")]
    TerminalNotInNet { terminal: String, net: String },

    /// Two rail nets merged
    #[error("Trying to merge two rail nets: '{first}' and '{second}'")]
    RailNetMerge { first: String, second: String },

    /// Input already driven by another rail
    #[error("Input '{input}' already connected")]
    InputAlreadyConnected { input: String },

    /// A mandatory connection could not be made
    #[error("Error connecting '{first}' to '{second}'")]
    ConnectionFailed { first: String, second: String },

    /// Link resolution exhausted its retry budget
    #[error("Error resolving {} link(s): {}", links.len(), format_links(links))]
    UnresolvedLinks { links: Vec<(String, String)> },

    /// Terminals left without a net after resolution
    #[error("Found terminal(s) without a net: {}", terminals.join(", "))]
    TerminalsWithoutNet { terminals: Vec<String> },

    // ============ Truthtable Errors ============
    /// Malformed truthtable header
    #[error("Truthtable '{name}': {message}")]
    TruthTableHeader { name: String, message: String },

    /// Malformed or conflicting truthtable row
    #[error("Truthtable '{name}', line '{row}': {message}")]
    TruthTableRow {
        name: String,
        row: String,
        message: String,
    },

    // ============ Solver Errors ============
    /// Analog terminals present but no solver device instantiated
    #[error("No solver found for this netlist although analog elements are present")]
    NoSolver,

    /// Unknown iterative solver name
    #[error("Unknown solver type '{name}'")]
    UnknownSolver { name: String },

    /// Solver group larger than any supported storage class
    #[error("Encountered net group with {size} nets (maximum is {max})")]
    GroupTooLarge { size: usize, max: usize },

    /// Unsupported terminal kind on an analog net
    #[error("Unhandled element '{terminal}' found on analog net '{net}'")]
    UnhandledSolverTerminal { terminal: String, net: String },

    /// Terminal whose opposite side is on a net outside the group
    #[error("Found terminal '{terminal}' with missing other net")]
    MissingOtherNet { terminal: String },

    // ============ State Errors ============
    /// Snapshot does not match this netlist
    #[error("State mismatch: {message}")]
    StateMismatch { message: String },

    /// Snapshot (de)serialization failed
    #[error("State serialization error: {0}")]
    StateFormat(#[from] serde_json::Error),

    // ============ I/O Errors ============
    /// Error reading a file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing a file
    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NetlistError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_param(
        param: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a model syntax error
    pub fn model_syntax(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelSyntax {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a truthtable header error
    pub fn tt_header(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TruthTableHeader {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a truthtable row error
    pub fn tt_row(name: impl Into<String>, row: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TruthTableRow {
            name: name.into(),
            row: row.into(),
            message: message.into(),
        }
    }

    /// Create a state mismatch error
    pub fn state(message: impl Into<String>) -> Self {
        Self::StateMismatch {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_links_lists_every_pair() {
        let err = NetlistError::UnresolvedLinks {
            links: vec![
                ("A.Q".to_string(), "B.A".to_string()),
                ("C.Q".to_string(), "D.B".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 link(s)"));
        assert!(msg.contains("A.Q <==> B.A"));
        assert!(msg.contains("C.Q <==> D.B"));
    }

    #[test]
    fn test_terminals_without_net_message() {
        let err = NetlistError::TerminalsWithoutNet {
            terminals: vec!["X.A".to_string(), "Y.B".to_string()],
        };
        assert_eq!(err.to_string(), "Found terminal(s) without a net: X.A, Y.B");
    }
}
