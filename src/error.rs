use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Note that a loop pair failing a legality predicate is *not* an error. Predicates fail closed
/// and the pair is simply left alone. Errors are reserved for malformed input and for states
/// that would corrupt the control-flow graph if the transformation continued.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The SSA function is structurally invalid
/// - [`Error::FunctionNotFound`] - A named function is not registered in the context
///
/// ## Transformation Errors
/// - [`Error::InvariantViolation`] - A merge was attempted without its preconditions
///
/// ## Evaluation Errors
/// - [`Error::ExecutionLimit`] - The interpreter exceeded its step budget
/// - [`Error::Execution`] - The interpreter hit a runtime fault
///
/// ## Analysis Errors
/// - [`Error::GraphError`] - A graph algorithm received inconsistent input
///
/// # Examples
///
/// ```rust
/// use loopfuse::{analysis::SsaFunction, Error};
///
/// let ssa = SsaFunction::new("empty");
/// match ssa.validate() {
///     Ok(()) => println!("valid"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed function: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The SSA function violates a structural rule.
    ///
    /// Raised by validation and by the builder when a block is missing its terminator,
    /// a branch targets a block that does not exist, or a phi names a block that is
    /// not a predecessor.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A transformation reached a state its preconditions should have ruled out.
    ///
    /// The loop merger raises this instead of continuing when, for example, a loop
    /// without a resolvable induction variable reaches it, or an edge it must rewrite
    /// does not exist. Continuing would leave the CFG inconsistent.
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The interpreter executed more steps than its configured limit.
    #[error("Execution exceeded the step limit of {0}")]
    ExecutionLimit(usize),

    /// The interpreter hit a runtime fault (out-of-bounds access, undefined value,
    /// unhandled call).
    #[error("Execution error: {0}")]
    Execution(String),

    /// A function name was not found in the compiler context.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// A graph algorithm received inconsistent input.
    #[error("{0}")]
    GraphError(String),
}
