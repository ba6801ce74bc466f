// Crate root: declare modules and control visibility
pub mod aggregate;
pub mod dump;
pub mod entries;
pub mod errors;
pub mod filter;
pub mod logging;
pub mod output;
pub mod resolve;
pub mod signature;

// Re-export commonly used API from the library for binaries/tests
pub use aggregate::{Aggregator, Report};
pub use dump::{DumpEncoding, DumpSource, NativeReader, ToolDumper};
pub use entries::CompilationUnit;
pub use filter::SourcePathFilter;
pub use signature::FunctionSignature;
