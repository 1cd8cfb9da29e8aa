//! Domain logic: masking, lexical extraction and rule evaluation.
//!
//! This crate is designed to be I/O-free and highly testable.

pub mod extract;
pub mod policy;
pub mod preprocess;
pub mod rules;

pub use extract::{
    AssertionCallSite, Deadline, ExtractError, FileModel, InvocationKind, RunnerInvocation,
    SourceFile, TestDeclaration, extract,
};
pub use policy::{
    AssertionPolicy, CalleeKind, CompiledPolicy, FileRole, Limits, NamingPolicy,
    PolicyCompileError, RunnerPolicy, ScanPolicy, TestMarkers, compile_policy, normalize_callee,
};
pub use preprocess::{Language, OpenConstruct, PreprocessOptions, Preprocessor};
pub use rules::{check_file, degraded_finding, naming_failure, sort_findings};
