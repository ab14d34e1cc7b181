//! The console shell: a plugin table of opaque module handles, the
//! capability object handed to mounted modules, and the navigation state
//! machine gating every module transition.

pub mod host;
pub mod router;

pub use host::{ConsoleModule, FailingModule, ModuleContext, ModuleHost, ProbeFuture, StubModule};
pub use router::{Router, RouterState, Session};
