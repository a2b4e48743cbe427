//! Workspace management — the command-execution core.
//!
//! ## Overview
//!
//! A workspace is an isolated on-disk checkout for one `(owner, repo)`
//! pair. This module keeps checkouts synchronized with their remote and
//! executes shell commands inside them, including long-running dev servers
//! tracked across requests.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌─────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  service::api  (route handlers, AppState)       │
//! └──────────┘          │         │                                       │
//!                       │         │ CommandExecutor::execute()            │
//!                       │         v                                       │
//!                       │  executor.rs  (classification dispatch)         │
//!                       │    │ store.rs     WorkspaceStore + per-path     │
//!                       │    │              locks                         │
//!                       │    │ sync.rs      clone / fetch+reset / no-op   │
//!                       │    │ registry.rs  one tracked dev server per    │
//!                       │    │              workspace                     │
//!                       │    │ reader.rs    line scanner for ready/port   │
//!                       │    │              detection                     │
//!                       │    └ files.rs     scoped read/write/list        │
//!                       └─────────────────────────────────────────────────┘
//! ```

pub mod executor;
pub mod files;
pub mod reader;
pub mod registry;
pub mod store;
pub mod sync;
