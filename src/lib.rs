//! # repo-scout
//!
//! Ask questions about a GitHub repository.
//!
//! repo-scout fetches a repository's metadata, file tree, README,
//! contributing guide, open issues, and pull requests into a snapshot, caches
//! it, and answers free-text questions with a language model. When a question
//! needs source inspection, the relevant files are pulled on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Cache /     │──▶│   Router    │──▶│  File    │──▶│  Context  │──▶│  Answer  │
//! │ Builder     │   │ rules+model │   │  fetch   │   │ assembler │   │  (LLM)   │
//! └─────────────┘   └─────────────┘   └──────────┘   └───────────┘   └──────────┘
//!        ▲                                                                 │
//!        └──────────────────── Assistant (orchestrator) ◀──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=...
//! scout index tokio-rs/axum
//! scout ask tokio-rs/axum "How does routing work?"
//! scout serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Snapshot and per-question types |
//! | [`github`] | Repository host trait and GitHub REST client |
//! | [`snapshot`] | Snapshot builder and file body fetch |
//! | [`cache`] | Snapshot stores and freshness policy |
//! | [`llm`] | Language model trait and HTTP providers |
//! | [`router`] | Decides whether and which files to fetch |
//! | [`context`] | Renders the model context |
//! | [`answer`] | Final answer call |
//! | [`trace`] | Per-question step log |
//! | [`assistant`] | Orchestrates one question end to end |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod assistant;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod github;
pub mod llm;
pub mod models;
pub mod router;
pub mod server;
pub mod snapshot;
pub mod trace;
