//! TutorChat - Tutoring Chat Core
//!
//! Real-time chat between a student, their assigned teacher and an AI
//! assistant. A room is either in AI mode, where the student's questions
//! are answered by a streamed AI response, or in human mode, where the
//! teacher takes over. Every message is persisted and then fanned out
//! through a partitioned durable log, so any number of server replicas can
//! serve the sockets of one room.
//!
//! # Module Structure
//!
//! - **`shared`** - plain data shared by every layer
//!   - rooms, roles, help mode, chat messages, socket frames
//!   - configuration and the shared error type
//!
//! - **`backend`** - the server
//!   - store interfaces with PostgreSQL and in-memory implementations
//!   - durable fan-out (Kafka or in-process) and the connection registry
//!   - help-mode routing, the AI bridge, HTTP and socket handlers
//!   - service graph construction and shutdown
//!
//! # Usage
//!
//! ```rust,no_run
//! use tutorchat::backend::server;
//! use tutorchat::shared::ChatConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::load()?;
//! let runtime = server::init(&config).await?;
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
//! axum::serve(listener, runtime.router()).await?;
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Types shared by every layer
pub mod shared;

/// Server-side chat core
pub mod backend;
