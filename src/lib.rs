// Configuration (TOML) and secrets
pub mod config;

// Error boundary
pub mod error;

// Canonical name grammar
pub mod name;

// Tempo/key/token path parsing
pub mod pathparse;

// Routing: (app, action) -> queue
pub mod router;

// Rate limiting (sleep-to-deadline)
pub mod rate_limit;

// Task model, id generation, pending continuations
pub mod task;

// NATS JetStream queue client
pub mod nats;

// Replica/snapshot export
pub mod snapshot;

// Catalog store (asset/file authority)
pub mod catalog;

// AppData stores (analysis, tokens, metadata)
pub mod appdata;

// Archive restore/move/archive boundary
pub mod filemover;

// Rate-limited metadata API client contract
pub mod apiclient;

// Tasks scheduler
pub mod scheduler;
