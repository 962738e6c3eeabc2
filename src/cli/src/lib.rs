//! MFE Bundle CLI - micro-frontend bundle publisher.

pub mod commands;
