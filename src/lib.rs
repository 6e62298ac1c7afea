pub mod archive;
pub mod commands;
pub mod corpus;
pub mod download;
pub mod http;
pub mod package;
pub mod projection;
pub mod resolve;
pub mod runtime;
pub mod sink;
