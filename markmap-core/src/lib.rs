#![doc = "markmap-core: rendering and publishing logic for markmap-mcp."]

//! This crate holds everything that does not talk to a concrete backend:
//! the contract traits, the mind-map renderer, the FreeMind exporter and the
//! publish pipeline. HTTP clients and the MCP server live in `markmap-mcp`.
//!
//! # Usage
//! Build a [`publish::PublishRequest`], hand it to [`publish::publish`]
//! together with a scratch directory and a [`contract::Viewer`].

pub mod contract;
pub mod outline;
pub mod publish;
pub mod render;
