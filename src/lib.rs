//! Spoken questions in, SQL results and a chart suggestion out.
//!
//! `audio` turns an uploaded recording into text, `query` turns text into
//! SQL against a caller-supplied MySQL database and picks a visualization,
//! and `web` exposes both over HTTP.

pub mod audio;
pub mod config;
pub mod db;
pub mod llm;
pub mod query;
pub mod util;
pub mod web;
