//! CADventory: incremental indexing and metadata catalog for CAD libraries
//!
//! Walks a library of BRL-CAD geometry (`.g`) and image files, extracts
//! titles and object trees through an external parser, and keeps the
//! results, along with user tags and selection, in a local SQLite store.

pub mod cli;
pub mod core;
