//! File edges of the pipeline. The engine modules never touch the filesystem.

pub mod csv;
