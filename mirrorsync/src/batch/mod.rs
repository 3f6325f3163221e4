//! Packing of formatted rows into bounded write statements.

mod assembler;

pub use assembler::{BatchAssembler, RowBatch};
