// Library entry exposing assembler modules.
pub mod assembler;
pub mod emitter;
pub mod error;
pub mod expression;
pub mod opcodes;
pub mod symbol_table;
pub mod tap;
pub mod token;
pub mod tokenizer;
