// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pass 1 driver: the scanner's root sink.
//!
//! The driver owns the symbol tables and the code position. Every root the
//! scanner hands over is sized immediately: instructions are encoded (their
//! template length is final even when operand values are not), directives
//! advance the position by their kind-dependent footprint, labels bind the
//! current position. Because footprints never depend on operand *values*,
//! forward references cost nothing; only `ds` and `org` must evaluate their
//! operands on the spot.

pub mod cli;
#[cfg(test)]
mod tests;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::emitter;
use crate::error::AsmError;
use crate::expression;
use crate::opcodes;
use crate::symbol_table::{Resolver, SymbolTable};
use crate::token::{Token, TokenKind};
use crate::tokenizer::{self, RootSink};

/// Result of a full assembly run.
#[derive(Debug)]
pub struct Assembly {
    pub image: Vec<u8>,
    pub symbols: SymbolTable,
    /// Origin in force at end of assembly, used when exporting defines.
    pub origin: i64,
}

impl Assembly {
    /// Write the symbol export side-file.
    pub fn write_exports<W: Write>(&self, out: W, include_defines: bool) -> Result<(), AsmError> {
        self.symbols.export(out, include_defines, self.origin)
    }
}

struct Driver {
    symbols: SymbolTable,
    codepos: i64,
    origin: i64,
    roots: Vec<Token>,
    /// Directory stack for resolving include/incbin paths relative to the
    /// file that names them.
    dirs: Vec<PathBuf>,
}

impl RootSink for Driver {
    fn address(&self) -> i64 {
        self.codepos + self.origin
    }

    fn accept_root(&mut self, mut root: Token) -> Result<(), AsmError> {
        expression::flatten_operands(&mut root);
        debug!(kind = %root.kind, value = %root.value, codepos = self.codepos, "root");
        match root.kind {
            TokenKind::Instruction => {
                let (opcode, patch) = opcodes::encode(&root)?;
                self.codepos += opcode.len() as i64;
                root.opcode = Some(opcode);
                root.patch = patch;
                self.roots.push(root);
                Ok(())
            }
            TokenKind::Label => {
                let pos = root.pos.clone();
                self.symbols.add_label(&root.value, self.codepos as u16, pos)?;
                self.roots.push(root);
                Ok(())
            }
            TokenKind::Directive => self.directive(root),
            _ => Err(AsmError::syntax(
                root.pos.clone(),
                &root.value,
                "token cannot start a statement",
            )),
        }
    }
}

impl Driver {
    fn new(symbols: SymbolTable) -> Self {
        Driver {
            symbols,
            codepos: 0,
            origin: 0,
            roots: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Evaluate an operand against the current symbol state, for the few
    /// directives that cannot wait for pass 2.
    fn eval_now(&self, token: &Token) -> Result<i64, AsmError> {
        let resolver = Resolver::new(&self.symbols, self.origin);
        expression::resolve(token, &resolver)
    }

    fn resolve_path(&self, value: &str) -> PathBuf {
        match self.dirs.last() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(value),
            _ => PathBuf::from(value),
        }
    }

    fn run_file(&mut self, path: &Path) -> Result<(), AsmError> {
        let source = fs::read_to_string(path)
            .map_err(|err| AsmError::io(format!("{}: {err}", path.display())))?;
        let file: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        self.dirs
            .push(path.parent().map(Path::to_path_buf).unwrap_or_default());
        let result = tokenizer::scan(&source, file, self);
        self.dirs.pop();
        result
    }

    fn directive(&mut self, mut root: Token) -> Result<(), AsmError> {
        let name = root.value.to_ascii_lowercase();
        match name.as_str() {
            "db" => {
                for op in &root.children {
                    if op.kind == TokenKind::String {
                        // Strings take no operand chain; `"AB" + 1` has no
                        // meaning and must not be half-emitted.
                        if !op.children.is_empty() {
                            return Err(AsmError::directive(
                                op.pos.clone(),
                                &op.value,
                                "string operand cannot be part of an expression",
                            ));
                        }
                        self.codepos += op.value.as_bytes().len() as i64;
                    } else if op.is_numeric_like() {
                        self.codepos += 1;
                    } else {
                        return Err(AsmError::directive(
                            op.pos.clone(),
                            &op.value,
                            format!("{} operand is not valid in `db`", op.kind),
                        ));
                    }
                }
                self.roots.push(root);
            }
            "dw" => {
                for op in &root.children {
                    if op.is_numeric_like() {
                        self.codepos += 2;
                    } else {
                        return Err(AsmError::directive(
                            op.pos.clone(),
                            &op.value,
                            format!("{} operand is not valid in `dw`", op.kind),
                        ));
                    }
                }
                self.roots.push(root);
            }
            "ds" => {
                if root.children.is_empty() || root.children.len() > 2 {
                    return Err(AsmError::directive(
                        root.pos.clone(),
                        &root.value,
                        "`ds` takes a size and an optional fill value",
                    ));
                }
                let size = self.eval_now(&root.children[0]).map_err(|err| {
                    AsmError::directive(
                        root.children[0].pos.clone(),
                        &root.children[0].value,
                        format!("`ds` size must resolve during pass 1 ({})", err.message),
                    )
                })?;
                if size < 0 {
                    return Err(AsmError::directive(
                        root.children[0].pos.clone(),
                        &root.children[0].value,
                        "`ds` size is negative",
                    ));
                }
                if let Some(fill) = root.children.get(1) {
                    if !fill.is_numeric_like() {
                        return Err(AsmError::directive(
                            fill.pos.clone(),
                            &fill.value,
                            format!("{} fill value is not valid in `ds`", fill.kind),
                        ));
                    }
                }
                root.children[0].numval = size;
                self.codepos += size;
                self.roots.push(root);
            }
            "org" => {
                if root.children.len() != 1 {
                    return Err(AsmError::directive(
                        root.pos.clone(),
                        &root.value,
                        "`org` takes exactly one operand",
                    ));
                }
                let value = self.eval_now(&root.children[0]).map_err(|err| {
                    AsmError::directive(
                        root.children[0].pos.clone(),
                        &root.children[0].value,
                        format!("`org` must resolve during pass 1 ({})", err.message),
                    )
                })?;
                root.children[0].numval = value;
                self.origin = value;
                self.roots.push(root);
            }
            "def" => {
                if root.children.len() != 2 {
                    return Err(AsmError::directive(
                        root.pos.clone(),
                        &root.value,
                        "`def` takes a name and a value",
                    ));
                }
                let Some(value) = root.children.pop() else {
                    return Err(AsmError::directive(
                        root.pos.clone(),
                        &root.value,
                        "`def` takes a name and a value",
                    ));
                };
                let key = &root.children[0];
                if key.kind != TokenKind::Identifier || !key.children.is_empty() {
                    return Err(AsmError::directive(
                        key.pos.clone(),
                        &key.value,
                        "`def` name must be a plain identifier",
                    ));
                }
                if !value.is_numeric_like() {
                    return Err(AsmError::directive(
                        value.pos.clone(),
                        &value.value,
                        format!("{} value is not valid in `def`", value.kind),
                    ));
                }
                let name = key.value.clone();
                let pos = key.pos.clone();
                self.symbols.add_define(&name, value, pos)?;
                self.roots.push(root);
            }
            "include" => {
                let path = self.source_path_operand(&root)?;
                info!(path = %path.display(), "include");
                self.roots.push(root);
                self.run_file(&path)?;
            }
            "incbin" => {
                let path = self.source_path_operand(&root)?;
                let meta = fs::metadata(&path)
                    .map_err(|err| AsmError::io(format!("{}: {err}", path.display())))?;
                let len = meta.len() as i64;
                // The emitter re-reads the file; hand it the resolved path
                // and the length this pass was sized with.
                root.children[0].value = path.to_string_lossy().into_owned();
                root.children[0].numval = len;
                self.codepos += len;
                self.roots.push(root);
            }
            _ => {
                return Err(AsmError::directive(
                    root.pos.clone(),
                    &root.value,
                    format!("unknown directive `{}`", root.value),
                ))
            }
        }
        Ok(())
    }

    /// The single quoted-string operand of include/incbin, resolved against
    /// the including file's directory.
    fn source_path_operand(&self, root: &Token) -> Result<PathBuf, AsmError> {
        match root.children.as_slice() {
            [op] if op.kind == TokenKind::String => Ok(self.resolve_path(&op.value)),
            _ => Err(AsmError::directive(
                root.pos.clone(),
                &root.value,
                format!("`{}` takes a single quoted path", root.value),
            )),
        }
    }

    fn finish(self) -> Result<Assembly, AsmError> {
        info!(
            bytes = self.codepos,
            roots = self.roots.len(),
            labels = self.symbols.labels().len(),
            "pass 1 complete"
        );
        let image = emitter::emit(&self.roots, &self.symbols, self.codepos as usize)?;
        Ok(Assembly {
            image,
            symbols: self.symbols,
            origin: self.origin,
        })
    }
}

/// Assemble a root source file. `import` optionally names a label side-file
/// loaded before assembly starts.
pub fn assemble_file(path: &Path, import: Option<&Path>) -> Result<Assembly, AsmError> {
    let mut symbols = SymbolTable::new();
    if let Some(side_file) = import {
        let count = symbols.import_file(side_file)?;
        info!(count, path = %side_file.display(), "imported labels");
    }
    let mut driver = Driver::new(symbols);
    driver.run_file(path)?;
    driver.finish()
}

/// Assemble from an in-memory source. Includes resolve relative to the
/// working directory.
pub fn assemble_source(source: &str, name: &str) -> Result<Assembly, AsmError> {
    let mut driver = Driver::new(SymbolTable::new());
    tokenizer::scan(source, Arc::from(name), &mut driver)?;
    driver.finish()
}
