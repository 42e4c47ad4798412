// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Label and define tables.
//!
//! Labels bind a name to the pre-origin code position of their definition;
//! the origin of the *use* site is added when a label is resolved, never at
//! bind time. Defines bind a name to an unevaluated value token and expand
//! lazily each time they are referenced. Both tables share one namespace:
//! a name may exist in at most one of them, and redefinition is fatal.

use std::cell::Cell;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::AsmError;
use crate::expression::{self, EvalContext};
use crate::token::{SourcePos, Token};

/// Cap on define-to-define reference chains.
pub const MAX_DEFINE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    /// Code position at definition, before any origin is applied.
    pub value: u16,
    pub imported: bool,
    /// `None` for imported labels.
    pub pos: Option<SourcePos>,
}

#[derive(Debug, Clone)]
pub struct Define {
    pub name: String,
    pub value: Token,
    pub pos: SourcePos,
}

/// Both symbol tables, in definition order. Lookups are linear; source
/// files small enough to assemble for a Z80 never make that matter.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    labels: Vec<Label>,
    defines: Vec<Define>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn label(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.name == name)
    }

    pub fn define(&self, name: &str) -> Option<&Define> {
        self.defines.iter().find(|d| d.name == name)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn defines(&self) -> &[Define] {
        &self.defines
    }

    /// Where (and as what) `name` is already bound, for duplicate reports.
    fn defined_note(&self, name: &str) -> Option<String> {
        if let Some(label) = self.label(name) {
            if label.imported {
                return Some("first defined by label import".to_owned());
            }
            let mut note = "first defined".to_owned();
            if let Some(pos) = &label.pos {
                let _ = write!(note, " at {pos}");
            }
            return Some(note);
        }
        self.define(name)
            .map(|d| format!("first defined at {}", d.pos))
    }

    pub fn add_label(&mut self, name: &str, value: u16, pos: SourcePos) -> Result<(), AsmError> {
        if let Some(note) = self.defined_note(name) {
            return Err(AsmError::symbol(
                pos,
                name,
                format!("duplicate symbol; {note}"),
            ));
        }
        self.labels.push(Label {
            name: name.to_owned(),
            value,
            imported: false,
            pos: Some(pos),
        });
        Ok(())
    }

    pub fn add_imported_label(&mut self, name: &str, value: u16) -> Result<(), AsmError> {
        if let Some(note) = self.defined_note(name) {
            return Err(AsmError::new(
                crate::error::AsmErrorKind::Symbol,
                format!("duplicate imported symbol `{name}`; {note}"),
            ));
        }
        self.labels.push(Label {
            name: name.to_owned(),
            value,
            imported: true,
            pos: None,
        });
        Ok(())
    }

    pub fn add_define(&mut self, name: &str, value: Token, pos: SourcePos) -> Result<(), AsmError> {
        if let Some(note) = self.defined_note(name) {
            return Err(AsmError::symbol(
                pos,
                name,
                format!("duplicate symbol; {note}"),
            ));
        }
        self.defines.push(Define {
            name: name.to_owned(),
            value,
            pos,
        });
        Ok(())
    }

    /// Load a label side-file: one `<name> <decimal-value>` pair per line.
    /// Returns the number of labels imported.
    pub fn import_file(&mut self, path: &Path) -> Result<usize, AsmError> {
        let text = fs::read_to_string(path)
            .map_err(|err| AsmError::io(format!("{}: {err}", path.display())))?;
        let mut count = 0;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let entry = match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(value), None) => value.parse::<i64>().ok().map(|v| (name, v)),
                _ => None,
            };
            let (name, value) = entry.ok_or_else(|| {
                AsmError::io(format!(
                    "{}:{}: malformed label import line `{line}`",
                    path.display(),
                    idx + 1
                ))
            })?;
            self.add_imported_label(name, value as u16)?;
            count += 1;
        }
        Ok(count)
    }

    /// Write the symbol export: labels in definition order, then (when
    /// requested) defines evaluated against the final symbol state. Names
    /// starting with `_` and imported labels are skipped.
    pub fn export<W: Write>(
        &self,
        mut out: W,
        include_defines: bool,
        origin: i64,
    ) -> Result<(), AsmError> {
        for label in &self.labels {
            if label.imported || label.name.starts_with('_') {
                continue;
            }
            writeln!(out, "{} {}", label.name, label.value)
                .map_err(|err| AsmError::io(format!("writing label export: {err}")))?;
        }
        if include_defines {
            let resolver = Resolver::new(self, origin);
            for define in &self.defines {
                if define.name.starts_with('_') {
                    continue;
                }
                let value = expression::resolve(&define.value, &resolver)?;
                writeln!(out, "{} {}", define.name, value)
                    .map_err(|err| AsmError::io(format!("writing define export: {err}")))?;
            }
        }
        Ok(())
    }
}

/// [`EvalContext`] over a symbol table at a given origin. Labels resolve to
/// their binding plus the origin; defines expand lazily, with a depth cap
/// against reference cycles.
pub struct Resolver<'a> {
    table: &'a SymbolTable,
    origin: i64,
    depth: Cell<usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a SymbolTable, origin: i64) -> Self {
        Resolver {
            table,
            origin,
            depth: Cell::new(0),
        }
    }
}

impl EvalContext for Resolver<'_> {
    fn lookup_symbol(&self, name: &str, pos: &SourcePos) -> Result<i64, AsmError> {
        if let Some(label) = self.table.label(name) {
            return Ok(i64::from(label.value) + self.origin);
        }
        if let Some(define) = self.table.define(name) {
            if self.depth.get() >= MAX_DEFINE_DEPTH {
                return Err(AsmError::symbol(
                    pos.clone(),
                    name,
                    "define reference chain too deep",
                ));
            }
            self.depth.set(self.depth.get() + 1);
            let value = expression::resolve(&define.value, self);
            self.depth.set(self.depth.get() - 1);
            return value;
        }
        Err(AsmError::symbol(pos.clone(), name, "unresolved identifier"))
    }
}
