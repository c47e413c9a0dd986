//! Tracks every label/`.global` name the parser sees and every back
//! reference the relocator still has to settle once the whole program has
//! been walked and instruction offsets are fixed.

use asmutil::OrderedMap;
use elfobj::{GlobalSymbol, SectionRef};

use crate::error::{Result, SemanticError};
use crate::lexer::SourceLoc;

/// A `%pcrel_hi(symbol)` that was resolved (or deferred) while emitting the
/// `auipc` it labels. A later `%pcrel_lo(label)` on the same anchor label
/// looks this up to recover the original symbol/addend pair instead of the
/// anchor label itself.
#[derive(Clone, Debug)]
pub struct PcrelAnchor {
    pub symbol: String,
    pub addend: i64,
    pub hi_inst_index: usize,
}

/// One symbolic operand the parser couldn't resolve on the spot, to be
/// settled by the relocator once every label's address is fixed.
#[derive(Clone, Debug)]
pub struct PendingRelocation {
    pub inst_index: usize,
    pub symbol: String,
    pub loc: SourceLoc,
}

/// Label/global bookkeeping for one assembled program.
///
/// `text_labels`/`global_symbols` are the two maps spec.md names
/// literally; `data_labels`/`bss_labels` are a deliberate addition so a
/// `.global` name defined in `.data`/`.bss` (not just `.text`) can still
/// have its section and value resolved at finalize time.
pub struct SymbolTracker {
    pub text_labels: OrderedMap<String, u64>,
    pub data_labels: OrderedMap<String, u64>,
    pub bss_labels: OrderedMap<String, u64>,
    /// `.global`/`.globl` declarations, in declaration order, plus any
    /// symbol a relocation later needed that wasn't declared global. Both
    /// need a real symbol-table entry, so they share one ordered set: it
    /// fixes each entry's 1-based symtab index.
    pub global_symbols: OrderedMap<String, ()>,
    pub pcrel_anchors: OrderedMap<String, PcrelAnchor>,
    pub pending: Vec<PendingRelocation>,
}

impl SymbolTracker {
    pub fn new() -> SymbolTracker {
        SymbolTracker {
            text_labels: OrderedMap::new(),
            data_labels: OrderedMap::new(),
            bss_labels: OrderedMap::new(),
            global_symbols: OrderedMap::new(),
            pcrel_anchors: OrderedMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn declare_label(&mut self, name: &str, section: SectionRef, offset: u64, loc: SourceLoc) -> Result<()> {
        let map = match section {
            SectionRef::Text => &mut self.text_labels,
            SectionRef::Data => &mut self.data_labels,
            SectionRef::Bss => &mut self.bss_labels,
            SectionRef::Undef => unreachable!("a label definition always lands in a real section"),
        };
        if !map.insert_if_absent(name.to_string(), offset) {
            return Err(SemanticError::DuplicateLabel {
                loc,
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// `.global`/`.globl name`: idempotent per spec.md's duplicate-global
    /// contract (unlike labels, re-declaring a global is not an error).
    pub fn declare_global(&mut self, name: &str) {
        self.global_symbols.insert_if_absent(name.to_string(), ());
    }

    pub fn add_pending(&mut self, inst_index: usize, symbol: String, loc: SourceLoc) {
        self.pending.push(PendingRelocation { inst_index, symbol, loc });
    }

    /// Looks a name up only in `.text` — the one section whose internal
    /// offsets are placement-independent relative to other `.text`
    /// instructions, so a direct PC-relative patch is valid.
    pub fn lookup_text(&self, name: &str) -> Option<u64> {
        self.text_labels.get(&name.to_string()).copied()
    }

    /// Looks a name up across all three defined-symbol maps, for
    /// finalizing `.global` entries (which may live in any section).
    fn lookup_any(&self, name: &str) -> Option<(SectionRef, u64)> {
        let key = name.to_string();
        if let Some(&v) = self.text_labels.get(&key) {
            return Some((SectionRef::Text, v));
        }
        if let Some(&v) = self.data_labels.get(&key) {
            return Some((SectionRef::Data, v));
        }
        if let Some(&v) = self.bss_labels.get(&key) {
            return Some((SectionRef::Bss, v));
        }
        None
    }

    /// Ensures `name` has a symbol-table entry, returning its 1-based
    /// symtab index. Used by the relocator for any symbol a relocation
    /// references, whether or not it was ever declared `.global`.
    pub fn ensure_symbol(&mut self, name: &str) -> u32 {
        self.global_symbols.insert_if_absent(name.to_string(), ());
        self.global_symbols.index_of(&name.to_string()).unwrap() as u32 + 1
    }

    /// Builds the final, ordered `GlobalSymbol` list `elfobj` wants: one
    /// entry per name in `global_symbols`, with its section/value resolved
    /// against whichever label map actually defines it (`Undef`/0 if it
    /// never was, i.e. a genuine extern reference).
    pub fn finalize_globals(&self) -> Vec<GlobalSymbol> {
        self.global_symbols
            .keys()
            .map(|name| {
                let (section, value) = self.lookup_any(name).unwrap_or((SectionRef::Undef, 0));
                GlobalSymbol::new(name.clone(), section, value)
            })
            .collect()
    }
}

impl Default for SymbolTracker {
    fn default() -> SymbolTracker {
        SymbolTracker::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicate_label_is_an_error() {
        let mut tracker = SymbolTracker::new();
        tracker.declare_label("main", SectionRef::Text, 0, SourceLoc::default()).unwrap();
        let err = tracker.declare_label("main", SectionRef::Text, 4, SourceLoc::default());
        assert!(err.is_err());
    }

    #[test]
    fn redeclaring_a_global_is_not_an_error() {
        let mut tracker = SymbolTracker::new();
        tracker.declare_global("main");
        tracker.declare_global("main");
        assert_eq!(tracker.global_symbols.len(), 1);
    }

    #[test]
    fn finalize_resolves_section_and_value_for_a_defined_global() {
        let mut tracker = SymbolTracker::new();
        tracker.declare_label("main", SectionRef::Text, 0, SourceLoc::default()).unwrap();
        tracker.declare_global("main");
        let globals = tracker.finalize_globals();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].name, "main");
        assert_eq!(globals[0].section, SectionRef::Text);
        assert_eq!(globals[0].value, 0);
    }

    #[test]
    fn ensure_symbol_is_idempotent_and_fixes_index() {
        let mut tracker = SymbolTracker::new();
        let a = tracker.ensure_symbol("msg");
        let b = tracker.ensure_symbol("msg");
        assert_eq!(a, b);
        assert_eq!(a, 1);
    }
}
