use rustc_hash::FxHashMap;

use crate::types::CatscriptType;

use super::{Instruction, Label, Slot};

#[derive(Debug, Clone)]
pub(super) struct Local {
    pub(super) slot: Slot,
    pub(super) ty: CatscriptType,
}

/// Per-function code buffer with slot and label allocation.
///
/// Slots are handed out monotonically and never reused; name lookups follow
/// the same scoping as the validator. Labels are only meaningful inside the
/// code block they were allocated for.
pub(super) struct CodeGenerator {
    code: Vec<Instruction>,
    scopes: Vec<FxHashMap<String, Local>>,
    next_slot: Slot,
    next_label: usize,
}

impl CodeGenerator {
    /// `first_slot` is the first slot free for locals; slot 0 always holds
    /// the program object.
    pub(super) fn new(first_slot: Slot) -> Self {
        Self {
            code: Vec::new(),
            scopes: vec![FxHashMap::default()],
            next_slot: first_slot,
            next_label: 0,
        }
    }

    pub(super) fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    pub(super) fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub(super) fn fresh_slot(&mut self) -> Slot {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub(super) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(super) fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub(super) fn declare_local(&mut self, name: &str, ty: CatscriptType) -> Slot {
        let slot = self.fresh_slot();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Local { slot, ty });
        }
        slot
    }

    pub(super) fn local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Returns the finished code and the number of local slots it uses.
    pub(super) fn finish(self) -> (Vec<Instruction>, usize) {
        (self.code, self.next_slot)
    }
}
