use ahash::AHashSet;

/// The kind of synthetic identifier to generate. Each kind carries the
/// prefix that ends up in the output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthName {
    /// Per-loop "a break has fired" flag.
    BreakFlag,
    /// Per-loop "an interrupt has fired" flag.
    InterruptFlag,
    /// Wrapped for-loop iterator.
    Iterator,
    /// The break-capable iteration adapter class.
    IterAdapter,
    /// Temporary holding a multi-target assignment value.
    AssignTmp,
    /// Temporary holding the old value in an augmented assignment.
    AugTmp,
    /// Temporary holding an augmented assignment's subscript.
    AugSliceTmp,
    /// Per-function return-value slot.
    ReturnValue,
    /// Per-function "a return has fired" flag.
    ReturnFlag,
    /// Per-function boxed mapping for captured mutable bindings.
    NonlocalBox,
    /// Per-class member mapping.
    ClassDict,
    /// Per-class body loader closure.
    ClassLoader,
    /// Temporary holding a from-import's module object.
    ImportTmp,
    /// The chained-call expression wrapper runner.
    Runner,
}

impl SynthName {
    fn prefix(self) -> &'static str {
        match self {
            Self::BreakFlag => "__ol_break",
            Self::InterruptFlag => "__ol_interrupt",
            Self::Iterator => "__ol_it",
            Self::IterAdapter => "__ol_iter_wrapper",
            Self::AssignTmp => "__ol_assign",
            Self::AugTmp => "__ol_augass",
            Self::AugSliceTmp => "__ol_slice",
            Self::ReturnValue => "__ol_retv",
            Self::ReturnFlag => "__ol_ret",
            Self::NonlocalBox => "__ol_nonlocal",
            Self::ClassDict => "__ol_classnsp",
            Self::ClassLoader => "__ol_loader",
            Self::ImportTmp => "__ol_mod",
            Self::Runner => "__ol_run",
        }
    }
}

/// Counter-based generator of synthetic identifiers, guaranteed not to
/// collide with any identifier appearing in the program or with each other.
#[derive(Debug)]
pub struct NameGenerator {
    counter: u32,
    used: AHashSet<String>,
}

impl NameGenerator {
    #[must_use]
    pub fn new(used: AHashSet<String>) -> Self {
        Self { counter: 0, used }
    }

    /// Returns a fresh identifier of the given kind.
    pub fn fresh(&mut self, kind: SynthName) -> String {
        loop {
            let candidate = format!("{}_{}", kind.prefix(), self.counter);
            self.counter += 1;
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_sequential() {
        let mut generator = NameGenerator::new(AHashSet::new());
        assert_eq!(generator.fresh(SynthName::BreakFlag), "__ol_break_0");
        assert_eq!(generator.fresh(SynthName::ReturnValue), "__ol_retv_1");
    }

    #[test]
    fn fresh_names_skip_used_identifiers() {
        let used: AHashSet<String> = ["__ol_break_0".to_owned()].into_iter().collect();
        let mut generator = NameGenerator::new(used);
        assert_eq!(generator.fresh(SynthName::BreakFlag), "__ol_break_1");
    }
}
