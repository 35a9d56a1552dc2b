//! Explicit error accumulator used by the processor chain and the per-shard
//! tick. Preserves wrapping (shard name, filepath, processor type) instead of
//! collapsing everything into a single opaque string, so the alerter can see
//! the first cause while logs can still walk every entry.

use std::fmt;

/// One failure observed while running a processor against a file.
#[derive(Debug)]
pub struct ProcessorFailure {
    pub processor_type: String,
    pub filepath: String,
    pub source: eyre::Report,
}

impl fmt::Display for ProcessorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processor '{}' on '{}': {}",
            self.processor_type, self.filepath, self.source
        )
    }
}

/// Accumulates zero or more [`ProcessorFailure`]s across a tick. `is_empty`
/// tells the caller whether the tick should be considered failed.
#[derive(Debug, Default)]
pub struct MultiError {
    failures: Vec<ProcessorFailure>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: ProcessorFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// The first failure in insertion order — what the alerter is shown.
    pub fn first_cause(&self) -> Option<&ProcessorFailure> {
        self.failures.first()
    }

    /// Collapses the accumulator into a [`crate::error::TickFailure`]:
    /// `first` is `first_cause()`'s failure alone (what the alerter sees,
    /// spec.md §7/§9), `full` is this type's `Display` (every failure, what
    /// logs see). `None` if nothing was recorded.
    pub fn into_tick_failure(self) -> Option<crate::error::TickFailure> {
        let first = eyre::eyre!("{}", self.first_cause()?);
        let full = eyre::eyre!("{self}");
        Some(crate::error::TickFailure { first, full })
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) while processing files:", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            writeln!(f, "  [{i}] {failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_has_no_tick_failure() {
        let me = MultiError::new();
        assert!(me.is_empty());
        assert!(me.into_tick_failure().is_none());
    }

    #[test]
    fn first_cause_preserves_insertion_order() {
        let mut me = MultiError::new();
        me.push(ProcessorFailure {
            processor_type: "prenote".into(),
            filepath: "a.ach".into(),
            source: eyre::eyre!("first"),
        });
        me.push(ProcessorFailure {
            processor_type: "prenote".into(),
            filepath: "b.ach".into(),
            source: eyre::eyre!("second"),
        });
        assert_eq!(me.len(), 2);
        assert!(me.first_cause().unwrap().to_string().contains("first"));
    }

    #[test]
    fn tick_failure_routes_first_cause_separately_from_the_full_report() {
        let mut me = MultiError::new();
        me.push(ProcessorFailure {
            processor_type: "prenote".into(),
            filepath: "a.ach".into(),
            source: eyre::eyre!("first"),
        });
        me.push(ProcessorFailure {
            processor_type: "audit".into(),
            filepath: "b.ach".into(),
            source: eyre::eyre!("second"),
        });

        let failure = me.into_tick_failure().unwrap();
        assert!(failure.first.to_string().contains("a.ach"));
        assert!(!failure.first.to_string().contains("b.ach"));
        assert!(failure.full.to_string().contains("a.ach"));
        assert!(failure.full.to_string().contains("b.ach"));
    }
}
