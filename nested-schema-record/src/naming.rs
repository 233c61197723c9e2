//! Unique blob names within an allocation scope

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::storage::NameGenerator;

/// Hands out names that are unique within this scope.
///
/// The first request for a prefix returns `scope/prefix`; later requests for
/// the same prefix get `_1`, `_2`, ... appended.
#[derive(Debug, Clone, Default)]
pub struct NameScope {
    /// Scope prepended to every name
    scope: Option<String>,

    /// Next suffix to try for each prefix
    counters: HashMap<String, usize>,

    /// Names handed out so far
    issued: HashSet<String>,
}

impl NameScope {
    /// Create a scope with no prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope whose names start with `scope/`
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }

    /// Create a scope with a random prefix, unique across scopes
    pub fn unique() -> Self {
        Self::with_scope(Uuid::new_v4().simple().to_string())
    }

    /// Get the scope prefix
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Number of names handed out
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Check if no names were handed out
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

impl NameGenerator for NameScope {
    fn next_name(&mut self, prefix: &str) -> String {
        let base = match &self.scope {
            Some(scope) => format!("{scope}/{prefix}"),
            None => prefix.to_string(),
        };
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            let candidate = if *counter == 0 {
                base.clone()
            } else {
                format!("{base}_{counter}")
            };
            *counter += 1;
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
