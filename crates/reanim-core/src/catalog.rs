//! Host catalog - names the host knows about at load time
//!
//! Literal names in rule packs (keywords, forms, external variables) are
//! resolved against the catalog once, so `is_valid()` never needs a live actor.

use std::collections::HashSet;

/// Known names exported by the host
#[derive(Debug, Clone, Default)]
pub struct HostCatalog {
    keywords: HashSet<String>,
    forms: HashSet<String>,
    globals: HashSet<String>,
    /// When false every lookup succeeds (tests, headless tooling)
    strict: bool,
}

impl HostCatalog {
    /// Strict, empty catalog
    pub fn new() -> Self {
        HostCatalog {
            strict: true,
            ..Default::default()
        }
    }

    /// Catalog that accepts every name
    pub fn permissive() -> Self {
        HostCatalog::default()
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forms.extend(forms.into_iter().map(Into::into));
        self
    }

    pub fn with_globals<I, S>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globals.extend(globals.into_iter().map(Into::into));
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn knows_keyword(&self, name: &str) -> bool {
        !self.strict || self.keywords.contains(name)
    }

    pub fn knows_form(&self, name: &str) -> bool {
        !self.strict || self.forms.contains(name)
    }

    pub fn knows_global(&self, name: &str) -> bool {
        !self.strict || self.globals.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_catalog() {
        let catalog = HostCatalog::new().with_keywords(["ActorTypeNPC"]);
        assert!(catalog.knows_keyword("ActorTypeNPC"));
        assert!(!catalog.knows_keyword("ActorTypeDragon"));
        assert!(!catalog.knows_form("IronSword"));
    }

    #[test]
    fn test_permissive_catalog() {
        let catalog = HostCatalog::permissive();
        assert!(catalog.knows_keyword("anything"));
        assert!(catalog.knows_global("anything"));
    }
}
