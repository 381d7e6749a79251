//! Process-wide catalog of discoverable actor classes.
//!
//! Libraries register their implementations here once, typically from an
//! initialization function. A stage started with auto-discovery enabled
//! registers every catalog class whose name matches one of its actor class
//! patterns (or every class when no pattern was configured). Classes given
//! explicitly in the provider list are registered regardless of discovery.

use std::sync::{OnceLock, RwLock};

use tracing::debug;

use crate::provider::{ActorClass, ClassPattern};
use crate::sync::{read, write};

fn catalog() -> &'static RwLock<Vec<ActorClass>> {
    static CATALOG: OnceLock<RwLock<Vec<ActorClass>>> = OnceLock::new();
    CATALOG.get_or_init(|| RwLock::new(Vec::new()))
}

/// Add a class to the catalog, replacing any class with the same name.
pub fn register(class: ActorClass) {
    let mut classes = write(catalog());
    debug!(class = class.name(), interface = class.interface().name(), "catalog registration");
    match classes.iter_mut().find(|c| c.name() == class.name()) {
        Some(existing) => *existing = class,
        None => classes.push(class),
    }
}

/// Snapshot of every registered class, in registration order.
pub fn discovered() -> Vec<ActorClass> {
    read(catalog()).clone()
}

/// Catalog classes allowed by `patterns`.
///
/// An empty pattern list allows every class.
pub fn matching(patterns: &[ClassPattern]) -> Vec<ActorClass> {
    read(catalog())
        .iter()
        .filter(|class| patterns.is_empty() || patterns.iter().any(|p| p.matches(class.name())))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceType;

    #[test]
    fn test_register_replaces_same_name() {
        let first = InterfaceType::observer("CatalogFirst");
        let second = InterfaceType::observer("CatalogSecond");
        register(ActorClass::declared("catalog.tests.Replaced", first));
        register(ActorClass::declared("catalog.tests.Replaced", second));

        let found: Vec<ActorClass> = discovered()
            .into_iter()
            .filter(|c| c.name() == "catalog.tests.Replaced")
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].interface().name(), "CatalogSecond");
    }

    #[test]
    fn test_matching_filters_by_pattern() {
        let listener = InterfaceType::observer("CatalogListener");
        register(ActorClass::declared("catalog.tests.kept.Listener", listener));
        register(ActorClass::declared("catalog.tests.other.Listener", listener));

        let pattern = ClassPattern::compile(r"catalog\.tests\.kept\..*").expect("valid pattern");
        let names: Vec<String> = matching(&[pattern])
            .into_iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["catalog.tests.kept.Listener".to_string()]);

        let all = matching(&[]);
        assert!(all.iter().any(|c| c.name() == "catalog.tests.other.Listener"));
    }
}
