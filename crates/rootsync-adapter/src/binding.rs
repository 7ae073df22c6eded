//! Adapter bindings
//!
//! A binding decides whether a document is offered to an adapter at all.
//! The adapter's own eligibility predicate then has the final word.

use rootsync_core::config::BindingConfig;
use rootsync_core::domain::{facets, Document};

use crate::context::AdaptContext;

/// What an adapter of the chain is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Offered every document
    Unconditional,
    /// Offered documents of this type
    DocType(String),
    /// Offered documents carrying this facet
    Facet(String),
}

impl Binding {
    /// Returns true if `doc` is offered to the bound adapter
    ///
    /// A facet binding on the sync-root facet also requires the document to
    /// be an enabled root for the requesting principal, unless the context
    /// relaxes the root constraint.
    pub fn matches(&self, doc: &Document, ctx: &AdaptContext) -> bool {
        match self {
            Binding::Unconditional => true,
            Binding::DocType(doc_type) => &doc.doc_type == doc_type,
            Binding::Facet(facet) if facet == facets::SYNC_ROOT => {
                doc.has_facet(facet)
                    && (ctx.relax_root_constraint || doc.is_enabled_root_for(&ctx.principal))
            }
            Binding::Facet(facet) => doc.has_facet(facet),
        }
    }
}

impl From<&BindingConfig> for Binding {
    fn from(config: &BindingConfig) -> Self {
        match config {
            BindingConfig::Unconditional => Binding::Unconditional,
            BindingConfig::DocType(t) => Binding::DocType(t.clone()),
            BindingConfig::Facet(f) => Binding::Facet(f.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rootsync_core::domain::{DocPath, DocumentId, Principal, RepositoryName};

    use super::*;

    fn doc() -> Document {
        Document::new(
            DocumentId::new("1".to_string()).unwrap(),
            RepositoryName::new("default".to_string()).unwrap(),
            DocPath::new("/a".to_string()).unwrap(),
            "Folder",
        )
        .with_facet(facets::FOLDERISH)
    }

    fn ctx(name: &str) -> AdaptContext {
        AdaptContext::new(Principal::new(name.to_string()).unwrap())
    }

    #[test]
    fn test_type_and_plain_facet_bindings() {
        let d = doc();
        assert!(Binding::Unconditional.matches(&d, &ctx("alice")));
        assert!(Binding::DocType("Folder".to_string()).matches(&d, &ctx("alice")));
        assert!(!Binding::DocType("Note".to_string()).matches(&d, &ctx("alice")));
        assert!(Binding::Facet(facets::FOLDERISH.to_string()).matches(&d, &ctx("alice")));
        assert!(!Binding::Facet(facets::COLLECTION.to_string()).matches(&d, &ctx("alice")));
    }

    #[test]
    fn test_sync_root_facet_requires_enabled_root() {
        let binding = Binding::Facet(facets::SYNC_ROOT.to_string());
        let mut d = doc();
        d.subscribe(&Principal::new("alice".to_string()).unwrap(), Utc::now());

        assert!(binding.matches(&d, &ctx("alice")));
        assert!(!binding.matches(&d, &ctx("bob")));
        assert!(binding.matches(&d, &ctx("bob").with_relaxed_roots(true)));
    }
}
