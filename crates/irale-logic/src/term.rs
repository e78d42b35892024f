//! Terms: variables and constants, with optional nominal types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Name of the distinguished wildcard variable that compares equal to every
/// variable.
pub const ANY_VAR: &str = "ANY";

/// A nominal type with an optional parent.
///
/// Type subsumption follows the parent chain: a type subsumes itself and
/// every type whose ancestry reaches it. The *absent* type (modelled as
/// `None` at use sites) subsumes everything; nothing subsumes it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermType {
    pub name: String,
    pub parent: Option<Arc<TermType>>,
}

impl TermType {
    pub fn new(name: impl Into<String>) -> Self {
        TermType {
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_parent(name: impl Into<String>, parent: Arc<TermType>) -> Self {
        TermType {
            name: name.into(),
            parent: Some(parent),
        }
    }

    /// Does `self` subsume `other`? True when the names match or some
    /// ancestor of `other` matches.
    pub fn subsumes(&self, other: &TermType) -> bool {
        self.name == other.name
            || other
                .parent
                .as_deref()
                .map(|p| self.subsumes(p))
                .unwrap_or(false)
    }

    /// Subsumption lifted to optional types: the absent type subsumes
    /// everything, and only the absent type subsumes an absent type.
    pub fn type_subsumes(a: Option<&Arc<TermType>>, b: Option<&Arc<TermType>>) -> bool {
        match (a, b) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a.subsumes(b),
        }
    }

    /// Walk to the root of the parent chain.
    pub fn most_general(ty: &Arc<TermType>) -> Arc<TermType> {
        match &ty.parent {
            Some(parent) => Self::most_general(parent),
            None => Arc::clone(ty),
        }
    }
}

/// A term is either a variable or a constant, optionally typed.
///
/// Equality is by name, with one exception: the wildcard variable
/// [`ANY_VAR`] compares equal to every variable. The total order used for
/// canonicalisation is by name alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Term {
    Var {
        name: String,
        ty: Option<Arc<TermType>>,
    },
    Const {
        name: String,
        ty: Option<Arc<TermType>>,
    },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var {
            name: name.into(),
            ty: None,
        }
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Term::Const {
            name: name.into(),
            ty: None,
        }
    }

    pub fn typed_var(name: impl Into<String>, ty: Arc<TermType>) -> Self {
        Term::Var {
            name: name.into(),
            ty: Some(ty),
        }
    }

    pub fn typed_const(name: impl Into<String>, ty: Arc<TermType>) -> Self {
        Term::Const {
            name: name.into(),
            ty: Some(ty),
        }
    }

    /// The wildcard variable.
    pub fn any() -> Self {
        Term::var(ANY_VAR)
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Var { name, .. } | Term::Const { name, .. } => name,
        }
    }

    pub fn ty(&self) -> Option<&Arc<TermType>> {
        match self {
            Term::Var { ty, .. } | Term::Const { ty, .. } => ty.as_ref(),
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var { .. })
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Term::Const { .. })
    }

    /// Rebuild this term with a different type annotation.
    pub fn with_type(&self, ty: Option<Arc<TermType>>) -> Self {
        match self {
            Term::Var { name, .. } => Term::Var {
                name: name.clone(),
                ty,
            },
            Term::Const { name, .. } => Term::Const {
                name: name.clone(),
                ty,
            },
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        if self.name() == other.name() {
            return true;
        }
        // The wildcard matches any variable.
        self.is_var() && other.is_var() && (self.name() == ANY_VAR || other.name() == ANY_VAR)
    }
}

impl Eq for Term {}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_subsumption_walks_parents() {
        let object = Arc::new(TermType::new("object"));
        let block = Arc::new(TermType::with_parent("block", Arc::clone(&object)));
        let small = Arc::new(TermType::with_parent("small-block", Arc::clone(&block)));

        assert!(object.subsumes(&block));
        assert!(object.subsumes(&small));
        assert!(block.subsumes(&small));
        assert!(!block.subsumes(&object));
        assert!(!small.subsumes(&block));
        assert!(object.subsumes(&object));
    }

    #[test]
    fn absent_type_subsumes_everything() {
        let block = Arc::new(TermType::new("block"));
        assert!(TermType::type_subsumes(None, Some(&block)));
        assert!(TermType::type_subsumes(None, None));
        assert!(!TermType::type_subsumes(Some(&block), None));
    }

    #[test]
    fn most_general_type_is_the_root() {
        let object = Arc::new(TermType::new("object"));
        let block = Arc::new(TermType::with_parent("block", Arc::clone(&object)));
        assert_eq!(TermType::most_general(&block).name, "object");
        assert_eq!(TermType::most_general(&object).name, "object");
    }

    #[test]
    fn term_equality_is_by_name() {
        assert_eq!(Term::var("x"), Term::var("x"));
        assert_ne!(Term::var("x"), Term::var("y"));
        // A constant and a variable of the same name compare equal by name.
        assert_eq!(Term::var("a"), Term::constant("a"));
    }

    #[test]
    fn any_matches_every_variable() {
        assert_eq!(Term::any(), Term::var("x"));
        assert_eq!(Term::var("x"), Term::any());
        assert_ne!(Term::any(), Term::constant("a"));
    }

    #[test]
    fn terms_order_by_name() {
        let mut terms = vec![Term::var("z"), Term::constant("a"), Term::var("m")];
        terms.sort();
        let names: Vec<&str> = terms.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }
}
