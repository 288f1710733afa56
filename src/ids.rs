//! Stable string identifiers for the three kinds of nodes in a constraint
//! graph: variables, methods, and constraints.
//!
//! Each id wraps an [`Arc<str>`] rather than a [`String`] so that the
//! graph, the planner's strength order, and method activation records can
//! all hold their own cheap clone of an id instead of fighting over
//! borrows.

use std::fmt;
use std::sync::Arc;

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl<S: Into<String>> From<S> for $name {
            fn from(s: S) -> Self {
                Self(Arc::from(s.into()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(VariableId, "The stable id of a variable.");
string_id!(MethodId, "The stable id of a method.");
string_id!(ConstraintId, "The stable id of a constraint.");

impl ConstraintId {
    /// The id of the implicit stay constraint for a variable.
    pub fn stay_of(variable: &VariableId) -> Self {
        Self(Arc::from(format!("_stay_{}", variable.as_str())))
    }
}
