use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(FrameworkId);
define_id_type!(SlaveId);
define_id_type!(OfferId);
define_id_type!(TaskId);
define_id_type!(ExecutorId);

/// A generator for identifiers that are unique within a master incarnation.
/// The prefix carries the incarnation so that identifiers from different
/// masters never collide.
#[derive(Debug)]
pub struct IdGenerator<T: From<String>> {
    prefix: String,
    next_value: u64,
    phantom: PhantomData<T>,
}

impl<T: From<String>> IdGenerator<T> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_value: 0,
            phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> T {
        let value = format!("{}{:04}", self.prefix, self.next_value);
        self.next_value += 1;
        T::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generator_is_sequential() {
        let mut generator = IdGenerator::<FrameworkId>::new("202608011234-F");
        assert_eq!(generator.next().as_str(), "202608011234-F0000");
        assert_eq!(generator.next().as_str(), "202608011234-F0001");
    }

    #[test]
    fn test_id_ordering_is_lexicographic() {
        let a = FrameworkId::from("m-F0001");
        let b = FrameworkId::from("m-F0002");
        assert!(a < b);
        assert_eq!(a, FrameworkId::from("m-F0001"));
    }
}
