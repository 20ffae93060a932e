//! Service lifetime definitions and the lifetime compatibility table.

use std::fmt;
use std::str::FromStr;

#[cfg(any(feature = "config", feature = "graph-export"))]
use serde::{Deserialize, Serialize};

/// Declared lifetime of a service.
///
/// Variant order is significant: the derived `Ord` is the lifetime order.
/// Lifetimes are ordered by how long an instance lives: a `Transient`
/// instance is created per request for it, a `Scoped` one lives as long as
/// its scope, and a `Singleton` lives as long as the root container.
///
/// # Examples
///
/// ```rust
/// use ferrous_di_verify::Lifetime;
///
/// assert!(Lifetime::Singleton.outlives(Lifetime::Scoped));
/// assert!(!Lifetime::Transient.outlives(Lifetime::Scoped));
/// assert_eq!("scoped".parse::<Lifetime>(), Ok(Lifetime::Scoped));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(feature = "config", feature = "graph-export"), derive(Serialize, Deserialize))]
pub enum Lifetime {
    /// New instance per resolution, never cached.
    Transient,
    /// Single instance per scope.
    Scoped,
    /// Single instance per root container, shared by every scope.
    Singleton,
}

impl Lifetime {
    /// Lifetime given to a service that carries markers but no explicit lifetime.
    pub const DEFAULT: Lifetime = Lifetime::Scoped;

    /// Returns true if instances of `self` live strictly longer than instances of `other`.
    pub fn outlives(self, other: Lifetime) -> bool {
        self > other
    }

    /// Lower-case name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Lifetime::Transient => "transient",
            Lifetime::Scoped => "scoped",
            Lifetime::Singleton => "singleton",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transient" => Ok(Lifetime::Transient),
            "scoped" => Ok(Lifetime::Scoped),
            "singleton" => Ok(Lifetime::Singleton),
            other => Err(format!("unknown lifetime '{}'", other)),
        }
    }
}

/// Outcome of checking one consumer → dependency lifetime pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeCompatibility {
    /// No violation.
    Compatible,
    /// A singleton captures a scoped instance beyond its scope.
    SingletonCapturesScoped,
    /// A singleton holds one transient instance forever.
    SingletonCapturesTransient,
}

/// Applies the lifetime rule table.
///
/// The table is directionally asymmetric: only a singleton consumer can
/// violate it. Scoped → Transient and every edge into a longer-lived
/// service are fine.
///
/// ```rust
/// use ferrous_di_verify::{check_lifetimes, Lifetime, LifetimeCompatibility};
///
/// assert_eq!(
///     check_lifetimes(Lifetime::Singleton, Lifetime::Scoped),
///     LifetimeCompatibility::SingletonCapturesScoped
/// );
/// assert_eq!(
///     check_lifetimes(Lifetime::Scoped, Lifetime::Singleton),
///     LifetimeCompatibility::Compatible
/// );
/// ```
pub const fn check_lifetimes(consumer: Lifetime, dependency: Lifetime) -> LifetimeCompatibility {
    match (consumer, dependency) {
        (Lifetime::Singleton, Lifetime::Scoped) => LifetimeCompatibility::SingletonCapturesScoped,
        (Lifetime::Singleton, Lifetime::Transient) => LifetimeCompatibility::SingletonCapturesTransient,
        _ => LifetimeCompatibility::Compatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlives_is_strict_lifetime_order() {
        use Lifetime::*;
        let all = [Transient, Scoped, Singleton];
        for (i, &longer) in all.iter().enumerate() {
            for (j, &shorter) in all.iter().enumerate() {
                assert_eq!(longer.outlives(shorter), i > j, "{} vs {}", longer, shorter);
            }
        }
        assert!(Singleton.outlives(Transient));
        assert!(!Scoped.outlives(Scoped));
    }

    #[test]
    fn rule_table_is_asymmetric() {
        use Lifetime::*;
        let all = [Transient, Scoped, Singleton];
        for consumer in all {
            for dependency in all {
                let result = check_lifetimes(consumer, dependency);
                match (consumer, dependency) {
                    (Singleton, Scoped) => assert_eq!(result, LifetimeCompatibility::SingletonCapturesScoped),
                    (Singleton, Transient) => assert_eq!(result, LifetimeCompatibility::SingletonCapturesTransient),
                    _ => assert_eq!(result, LifetimeCompatibility::Compatible),
                }
            }
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(" Singleton ".parse::<Lifetime>(), Ok(Lifetime::Singleton));
        assert!("forever".parse::<Lifetime>().is_err());
    }
}
