//! Ordered "first success wins" evaluation.
//!
//! Format detection and connection probing both try several approaches in
//! a fixed order. The order is data ([`Strategy`] lists), so it can be
//! documented and asserted in tests instead of living in nested fallbacks.

/// One named attempt.
pub struct Strategy<I: ?Sized, T, E> {
    /// Name reported in logs and in [`Attempts`].
    pub name: &'static str,
    /// The attempt itself.
    pub run: fn(&I) -> Result<T, E>,
}

impl<I: ?Sized, T, E> Clone for Strategy<I, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: ?Sized, T, E> Copy for Strategy<I, T, E> {}

/// Every failed attempt, in evaluation order.
#[derive(Debug)]
pub struct Attempts<E> {
    /// `(strategy name, error)` pairs.
    pub failures: Vec<(&'static str, E)>,
}

impl<E> Attempts<E> {
    /// The error of the last strategy tried, if any ran.
    #[must_use]
    pub fn last(&self) -> Option<&E> {
        self.failures.last().map(|(_, e)| e)
    }

    /// The error of the last strategy tried, consuming the list.
    #[must_use]
    pub fn into_last(self) -> Option<E> {
        self.failures.into_iter().next_back().map(|(_, e)| e)
    }
}

/// Run `strategies` in order against `input`; return the first success
/// together with the name of the strategy that produced it.
///
/// # Errors
///
/// Returns every failure when no strategy succeeds (an empty list yields
/// an empty [`Attempts`]).
pub fn first_success<I: ?Sized, T, E>(
    input: &I,
    strategies: &[Strategy<I, T, E>],
) -> Result<(&'static str, T), Attempts<E>> {
    let mut failures = Vec::new();
    for strategy in strategies {
        match (strategy.run)(input) {
            Ok(value) => return Ok((strategy.name, value)),
            Err(e) => failures.push((strategy.name, e)),
        }
    }
    Err(Attempts { failures })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even(n: &u32) -> Result<&'static str, String> {
        if n % 2 == 0 {
            Ok("even")
        } else {
            Err(format!("{n} is odd"))
        }
    }

    fn small(n: &u32) -> Result<&'static str, String> {
        if *n < 10 {
            Ok("small")
        } else {
            Err(format!("{n} is large"))
        }
    }

    const ORDER: [Strategy<u32, &'static str, String>; 2] = [
        Strategy { name: "even", run: even },
        Strategy { name: "small", run: small },
    ];

    #[test]
    fn earlier_strategy_wins() {
        assert_eq!(first_success(&4, &ORDER).unwrap(), ("even", "even"));
        assert_eq!(first_success(&3, &ORDER).unwrap(), ("small", "small"));
    }

    #[test]
    fn all_failures_are_reported_in_order() {
        let attempts = first_success(&11, &ORDER).unwrap_err();
        let names: Vec<_> = attempts.failures.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["even", "small"]);
        assert_eq!(attempts.last().unwrap(), "11 is large");
    }

    #[test]
    fn empty_list_fails_without_errors() {
        let attempts = first_success::<u32, (), String>(&1, &[]).unwrap_err();
        assert!(attempts.failures.is_empty());
        assert!(attempts.into_last().is_none());
    }
}
