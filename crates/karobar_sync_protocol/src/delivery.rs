//! Classification of Remote API responses.

use crate::task::Verb;

/// What a response means for the task that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx: the remote applied the mutation.
    Applied,
    /// 409: the remote already holds this entity.
    AlreadyApplied,
    /// 404 on DELETE: the entity is already gone.
    AlreadyGone,
    /// 5xx, 408 or 429: worth retrying unchanged.
    Transient,
    /// 401 or 403: the session was refused, not the payload.
    Unauthorized,
    /// Any other status: the remote refused the payload.
    Rejected,
}

impl Delivery {
    /// Whether the task can be removed from the queue.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Delivery::Applied | Delivery::AlreadyApplied | Delivery::AlreadyGone
        )
    }

    /// Whether the outcome counts toward dead-lettering.
    ///
    /// Only the payload's own fault counts; an expired session or an
    /// unavailable remote says nothing about the task.
    #[must_use]
    pub fn counts_as_rejection(self) -> bool {
        self == Delivery::Rejected
    }
}

/// Classifies `status` for a task of kind `verb`.
///
/// A 404 is only benign for DELETE; an UPDATE of an entity the remote has
/// never seen is a rejection. 401 and 403 concern the session and apply
/// to every task alike.
///
/// ```
/// use karobar_sync_protocol::{classify, Delivery, Verb};
///
/// assert_eq!(classify(Verb::Create, 201), Delivery::Applied);
/// assert_eq!(classify(Verb::Create, 409), Delivery::AlreadyApplied);
/// assert_eq!(classify(Verb::Delete, 404), Delivery::AlreadyGone);
/// assert_eq!(classify(Verb::Update, 404), Delivery::Rejected);
/// assert_eq!(classify(Verb::Update, 401), Delivery::Unauthorized);
/// ```
#[must_use]
pub fn classify(verb: Verb, status: u16) -> Delivery {
    match status {
        200..=299 => Delivery::Applied,
        409 => Delivery::AlreadyApplied,
        404 if verb == Verb::Delete => Delivery::AlreadyGone,
        401 | 403 => Delivery::Unauthorized,
        408 | 429 | 500..=599 => Delivery::Transient,
        _ => Delivery::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn verb_strategy() -> impl Strategy<Value = Verb> {
        prop_oneof![Just(Verb::Create), Just(Verb::Update), Just(Verb::Delete)]
    }

    #[test]
    fn not_found_depends_on_verb() {
        assert_eq!(classify(Verb::Delete, 404), Delivery::AlreadyGone);
        assert_eq!(classify(Verb::Create, 404), Delivery::Rejected);
        assert_eq!(classify(Verb::Update, 404), Delivery::Rejected);
    }

    #[test]
    fn transient_statuses_do_not_count() {
        for status in [408, 429, 500, 502, 503] {
            let d = classify(Verb::Update, status);
            assert_eq!(d, Delivery::Transient);
            assert!(!d.is_success());
            assert!(!d.counts_as_rejection());
        }
    }

    #[test]
    fn validation_failure_counts() {
        let d = classify(Verb::Create, 400);
        assert!(!d.is_success());
        assert!(d.counts_as_rejection());
        assert!(classify(Verb::Update, 422).counts_as_rejection());
    }

    #[test]
    fn refused_session_never_counts() {
        for verb in [Verb::Create, Verb::Update, Verb::Delete] {
            for status in [401, 403] {
                let d = classify(verb, status);
                assert_eq!(d, Delivery::Unauthorized);
                assert!(!d.is_success());
                assert!(!d.counts_as_rejection());
            }
        }
    }

    proptest! {
        #[test]
        fn every_2xx_is_applied(verb in verb_strategy(), status in 200u16..300) {
            prop_assert_eq!(classify(verb, status), Delivery::Applied);
        }

        #[test]
        fn conflict_is_success_for_any_verb(verb in verb_strategy()) {
            prop_assert!(classify(verb, 409).is_success());
        }

        #[test]
        fn success_and_rejection_are_exclusive(verb in verb_strategy(), status in 100u16..600) {
            let d = classify(verb, status);
            prop_assert!(!(d.is_success() && d.counts_as_rejection()));
        }
    }
}
