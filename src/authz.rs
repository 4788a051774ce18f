//! Ownership authorization.
//!
//! A resource may be mutated only by the account that owns it. The same
//! predicate drives the client's edit/delete affordances and the server's
//! mutation endpoints; only the server-side check is a security boundary.
//!
//! Ownership matches on account id, falling back to email for identity
//! snapshots that were captured before the id format changed.

use crate::credentials::normalize_email;
use crate::error::AppError;

/// Anything that names an account: a caller's identity or a resource owner.
pub trait Principal {
    fn principal_id(&self) -> &str;
    fn principal_email(&self) -> &str;
}

/// Whether `caller` may edit or delete a resource owned by `owner`.
pub fn can_mutate<O, C>(owner: &O, caller: Option<&C>) -> bool
where
    O: Principal + ?Sized,
    C: Principal + ?Sized,
{
    let Some(caller) = caller else {
        return false;
    };

    let same_id = !caller.principal_id().is_empty()
        && caller.principal_id() == owner.principal_id();

    let caller_email = normalize_email(caller.principal_email());
    let same_email =
        !caller_email.is_empty() && caller_email == normalize_email(owner.principal_email());

    same_id || same_email
}

/// Server-side gate in front of every mutation.
pub fn ensure_can_mutate<O, C>(owner: &O, caller: &C) -> Result<(), AppError>
where
    O: Principal + ?Sized,
    C: Principal + ?Sized,
{
    if can_mutate(owner, Some(caller)) {
        Ok(())
    } else {
        tracing::warn!(
            caller_id = caller.principal_id(),
            owner_id = owner.principal_id(),
            "ownership check failed"
        );
        Err(AppError::Forbidden(
            "Not authorized to modify this post".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Who(&'static str, &'static str);

    impl Principal for Who {
        fn principal_id(&self) -> &str {
            self.0
        }

        fn principal_email(&self) -> &str {
            self.1
        }
    }

    const OWNER: Who = Who("a1", "ada@x.com");

    #[test]
    fn owner_by_id() {
        assert!(can_mutate(&OWNER, Some(&Who("a1", "other@x.com"))));
    }

    #[test]
    fn owner_by_email_fallback() {
        assert!(can_mutate(&OWNER, Some(&Who("legacy-id", "ada@x.com"))));
        assert!(can_mutate(&OWNER, Some(&Who("legacy-id", "ADA@x.com"))));
    }

    #[test]
    fn email_fallback_folds_case_like_registration() {
        let owner = Who("a1", "åsa@x.com");
        assert!(can_mutate(&owner, Some(&Who("legacy-id", "ÅSA@X.COM"))));
        assert!(can_mutate(&owner, Some(&Who("legacy-id", " åsa@x.com "))));
    }

    #[test]
    fn stranger_is_refused() {
        assert!(!can_mutate(&OWNER, Some(&Who("b2", "bob@x.com"))));
    }

    #[test]
    fn anonymous_is_refused() {
        assert!(!can_mutate::<Who, Who>(&OWNER, None));
    }

    #[test]
    fn empty_fields_never_match() {
        let blank_owner = Who("", "");
        assert!(!can_mutate(&blank_owner, Some(&Who("", ""))));
    }

    #[test]
    fn ensure_maps_to_forbidden() {
        assert!(ensure_can_mutate(&OWNER, &Who("a1", "ada@x.com")).is_ok());
        let err = ensure_can_mutate(&OWNER, &Who("b2", "bob@x.com")).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
