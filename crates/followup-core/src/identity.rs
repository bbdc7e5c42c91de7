//! The identity registry boundary used to confirm identity merges.

use std::future::Future;

use crate::ident::PersonIdent;

/// Answers whether an identity is the person's current one.
pub trait IdentityRegistry: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `true` if `ident` is the active identity of its person, `false` if the
  /// registry knows it only as a retired identity.
  fn is_active<'a>(
    &'a self,
    ident: &'a PersonIdent,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
