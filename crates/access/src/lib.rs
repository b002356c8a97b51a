//! Access control for the notifications push stream.
//!
//! Three concerns live here, all fronting the API gateway or the policy
//! engine on behalf of the push pipeline:
//!
//! - [`KeyProcessor`] validates subscriber API keys against the gateway and
//!   surfaces the gateway's verdict as a [`KeyErr`] carrying the HTTP status
//!   to mirror back to the client.
//! - [`PolicyProcessor`] fetches the x-policies attached to an API key and
//!   folds them into [`SubscriptionOptions`].
//! - [`AccessEvaluator`] answers whether a notification may be delivered to
//!   standard consumers, given an [`AccessQuery`] describing the content.
//!
//! API keys are never logged in full; only the last ten characters appear in
//! log fields.

mod evaluator;
mod key;
mod policy;

pub use evaluator::{AccessEvaluator, AccessQuery, EvaluatorError, PolicyDecision, RuleTableEvaluator};
pub use key::{KeyErr, KeyProcessor};
pub use policy::{PolicyErr, PolicyProcessor, SubscriptionOptions};

pub(crate) const API_KEY_HEADER: &str = "X-Api-Key";
pub(crate) const KEY_SUFFIX_LEN: usize = 10;

/// Returns the loggable tail of an API key.
pub(crate) fn key_suffix(key: &str) -> &str {
    match key.char_indices().rev().nth(KEY_SUFFIX_LEN - 1) {
        Some((i, _)) => &key[i..],
        None => key,
    }
}
