//! Typed method bindings.
//!
//! Implementors are uninhabited marker types; the trait ties a wire method
//! name to its parameter and result payloads so callers never spell either
//! out by hand.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A request method.
pub trait Request {
	/// Wire method name.
	const METHOD: &'static str;
	/// Parameter payload.
	type Params: Serialize;
	/// Result payload of a successful response.
	type Result: DeserializeOwned;
}

/// A notification method.
pub trait Notification {
	/// Wire method name.
	const METHOD: &'static str;
	/// Parameter payload.
	type Params: Serialize + DeserializeOwned;
}
