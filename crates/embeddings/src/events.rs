//! Observer lists for controller change events.
//!
//! Dispatch is synchronous and happens at well-defined transition points;
//! callbacks receive no payload and are expected to pull fresh state from
//! the controller. Registration is explicit: dropping the returned
//! [`Subscription`] removes the callback.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;

type Callback = Arc<dyn Fn() + Send + Sync>;
type Registry = Mutex<Slab<Callback>>;

/// A list of callbacks fired in registration order.
#[derive(Default)]
pub(crate) struct Observers {
	inner: Arc<Registry>,
}

impl Observers {
	/// Register `callback` for as long as the returned handle is alive.
	pub(crate) fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
		let key = self.inner.lock().insert(Arc::new(callback));
		Subscription { registry: Arc::downgrade(&self.inner), key }
	}

	/// Invoke every registered callback.
	///
	/// Callbacks run outside the registry lock, so they may subscribe or
	/// unsubscribe freely. A callback that unsubscribes during an emit can
	/// still see that emit complete.
	pub(crate) fn emit(&self) {
		let snapshot: Vec<Callback> = self.inner.lock().iter().map(|(_, cb)| cb.clone()).collect();
		for callback in snapshot {
			callback();
		}
	}
}

/// Handle to a registered observer.
#[must_use = "dropping a subscription removes its callback"]
pub struct Subscription {
	registry: Weak<Registry>,
	key: usize,
}

impl Subscription {
	/// Remove the callback now instead of at drop time.
	pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			let mut slab = registry.lock();
			if slab.contains(self.key) {
				slab.remove(self.key);
			}
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("key", &self.key).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn callbacks_fire_until_unsubscribed() {
		let observers = Observers::default();
		let hits = Arc::new(AtomicUsize::new(0));

		let hits_a = hits.clone();
		let sub_a = observers.subscribe(move || {
			hits_a.fetch_add(1, Ordering::SeqCst);
		});
		let hits_b = hits.clone();
		let sub_b = observers.subscribe(move || {
			hits_b.fetch_add(1, Ordering::SeqCst);
		});

		observers.emit();
		assert_eq!(hits.load(Ordering::SeqCst), 2);

		sub_a.unsubscribe();
		observers.emit();
		assert_eq!(hits.load(Ordering::SeqCst), 3);

		drop(sub_b);
		observers.emit();
		assert_eq!(hits.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn emit_survives_subscribing_from_a_callback() {
		let observers = Arc::new(Observers::default());
		let stash: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

		let reentrant = observers.clone();
		let stash_from_cb = stash.clone();
		let _sub = observers.subscribe(move || {
			stash_from_cb.lock().push(reentrant.subscribe(|| {}));
		});

		observers.emit();
		assert_eq!(stash.lock().len(), 1);
		observers.emit();
		assert_eq!(stash.lock().len(), 2);
	}

	#[test]
	fn dropping_a_subscription_after_the_list_is_gone_is_harmless() {
		let observers = Observers::default();
		let sub = observers.subscribe(|| {});
		drop(observers);
		drop(sub);
	}
}
