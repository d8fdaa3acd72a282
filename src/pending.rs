//! Outstanding forwarded-request tracking.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::route::ChildId;

/// The set of tagged ids for editor requests awaiting a child reply.
///
/// Membership decides whether a child response answers a forwarded editor
/// request (reverse the namespacing, forward to the editor) or a request
/// the proxy issued itself. Children that never reply leak their entry;
/// there is no sweep.
#[derive(Debug, Default)]
pub struct PendingRequests {
	inflight: Mutex<HashSet<i64>>,
}

impl PendingRequests {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Tags an editor-issued id for `child` and tracks it.
	pub fn track(&self, child: ChildId, editor_id: i64) -> i64 {
		let tagged = child.namespace(editor_id);
		self.inflight.lock().insert(tagged);
		tagged
	}

	/// Claims a reply id from `child`, yielding the original editor id if
	/// the request was forwarded by us. Each tracked id can be claimed once.
	pub fn claim(&self, child: ChildId, tagged: i64) -> Option<i64> {
		if self.inflight.lock().remove(&tagged) {
			Some(child.restore(tagged))
		} else {
			None
		}
	}

	/// Drops a tracked id without forwarding anything, e.g. when the child
	/// went away before replying.
	pub fn forget(&self, tagged: i64) {
		self.inflight.lock().remove(&tagged);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn track_then_claim_restores_editor_id() {
		let pending = PendingRequests::new();
		let tagged = pending.track(ChildId::Yaml, 42);
		assert_eq!(tagged, 1_000_042);
		assert_eq!(pending.claim(ChildId::Yaml, tagged), Some(42));
	}

	#[test]
	fn claim_is_one_shot() {
		let pending = PendingRequests::new();
		let tagged = pending.track(ChildId::Xml, 5);
		assert_eq!(pending.claim(ChildId::Xml, tagged), Some(5));
		assert_eq!(pending.claim(ChildId::Xml, tagged), None);
	}

	#[test]
	fn unknown_ids_are_not_claimed() {
		let pending = PendingRequests::new();
		assert_eq!(pending.claim(ChildId::Json, 2_000_001), None);
	}

	#[test]
	fn forget_removes_without_yielding() {
		let pending = PendingRequests::new();
		let tagged = pending.track(ChildId::Rome, 9);
		pending.forget(tagged);
		assert_eq!(pending.claim(ChildId::Rome, tagged), None);
	}
}
