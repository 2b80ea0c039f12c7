//! Content-addressed storage of whole-file copies and binary patches.
//!
//! Two independent refcounted maps with identical discipline: `copies: hash
//! -> refcount` and `patches: patch_id -> (refcount, size, kind, active)`.
//! Refcounts are held in memory for fast reads and mirrored into redb tables
//! so they survive a restart without a directory rescan (grounded on
//! cache.rs's ChildCache table pattern).

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::ContentStoreError;
use crate::logging::*;

const COPIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("copies");
const PATCHES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("patches");

/// Direct (old->new) or reverse (new->old) binary delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchKind {
	Direct,
	Reverse,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CopyRecord {
	refcount: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PatchRecord {
	refcount: i64,
	new_hash: String,
	old_hash: String,
	size: u64,
	kind: PatchKind,
	active: bool,
}

/// A staged mutation, recorded while a batch is `postponed` and materialized
/// by `commit_last_changes()` or discarded by `clear_last_changes()`.
#[derive(Clone, Debug)]
enum PendingChange {
	CopyDelta { hash: String, delta: i64 },
	PatchUpsert { patch_id: String, record: PatchRecordDelta },
}

#[derive(Clone, Debug)]
struct PatchRecordDelta {
	delta: i64,
	new_hash: String,
	old_hash: String,
	size: u64,
	kind: PatchKind,
	active: bool,
}

struct Inner {
	copies: HashMap<String, i64>,
	patches: HashMap<String, PatchRecord>,
	pending: Vec<PendingChange>,
}

/// Content-addressed store of copies and patches, refcounted, with a
/// two-phase postponed-commit discipline (SPEC_FULL §4.1).
pub struct ContentStore {
	db: Database,
	inner: Mutex<Inner>,
}

impl ContentStore {
	pub fn open(db_path: &Path) -> Result<Self, ContentStoreError> {
		let db = Database::create(db_path)
			.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;

		let mut copies = HashMap::new();
		let mut patches = HashMap::new();
		{
			let write_txn =
				db.begin_write().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
			{
				let table = write_txn
					.open_table(COPIES_TABLE)
					.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
				let mut iter =
					table.iter().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
				while let Some(Ok((k, v))) = iter.next() {
					if let Ok(rec) = bincode::deserialize::<CopyRecord>(v.value()) {
						copies.insert(k.value().to_string(), rec.refcount);
					}
				}
			}
			{
				let table = write_txn
					.open_table(PATCHES_TABLE)
					.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
				let mut iter =
					table.iter().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
				while let Some(Ok((k, v))) = iter.next() {
					if let Ok(rec) = bincode::deserialize::<PatchRecord>(v.value()) {
						patches.insert(k.value().to_string(), rec);
					}
				}
			}
			write_txn.commit().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		}

		Ok(ContentStore { db, inner: Mutex::new(Inner { copies, patches, pending: Vec::new() }) })
	}

	/// Increment the refcount for `hash`. When `postponed`, the mutation is
	/// staged and only becomes visible after `commit_last_changes()`.
	pub fn add_copy_reference(&self, hash: &str, reason: &str, postponed: bool) {
		debug!(hash, reason, postponed, "add_copy_reference");
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		if postponed {
			inner.pending.push(PendingChange::CopyDelta { hash: hash.to_string(), delta: 1 });
		} else {
			*inner.copies.entry(hash.to_string()).or_insert(0) += 1;
			let _ = self.persist_copy(hash, inner.copies[hash]);
		}
	}

	/// Decrement the refcount for `hash`. An attempted decrement at zero is
	/// logged, never treated as an error: the store never refuses a caller.
	pub fn remove_copy_reference(&self, hash: &str, reason: &str, postponed: bool) {
		debug!(hash, reason, postponed, "remove_copy_reference");
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		if postponed {
			inner.pending.push(PendingChange::CopyDelta { hash: hash.to_string(), delta: -1 });
		} else {
			let entry = inner.copies.entry(hash.to_string()).or_insert(0);
			if *entry == 0 {
				warn!(hash, "refcount decrement at zero");
			} else {
				*entry -= 1;
			}
			let new_val = inner.copies[hash];
			let _ = self.persist_copy(hash, new_val);
		}
	}

	#[allow(clippy::too_many_arguments)]
	pub fn add_direct_patch(
		&self,
		patch_id: &str,
		new_hash: &str,
		old_hash: &str,
		size: u64,
		active: bool,
		reason: &str,
		postponed: bool,
	) {
		self.add_patch(patch_id, new_hash, old_hash, size, PatchKind::Direct, active, reason, postponed)
	}

	#[allow(clippy::too_many_arguments)]
	pub fn add_reverse_patch(
		&self,
		patch_id: &str,
		new_hash: &str,
		old_hash: &str,
		size: u64,
		active: bool,
		reason: &str,
		postponed: bool,
	) {
		self.add_patch(
			patch_id,
			new_hash,
			old_hash,
			size,
			PatchKind::Reverse,
			active,
			reason,
			postponed,
		)
	}

	#[allow(clippy::too_many_arguments)]
	fn add_patch(
		&self,
		patch_id: &str,
		new_hash: &str,
		old_hash: &str,
		size: u64,
		kind: PatchKind,
		active: bool,
		reason: &str,
		postponed: bool,
	) {
		debug!(patch_id, reason, postponed, ?kind, "add_patch");
		let delta = PatchRecordDelta {
			delta: 1,
			new_hash: new_hash.to_string(),
			old_hash: old_hash.to_string(),
			size,
			kind,
			active,
		};
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		if postponed {
			inner.pending.push(PendingChange::PatchUpsert { patch_id: patch_id.to_string(), record: delta });
		} else {
			Self::apply_patch_delta(&mut inner.patches, patch_id, delta);
			if let Some(rec) = inner.patches.get(patch_id).cloned() {
				let _ = self.persist_patch(patch_id, &rec);
			}
		}
	}

	fn apply_patch_delta(patches: &mut HashMap<String, PatchRecord>, patch_id: &str, delta: PatchRecordDelta) {
		let entry = patches.entry(patch_id.to_string()).or_insert_with(|| PatchRecord {
			refcount: 0,
			new_hash: delta.new_hash.clone(),
			old_hash: delta.old_hash.clone(),
			size: delta.size,
			kind: delta.kind,
			active: delta.active,
		});
		entry.refcount += delta.delta;
		if entry.refcount < 0 {
			entry.refcount = 0;
		}
		entry.active = entry.active || delta.active;
	}

	/// Transition an inactive patch (metadata-only) to active (awaiting
	/// download).
	pub fn activate_patch(&self, patch_id: &str) -> Result<(), ContentStoreError> {
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		let rec = inner
			.patches
			.get_mut(patch_id)
			.ok_or_else(|| ContentStoreError::UnknownPatch { patch_id: patch_id.to_string() })?;
		rec.active = true;
		let rec = rec.clone();
		self.persist_patch(patch_id, &rec)
	}

	/// Scan for expired or unreferenced patches. Returns the ids evicted.
	pub fn check_patches(&self) -> Vec<String> {
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		let dead: Vec<String> =
			inner.patches.iter().filter(|(_, r)| r.refcount <= 0).map(|(k, _)| k.clone()).collect();
		for id in &dead {
			inner.patches.remove(id);
			let _ = self.delete_patch(id);
		}
		dead
	}

	pub fn copy_exists(&self, hash: &str) -> bool {
		let inner = self.inner.lock().expect("content store mutex poisoned");
		inner.copies.get(hash).map(|c| *c > 0).unwrap_or(false)
	}

	pub fn patch_exists(&self, patch_id: &str) -> bool {
		let inner = self.inner.lock().expect("content store mutex poisoned");
		inner.patches.contains_key(patch_id)
	}

	pub fn refcount(&self, hash: &str) -> i64 {
		let inner = self.inner.lock().expect("content store mutex poisoned");
		*inner.copies.get(hash).unwrap_or(&0)
	}

	/// Materialize every change staged since the last commit/clear.
	pub fn commit_last_changes(&self) -> Result<(), ContentStoreError> {
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		if inner.pending.is_empty() {
			return Err(ContentStoreError::NoPendingBatch);
		}
		let pending = std::mem::take(&mut inner.pending);
		let mut touched_copies = Vec::new();
		let mut touched_patches = Vec::new();
		for change in pending {
			match change {
				PendingChange::CopyDelta { hash, delta } => {
					let entry = inner.copies.entry(hash.clone()).or_insert(0);
					*entry += delta;
					if *entry < 0 {
						warn!(hash = %hash, "refcount would go negative, clamped to zero");
						*entry = 0;
					}
					touched_copies.push((hash, *entry));
				}
				PendingChange::PatchUpsert { patch_id, record } => {
					Self::apply_patch_delta(&mut inner.patches, &patch_id, record);
					touched_patches.push(patch_id);
				}
			}
		}
		for (hash, count) in touched_copies {
			self.persist_copy(&hash, count)?;
		}
		for patch_id in touched_patches {
			if let Some(rec) = inner.patches.get(&patch_id).cloned() {
				self.persist_patch(&patch_id, &rec)?;
			}
		}
		Ok(())
	}

	/// Discard every change staged since the last commit/clear.
	pub fn clear_last_changes(&self) {
		let mut inner = self.inner.lock().expect("content store mutex poisoned");
		inner.pending.clear();
	}

	fn persist_copy(&self, hash: &str, refcount: i64) -> Result<(), ContentStoreError> {
		let bytes = bincode::serialize(&CopyRecord { refcount })
			.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		let write_txn =
			self.db.begin_write().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		{
			let mut table = write_txn
				.open_table(COPIES_TABLE)
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
			table
				.insert(hash, bytes.as_slice())
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })
	}

	fn persist_patch(&self, patch_id: &str, rec: &PatchRecord) -> Result<(), ContentStoreError> {
		let bytes =
			bincode::serialize(rec).map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		let write_txn =
			self.db.begin_write().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		{
			let mut table = write_txn
				.open_table(PATCHES_TABLE)
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
			table
				.insert(patch_id, bytes.as_slice())
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })
	}

	fn delete_patch(&self, patch_id: &str) -> Result<(), ContentStoreError> {
		let write_txn =
			self.db.begin_write().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		{
			let mut table = write_txn
				.open_table(PATCHES_TABLE)
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
			table
				.remove(patch_id)
				.map_err(|e| ContentStoreError::Storage { source: Box::new(e) })?;
		}
		write_txn.commit().map_err(|e| ContentStoreError::Storage { source: Box::new(e) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn open_store() -> (TempDir, ContentStore) {
		let tmp = TempDir::new().unwrap();
		let store = ContentStore::open(&tmp.path().join("content.redb")).unwrap();
		(tmp, store)
	}

	#[test]
	fn refcount_increments_and_decrements() {
		let (_tmp, store) = open_store();
		store.add_copy_reference("H1", "event 1", false);
		store.add_copy_reference("H1", "event 2", false);
		assert_eq!(store.refcount("H1"), 2);
		store.remove_copy_reference("H1", "event 1 erased", false);
		assert_eq!(store.refcount("H1"), 1);
		assert!(store.copy_exists("H1"));
	}

	#[test]
	fn decrement_at_zero_does_not_go_negative() {
		let (_tmp, store) = open_store();
		store.remove_copy_reference("missing", "spurious", false);
		assert_eq!(store.refcount("missing"), 0);
	}

	#[test]
	fn postponed_changes_require_explicit_commit() {
		let (_tmp, store) = open_store();
		store.add_copy_reference("H2", "batch", true);
		assert_eq!(store.refcount("H2"), 0);
		store.commit_last_changes().unwrap();
		assert_eq!(store.refcount("H2"), 1);
	}

	#[test]
	fn clear_last_changes_discards_pending_batch() {
		let (_tmp, store) = open_store();
		store.add_copy_reference("H3", "batch", true);
		store.clear_last_changes();
		assert_eq!(store.refcount("H3"), 0);
	}

	#[test]
	fn patch_activation_and_existence() {
		let (_tmp, store) = open_store();
		store.add_direct_patch("p1", "Hnew", "Hold", 1024, false, "diff", false);
		assert!(store.patch_exists("p1"));
		store.activate_patch("p1").unwrap();
	}

	#[test]
	fn commit_with_no_pending_batch_errors() {
		let (_tmp, store) = open_store();
		assert!(matches!(store.commit_last_changes(), Err(ContentStoreError::NoPendingBatch)));
	}

	#[test]
	fn refcounts_survive_reopen() {
		let tmp = TempDir::new().unwrap();
		let db_path = tmp.path().join("content.redb");
		{
			let store = ContentStore::open(&db_path).unwrap();
			store.add_copy_reference("H4", "persisted", false);
		}
		let reopened = ContentStore::open(&db_path).unwrap();
		assert_eq!(reopened.refcount("H4"), 1);
	}
}

// vim: ts=4
