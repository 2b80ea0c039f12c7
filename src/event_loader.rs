//! Selects the next batch of processable events from EventDB using precise
//! query predicates, in five-category precedence order (SPEC_FULL §4.6).
//!
//! Grounded on `event_db.rs`'s `all_events()`/`get_file()` read path; this
//! module adds no storage of its own, it only orders and filters what
//! EventDb already holds.

use std::collections::HashSet;

use crate::event_db::EventDb;
use crate::types::{Direction, Event, EventType, RowId};

/// Per-category cap. The per-cycle total is bounded by this times the number
/// of categories that actually contribute events.
pub const EVENTS_QUERY_LIMIT: usize = 100;

/// An event batch ready for strategy dispatch, still in precedence order.
#[derive(Debug, Default)]
pub struct LoadedBatch {
	pub events: Vec<Event>,
	/// (file_id, last_event_id) pairs whose trailing delete chain was
	/// fast-forwarded instead of applied event-by-event.
	pub fast_forwarded: Vec<(RowId, RowId)>,
}

/// Selects events from EventDB in the five-category precedence order,
/// excluding files already in flight.
pub struct EventLoader<'a> {
	db: &'a EventDb,
}

impl<'a> EventLoader<'a> {
	pub fn new(db: &'a EventDb) -> Self {
		EventLoader { db }
	}

	fn parent_applied(&self, event: &Event) -> bool {
		match event.folder_uuid {
			None => true,
			Some(uuid) => self.db.find_file_by_uuid(uuid).map(|f| f.event_id.is_some()).unwrap_or(false),
		}
	}

	/// Load the next batch, excluding any event whose `file_id` is in
	/// `in_flight`. `local_limit`/`remote_limit` bound how many
	/// locally-originated/remotely-originated events end up in the final
	/// merged batch, after the five categories are evaluated in precedence
	/// order.
	pub fn load_batch(&self, local_limit: usize, remote_limit: usize, in_flight: &HashSet<RowId>) -> LoadedBatch {
		let all: Vec<Event> =
			self.db.all_events().unwrap_or_default().into_iter().filter(|e| !in_flight.contains(&e.file_id)).collect();

		// Category 1: folder creation/movement events whose parents are
		// already applied. These unblock their descendants, so they load
		// first in every cycle regardless of what else is pending.
		let cat1: Vec<Event> = all
			.iter()
			.filter(|e| e.is_folder && matches!(e.event_type, EventType::Create | EventType::Move))
			.filter(|e| self.parent_applied(e))
			.take(EVENTS_QUERY_LIMIT)
			.cloned()
			.collect();

		// Category 3: remote creation (non-folder) events for files never
		// yet seen, smallest first.
		let mut cat3: Vec<Event> = all
			.iter()
			.filter(|e| e.direction() == Direction::Remote)
			.filter(|e| !e.is_folder && e.event_type == EventType::Create)
			.filter(|e| self.db.get_file(e.file_id).is_none())
			.cloned()
			.collect();
		cat3.sort_by_key(|e| e.file_size);
		cat3.truncate(EVENTS_QUERY_LIMIT);

		// Category 4: remote non-creation events for files already present.
		let cat4: Vec<Event> = all
			.iter()
			.filter(|e| e.direction() == Direction::Remote)
			.filter(|e| e.event_type != EventType::Create)
			.filter(|e| self.db.get_file(e.file_id).is_some())
			.take(EVENTS_QUERY_LIMIT)
			.cloned()
			.collect();

		// Category 2: folder deletion events. Loaded only when every other
		// category came back empty, since they are destructive and must not
		// race with descendant processing.
		let cat2: Vec<Event> = if cat1.is_empty() && cat3.is_empty() && cat4.is_empty() {
			all.iter()
				.filter(|e| e.is_folder && e.event_type == EventType::Delete)
				.take(EVENTS_QUERY_LIMIT)
				.cloned()
				.collect()
		} else {
			Vec::new()
		};

		// Category 5: "excluded events" -- events previously held back
		// (flags.checked == true, meaning the loader examined and deferred
		// them) whose target file is no longer excluded, because a folder
		// moved out of the selective-sync exclusion list since the last
		// pass.
		let cat5: Vec<Event> = all
			.iter()
			.filter(|e| e.flags.checked)
			.filter(|e| self.db.get_file(e.file_id).map(|f| !f.excluded).unwrap_or(false))
			.take(EVENTS_QUERY_LIMIT)
			.cloned()
			.collect();

		let mut merged = Vec::new();
		merged.extend(cat1);
		merged.extend(cat2);
		merged.extend(cat3);
		merged.extend(cat4);
		merged.extend(cat5);

		let mut local_count = 0usize;
		let mut remote_count = 0usize;
		let mut events = Vec::with_capacity(merged.len());
		for event in merged {
			match event.direction() {
				Direction::Local => {
					if local_count >= local_limit {
						continue;
					}
					local_count += 1;
				}
				Direction::Remote => {
					if remote_count >= remote_limit {
						continue;
					}
					remote_count += 1;
				}
			}
			events.push(event);
		}

		let fast_forwarded = self.find_fast_forwardable_deletes(in_flight);
		LoadedBatch { events, fast_forwarded }
	}

	/// Identify files whose only remaining events are a trailing run of
	/// delete events, so the caller can fast-forward `last_skipped_event_id`
	/// instead of starving the loader applying each one individually.
	fn find_fast_forwardable_deletes(&self, in_flight: &HashSet<RowId>) -> Vec<(RowId, RowId)> {
		let all = self.db.all_events().unwrap_or_default();
		let mut by_file: std::collections::BTreeMap<RowId, Vec<Event>> = std::collections::BTreeMap::new();
		for event in all {
			by_file.entry(event.file_id).or_default().push(event);
		}
		let mut out = Vec::new();
		for (file_id, mut events) in by_file {
			if in_flight.contains(&file_id) {
				continue;
			}
			events.sort_by_key(|e| e.id);
			let trailing_deletes: Vec<&Event> =
				events.iter().rev().take_while(|e| e.event_type == EventType::Delete).collect();
			if trailing_deletes.len() >= 2 {
				// Skip straight to the last delete; the intermediate ones
				// never need to be individually applied.
				if let Some(last) = trailing_deletes.first() {
					out.push((file_id, last.id));
				}
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{EventFlags, EventState, File};
	use tempfile::TempDir;
	use uuid::Uuid;

	fn open_db() -> (TempDir, EventDb) {
		let tmp = TempDir::new().unwrap();
		let db = EventDb::open(&tmp.path().join("events.redb")).unwrap();
		(tmp, db)
	}

	fn base_event(id: RowId, file_id: RowId, event_type: EventType, state: EventState) -> Event {
		Event {
			id,
			file_id,
			uuid: Uuid::new_v4(),
			server_event_id: id as i64,
			is_dummy: false,
			event_type,
			is_folder: false,
			file_name: "f".into(),
			file_name_before_event: None,
			file_size: 100,
			file_size_before_event: None,
			file_hash: Some("H".into()),
			file_hash_before_event: None,
			folder_uuid: None,
			diff_file_uuid: None,
			diff_file_size: None,
			rev_diff_file_uuid: None,
			rev_diff_file_size: None,
			last_event_id: None,
			state,
			timestamp: 1,
			flags: EventFlags::default(),
		}
	}

	#[test]
	fn remote_creates_sort_smallest_first() {
		let (_tmp, db) = open_db();
		let mut e1 = base_event(1, 10, EventType::Create, EventState::Received);
		e1.file_size = 500;
		let mut e2 = base_event(2, 20, EventType::Create, EventState::Received);
		e2.file_size = 50;
		db.put_events_atomic(&[e1, e2]).unwrap();

		let loader = EventLoader::new(&db);
		let batch = loader.load_batch(100, 100, &HashSet::new());
		assert_eq!(batch.events[0].file_id, 20);
		assert_eq!(batch.events[1].file_id, 10);
	}

	#[test]
	fn folder_creates_load_before_remote_updates() {
		let (_tmp, db) = open_db();
		let mut root = File::root(1, "");
		db.put_file(&mut_root(&mut root)).unwrap();

		let mut folder_event = base_event(1, 2, EventType::Create, EventState::Received);
		folder_event.is_folder = true;
		folder_event.folder_uuid = None;

		let existing_file = File::root(3, "x.txt");
		db.put_file(&existing_file).unwrap();
		let mut update_event = base_event(2, 3, EventType::Update, EventState::Received);
		update_event.is_folder = false;

		db.put_events_atomic(&[folder_event, update_event]).unwrap();

		let loader = EventLoader::new(&db);
		let batch = loader.load_batch(100, 100, &HashSet::new());
		assert_eq!(batch.events[0].file_id, 2);
	}

	fn mut_root(f: &mut File) -> File {
		f.clone()
	}

	#[test]
	fn in_flight_files_are_excluded() {
		let (_tmp, db) = open_db();
		let e = base_event(1, 10, EventType::Create, EventState::Received);
		db.put_events_atomic(&[e]).unwrap();

		let loader = EventLoader::new(&db);
		let mut in_flight = HashSet::new();
		in_flight.insert(10u64);
		let batch = loader.load_batch(100, 100, &in_flight);
		assert!(batch.events.is_empty());
	}

	#[test]
	fn folder_deletes_only_load_when_nothing_else_pending() {
		let (_tmp, db) = open_db();
		let mut folder_delete = base_event(1, 1, EventType::Delete, EventState::Received);
		folder_delete.is_folder = true;
		let mut update = base_event(2, 2, EventType::Update, EventState::Received);
		let existing = File::root(2, "x.txt");
		db.put_file(&existing).unwrap();
		update.is_folder = false;
		db.put_events_atomic(&[folder_delete.clone(), update]).unwrap();

		let loader = EventLoader::new(&db);
		let batch = loader.load_batch(100, 100, &HashSet::new());
		assert!(batch.events.iter().all(|e| e.id != 1));

		// With nothing else pending, the folder delete surfaces.
		let (_tmp2, db2) = open_db();
		db2.put_events_atomic(&[folder_delete]).unwrap();
		let loader2 = EventLoader::new(&db2);
		let batch2 = loader2.load_batch(100, 100, &HashSet::new());
		assert_eq!(batch2.events.len(), 1);
	}

	#[test]
	fn fast_forward_detects_trailing_delete_chain() {
		let (_tmp, db) = open_db();
		let e1 = base_event(1, 5, EventType::Create, EventState::Received);
		let e2 = base_event(2, 5, EventType::Delete, EventState::Received);
		let e3 = base_event(3, 5, EventType::Delete, EventState::Received);
		db.put_events_atomic(&[e1, e2, e3]).unwrap();

		let loader = EventLoader::new(&db);
		let batch = loader.load_batch(100, 100, &HashSet::new());
		assert_eq!(batch.fast_forwarded, vec![(5, 3)]);
	}
}

// vim: ts=4
