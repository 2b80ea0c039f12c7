//! Integration tests exercising `EventStrategies` end to end against real
//! `EventDb`/`ContentStore` instances, through the public `CoordinatorClient`
//! trait boundary rather than the in-file fakes' direct field access.

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use syncr_p2p::coordinator_client::{CoordinatorClient, EventRegistration, RegisterResult};
use syncr_p2p::event_strategies::{ApplyOutcome, EventStrategies, RegisterOutcome};
use syncr_p2p::types::{Event, EventFlags, EventState, EventType, File};
use syncr_p2p::{ContentStore, EventDb};

struct RecordingCoordinator {
	next_id: std::sync::atomic::AtomicI64,
	last_create: std::sync::Mutex<Option<EventRegistration>>,
}

impl RecordingCoordinator {
	fn new(start: i64) -> Self {
		RecordingCoordinator { next_id: std::sync::atomic::AtomicI64::new(start), last_create: std::sync::Mutex::new(None) }
	}

	fn assign(&self) -> i64 {
		self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
	}
}

#[async_trait]
impl CoordinatorClient for RecordingCoordinator {
	async fn file_event_create(&self, req: &EventRegistration) -> RegisterResult {
		*self.last_create.lock().unwrap() = Some(req.clone());
		Ok(self.assign())
	}
	async fn file_event_update(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn file_event_delete(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn file_event_move(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn folder_event_create(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn folder_event_update(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn folder_event_delete(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
	async fn folder_event_move(&self, _req: &EventRegistration) -> RegisterResult {
		Ok(self.assign())
	}
}

fn open_stores(tmp: &TempDir) -> (EventDb, ContentStore) {
	let db = EventDb::open(&tmp.path().join("events.redb")).unwrap();
	let store = ContentStore::open(&tmp.path().join("content.redb")).unwrap();
	(db, store)
}

fn local_create_event(id: u64, file_id: u64, name: &str) -> Event {
	Event {
		id,
		file_id,
		uuid: Uuid::new_v4(),
		server_event_id: 0,
		is_dummy: false,
		event_type: EventType::Create,
		is_folder: false,
		file_name: name.into(),
		file_name_before_event: None,
		file_size: 1234,
		file_size_before_event: None,
		file_hash: Some("abc123".into()),
		file_hash_before_event: None,
		folder_uuid: None,
		diff_file_uuid: None,
		diff_file_size: None,
		rev_diff_file_uuid: None,
		rev_diff_file_size: None,
		last_event_id: None,
		state: EventState::Occured,
		timestamp: 1_700_000_000,
		flags: EventFlags::default(),
	}
}

#[tokio::test]
async fn local_create_registers_with_coordinator_and_carries_request_fields() {
	let tmp = TempDir::new().unwrap();
	let (db, store) = open_stores(&tmp);
	let coordinator = RecordingCoordinator::new(100);
	let strategies = EventStrategies::new(&db, &store, &coordinator);

	let file = File::root(1, "report.docx");
	let event = local_create_event(1, 1, "report.docx");

	let outcome = strategies.register(&event, &file).await.unwrap();
	assert!(matches!(outcome, RegisterOutcome::Registered { server_event_id: 100 }));

	let recorded = coordinator.last_create.lock().unwrap().clone().unwrap();
	assert_eq!(recorded.file_name, "report.docx");
	assert_eq!(recorded.file_size, 1234);
	assert_eq!(recorded.file_hash.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn create_create_race_produces_conflict_rename() {
	let tmp = TempDir::new().unwrap();
	let (db, store) = open_stores(&tmp);
	let coordinator = RecordingCoordinator::new(1);
	let strategies = EventStrategies::new(&db, &store, &coordinator);

	let mut first = File::root(10, "notes.txt");
	first.folder_id = None;
	db.put_file(&first).unwrap();

	let second = File::root(11, "notes.txt");
	let event = local_create_event(1, 11, "notes.txt");

	let outcome = strategies.register(&event, &second).await.unwrap();
	match outcome {
		RegisterOutcome::Conflict { conflicting_copy_name, conflicting_file_id, conflicting_event_id } => {
			assert!(conflicting_copy_name.starts_with("notes (conflicting copy"));
			assert!(conflicting_copy_name.ends_with(".txt"));
			assert_eq!(db.get_file(conflicting_file_id).unwrap().name, conflicting_copy_name);
			assert!(db.get_event(conflicting_event_id).unwrap().is_some());
		}
		other => panic!("expected a conflict, got {other:?}"),
	}

	// The first file is untouched; no conflict is raised against itself.
	first.folder_id = None;
	let self_event = local_create_event(2, 10, "notes.txt");
	let self_outcome = strategies.register(&self_event, &first).await.unwrap();
	assert!(matches!(self_outcome, RegisterOutcome::Registered { .. }));
}

#[tokio::test]
async fn folder_erase_nested_releases_all_descendant_copy_refs() {
	let tmp = TempDir::new().unwrap();
	let (db, store) = open_stores(&tmp);
	let coordinator = RecordingCoordinator::new(1);
	let strategies = EventStrategies::new(&db, &store, &coordinator);

	let mut folder = File::root(1, "shared");
	folder.folder_id = None;
	db.put_file(&folder).unwrap();

	for (id, name, hash) in [(2u64, "a.txt", "HASH_A"), (3u64, "b.txt", "HASH_B")] {
		store.add_copy_reference(hash, "seed", false);
		let event = Event {
			id,
			file_id: id,
			uuid: Uuid::new_v4(),
			server_event_id: id as i64,
			is_dummy: false,
			event_type: EventType::Create,
			is_folder: false,
			file_name: name.into(),
			file_name_before_event: None,
			file_size: 10,
			file_size_before_event: None,
			file_hash: Some(hash.into()),
			file_hash_before_event: None,
			folder_uuid: None,
			diff_file_uuid: None,
			diff_file_size: None,
			rev_diff_file_uuid: None,
			rev_diff_file_size: None,
			last_event_id: None,
			state: EventState::Downloaded,
			timestamp: 0,
			flags: EventFlags::default(),
		};
		db.put_event(&event).unwrap();

		let mut child = File::root(id, name);
		child.is_folder = false;
		child.folder_id = Some(1);
		child.event_id = Some(id);
		db.put_file(&child).unwrap();
	}

	assert_eq!(store.refcount("HASH_A"), 1);
	assert_eq!(store.refcount("HASH_B"), 1);

	let erased = strategies.erase_nested(1);
	assert_eq!(erased, 2);
	assert_eq!(store.refcount("HASH_A"), 0);
	assert_eq!(store.refcount("HASH_B"), 0);
}

#[tokio::test]
async fn excluded_move_translates_to_delete_create_instead_of_applying() {
	let tmp = TempDir::new().unwrap();
	let (db, store) = open_stores(&tmp);
	let coordinator = RecordingCoordinator::new(1);
	let strategies = EventStrategies::new(&db, &store, &coordinator);

	let mut existing = File::root(50, "old_name.txt");
	existing.is_folder = false;
	existing.excluded = true;
	db.put_file(&existing).unwrap();

	let event = Event {
		id: 1,
		file_id: 50,
		uuid: Uuid::new_v4(),
		server_event_id: 1,
		is_dummy: false,
		event_type: EventType::Move,
		is_folder: false,
		file_name: "new_name.txt".into(),
		file_name_before_event: Some("old_name.txt".into()),
		file_size: 10,
		file_size_before_event: None,
		file_hash: Some("H".into()),
		file_hash_before_event: None,
		folder_uuid: None,
		diff_file_uuid: None,
		diff_file_size: None,
		rev_diff_file_uuid: None,
		rev_diff_file_size: None,
		last_event_id: None,
		state: EventState::Received,
		timestamp: 0,
		flags: EventFlags::default(),
	};

	let outcome = strategies.apply(&event, Some(&existing)).await.unwrap();
	assert_eq!(outcome, ApplyOutcome::TranslatedToDeleteCreate);

	// The file row on disk keeps its pre-move name; the caller is
	// responsible for issuing the delete/create pair, not this call.
	let reloaded = db.get_file(50).unwrap();
	assert_eq!(reloaded.name, "old_name.txt");
}
