//! File-backed [`TokenStore`] so CLI invocations share one session across processes.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenRecord},
	store::{self, CompareAndSwapOutcome, StoreError, StoreFuture, TokenStore},
};

type Snapshot = HashMap<SessionId, TokenRecord>;

/// Persists every session to one JSON file after each mutation.
///
/// The file is replaced atomically (temp file, fsync, rename), so readers never observe a
/// partially written snapshot. Mutations reach the in-memory view only after the write succeeds.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Returns the snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn save<'a>(&'a self, session: &'a SessionId, record: TokenRecord) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.insert(session.clone(), record);
			self.persist_locked(&next)?;

			*guard = next;

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.inner.read().get(session).cloned()) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		session: &'a SessionId,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();
			let outcome = store::swap_in_map(&mut next, session, expected_refresh, replacement);

			if outcome == CompareAndSwapOutcome::Updated {
				self.persist_locked(&next)?;

				*guard = next;
			}

			Ok(outcome)
		})
	}
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
		Err(e) =>
			return Err(StoreError::Backend {
				message: format!("Failed to read {}: {e}", path.display()),
			}),
	};

	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Snapshot::new());
	}

	let mut de = serde_json::Deserializer::from_slice(&bytes);

	serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {} at `{}`: {}", path.display(), e.path(), e.inner()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"oauth2_auth_transport_file_store_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn session() -> SessionId {
		SessionId::new("api.example.com").expect("Session fixture should be valid.")
	}

	fn record(access: &str, refresh: &str) -> TokenRecord {
		TokenRecord::builder()
			.access_token(access)
			.refresh_token(refresh)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build file-store test record.")
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.save(&session(), record("a1", "r1")).await.expect("Save should succeed.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = reopened
			.fetch(&session())
			.await
			.expect("Fetch should succeed.")
			.expect("File store lost the record after reopen.");

		assert_eq!(fetched.access_token.expose(), "a1");
		assert_eq!(fetched.refresh_token.as_ref().map(|secret| secret.expose()), Some("r1"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn compare_and_swap_persists_only_on_match() {
		let path = temp_path("cas");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.save(&session(), record("a1", "r1")).await.expect("Save should succeed.");

		let mismatch = store
			.compare_and_swap_refresh(&session(), Some("stale"), record("a2", "r2"))
			.await
			.expect("CAS should succeed.");

		assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

		let updated = store
			.compare_and_swap_refresh(&session(), Some("r1"), record("a2", "r2"))
			.await
			.expect("CAS should succeed.");

		assert_eq!(updated, CompareAndSwapOutcome::Updated);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = reopened
			.fetch(&session())
			.await
			.expect("Fetch should succeed.")
			.expect("Rotated record should be persisted.");

		assert_eq!(fetched.access_token.expose(), "a2");

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn failed_writes_leave_memory_in_step_with_disk() {
		let path = temp_path("failed_write");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.save(&session(), record("a1", "r1")).await.expect("Save should succeed.");

		let blocker = path.with_extension("tmp");

		fs::create_dir(&blocker).expect("Blocking directory should be creatable.");

		let cas = store.compare_and_swap_refresh(&session(), Some("r1"), record("a2", "r2")).await;

		assert!(matches!(cas, Err(StoreError::Backend { .. })));

		let save = store.save(&session(), record("a3", "r3")).await;

		assert!(matches!(save, Err(StoreError::Backend { .. })));

		let fetched = store
			.fetch(&session())
			.await
			.expect("Fetch should succeed.")
			.expect("Original record should remain.");

		assert_eq!(fetched.access_token.expose(), "a1");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let on_disk = reopened
			.fetch(&session())
			.await
			.expect("Fetch should succeed.")
			.expect("Original record should remain on disk.");

		assert_eq!(on_disk.access_token.expose(), "a1");

		fs::remove_dir(&blocker).unwrap_or_else(|e| {
			panic!("Failed to remove blocking directory {}: {e}", blocker.display())
		});
		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn empty_file_loads_as_empty_and_garbage_reports_path() {
		let path = temp_path("parse");

		fs::write(&path, "").expect("Fixture file should be writable.");
		assert!(FileStore::open(&path).is_ok());

		fs::write(&path, r#"{"api.example.com":{"access_token":7}}"#)
			.expect("Fixture file should be writable.");

		let err = FileStore::open(&path).expect_err("Malformed snapshots should be rejected.");

		assert!(matches!(
			err,
			StoreError::Serialization { ref message } if message.contains("api.example.com.access_token")
		));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
