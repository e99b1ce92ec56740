//! Local repository gateway (C3): read-transactional lookup of scenes,
//! performers, studios, and tags.
//!
//! The embedded SQL schema itself is out of scope for this crate (SPEC_FULL
//! §1) — it is owned by the (external) scanner/CRUD layer. What this module
//! owns is the *contract* those layers must satisfy: every read happens
//! inside a [`Repository::with_read_txn`] closure, which guarantees a
//! consistent snapshot for its duration and is released on every exit path.
//! The closure form is deliberate: a `begin`/`commit` pair lets a caller
//! forget to release on an error path, while a closure's lifetime is
//! statically confined by the borrow checker.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::model::{Performer, Scene, Studio, Tag};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("repository backend failure: {0}")]
    Backend(String),
}

/// A consistent read snapshot, valid only for the duration of the closure
/// passed to [`Repository::with_read_txn`].
pub trait ReadTxn {
    fn find_scene(&self, id: i64) -> Result<Scene, RepositoryError>;
    fn find_performer(&self, id: i64) -> Result<Performer, RepositoryError>;
    fn find_performers_by_scene(&self, scene_id: i64) -> Result<Vec<Performer>, RepositoryError>;
    fn find_studio(&self, id: i64) -> Result<Studio, RepositoryError>;
    fn find_tags_by_scene(&self, scene_id: i64) -> Result<Vec<Tag>, RepositoryError>;
    fn all_performers(&self) -> Result<Vec<Performer>, RepositoryError>;
    fn all_studios(&self) -> Result<Vec<Studio>, RepositoryError>;
    fn all_tags(&self) -> Result<Vec<Tag>, RepositoryError>;
}

/// The local repository gateway. Implementations may serialise or use MVCC;
/// the core only requires repeatable reads within one `with_read_txn` call.
pub trait Repository: Send + Sync {
    fn with_read_txn<F, R>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, RepositoryError>;
}

/// `HashMap`-backed repository for tests and ephemeral use. A single
/// `RwLock` read guard stands in for the transaction: it is held for exactly
/// the duration of the closure, the same scoping `redb`'s MVCC snapshot
/// gives [`RedbRepository`] below.
#[derive(Default)]
pub struct InMemoryRepository {
    scenes: RwLock<HashMap<i64, Scene>>,
    performers: RwLock<HashMap<i64, Performer>>,
    studios: RwLock<HashMap<i64, Studio>>,
    tags: RwLock<HashMap<i64, Tag>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scene(&self, scene: Scene) {
        self.scenes.write().unwrap().insert(scene.id, scene);
    }

    pub fn insert_performer(&self, performer: Performer) {
        self.performers
            .write()
            .unwrap()
            .insert(performer.id, performer);
    }

    pub fn insert_studio(&self, studio: Studio) {
        self.studios.write().unwrap().insert(studio.id, studio);
    }

    pub fn insert_tag(&self, tag: Tag) {
        self.tags.write().unwrap().insert(tag.id, tag);
    }
}

struct InMemoryTxn<'a> {
    scenes: &'a HashMap<i64, Scene>,
    performers: &'a HashMap<i64, Performer>,
    studios: &'a HashMap<i64, Studio>,
    tags: &'a HashMap<i64, Tag>,
}

impl ReadTxn for InMemoryTxn<'_> {
    fn find_scene(&self, id: i64) -> Result<Scene, RepositoryError> {
        self.scenes
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "scene",
                id,
            })
    }

    fn find_performer(&self, id: i64) -> Result<Performer, RepositoryError> {
        self.performers
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound {
                entity: "performer",
                id,
            })
    }

    fn find_performers_by_scene(&self, scene_id: i64) -> Result<Vec<Performer>, RepositoryError> {
        let scene = self.find_scene(scene_id)?;
        scene
            .performer_ids
            .iter()
            .map(|id| self.find_performer(*id))
            .collect()
    }

    fn find_studio(&self, id: i64) -> Result<Studio, RepositoryError> {
        self.studios
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound { entity: "studio", id })
    }

    fn find_tags_by_scene(&self, scene_id: i64) -> Result<Vec<Tag>, RepositoryError> {
        let scene = self.find_scene(scene_id)?;
        Ok(scene
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id).cloned())
            .collect())
    }

    fn all_performers(&self) -> Result<Vec<Performer>, RepositoryError> {
        Ok(self.performers.values().cloned().collect())
    }

    fn all_studios(&self) -> Result<Vec<Studio>, RepositoryError> {
        Ok(self.studios.values().cloned().collect())
    }

    fn all_tags(&self) -> Result<Vec<Tag>, RepositoryError> {
        Ok(self.tags.values().cloned().collect())
    }
}

impl Repository for InMemoryRepository {
    fn with_read_txn<F, R>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, RepositoryError>,
    {
        let scenes = self
            .scenes
            .read()
            .map_err(|_| RepositoryError::Backend("poisoned lock".into()))?;
        let performers = self
            .performers
            .read()
            .map_err(|_| RepositoryError::Backend("poisoned lock".into()))?;
        let studios = self
            .studios
            .read()
            .map_err(|_| RepositoryError::Backend("poisoned lock".into()))?;
        let tags = self
            .tags
            .read()
            .map_err(|_| RepositoryError::Backend("poisoned lock".into()))?;

        let txn = InMemoryTxn {
            scenes: &scenes,
            performers: &performers,
            studios: &studios,
            tags: &tags,
        };
        f(&txn)
    }
}

#[cfg(feature = "embedded")]
pub mod redb_backend {
    //! A `redb`-backed repository. Each `with_read_txn` call opens an actual
    //! `redb` MVCC read transaction, giving the same repeatable-read
    //! guarantee a real embedded SQL store would, without depending on the
    //! (out-of-scope) SQL schema itself. Records are stored JSON-encoded
    //! under per-entity-kind tables keyed by decimal id.

    use std::path::Path;
    use std::sync::Arc;

    use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
    use serde::de::DeserializeOwned;

    use super::{ReadTxn, Repository, RepositoryError};
    use crate::model::{Performer, Scene, Studio, Tag};

    const SCENES: TableDefinition<i64, &[u8]> = TableDefinition::new("scenes");
    const PERFORMERS: TableDefinition<i64, &[u8]> = TableDefinition::new("performers");
    const STUDIOS: TableDefinition<i64, &[u8]> = TableDefinition::new("studios");
    const TAGS: TableDefinition<i64, &[u8]> = TableDefinition::new("tags");

    pub struct RedbRepository {
        db: Arc<Database>,
    }

    impl RedbRepository {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
            let db = Database::create(path).map_err(|e| RepositoryError::Backend(e.to_string()))?;
            let write_txn = db
                .begin_write()
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            {
                let _ = write_txn
                    .open_table(SCENES)
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
                let _ = write_txn
                    .open_table(PERFORMERS)
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
                let _ = write_txn
                    .open_table(STUDIOS)
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
                let _ = write_txn
                    .open_table(TAGS)
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            Ok(Self { db: Arc::new(db) })
        }

        pub fn put_scene(&self, scene: &Scene) -> Result<(), RepositoryError> {
            self.put(SCENES, scene.id, scene)
        }

        pub fn put_performer(&self, performer: &Performer) -> Result<(), RepositoryError> {
            self.put(PERFORMERS, performer.id, performer)
        }

        pub fn put_studio(&self, studio: &Studio) -> Result<(), RepositoryError> {
            self.put(STUDIOS, studio.id, studio)
        }

        pub fn put_tag(&self, tag: &Tag) -> Result<(), RepositoryError> {
            self.put(TAGS, tag.id, tag)
        }

        fn put<T: serde::Serialize>(
            &self,
            table: TableDefinition<i64, &[u8]>,
            id: i64,
            value: &T,
        ) -> Result<(), RepositoryError> {
            let bytes =
                serde_json::to_vec(value).map_err(|e| RepositoryError::Backend(e.to_string()))?;
            let write_txn = self
                .db
                .begin_write()
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            {
                let mut t = write_txn
                    .open_table(table)
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
                t.insert(id, bytes.as_slice())
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            Ok(())
        }
    }

    struct RedbTxn<'a> {
        txn: redb::ReadTransaction,
        _marker: std::marker::PhantomData<&'a ()>,
    }

    fn read_one<T: DeserializeOwned>(
        txn: &redb::ReadTransaction,
        table: TableDefinition<i64, &[u8]>,
        id: i64,
        entity: &'static str,
    ) -> Result<T, RepositoryError> {
        let t = txn
            .open_table(table)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;
        let value = t
            .get(id)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?
            .ok_or(RepositoryError::NotFound { entity, id })?;
        serde_json::from_slice(value.value()).map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    fn read_all<T: DeserializeOwned>(
        txn: &redb::ReadTransaction,
        table: TableDefinition<i64, &[u8]>,
    ) -> Result<Vec<T>, RepositoryError> {
        let t = txn
            .open_table(table)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;
        t.iter()
            .map_err(|e| RepositoryError::Backend(e.to_string()))?
            .map(|entry| {
                let (_, value) = entry.map_err(|e| RepositoryError::Backend(e.to_string()))?;
                serde_json::from_slice(value.value())
                    .map_err(|e| RepositoryError::Backend(e.to_string()))
            })
            .collect()
    }

    impl ReadTxn for RedbTxn<'_> {
        fn find_scene(&self, id: i64) -> Result<Scene, RepositoryError> {
            read_one(&self.txn, SCENES, id, "scene")
        }

        fn find_performer(&self, id: i64) -> Result<Performer, RepositoryError> {
            read_one(&self.txn, PERFORMERS, id, "performer")
        }

        fn find_performers_by_scene(&self, scene_id: i64) -> Result<Vec<Performer>, RepositoryError> {
            let scene = self.find_scene(scene_id)?;
            scene
                .performer_ids
                .iter()
                .map(|id| self.find_performer(*id))
                .collect()
        }

        fn find_studio(&self, id: i64) -> Result<Studio, RepositoryError> {
            read_one(&self.txn, STUDIOS, id, "studio")
        }

        fn find_tags_by_scene(&self, scene_id: i64) -> Result<Vec<Tag>, RepositoryError> {
            let scene = self.find_scene(scene_id)?;
            let all: Vec<Tag> = read_all(&self.txn, TAGS)?;
            Ok(all
                .into_iter()
                .filter(|t| scene.tag_ids.contains(&t.id))
                .collect())
        }

        fn all_performers(&self) -> Result<Vec<Performer>, RepositoryError> {
            read_all(&self.txn, PERFORMERS)
        }

        fn all_studios(&self) -> Result<Vec<Studio>, RepositoryError> {
            read_all(&self.txn, STUDIOS)
        }

        fn all_tags(&self) -> Result<Vec<Tag>, RepositoryError> {
            read_all(&self.txn, TAGS)
        }
    }

    impl Repository for RedbRepository {
        fn with_read_txn<F, R>(&self, f: F) -> Result<R, RepositoryError>
        where
            F: FnOnce(&dyn ReadTxn) -> Result<R, RepositoryError>,
        {
            let txn = self
                .db
                .begin_read()
                .map_err(|e| RepositoryError::Backend(e.to_string()))?;
            let scoped = RedbTxn {
                txn,
                _marker: std::marker::PhantomData,
            };
            f(&scoped)
        }
    }
}

#[cfg(feature = "embedded")]
pub use redb_backend::RedbRepository;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StashId;

    fn sample_scene() -> Scene {
        Scene {
            id: 1,
            title: Some("Scene One".into()),
            details: None,
            url: None,
            date: None,
            duration: Some(120.0),
            height: None,
            codec: None,
            checksum: Some("a".repeat(32)),
            oshash: None,
            phash: None,
            interactive: false,
            studio_id: None,
            performer_ids: vec![10],
            tag_ids: vec![20],
            stash_ids: vec![StashId {
                endpoint: "https://stashdb.org".into(),
                remote_id: "remote-1".into(),
            }],
        }
    }

    #[test]
    fn in_memory_round_trip() {
        let repo = InMemoryRepository::new();
        repo.insert_scene(sample_scene());
        repo.insert_performer(Performer {
            id: 10,
            name: "Performer One".into(),
            disambiguation: None,
            gender: None,
            birthdate: None,
            country: None,
            urls: vec![],
            handles: vec![],
            image: None,
            stash_ids: vec![],
        });
        repo.insert_tag(Tag {
            id: 20,
            name: "Tag One".into(),
            stash_ids: vec![],
        });

        let result = repo
            .with_read_txn(|txn| {
                let scene = txn.find_scene(1)?;
                let performers = txn.find_performers_by_scene(1)?;
                let tags = txn.find_tags_by_scene(1)?;
                Ok((scene, performers, tags))
            })
            .unwrap();

        assert_eq!(result.0.title.as_deref(), Some("Scene One"));
        assert_eq!(result.1.len(), 1);
        assert_eq!(result.2.len(), 1);
    }

    #[test]
    fn missing_scene_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .with_read_txn(|txn| txn.find_scene(999))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::NotFound {
                entity: "scene",
                id: 999
            }
        ));
    }

    #[cfg(feature = "embedded")]
    #[test]
    fn redb_repository_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.redb");
        let repo = RedbRepository::open(&path).unwrap();
        repo.put_scene(&sample_scene()).unwrap();
        repo.put_performer(&Performer {
            id: 10,
            name: "Performer One".into(),
            disambiguation: None,
            gender: None,
            birthdate: None,
            country: None,
            urls: vec![],
            handles: vec![],
            image: None,
            stash_ids: vec![],
        })
        .unwrap();

        let scene = repo.with_read_txn(|txn| txn.find_scene(1)).unwrap();
        assert_eq!(scene.id, 1);
    }
}
