use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::crypto::EncryptionKey;
use super::model::{RegistrationRecord, StoredRegistration, Verifiers};

/// Primary table: alias → bincode-encoded [`StoredRegistration`].
const REGISTRATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("registrations");
/// Secondary index: tenant-issued user id → alias.
const USER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("user_index");

/// Thread-safe handle to the redb-backed registration store.
///
/// Records are mutated exactly once (the validation verifier is attached on
/// completion) and never deleted. All mutation happens inside a single write
/// transaction, so two requests racing on the same user cannot lose updates:
/// redb serializes writers.
#[derive(Clone)]
pub struct RegStore {
    db: Arc<Database>,
    key: Arc<EncryptionKey>,
}

impl RegStore {
    /// Open (or create) the database at `path`, using `key` to encrypt
    /// verifier secrets at rest.
    pub fn open(path: &Path, key: EncryptionKey) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(REGISTRATIONS)?;
        write_txn.open_table(USER_INDEX)?;
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            key: Arc::new(key),
        })
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Persist a freshly initiated registration. Fails if the alias is
    /// already taken — the alias is the unique business key.
    pub fn insert(
        &self,
        alias: &str,
        user_id: &str,
        reg_session_id: &str,
        reg_session_verifier: &str,
    ) -> Result<RegistrationRecord> {
        let verifiers = Verifiers {
            reg_session_verifier: reg_session_verifier.to_owned(),
            reg_validation_verifier: None,
        };
        let stored = self.seal(alias, user_id, reg_session_id, &verifiers, Self::now())?;
        let bytes = encode(&stored)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REGISTRATIONS)?;
            let taken = table.get(alias)?.is_some();
            if taken {
                anyhow::bail!("alias '{alias}' is already registered");
            }
            table.insert(alias, bytes.as_slice())?;

            let mut index = write_txn.open_table(USER_INDEX)?;
            index.insert(user_id, alias)?;
        }
        write_txn.commit()?;

        debug!(alias, user_id, "stored registration");
        Ok(self.open_record(&stored)?)
    }

    /// Look up a registration by its alias.
    pub fn find_by_alias(&self, alias: &str) -> Result<Option<RegistrationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REGISTRATIONS)?;

        let raw: Option<Vec<u8>> = table.get(alias)?.map(|guard| guard.value().to_vec());
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let stored = decode(&bytes)?;
                Ok(Some(self.open_record(&stored)?))
            }
        }
    }

    /// Look up a registration by the tenant-issued user id.
    pub fn find_by_user_id(&self, user_id: &str) -> Result<Option<RegistrationRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_INDEX)?;

        let alias: Option<String> = index.get(user_id)?.map(|guard| guard.value().to_owned());
        drop(index);

        match alias {
            None => Ok(None),
            Some(alias) => {
                let table = read_txn.open_table(REGISTRATIONS)?;
                let raw: Option<Vec<u8>> =
                    table.get(alias.as_str())?.map(|guard| guard.value().to_vec());
                match raw {
                    None => Ok(None),
                    Some(bytes) => {
                        let stored = decode(&bytes)?;
                        Ok(Some(self.open_record(&stored)?))
                    }
                }
            }
        }
    }

    /// Attach the validation verifier to the record for `user_id`, inside a
    /// single write transaction. Returns the updated record, or None if the
    /// user is unknown. Re-attaching the same verifier is harmless, so a
    /// retried completion request goes through cleanly.
    pub fn attach_validation_verifier(
        &self,
        user_id: &str,
        reg_validation_verifier: &str,
    ) -> Result<Option<RegistrationRecord>> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let index = write_txn.open_table(USER_INDEX)?;
            let alias: Option<String> = index.get(user_id)?.map(|guard| guard.value().to_owned());
            drop(index);

            match alias {
                None => None,
                Some(alias) => {
                    let mut table = write_txn.open_table(REGISTRATIONS)?;
                    let raw: Option<Vec<u8>> =
                        table.get(alias.as_str())?.map(|guard| guard.value().to_vec());
                    match raw {
                        None => None,
                        Some(bytes) => {
                            let stored = decode(&bytes)?;
                            let mut verifiers = self.unseal(&stored)?;
                            verifiers.reg_validation_verifier =
                                Some(reg_validation_verifier.to_owned());

                            let resealed = self.seal(
                                &stored.alias,
                                &stored.user_id,
                                &stored.reg_session_id,
                                &verifiers,
                                stored.created_at,
                            )?;
                            let new_bytes = encode(&resealed)?;
                            table.insert(alias.as_str(), new_bytes.as_slice())?;

                            debug!(user_id, "attached validation verifier");
                            Some(self.open_record(&resealed)?)
                        }
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Encrypt the verifier pair into a stored record.
    fn seal(
        &self,
        alias: &str,
        user_id: &str,
        reg_session_id: &str,
        verifiers: &Verifiers,
        created_at: i64,
    ) -> Result<StoredRegistration> {
        let plaintext = bincode::serde::encode_to_vec(verifiers, bincode::config::standard())
            .context("bincode encode verifiers")?;
        let (verifiers_encrypted, nonce) =
            super::crypto::encrypt(&self.key, &plaintext).context("encrypt verifiers")?;

        Ok(StoredRegistration {
            alias: alias.to_owned(),
            user_id: user_id.to_owned(),
            reg_session_id: reg_session_id.to_owned(),
            verifiers_encrypted,
            nonce,
            created_at,
        })
    }

    /// Decrypt the verifier pair from a stored record.
    fn unseal(&self, stored: &StoredRegistration) -> Result<Verifiers> {
        let plaintext =
            super::crypto::decrypt(&self.key, &stored.verifiers_encrypted, &stored.nonce)
                .context("decrypt verifiers")?;
        let (verifiers, _) =
            bincode::serde::decode_from_slice(&plaintext, bincode::config::standard())
                .context("bincode decode verifiers")?;
        Ok(verifiers)
    }

    fn open_record(&self, stored: &StoredRegistration) -> Result<RegistrationRecord> {
        let verifiers = self.unseal(stored)?;
        Ok(RegistrationRecord {
            alias: stored.alias.clone(),
            user_id: stored.user_id.clone(),
            reg_session_id: stored.reg_session_id.clone(),
            reg_session_verifier: verifiers.reg_session_verifier.clone(),
            reg_validation_verifier: verifiers.reg_validation_verifier.clone(),
            created_at: stored.created_at,
        })
    }
}

fn encode(stored: &StoredRegistration) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(stored, bincode::config::standard()).context("bincode encode")
}

fn decode(bytes: &[u8]) -> Result<StoredRegistration> {
    let (stored, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (RegStore, tempfile::TempDir) {
        let key = super::super::crypto::generate_key();
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = RegStore::open(&path, key).unwrap();
        (store, dir)
    }

    #[test]
    fn insert_and_find_by_alias() {
        let (s, _dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "sv-1").unwrap();

        let rec = s.find_by_alias("alice").unwrap().unwrap();
        assert_eq!(rec.user_id, "u-1");
        assert_eq!(rec.reg_session_id, "rs-1");
        assert_eq!(rec.reg_session_verifier, "sv-1");
        assert_eq!(rec.reg_validation_verifier, None);
    }

    #[test]
    fn find_by_user_id_uses_the_index() {
        let (s, _dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "sv-1").unwrap();
        s.insert("bob", "u-2", "rs-2", "sv-2").unwrap();

        let rec = s.find_by_user_id("u-2").unwrap().unwrap();
        assert_eq!(rec.alias, "bob");
        assert!(s.find_by_user_id("u-404").unwrap().is_none());
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let (s, _dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "sv-1").unwrap();
        assert!(s.insert("alice", "u-9", "rs-9", "sv-9").is_err());
        // First record untouched.
        let rec = s.find_by_alias("alice").unwrap().unwrap();
        assert_eq!(rec.user_id, "u-1");
    }

    #[test]
    fn attach_validation_verifier_updates_record() {
        let (s, _dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "sv-1").unwrap();

        let rec = s.attach_validation_verifier("u-1", "vv-1").unwrap().unwrap();
        assert_eq!(rec.reg_validation_verifier.as_deref(), Some("vv-1"));
        assert_eq!(rec.reg_session_verifier, "sv-1");

        // The update is durable.
        let rec = s.find_by_user_id("u-1").unwrap().unwrap();
        assert_eq!(rec.reg_validation_verifier.as_deref(), Some("vv-1"));
    }

    #[test]
    fn attach_for_unknown_user_returns_none() {
        let (s, _dir) = make_store();
        assert!(s.attach_validation_verifier("u-404", "vv").unwrap().is_none());
    }

    #[test]
    fn reattach_same_verifier_is_idempotent() {
        let (s, _dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "sv-1").unwrap();
        s.attach_validation_verifier("u-1", "vv-1").unwrap().unwrap();
        let rec = s.attach_validation_verifier("u-1", "vv-1").unwrap().unwrap();
        assert_eq!(rec.reg_validation_verifier.as_deref(), Some("vv-1"));
    }

    #[test]
    fn verifiers_are_not_stored_in_the_clear() {
        let (s, dir) = make_store();
        s.insert("alice", "u-1", "rs-1", "super-secret-verifier")
            .unwrap();
        drop(s);
        let raw = std::fs::read(dir.path().join("test.db")).unwrap();
        let needle = b"super-secret-verifier";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn records_survive_reopen_with_same_key() {
        let key = super::super::crypto::generate_key();
        let key_bytes = *key.as_bytes();
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = RegStore::open(&path, key).unwrap();
            store.insert("alice", "u-1", "rs-1", "sv-1").unwrap();
        }

        let reopened =
            RegStore::open(&path, super::super::crypto::load_key(&key_bytes).unwrap()).unwrap();
        let rec = reopened.find_by_alias("alice").unwrap().unwrap();
        assert_eq!(rec.reg_session_verifier, "sv-1");
    }
}
