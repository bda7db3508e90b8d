//! Embedded identity store: `users` and `groups` as reserved system files,
//! SHA-256 password hashing. Grounded in the Python original's
//! `add_user`/`add_group`/`verify_password`, reimplemented against
//! `FileStore` instead of raw FAT calls, with digests computed by `sha2`.

use sha2::{Digest, Sha256};

use crate::codec::{read_fixed_str, write_fixed_str};
use crate::error::{Error, Result};
use crate::file::{FileStore, WriteMode};
use crate::{
    ATTR_HIDDEN, ATTR_READ_ONLY, ATTR_SYSTEM, GROUP_NAME_LEN, GROUP_RECORD_SIZE,
    RESERVED_GROUPS_FILE, RESERVED_USERS_FILE, USER_FLAG_LOCKED, USER_LOGIN_LEN, USER_RECORD_SIZE,
};

pub const ROOT_UID: u8 = 0;
pub const ROOT_GID: u8 = 0;
const RESERVED_ATTRS: u8 = ATTR_SYSTEM | ATTR_HIDDEN | ATTR_READ_ONLY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub uid: u8,
    pub gid: u8,
    pub locked: bool,
    pub password_hash: [u8; 32],
}

impl User {
    fn encode(&self) -> [u8; USER_RECORD_SIZE] {
        let mut buf = [0u8; USER_RECORD_SIZE];
        write_fixed_str(&mut buf[0..USER_LOGIN_LEN], &self.login);
        buf[30] = self.uid;
        buf[31] = self.gid;
        buf[32] = if self.locked { USER_FLAG_LOCKED } else { 0 };
        buf[33..65].copy_from_slice(&self.password_hash);
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&buf[33..65]);
        Self {
            login: read_fixed_str(&buf[0..USER_LOGIN_LEN]),
            uid: buf[30],
            gid: buf[31],
            locked: buf[32] & USER_FLAG_LOCKED != 0,
            password_hash: hash,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash != [0u8; 32]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub gid: u8,
    pub name: String,
}

impl Group {
    fn encode(&self) -> [u8; GROUP_RECORD_SIZE] {
        let mut buf = [0u8; GROUP_RECORD_SIZE];
        buf[0] = self.gid;
        write_fixed_str(&mut buf[1..1 + GROUP_NAME_LEN], &self.name);
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            gid: buf[0],
            name: read_fixed_str(&buf[1..1 + GROUP_NAME_LEN]),
        }
    }
}

fn hash_password(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Constant-time digest comparison, to avoid a timing oracle on password
/// verification (the Python original compares with plain `==`).
fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub struct IdentityStore<'a> {
    files: &'a FileStore,
}

impl<'a> IdentityStore<'a> {
    pub fn new(files: &'a FileStore) -> Self {
        Self { files }
    }

    /// Ensures the reserved `users`/`groups` files and the `root`
    /// user/group exist. Idempotent: safe to call on every mount.
    pub fn ensure_bootstrapped(&self) -> Result<()> {
        if self.files.dir().find(RESERVED_USERS_FILE)?.is_none() {
            self.files
                .create(RESERVED_USERS_FILE, ROOT_UID, ROOT_GID, RESERVED_ATTRS)?;
            self.write_users(&[User {
                login: "root".into(),
                uid: ROOT_UID,
                gid: ROOT_GID,
                locked: false,
                password_hash: [0u8; 32],
            }])?;
        }
        if self.files.dir().find(RESERVED_GROUPS_FILE)?.is_none() {
            self.files
                .create(RESERVED_GROUPS_FILE, ROOT_UID, ROOT_GID, RESERVED_ATTRS)?;
            self.write_groups(&[Group {
                gid: ROOT_GID,
                name: "root".into(),
            }])?;
        }
        Ok(())
    }

    pub fn read_users(&self) -> Result<Vec<User>> {
        let bytes = self.files.read(RESERVED_USERS_FILE)?;
        Ok(bytes
            .chunks_exact(USER_RECORD_SIZE)
            .map(User::decode)
            .take_while(|u| !u.login.is_empty())
            .collect())
    }

    pub fn write_users(&self, users: &[User]) -> Result<()> {
        let mut bytes = Vec::with_capacity(users.len() * USER_RECORD_SIZE);
        for user in users {
            bytes.extend_from_slice(&user.encode());
        }
        self.files
            .write(RESERVED_USERS_FILE, &bytes, WriteMode::Replace)?;
        Ok(())
    }

    pub fn read_groups(&self) -> Result<Vec<Group>> {
        let bytes = self.files.read(RESERVED_GROUPS_FILE)?;
        Ok(bytes
            .chunks_exact(GROUP_RECORD_SIZE)
            .map(Group::decode)
            .take_while(|g| !g.name.is_empty())
            .collect())
    }

    pub fn write_groups(&self, groups: &[Group]) -> Result<()> {
        let mut bytes = Vec::with_capacity(groups.len() * GROUP_RECORD_SIZE);
        for group in groups {
            bytes.extend_from_slice(&group.encode());
        }
        self.files
            .write(RESERVED_GROUPS_FILE, &bytes, WriteMode::Replace)?;
        Ok(())
    }

    pub fn user(&self, login: &str) -> Result<Option<User>> {
        Ok(self.read_users()?.into_iter().find(|u| u.login == login))
    }

    pub fn user_by_uid(&self, uid: u8) -> Result<Option<User>> {
        Ok(self.read_users()?.into_iter().find(|u| u.uid == uid))
    }

    pub fn group_by_name(&self, name: &str) -> Result<Option<Group>> {
        Ok(self.read_groups()?.into_iter().find(|g| g.name == name))
    }

    pub fn group_by_gid(&self, gid: u8) -> Result<Option<Group>> {
        Ok(self.read_groups()?.into_iter().find(|g| g.gid == gid))
    }

    pub fn add_user(
        &self,
        login: &str,
        password: &str,
        uid: Option<u8>,
        gid: u8,
    ) -> Result<User> {
        if login.is_empty() || login.as_bytes().len() > USER_LOGIN_LEN {
            return Err(Error::InvalidArg(format!("bad login {login:?}")));
        }
        let mut users = self.read_users()?;
        if users.iter().any(|u| u.login == login) {
            return Err(Error::UserExists(login.to_string()));
        }

        let mut sb = crate::superblock::Superblock::read_from(self.files_device())?;
        let uid = uid.unwrap_or_else(|| {
            sb.max_uid = sb.max_uid.saturating_add(1);
            sb.max_uid as u8
        });
        sb.write_to(self.files_device())?;

        let user = User {
            login: login.to_string(),
            uid,
            gid,
            locked: false,
            password_hash: hash_password(password),
        };
        users.push(user.clone());
        self.write_users(&users)?;
        Ok(user)
    }

    pub fn add_group(&self, name: &str, gid: Option<u8>) -> Result<Group> {
        if name.is_empty() || name.as_bytes().len() > GROUP_NAME_LEN {
            return Err(Error::InvalidArg(format!("bad group name {name:?}")));
        }
        let mut groups = self.read_groups()?;
        if groups.iter().any(|g| g.name == name) {
            return Err(Error::GroupExists(name.to_string()));
        }

        let mut sb = crate::superblock::Superblock::read_from(self.files_device())?;
        let gid = gid.unwrap_or_else(|| {
            sb.max_gid = sb.max_gid.saturating_add(1);
            sb.max_gid as u8
        });
        sb.write_to(self.files_device())?;

        let group = Group {
            gid,
            name: name.to_string(),
        };
        groups.push(group.clone());
        self.write_groups(&groups)?;
        Ok(group)
    }

    pub fn set_password(&self, login: &str, password: &str) -> Result<()> {
        let mut users = self.read_users()?;
        let user = users
            .iter_mut()
            .find(|u| u.login == login)
            .ok_or_else(|| Error::UserNotFound(login.to_string()))?;
        user.password_hash = hash_password(password);
        self.write_users(&users)?;
        Ok(())
    }

    pub fn verify_password(&self, login: &str, password: &str) -> Result<bool> {
        let user = self
            .user(login)?
            .ok_or_else(|| Error::UserNotFound(login.to_string()))?;
        Ok(digests_equal(&user.password_hash, &hash_password(password)))
    }

    pub fn is_first_run(&self) -> Result<bool> {
        match self.user("root")? {
            Some(root) => Ok(!root.has_password()),
            None => Ok(true),
        }
    }

    pub fn regular_users(&self) -> Result<Vec<User>> {
        Ok(self
            .read_users()?
            .into_iter()
            .filter(|u| u.uid != ROOT_UID)
            .collect())
    }

    fn files_device(&self) -> &crate::device::BlockFile {
        self.files.device()
    }
}
