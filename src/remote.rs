// src/remote.rs
//! Handles to objects living in the target application.
//!
//! The target application exposes its object tree through an [`Introspector`].
//! Objects are identified by numeric ids, which are only meaningful while the
//! target process is running. An [`ObjectMapper`] hands out [`RemoteObject`]
//! handles for one run of the target; once the target exits the mapper is
//! invalidated and every handle it issued turns stale.

use crate::error::{RemoteError, Result};
use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Remote object id. `0` is the remote side's "no object".
pub type ObjectId = u64;

/// Queries answered by the target application.
///
/// Calls are synchronous round-trips. Any of them may fail at any time, as the
/// target process can exit in the middle of a call.
pub trait Introspector: Send + Sync + 'static {
    /// Id of the main window, the root of the object tree.
    fn main_window(&self) -> Result<ObjectId>;

    fn object_name(&self, id: ObjectId) -> Result<String>;

    fn class_name(&self, id: ObjectId) -> Result<String>;

    /// Ids of the direct children of `id`, in remote order.
    fn child_object_ids(&self, id: ObjectId) -> Result<Vec<ObjectId>>;

    /// Resolve a (possibly qualified) name with the target's own rules.
    fn find_object(&self, name: &str) -> Result<ObjectId>;
}

struct Link {
    introspector: Arc<dyn Introspector>,
    alive: AtomicBool,
    /// Class names never change during an object's lifetime.
    classes: DashMap<ObjectId, String>,
}

impl Link {
    fn check(&self, id: ObjectId) -> Result<&dyn Introspector> {
        if self.alive.load(Ordering::Acquire) {
            Ok(self.introspector.as_ref())
        } else {
            Err(RemoteError::Stale(id))
        }
    }
}

/// Issues handles for a single run of the target application.
#[derive(Clone)]
pub struct ObjectMapper {
    link: Arc<Link>,
}

impl ObjectMapper {
    pub fn new(introspector: Arc<dyn Introspector>) -> Self {
        Self {
            link: Arc::new(Link {
                introspector,
                alive: AtomicBool::new(true),
                classes: DashMap::new(),
            }),
        }
    }

    /// Handle for `id`, or `None` for the null id.
    pub fn remote_object(&self, id: ObjectId) -> Option<RemoteObject> {
        if id == 0 {
            return None;
        }
        Some(RemoteObject {
            id,
            link: self.link.clone(),
        })
    }

    pub fn main_window(&self) -> Result<Option<RemoteObject>> {
        let id = self.link.check(0)?.main_window()?;
        Ok(self.remote_object(id))
    }

    pub fn find_object(&self, name: &str) -> Result<Option<RemoteObject>> {
        let id = self.link.check(0)?.find_object(name)?;
        Ok(self.remote_object(id))
    }

    /// Mark the target application as gone. Every handle issued by this
    /// mapper fails with [`RemoteError::Stale`] from now on.
    pub fn invalidate(&self) {
        self.link.alive.store(false, Ordering::Release);
        self.link.classes.clear();
    }

    pub fn is_alive(&self) -> bool {
        self.link.alive.load(Ordering::Acquire)
    }

    /// True when both mappers serve the same run of the target.
    pub fn same_target(&self, other: &ObjectMapper) -> bool {
        Arc::ptr_eq(&self.link, &other.link)
    }
}

impl fmt::Debug for ObjectMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMapper")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Guarded reference to a remote object.
///
/// Cloning is cheap. Two handles are equal when they carry the same id and
/// were issued by the same mapper.
#[derive(Clone)]
pub struct RemoteObject {
    id: ObjectId,
    link: Arc<Link>,
}

impl RemoteObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// False once the target application that owns the object has exited.
    pub fn is_alive(&self) -> bool {
        self.link.alive.load(Ordering::Acquire)
    }

    pub fn name(&self) -> Result<String> {
        self.link.check(self.id)?.object_name(self.id)
    }

    pub fn class_name(&self) -> Result<String> {
        let introspector = self.link.check(self.id)?;
        if let Some(class) = self.link.classes.get(&self.id) {
            return Ok(class.clone());
        }
        let class = introspector.class_name(self.id)?;
        self.link.classes.insert(self.id, class.clone());
        Ok(class)
    }

    pub fn children(&self) -> Result<Vec<RemoteObject>> {
        let ids = self.link.check(self.id)?.child_object_ids(self.id)?;
        Ok(ids
            .into_iter()
            .filter(|id| *id != 0)
            .map(|id| RemoteObject {
                id,
                link: self.link.clone(),
            })
            .collect())
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.link, &other.link)
    }
}

impl Eq for RemoteObject {}

impl Hash for RemoteObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteObject").field(&self.id).finish()
    }
}
