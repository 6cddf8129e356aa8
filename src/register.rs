// src/register.rs
//! Name register for the objects of the target application.
//!
//! Remote objects are identified by name in tutorials, but names are neither
//! mandatory nor unique. The register keeps track of every object in the
//! target's tree and of the names they are known by, so it can offer the
//! shortest qualified name (`ancestor/.../object`) that tells an object apart
//! from its homonyms.
//!
//! Objects are registered in two steps. They are added to the tree as soon as
//! they are discovered, but their name is read only after
//! [`RegisterConfig::name_debounce`], as the target usually names an object
//! right after creating it. While there are names pending the register is
//! "updating" and query results are provisional.

use crate::config::RegisterConfig;
use crate::error::Result;
use crate::events::{Event, EventKind, EventReceiver, SystemEvent};
use crate::path;
use crate::remote::{ObjectId, ObjectMapper, RemoteObject};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Notification sent to register subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameEvent {
    NameAdded(String),
    NameRemoved(String),
    /// Names are being read; queries are provisional until `UpdateFinished`.
    UpdateStarted,
    UpdateFinished,
}

#[derive(Default)]
struct State {
    /// Named objects, in registration order within each name.
    by_name: HashMap<String, Vec<RemoteObject>>,
    /// Name each object was registered under.
    name_of: HashMap<ObjectId, String>,
    /// Known children of each object. `None` is the parent of the root.
    by_parent: HashMap<Option<ObjectId>, Vec<RemoteObject>>,
    parent_of: HashMap<ObjectId, Option<RemoteObject>>,
    /// Discovered objects whose name was not read yet, oldest first.
    pending: VecDeque<RemoteObject>,
}

impl State {
    fn clear(&mut self) {
        self.by_name.clear();
        self.name_of.clear();
        self.by_parent.clear();
        self.parent_of.clear();
    }

    fn known_children(&self, parent: ObjectId) -> Vec<ObjectId> {
        self.by_parent
            .get(&Some(parent))
            .map(|children| children.iter().map(RemoteObject::id).collect())
            .unwrap_or_default()
    }
}

struct Inner {
    config: RegisterConfig,
    state: Mutex<State>,
    mapper: Mutex<Option<ObjectMapper>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<NameEvent>>>,
    updating: watch::Sender<bool>,
}

/// Registry of the names of the remote objects. Cloning shares the register.
#[derive(Clone)]
pub struct NameRegister {
    inner: Arc<Inner>,
}

impl NameRegister {
    /// Create a register with no target application attached.
    pub fn new(config: RegisterConfig) -> Self {
        let (updating, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                mapper: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                updating,
            }),
        }
    }

    /// Create a register for a target application that is already running.
    pub fn with_mapper(config: RegisterConfig, mapper: ObjectMapper) -> Self {
        let register = Self::new(config);
        register.attach(mapper);
        register
    }

    pub fn config(&self) -> &RegisterConfig {
        &self.inner.config
    }

    /// Receive name and update notifications from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NameEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners.lock().push(tx);
        rx
    }

    /// Start tracking the objects of a newly started target application.
    ///
    /// Any previous target is detached first. The whole tree below the main
    /// window is walked now; names follow after the debounce delay.
    ///
    /// Attaching the mapper already in use starts over without invalidating
    /// it.
    pub fn attach(&self, mapper: ObjectMapper) {
        let previous = self.inner.mapper.lock().replace(mapper.clone());
        if let Some(previous) = previous {
            if !previous.same_target(&mapper) {
                previous.invalidate();
            }
        }

        let mut state = self.inner.state.lock();
        state.clear();
        self.start_update();

        match mapper.main_window() {
            Ok(Some(root)) => self.register_object(&mut state, root, None),
            Ok(None) => warn!("the target application has no main window, no names registered"),
            Err(err) => warn!(error = %err, "the remote objects could not be registered"),
        }

        if state.pending.is_empty() {
            self.finish_update();
        }
    }

    /// Forget every object; the target application exited.
    ///
    /// Names pending to be read are not cancelled. Their handles are stale now
    /// and they are dropped when their delay expires, which eventually ends the
    /// update in progress.
    pub fn detach(&self) {
        if let Some(mapper) = self.inner.mapper.lock().take() {
            mapper.invalidate();
        }
        self.inner.state.lock().clear();
    }

    /// React to an event observed on `object` in the target application.
    pub fn handle_event(&self, object: &RemoteObject, kind: &EventKind) {
        match kind {
            EventKind::ChildAdded => self.children_added(object),
            EventKind::ChildRemoved => self.children_removed(object),
            EventKind::Other(_) => {}
        }
    }

    /// Drive the register from an event channel until every sender is gone.
    pub fn listen(&self, mut events: EventReceiver) -> JoinHandle<()> {
        let register = self.clone();
        crate::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    Event::System(SystemEvent::Started(mapper)) => register.attach(mapper),
                    Event::System(SystemEvent::Finished) => register.detach(),
                    // Lifecycle events overtake queued object events, so a
                    // stale id may be resolved by the mapper of a newer run.
                    // Child events diff against the live children, which
                    // makes that harmless.
                    Event::Object(event) => {
                        let object = register
                            .inner
                            .mapper
                            .lock()
                            .as_ref()
                            .and_then(|mapper| mapper.remote_object(event.object));
                        match object {
                            Some(object) => register.handle_event(&object, &event.kind),
                            None => debug!(object = event.object, kind = %event.kind, "event ignored, no target attached"),
                        }
                    }
                }
            }
            debug!("event channel closed");
        })
    }

    /// Every registered name, once per object registered with it.
    pub fn names(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let names = state
            .by_name
            .iter()
            .flat_map(|(name, objects)| std::iter::repeat(name.clone()).take(objects.len()))
            .collect();
        names
    }

    /// Name that identifies `object` in the target application, or an empty
    /// string if there is none.
    pub fn unique_name(&self, object: &RemoteObject) -> Result<String> {
        let (name, unique) = {
            let state = self.inner.state.lock();
            let (reversed, homonyms) = self.best_path(&state, object)?;
            (
                path::reversed_path_as_name(&reversed),
                path::is_unique_among(&reversed, &homonyms),
            )
        };

        if unique {
            return Ok(name);
        }

        // The target's resolution rules may still single it out.
        if self.find_remote_object(&name)?.as_ref() == Some(object) {
            return Ok(name);
        }

        Ok(String::new())
    }

    /// Best qualified name of `object`, even if it is still ambiguous.
    pub fn best_name(&self, object: &RemoteObject) -> Result<String> {
        let state = self.inner.state.lock();
        let (reversed, _) = self.best_path(&state, object)?;
        Ok(path::reversed_path_as_name(&reversed))
    }

    /// Best qualified name of every object registered as `name`.
    ///
    /// A single object gives just `name`. Several objects give one entry each,
    /// in registration order; an entry may repeat when two objects can not be
    /// told apart. An unknown name gives an empty list.
    pub fn best_names(&self, name: &str) -> Result<Vec<String>> {
        let state = self.inner.state.lock();
        let Some(objects) = state.by_name.get(name) else {
            return Ok(Vec::new());
        };

        if objects.len() <= 1 {
            return Ok(vec![name.to_string()]);
        }

        let best_names = objects
            .iter()
            .map(|object| {
                self.best_path(&state, object)
                    .map(|(reversed, _)| path::reversed_path_as_name(&reversed))
            })
            .collect();
        best_names
    }

    /// Resolve a name with the target application's own rules.
    pub fn find_remote_object(&self, name: &str) -> Result<Option<RemoteObject>> {
        let mapper = self.inner.mapper.lock().clone();
        match mapper {
            Some(mapper) => mapper.find_object(name),
            None => Ok(None),
        }
    }

    pub fn is_updating(&self) -> bool {
        *self.inner.updating.borrow()
    }

    /// Wait until no names are pending.
    pub async fn wait_until_idle(&self) {
        let mut updating = self.inner.updating.subscribe();
        let _ = updating.wait_for(|updating| !*updating).await;
    }

    fn emit(&self, event: NameEvent) {
        self.inner
            .listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    // Both must be called with the state locked, so the flag always agrees
    // with the pending queue.
    fn start_update(&self) {
        if !self.inner.updating.send_replace(true) {
            self.emit(NameEvent::UpdateStarted);
        }
    }

    // Subscribers get `UpdateFinished` before idle waiters are woken up.
    fn finish_update(&self) {
        let updating = *self.inner.updating.borrow();
        if updating {
            self.emit(NameEvent::UpdateFinished);
            self.inner.updating.send_replace(false);
        }
    }

    fn register_object(&self, state: &mut State, object: RemoteObject, parent: Option<&RemoteObject>) {
        let id = object.id();
        let parent_id = parent.map(RemoteObject::id);
        let known_parent = state
            .parent_of
            .get(&id)
            .map(|known| known.as_ref().map(RemoteObject::id));
        match known_parent {
            Some(known) if known == parent_id => return,
            // Reparented: forget the old subtree before registering it again.
            Some(_) => self.deregister_object(state, id),
            None => {}
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(object = id, class = ?object.class_name(), "remote object discovered");
        }

        state
            .by_parent
            .entry(parent_id)
            .or_default()
            .push(object.clone());
        state.parent_of.insert(id, parent.cloned());

        state.pending.push_back(object.clone());
        self.schedule_name_register();

        match object.children() {
            Ok(children) => {
                for child in children {
                    self.register_object(state, child, Some(&object));
                }
            }
            Err(err) => warn!(object = id, error = %err, "children could not be registered"),
        }
    }

    fn deregister_object(&self, state: &mut State, id: ObjectId) {
        let Some(parent) = state.parent_of.remove(&id) else {
            return;
        };

        let parent = parent.as_ref().map(RemoteObject::id);
        if let Some(siblings) = state.by_parent.get_mut(&parent) {
            siblings.retain(|sibling| sibling.id() != id);
            if siblings.is_empty() {
                state.by_parent.remove(&parent);
            }
        }

        // The object may be gone already, so the recorded name is used.
        if let Some(name) = state.name_of.remove(&id) {
            if let Some(homonyms) = state.by_name.get_mut(&name) {
                homonyms.retain(|homonym| homonym.id() != id);
                if homonyms.is_empty() {
                    state.by_name.remove(&name);
                }
            }
            debug!(object = id, name = %name, "remote object name removed");
            self.emit(NameEvent::NameRemoved(name));
        }

        for child in state.by_parent.remove(&Some(id)).unwrap_or_default() {
            self.deregister_object(state, child.id());
        }
    }

    fn schedule_name_register(&self) {
        let inner = Arc::downgrade(&self.inner);
        let delay = self.inner.config.name_debounce;
        crate::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                NameRegister { inner }.register_pending_name();
            }
        });
    }

    /// Read the name of the oldest pending object.
    fn register_pending_name(&self) {
        let mut state = self.inner.state.lock();
        let Some(object) = state.pending.pop_front() else {
            return;
        };

        let id = object.id();
        let tracked = object.is_alive()
            && state.parent_of.contains_key(&id)
            && !state.name_of.contains_key(&id);
        if tracked {
            match object.name() {
                Ok(name) if !name.is_empty() => {
                    debug!(object = id, name = %name, "remote object name added");
                    state.by_name.entry(name.clone()).or_default().push(object);
                    state.name_of.insert(id, name.clone());
                    self.emit(NameEvent::NameAdded(name));
                }
                Ok(_) => trace!(object = id, "remote object has no name"),
                Err(err) => warn!(object = id, error = %err, "the name of the remote object could not be read"),
            }
        }

        if state.pending.is_empty() {
            self.finish_update();
        }
    }

    fn children_added(&self, parent: &RemoteObject) {
        let mut state = self.inner.state.lock();
        self.start_update();

        match parent.children() {
            Ok(children) => {
                let known = state.known_children(parent.id());
                for child in children {
                    if !known.contains(&child.id()) {
                        self.register_object(&mut state, child, Some(parent));
                    }
                }
            }
            Err(err) => warn!(object = parent.id(), error = %err, "added children could not be registered"),
        }

        if state.pending.is_empty() {
            self.finish_update();
        }
    }

    fn children_removed(&self, parent: &RemoteObject) {
        let mut state = self.inner.state.lock();
        match parent.children() {
            Ok(children) => {
                let current: HashSet<ObjectId> = children.iter().map(RemoteObject::id).collect();
                for id in state.known_children(parent.id()) {
                    if !current.contains(&id) {
                        self.deregister_object(&mut state, id);
                    }
                }
            }
            Err(err) => warn!(object = parent.id(), error = %err, "removed children could not be deregistered"),
        }
    }

    /// Best reversed path of `object` along with the reversed paths of its
    /// homonyms.
    fn best_path(&self, state: &State, object: &RemoteObject) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let name = object.name()?;
        if name.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let homonyms = self.reversed_paths_to_homonyms(state, object, &name)?;
        let mut reversed = vec![name];
        if homonyms.is_empty() {
            return Ok((reversed, homonyms));
        }

        let full = self.reversed_path_to(state, object, &reversed[0])?;

        // Nearest ancestor whose name is registered only once.
        let unique_ancestor = (1..full.len())
            .find(|&i| state.by_name.get(&full[i]).map_or(0, Vec::len) == 1);

        // No homonym descends from it, so it is enough on its own.
        if let Some(i) = unique_ancestor {
            if path::ancestor_not_in_paths(&full[i], &homonyms) {
                reversed.push(full[i].clone());
                return Ok((reversed, homonyms));
            }
        }

        let limit = unique_ancestor.unwrap_or(full.len().saturating_sub(1));
        for ancestor in full.iter().take(limit + 1).skip(1) {
            reversed.push(ancestor.clone());
            if path::is_unique_among(&reversed, &homonyms) {
                break;
            }
        }

        Ok((reversed, homonyms))
    }

    /// `name` followed by the usable names of the ancestors of `object`. The
    /// root is never part of the path.
    ///
    /// An object missing from the tree gives just `[name]`, not an empty path.
    fn reversed_path_to(&self, state: &State, object: &RemoteObject, name: &str) -> Result<Vec<String>> {
        let mut reversed = vec![name.to_string()];

        let mut ancestor = state.parent_of.get(&object.id()).cloned().flatten();
        while let Some(current) = ancestor {
            let Some(Some(next)) = state.parent_of.get(&current.id()) else {
                break;
            };
            let ancestor_name = current.name()?;
            if self.inner.config.is_path_component(&ancestor_name) {
                reversed.push(ancestor_name);
            }
            ancestor = Some(next.clone());
        }

        Ok(reversed)
    }

    fn reversed_paths_to_homonyms(&self, state: &State, object: &RemoteObject, name: &str) -> Result<Vec<Vec<String>>> {
        state
            .by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter(|homonym| *homonym != object)
            .map(|homonym| self.reversed_path_to(state, homonym, name))
            .collect()
    }
}
