//! In-memory target application used by the integration tests.
//!
//! ```text
//!  42: "The object name 42"
//!    420..423: "The object name 42x"
//!    5: "Duplicated grandparent"
//!      50: "The object name 50"
//!        500: "Duplicated object", 501..503
//!      51..53 with 510..533
//!    6: "Duplicated grandparent"
//!      60: "Duplicated parent"
//!        600: "Duplicated object"
//!    7: "The object name 7"
//!      70: "Duplicated parent"
//!        700: "Duplicated object"
//!    8: "The object name 8"
//!      80: ""
//!        800: "Duplicated object", 801, 802: "", 803
//!      81: "" with 810..813: ""
//!      82, 83 with 820..833
//!    9: "Duplicated grandparent"
//!      90: "The object name 90"
//!        900, 901: "Duplicated object"
//!      91, 92: "Another duplicated parent"
//!        910, 920: "Duplicated object"
//!      93: ""
//!        930, 931: "Duplicated object"
//! ```
#![allow(dead_code)]

use parking_lot::Mutex;
use remote_names::{Introspector, ObjectId, RemoteError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;

pub const ROOT: ObjectId = 42;

fn fixture_name(id: ObjectId) -> String {
    match id {
        500 | 600 | 700 | 800 | 900 | 901 | 910 | 920 | 930 | 931 => "Duplicated object".to_string(),
        60 | 70 => "Duplicated parent".to_string(),
        91 | 92 => "Another duplicated parent".to_string(),
        5 | 6 | 9 => "Duplicated grandparent".to_string(),
        80 | 81 | 802 | 810 | 811 | 812 | 813 | 93 => String::new(),
        id if id > 1000 => String::new(),
        id => format!("The object name {id}"),
    }
}

fn fixture_class(id: ObjectId) -> String {
    match id {
        81 | 82 => "ChildChildQWidget".to_string(),
        830 => "ChildQWidget".to_string(),
        id => format!("The class name {id}"),
    }
}

fn fixture_children(id: ObjectId) -> Vec<ObjectId> {
    if id > 99 {
        return Vec::new();
    }
    let mut ids: Vec<ObjectId> = (0..4).map(|i| id * 10 + i).collect();
    if id == ROOT {
        ids.extend([5, 6, 7, 8, 9]);
    }
    ids
}

/// Ambiguous names the target resolves with its own tie-breaking rules.
fn resolve_ambiguous(name: &str) -> ObjectId {
    match name {
        "The object name 90/Duplicated object" => 900,
        "Duplicated grandparent/Another duplicated parent/Duplicated object" => 910,
        "Duplicated grandparent/Duplicated object" => 930,
        _ => 0,
    }
}

pub struct TargetStub {
    names: Mutex<HashMap<ObjectId, String>>,
    children: Mutex<HashMap<ObjectId, Vec<ObjectId>>>,
    broken_children: Mutex<HashSet<ObjectId>>,
    unreachable: AtomicBool,
}

impl TargetStub {
    pub fn new() -> Self {
        let mut names = HashMap::new();
        let mut children = HashMap::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            names.insert(id, fixture_name(id));
            let ids = fixture_children(id);
            stack.extend(ids.iter().copied());
            children.insert(id, ids);
        }
        Self {
            names: Mutex::new(names),
            children: Mutex::new(children),
            broken_children: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn add_child(&self, parent: ObjectId, child: ObjectId, name: &str) {
        self.names.lock().insert(child, name.to_string());
        self.children.lock().entry(child).or_default();
        self.children.lock().entry(parent).or_default().push(child);
    }

    pub fn remove_child(&self, parent: ObjectId, child: ObjectId) {
        if let Some(children) = self.children.lock().get_mut(&parent) {
            children.retain(|id| *id != child);
        }
    }

    pub fn set_name(&self, id: ObjectId, name: &str) {
        self.names.lock().insert(id, name.to_string());
    }

    pub fn break_children_of(&self, id: ObjectId) {
        self.broken_children.lock().insert(id);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every object reachable from the root, in depth-first order.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let children = self.children.lock();
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(ids) = children.get(&id) {
                stack.extend(ids.iter().rev().copied());
            }
        }
        out
    }

    fn reachable(&self, call: &'static str) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::communication(call, "the target does not answer"));
        }
        Ok(())
    }

    fn parent_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.children
            .lock()
            .iter()
            .find(|(_, children)| children.contains(&id))
            .map(|(parent, _)| *parent)
    }

    /// Objects named like the last component whose ancestors carry the other
    /// components, outermost first.
    fn matches(&self, name: &str) -> Vec<ObjectId> {
        let components: Vec<&str> = name.split('/').collect();
        let Some((own, qualifiers)) = components.split_last() else {
            return Vec::new();
        };
        let names = self.names.lock().clone();
        self.object_ids()
            .into_iter()
            .filter(|id| names.get(id).map(String::as_str) == Some(*own))
            .filter(|id| {
                let mut ancestors = Vec::new();
                let mut current = self.parent_of(*id);
                while let Some(parent) = current {
                    ancestors.push(names.get(&parent).cloned().unwrap_or_default());
                    current = self.parent_of(parent);
                }
                ancestors.reverse();
                let mut remaining = ancestors.iter();
                qualifiers
                    .iter()
                    .all(|qualifier| remaining.any(|ancestor| ancestor == qualifier))
            })
            .collect()
    }
}

impl Introspector for TargetStub {
    fn main_window(&self) -> Result<ObjectId> {
        self.reachable("mainWindowObjectId")?;
        Ok(ROOT)
    }

    fn object_name(&self, id: ObjectId) -> Result<String> {
        self.reachable("objectName")?;
        Ok(self.names.lock().get(&id).cloned().unwrap_or_else(|| fixture_name(id)))
    }

    fn class_name(&self, id: ObjectId) -> Result<String> {
        self.reachable("className")?;
        Ok(fixture_class(id))
    }

    fn child_object_ids(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        self.reachable("childObjectIds")?;
        if self.broken_children.lock().contains(&id) {
            return Err(RemoteError::communication("childObjectIds", "no reply"));
        }
        Ok(self.children.lock().get(&id).cloned().unwrap_or_default())
    }

    fn find_object(&self, name: &str) -> Result<ObjectId> {
        self.reachable("findObject")?;
        match self.matches(name).as_slice() {
            [] => Ok(0),
            [only] => Ok(*only),
            _ => Ok(resolve_ambiguous(name)),
        }
    }
}

pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
