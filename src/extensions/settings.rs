//! Provider settings tree.
//!
//! Each provider owns one synthetic screen node whose children come from the
//! provider (manifest `settings` and `Awery.addSetting`) plus host-owned
//! action items appended by the bridge. The tree is an arena: nodes refer to
//! their parent by index, and removal frees slots without moving live nodes.
//!
//! Every mutation emits a [`SettingsEvent`] carrying an owned snapshot, so
//! listeners never need to re-enter the tree. Listeners run on the mutating
//! thread; hosts hop to their presentation thread themselves.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::dates::{decode_date, encode_date};
use super::codec::{
    decode_batch, expect_mapping, opt_bool, opt_i64, opt_string, required_string, string_list,
    DecodeError, FromGuest, ToGuest,
};
use super::error::{ExtensionError, ExtensionResult};
use super::value::GuestValue;

/// Settings tree shared between the queue thread and the host.
pub type SharedSettings = Arc<Mutex<SettingsTree>>;

/// Kind of a settings node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Screen,
    Category,
    Divider,
    Action,
    Boolean,
    ScreenBoolean,
    Integer,
    SelectInteger,
    Color,
    String,
    Select,
    Json,
    #[serde(rename = "multiselect")]
    MultiSelect,
    Date,
}

const KIND_NAMES: &[(&str, SettingKind)] = &[
    ("screen", SettingKind::Screen),
    ("category", SettingKind::Category),
    ("divider", SettingKind::Divider),
    ("action", SettingKind::Action),
    ("boolean", SettingKind::Boolean),
    ("screen_boolean", SettingKind::ScreenBoolean),
    ("integer", SettingKind::Integer),
    ("int", SettingKind::Integer),
    ("select_integer", SettingKind::SelectInteger),
    ("color", SettingKind::Color),
    ("string", SettingKind::String),
    ("select", SettingKind::Select),
    ("json", SettingKind::Json),
    ("multiselect", SettingKind::MultiSelect),
    ("date", SettingKind::Date),
];

impl SettingKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        KIND_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        KIND_NAMES
            .iter()
            .find(|(_, kind)| kind == self)
            .map_or("unknown", |(name, _)| *name)
    }

    /// Whether nodes of this kind may have children.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Screen | Self::Category | Self::ScreenBoolean | Self::Select | Self::MultiSelect
        )
    }

    /// Whether nodes of this kind hold a persisted value.
    pub fn has_value(&self) -> bool {
        !matches!(
            self,
            Self::Screen | Self::Category | Self::Divider | Self::Action
        )
    }
}

/// Persisted value of a setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    String(String),
    StringSet(Vec<String>),
    Date(DateTime<Utc>),
}

impl SettingValue {
    /// Interpret a guest value according to the node kind.
    pub fn from_guest(kind: SettingKind, value: &GuestValue) -> Option<Self> {
        match kind {
            SettingKind::Boolean | SettingKind::ScreenBoolean => opt_bool(value).map(Self::Bool),
            SettingKind::Integer | SettingKind::SelectInteger | SettingKind::Color => {
                opt_i64(value).map(Self::Integer)
            }
            SettingKind::String | SettingKind::Select | SettingKind::Json => {
                opt_string(value).map(Self::String)
            }
            SettingKind::MultiSelect => Some(Self::StringSet(string_list(value))),
            SettingKind::Date => decode_date(value).map(Self::Date),
            SettingKind::Screen
            | SettingKind::Category
            | SettingKind::Divider
            | SettingKind::Action => None,
        }
    }

    /// Interpret a stored JSON value according to the node kind.
    pub fn from_json(kind: SettingKind, value: &serde_json::Value) -> Option<Self> {
        Self::from_guest(kind, &GuestValue::from(value.clone()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.to_guest())
    }
}

impl ToGuest for SettingValue {
    fn to_guest(&self) -> GuestValue {
        match self {
            Self::Bool(b) => GuestValue::Bool(*b),
            Self::Integer(n) => GuestValue::from(*n),
            Self::String(s) => GuestValue::from(s),
            Self::StringSet(items) => GuestValue::from(items.clone()),
            Self::Date(date) => encode_date(date),
        }
    }
}

/// Host-owned actions appended to every provider screen. Never guest-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    Login,
    LogOut,
    Uninstall,
}

impl HostAction {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Login => "Log in",
            Self::LogOut => "Log out",
            Self::Uninstall => "Uninstall extension",
        }
    }
}

/// A settings item as contributed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingItem {
    pub key: String,
    pub kind: SettingKind,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Default value.
    pub value: Option<SettingValue>,
    /// Children of containers, or the options of a select.
    #[serde(default)]
    pub items: Vec<SettingItem>,
}

impl SettingItem {
    pub fn new(key: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            key: key.into(),
            kind,
            title: None,
            description: None,
            value: None,
            items: Vec::new(),
        }
    }
}

impl FromGuest for SettingItem {
    fn from_guest(value: &GuestValue) -> Result<Self, DecodeError> {
        expect_mapping(value, "setting")?;

        let key = required_string(value.get("key"), "setting", "key")?;
        let kind_name = required_string(value.get("type"), "setting", "type")?;
        let kind = SettingKind::from_name(&kind_name).ok_or(DecodeError::UnexpectedKind {
            record: "setting",
            field: "type",
            expected: "settings kind",
            found: "unknown name",
        })?;

        Ok(SettingItem {
            title: opt_string(value.get("title")),
            description: opt_string(value.get("description")),
            value: SettingValue::from_guest(kind, value.get("value")),
            items: decode_batch(value.get("items")),
            key,
            kind,
        })
    }
}

/// Index of a node in its [`SettingsTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A node of the settings tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsNode {
    pub key: String,
    pub kind: SettingKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub value: Option<SettingValue>,
    pub action: Option<HostAction>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Notification of a tree mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    Inserted {
        parent: NodeId,
        index: usize,
        id: NodeId,
        node: SettingsNode,
    },
    Removed {
        parent: NodeId,
        index: usize,
        full_key: String,
    },
    Changed {
        parent: NodeId,
        index: usize,
        id: NodeId,
        node: SettingsNode,
    },
}

/// Handle returned by [`SettingsTree::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&SettingsEvent) + Send>;

/// Arena-backed settings tree for one provider.
pub struct SettingsTree {
    nodes: Vec<Option<SettingsNode>>,
    root: NodeId,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl SettingsTree {
    /// Create a tree with a screen root. The root key names the provider and
    /// does not take part in full keys.
    pub fn new(root_key: &str, title: &str) -> Self {
        let root = SettingsNode {
            key: root_key.to_string(),
            kind: SettingKind::Screen,
            title: Some(title.to_string()),
            description: None,
            value: None,
            action: None,
            parent: None,
            children: Vec::new(),
        };

        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn shared(self) -> SharedSettings {
        Arc::new(Mutex::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&SettingsNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Ancestor keys below the root joined with `_`.
    pub fn full_key(&self, id: NodeId) -> String {
        let mut keys = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.root {
                break;
            }
            match self.node(node_id) {
                Some(node) => {
                    keys.push(node.key.as_str());
                    current = node.parent;
                }
                None => break,
            }
        }
        keys.reverse();
        keys.join("_")
    }

    /// Resolve a `.`-separated key path from the root.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        path.split('.').try_fold(self.root, |current, key| {
            self.children(current)
                .iter()
                .copied()
                .find(|child| self.node(*child).is_some_and(|node| node.key == key))
        })
    }

    /// Locate a node by its full key.
    pub fn find_full_key(&self, full_key: &str) -> Option<NodeId> {
        self.iter()
            .map(|(id, _)| id)
            .find(|id| *id != self.root && self.full_key(*id) == full_key)
    }

    /// Live nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SettingsNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (NodeId(index), node)))
    }

    /// Host action node directly under the root, if any.
    pub fn action_node(&self, matches: impl Fn(HostAction) -> bool) -> Option<NodeId> {
        self.children(self.root).iter().copied().find(|child| {
            self.node(*child)
                .and_then(|node| node.action)
                .is_some_and(&matches)
        })
    }

    /// Insert a provider item (and its subtree) under `parent`.
    ///
    /// Items added under the root are kept ahead of the host action nodes.
    pub fn insert(&mut self, parent: NodeId, item: SettingItem) -> ExtensionResult<NodeId> {
        let parent_node = self
            .node(parent)
            .ok_or_else(|| ExtensionError::Settings("parent node does not exist".to_string()))?;
        if !parent_node.kind.is_container() {
            return Err(ExtensionError::Settings(format!(
                "'{}' cannot contain other settings",
                parent_node.key
            )));
        }
        if parent_node
            .children
            .iter()
            .any(|child| self.node(*child).is_some_and(|node| node.key == item.key))
        {
            return Err(ExtensionError::Settings(format!(
                "a setting with key '{}' already exists",
                item.key
            )));
        }

        let index = if parent == self.root {
            self.action_node(|_| true)
                .and_then(|first| self.children(self.root).iter().position(|c| *c == first))
                .unwrap_or(self.children(self.root).len())
        } else {
            parent_node.children.len()
        };

        let id = self.attach(parent, index, item);
        self.notify_inserted(parent, index, id);
        Ok(id)
    }

    /// Append a host action under the root.
    pub fn insert_action(&mut self, action: HostAction) -> NodeId {
        let node = SettingsNode {
            key: format!("{:?}", action).to_lowercase(),
            kind: SettingKind::Action,
            title: Some(action.title().to_string()),
            description: None,
            value: None,
            action: Some(action),
            parent: Some(self.root),
            children: Vec::new(),
        };
        let index = self.children(self.root).len();
        let id = self.push(node);
        if let Some(Some(root)) = self.nodes.get_mut(self.root.0) {
            root.children.push(id);
        }
        self.notify_inserted(self.root, index, id);
        id
    }

    /// Remove a node and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Option<SettingsNode> {
        if id == self.root {
            return None;
        }
        let parent = self.node(id)?.parent?;
        let full_key = self.full_key(id);
        let index = self.children(parent).iter().position(|child| *child == id)?;

        if let Some(Some(parent_node)) = self.nodes.get_mut(parent.0) {
            parent_node.children.remove(index);
        }
        let removed = self.free(id);

        self.emit(&SettingsEvent::Removed {
            parent,
            index,
            full_key,
        });
        removed
    }

    /// Mutate a node in place and notify listeners.
    pub fn update(&mut self, id: NodeId, f: impl FnOnce(&mut SettingsNode)) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => f(node),
            _ => return false,
        }

        if let Some(parent) = self.node(id).and_then(|node| node.parent) {
            let index = self
                .children(parent)
                .iter()
                .position(|child| *child == id)
                .unwrap_or_default();
            if let Some(node) = self.node(id).cloned() {
                self.emit(&SettingsEvent::Changed {
                    parent,
                    index,
                    id,
                    node,
                });
            }
        }
        true
    }

    /// Fill node values from persisted storage, keyed by full key.
    pub fn restore_values(&mut self, lookup: impl Fn(&str) -> Option<serde_json::Value>) {
        let ids: Vec<NodeId> = self.iter().map(|(id, _)| id).collect();
        for id in ids {
            let Some(kind) = self.node(id).map(|node| node.kind) else {
                continue;
            };
            if !kind.has_value() {
                continue;
            }
            let stored = lookup(&self.full_key(id)).and_then(|v| SettingValue::from_json(kind, &v));
            if let (Some(value), Some(Some(node))) = (stored, self.nodes.get_mut(id.0)) {
                node.value = Some(value);
            }
        }
    }

    /// Current values of all value-bearing nodes by full key.
    pub fn values(&self) -> BTreeMap<String, SettingValue> {
        self.iter()
            .filter_map(|(id, node)| node.value.clone().map(|value| (self.full_key(id), value)))
            .collect()
    }

    pub fn add_listener(
        &mut self,
        listener: impl Fn(&SettingsEvent) + Send + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn attach(&mut self, parent: NodeId, index: usize, item: SettingItem) -> NodeId {
        let SettingItem {
            key,
            kind,
            title,
            description,
            value,
            items,
        } = item;

        let id = self.push(SettingsNode {
            key,
            kind,
            title,
            description,
            value,
            action: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(Some(parent_node)) = self.nodes.get_mut(parent.0) {
            parent_node.children.insert(index, id);
        }

        for (child_index, child) in items.into_iter().enumerate() {
            self.attach(id, child_index, child);
        }
        id
    }

    fn push(&mut self, node: SettingsNode) -> NodeId {
        match self.nodes.iter().position(Option::is_none) {
            Some(free) => {
                self.nodes[free] = Some(node);
                NodeId(free)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn free(&mut self, id: NodeId) -> Option<SettingsNode> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        for child in &node.children {
            self.free(*child);
        }
        Some(node)
    }

    fn notify_inserted(&self, parent: NodeId, index: usize, id: NodeId) {
        if let Some(node) = self.node(id).cloned() {
            self.emit(&SettingsEvent::Inserted {
                parent,
                index,
                id,
                node,
            });
        }
    }

    fn emit(&self, event: &SettingsEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for SettingsTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsTree")
            .field("nodes", &self.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
