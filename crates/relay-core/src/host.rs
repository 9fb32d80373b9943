//! The host: owns buffers, hotlist, registries and the signal bus.
//!
//! Every mutation emits the matching signal so relay clients (and any
//! other subscriber) can mirror state changes. All ids come from one
//! monotonic counter and are never reused.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use relay_eval::HostBindings;
use relay_protocol::{BufferKind, CompletionData, HotlistEntry};
use relay_text::{encode_ansi, strip_colors};
use tracing::{debug, warn};

use crate::buffer::{Buffer, Line, NickGroupNode, NickNode};
use crate::completion;
use crate::config::Config;
use crate::hotlist::{sort_entries, Hotlist};
use crate::signals::{Signal, SignalBus, SignalData};

/// Name of the main buffer, always present.
pub const MAIN_BUFFER_NAME: &str = "core.weechat";

const DEFAULT_COMMANDS: &[&str] = &[
    "/buffer", "/clear", "/close", "/input", "/msg", "/print", "/query", "/upgrade",
];

type ModifierFn = Box<dyn Fn(&str, &str) -> String + Send + Sync>;

struct HostState {
    buffers: BTreeMap<i64, Buffer>,
    hotlist: Vec<Hotlist>,
    commands: Vec<String>,
}

struct Inner {
    state: RwLock<HostState>,
    config: RwLock<Config>,
    modifiers: RwLock<HashMap<String, ModifierFn>>,
    bus: SignalBus,
    next_id: AtomicI64,
}

#[derive(Clone)]
pub struct Host {
    inner: Arc<Inner>,
}

impl Host {
    pub fn new(config: Config) -> Self {
        let host = Self {
            inner: Arc::new(Inner {
                state: RwLock::new(HostState {
                    buffers: BTreeMap::new(),
                    hotlist: Vec::new(),
                    commands: DEFAULT_COMMANDS.iter().map(|s| (*s).to_owned()).collect(),
                }),
                config: RwLock::new(config),
                modifiers: RwLock::new(HashMap::new()),
                bus: SignalBus::default(),
                next_id: AtomicI64::new(1),
            }),
        };
        host.register_modifier("color_encode_ansi", |_, text| encode_ansi(text));
        host.register_modifier("color_strip", |_, text| strip_colors(text));
        host.buffer_add(MAIN_BUFFER_NAME, BufferKind::Formatted);
        host
    }

    /// Next process-wide id (buffers, lines, nicks, relay clients).
    pub fn next_id(&self) -> i64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn signals(&self) -> &SignalBus {
        &self.inner.bus
    }

    pub fn signal_send(&self, signal: Signal) {
        self.inner.bus.send(signal);
    }

    pub fn config(&self) -> Config {
        self.inner.config.read().expect("config lock").clone()
    }

    pub fn update_config(&self, config: Config) {
        *self.inner.config.write().expect("config lock") = config;
        self.signal_send(Signal::bare("config_changed"));
    }

    // -----------------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------------

    pub fn buffer_add(&self, full_name: &str, kind: BufferKind) -> i64 {
        let id = self.next_id();
        let root_group_id = self.next_id();
        let mut buffer = Buffer::new(id, root_group_id, full_name, kind);
        {
            let mut state = self.state_mut();
            buffer.number = state
                .buffers
                .values()
                .map(|b| b.number)
                .max()
                .unwrap_or(0)
                + 1;
            state.buffers.insert(id, buffer);
        }
        debug!(buffer = full_name, id, "buffer opened");
        self.signal_send(Signal::buffer("buffer_opened", id));
        id
    }

    /// Buffer ids in display order (number, then id).
    pub fn buffer_ids(&self) -> Vec<i64> {
        let state = self.state();
        let mut ids: Vec<(i32, i64)> = state.buffers.values().map(|b| (b.number, b.id)).collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn main_buffer_id(&self) -> Option<i64> {
        self.find_buffer_by_name(MAIN_BUFFER_NAME)
    }

    pub fn find_buffer_by_name(&self, full_name: &str) -> Option<i64> {
        self.state()
            .buffers
            .values()
            .find(|b| b.full_name == full_name)
            .map(|b| b.id)
    }

    /// Looks a buffer up by id first, then by full name.
    pub fn find_buffer(&self, id_or_name: &str) -> Option<i64> {
        if let Ok(id) = id_or_name.parse::<i64>() {
            if self.state().buffers.contains_key(&id) {
                return Some(id);
            }
        }
        self.find_buffer_by_name(id_or_name)
    }

    pub fn with_buffer<T>(&self, id: i64, f: impl FnOnce(&Buffer) -> T) -> Option<T> {
        self.state().buffers.get(&id).map(f)
    }

    fn mutate_buffer<T>(&self, id: i64, f: impl FnOnce(&mut Buffer) -> T) -> Option<T> {
        self.state_mut().buffers.get_mut(&id).map(f)
    }

    pub fn buffer_set_title(&self, id: i64, title: &str) {
        if self.mutate_buffer(id, |b| b.title = title.to_owned()).is_some() {
            self.signal_send(Signal::buffer("buffer_title_changed", id));
        }
    }

    pub fn buffer_set_modes(&self, id: i64, modes: &str) {
        if self.mutate_buffer(id, |b| b.modes = modes.to_owned()).is_some() {
            self.signal_send(Signal::buffer("buffer_modes_changed", id));
        }
    }

    pub fn buffer_rename(&self, id: i64, full_name: &str) {
        let renamed = self.mutate_buffer(id, |b| {
            b.full_name = full_name.to_owned();
            b.short_name = full_name.rsplit('.').next().unwrap_or(full_name).to_owned();
        });
        if renamed.is_some() {
            self.signal_send(Signal::buffer("buffer_renamed", id));
        }
    }

    pub fn buffer_set_hidden(&self, id: i64, hidden: bool) {
        if self.mutate_buffer(id, |b| b.hidden = hidden).is_some() {
            let name = if hidden { "buffer_hidden" } else { "buffer_unhidden" };
            self.signal_send(Signal::buffer(name, id));
        }
    }

    pub fn buffer_move(&self, id: i64, number: i32) {
        if self.mutate_buffer(id, |b| b.number = number).is_some() {
            self.signal_send(Signal::buffer("buffer_moved", id));
        }
    }

    pub fn buffer_set_local_variable(&self, id: i64, name: &str, value: &str) {
        let previous = self.mutate_buffer(id, |b| {
            b.local_variables.insert(name.to_owned(), value.to_owned())
        });
        match previous {
            Some(None) => self.signal_send(Signal::buffer("buffer_localvar_added", id)),
            Some(Some(_)) => self.signal_send(Signal::buffer("buffer_localvar_changed", id)),
            None => {}
        }
    }

    pub fn buffer_remove_local_variable(&self, id: i64, name: &str) {
        let removed = self.mutate_buffer(id, |b| b.local_variables.remove(name).is_some());
        if removed == Some(true) {
            self.signal_send(Signal::buffer("buffer_localvar_removed", id));
        }
    }

    pub fn buffer_set_input(&self, id: i64, input: &str, position: i32) {
        let changed = self.mutate_buffer(id, |b| {
            b.input = input.to_owned();
            b.input_position = position;
        });
        if changed.is_some() {
            self.signal_send(Signal {
                name: "input_text_changed".to_owned(),
                data: SignalData::Buffer { buffer_id: id },
            });
        }
    }

    pub fn buffer_clear(&self, id: i64) {
        if self.mutate_buffer(id, |b| b.lines.clear()).is_some() {
            self.signal_send(Signal::buffer("buffer_cleared", id));
        }
    }

    /// Closes a buffer: `buffer_closing` fires while the buffer still
    /// exists, `buffer_closed` after it is gone.
    pub fn buffer_close(&self, id: i64) {
        if !self.state().buffers.contains_key(&id) {
            return;
        }
        self.signal_send(Signal::buffer("buffer_closing", id));
        {
            let mut state = self.state_mut();
            state.buffers.remove(&id);
            state.hotlist.retain(|h| h.buffer_id != id);
        }
        self.signal_send(Signal::buffer("buffer_closed", id));
    }

    // -----------------------------------------------------------------------
    // Lines
    // -----------------------------------------------------------------------

    pub fn print(&self, buffer_id: i64, prefix: &str, message: &str) -> Option<i64> {
        self.print_full(buffer_id, prefix, message, &[], 0, false)
    }

    pub fn print_full(
        &self,
        buffer_id: i64,
        prefix: &str,
        message: &str,
        tags: &[&str],
        notify_level: i32,
        highlight: bool,
    ) -> Option<i64> {
        let line_id = self.next_id();
        let now = Utc::now();
        let added = self.mutate_buffer(buffer_id, |b| {
            let y = if b.kind == BufferKind::Free {
                i32::try_from(b.lines.len()).unwrap_or(i32::MAX)
            } else {
                -1
            };
            b.lines.push(Line {
                id: line_id,
                y,
                date: now,
                date_printed: now,
                displayed: true,
                highlight,
                notify_level,
                prefix: prefix.to_owned(),
                message: message.to_owned(),
                tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            });
        });
        if added.is_none() {
            return None;
        }
        self.signal_send(Signal {
            name: "buffer_line_added".to_owned(),
            data: SignalData::Line { buffer_id, line_id },
        });
        Some(line_id)
    }

    // -----------------------------------------------------------------------
    // Nicklist
    // -----------------------------------------------------------------------

    pub fn nicklist_add_group(
        &self,
        buffer_id: i64,
        parent: Option<i64>,
        name: &str,
        color: &str,
        visible: bool,
    ) -> Option<i64> {
        let group_id = self.next_id();
        let added = self.mutate_buffer(buffer_id, |b| {
            let parent = parent.unwrap_or(b.root_group_id);
            b.nicklist_enabled = true;
            b.groups.push(NickGroupNode {
                id: group_id,
                parent: Some(parent),
                name: name.to_owned(),
                color: color.to_owned(),
                visible,
            });
        });
        added?;
        self.signal_send(Signal {
            name: "nicklist_group_added".to_owned(),
            data: SignalData::NickGroup {
                buffer_id,
                group_id,
            },
        });
        Some(group_id)
    }

    pub fn nicklist_add_nick(
        &self,
        buffer_id: i64,
        group: Option<i64>,
        name: &str,
        color: &str,
        prefix: &str,
        prefix_color: &str,
        visible: bool,
    ) -> Option<i64> {
        let nick_id = self.next_id();
        let added = self.mutate_buffer(buffer_id, |b| {
            b.nicklist_enabled = true;
            b.nicks.push(NickNode {
                id: nick_id,
                group,
                prefix: prefix.to_owned(),
                prefix_color: prefix_color.to_owned(),
                name: name.to_owned(),
                color: color.to_owned(),
                visible,
            });
        });
        added?;
        self.signal_send(Signal {
            name: "nicklist_nick_added".to_owned(),
            data: SignalData::Nick { buffer_id, nick_id },
        });
        Some(nick_id)
    }

    /// Emits `nicklist_nick_removing` while the nick is still present,
    /// then removes it.
    pub fn nicklist_remove_nick(&self, buffer_id: i64, nick_id: i64) {
        let exists = self
            .with_buffer(buffer_id, |b| b.nick_by_id(nick_id).is_some())
            .unwrap_or(false);
        if !exists {
            return;
        }
        self.signal_send(Signal {
            name: "nicklist_nick_removing".to_owned(),
            data: SignalData::Nick { buffer_id, nick_id },
        });
        self.mutate_buffer(buffer_id, |b| b.nicks.retain(|n| n.id != nick_id));
    }

    pub fn nicklist_remove_group(&self, buffer_id: i64, group_id: i64) {
        let exists = self
            .with_buffer(buffer_id, |b| b.group_by_id(group_id).is_some())
            .unwrap_or(false);
        if !exists {
            return;
        }
        self.signal_send(Signal {
            name: "nicklist_group_removing".to_owned(),
            data: SignalData::NickGroup {
                buffer_id,
                group_id,
            },
        });
        self.mutate_buffer(buffer_id, |b| {
            b.groups.retain(|g| g.id != group_id);
            b.nicks.retain(|n| n.group != Some(group_id));
        });
    }

    pub fn buffer_nick_names(&self, buffer_id: i64) -> Vec<String> {
        self.with_buffer(buffer_id, |b| {
            b.nicks.iter().map(|n| n.name.clone()).collect()
        })
        .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Hotlist
    // -----------------------------------------------------------------------

    pub fn hotlist_add(&self, buffer_id: i64, priority: usize) {
        let priority = priority.min(3);
        let number = self
            .with_buffer(buffer_id, |b| b.number)
            .unwrap_or_default();
        let mut state = self.state_mut();
        if let Some(entry) = state.hotlist.iter_mut().find(|h| h.buffer_id == buffer_id) {
            entry.count[priority] += 1;
            entry.date = Utc::now();
            entry.priority = entry.priority.max(priority as u8);
            entry.buffer_number = number;
        } else {
            let mut count = [0i64; 4];
            count[priority] = 1;
            state.hotlist.push(Hotlist {
                buffer_id,
                buffer_number: number,
                priority: priority as u8,
                date: Utc::now(),
                count,
            });
        }
    }

    pub fn hotlist_clear(&self) {
        self.state_mut().hotlist.clear();
    }

    /// All hotlist entries, ordered per `look.hotlist_sort`.
    pub fn hotlist_sorted(&self) -> Vec<HotlistEntry> {
        let sort = self.config().look.hotlist_sort;
        let mut entries = self.state().hotlist.clone();
        sort_entries(&mut entries, sort);
        entries.iter().map(Hotlist::to_wire).collect()
    }

    // -----------------------------------------------------------------------
    // Completion and commands
    // -----------------------------------------------------------------------

    pub fn complete(&self, buffer_id: i64, input: &str, position: usize) -> CompletionData {
        let commands = self.state().commands.clone();
        let nicks = self.buffer_nick_names(buffer_id);
        completion::complete(input, position, &commands, &nicks)
    }

    pub fn register_command(&self, name: &str) {
        let mut state = self.state_mut();
        if !state.commands.iter().any(|c| c == name) {
            state.commands.push(name.to_owned());
        }
    }

    /// Checks the `network.commands` allow-list: empty allows all,
    /// `*` allows all, `!name` denies, plain names allow.
    pub fn command_allowed(&self, name: &str) -> bool {
        let list = self.config().network.commands;
        if list.trim().is_empty() {
            return true;
        }
        let mut allowed = false;
        for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(denied) = entry.strip_prefix('!') {
                if denied == name {
                    return false;
                }
            } else if entry == "*" || entry == name {
                allowed = true;
            }
        }
        allowed
    }

    /// Executes an input line on a buffer: `/command args` runs the
    /// command, anything else is printed as a message.
    pub fn execute_command(&self, buffer_id: i64, text: &str) {
        let Some(rest) = text.strip_prefix('/') else {
            self.print_full(buffer_id, "", text, &["message"], 1, false);
            self.hotlist_add(buffer_id, crate::hotlist::PRIORITY_MESSAGE);
            return;
        };
        let mut parts = rest.splitn(2, ' ');
        let name = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("");
        if !self.command_allowed(name) {
            warn!(command = name, "command refused by allow-list");
            return;
        }
        match name {
            "print" => {
                self.print(buffer_id, "", args);
            }
            "clear" => self.buffer_clear(buffer_id),
            "close" => self.buffer_close(buffer_id),
            "upgrade" => self.upgrade(),
            _ => {
                warn!(command = name, "unknown command");
                if let Some(main) = self.main_buffer_id() {
                    self.print(main, "=!=", &format!("Unknown command: /{name}"));
                }
            }
        }
    }

    /// Schedules a command for delayed execution on the runtime; used
    /// to avoid reentrancy into the caller's stack.
    pub fn schedule_command(&self, buffer_id: i64, text: String, delay: Duration) {
        let host = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            host.execute_command(buffer_id, &text);
        });
    }

    /// Emits the upgrade signal pair (state transfer is in-process).
    pub fn upgrade(&self) {
        self.signal_send(Signal::bare("upgrade"));
        self.signal_send(Signal::bare("upgrade_ended"));
    }

    // -----------------------------------------------------------------------
    // Info and modifier registries
    // -----------------------------------------------------------------------

    pub fn info_get(&self, name: &str, _args: Option<&str>) -> Option<String> {
        match name {
            "version" => Some(env!("CARGO_PKG_VERSION").to_owned()),
            "version_git" => Some(String::new()),
            "version_number" => Some(version_number(env!("CARGO_PKG_VERSION")).to_string()),
            _ => None,
        }
    }

    pub fn register_modifier(
        &self,
        name: &str,
        f: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) {
        self.inner
            .modifiers
            .write()
            .expect("modifier lock")
            .insert(name.to_owned(), Box::new(f));
    }

    pub fn modifier_exec(&self, name: &str, data: &str, text: &str) -> Option<String> {
        self.inner
            .modifiers
            .read()
            .expect("modifier lock")
            .get(name)
            .map(|f| f(data, text))
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, HostState> {
        self.inner.state.read().expect("host state lock")
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, HostState> {
        self.inner.state.write().expect("host state lock")
    }
}

/// Encodes `major.minor.patch` as `(major << 16) + (minor << 8) + patch`.
pub fn version_number(version: &str) -> i64 {
    let mut parts = version.split('.');
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let (major, minor, patch) = (next(), next(), next());
    (major << 16) + (minor << 8) + patch
}

impl HostBindings for Host {
    fn info(&self, name: &str, args: Option<&str>) -> Option<String> {
        self.info_get(name, args)
    }

    fn modifier_exec(&self, name: &str, data: &str, text: &str) -> Option<String> {
        Host::modifier_exec(self, name, data, text)
    }

    fn secured_data(&self, key: &str) -> Option<String> {
        self.config().secure.get(key).cloned()
    }

    fn config_option(&self, path: &str) -> Option<String> {
        let config = self.config();
        match path {
            "relay.network.password" => Some(config.network.password),
            "relay.network.totp_secret" => Some(config.network.totp_secret),
            "relay.network.commands" => Some(config.network.commands),
            "relay.network.password_hash_iterations" => {
                Some(config.network.password_hash_iterations.to_string())
            }
            "relay.network.connection_timeout" => {
                Some(config.network.connection_timeout_secs.to_string())
            }
            "relay.look.auto_open_buffer" => {
                let value = if config.look.auto_open_buffer { "on" } else { "off" };
                Some(value.to_owned())
            }
            _ => None,
        }
    }

    fn data_path(&self, pointers: &HashMap<String, String>, path: &str) -> Option<String> {
        let (root, field) = path.split_once('.')?;
        let id: i64 = pointers.get(root)?.parse().ok()?;
        self.with_buffer(id, |b| match field {
            "full_name" => Some(b.full_name.clone()),
            "short_name" => Some(b.short_name.clone()),
            "number" => Some(b.number.to_string()),
            "title" => Some(b.title.clone()),
            "input" => Some(b.input.clone()),
            _ => None,
        })?
    }
}
