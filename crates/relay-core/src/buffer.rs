//! Buffers, lines and nicklists, plus their wire conversions.
//!
//! Every object carries a stable id assigned by the host; ids are
//! monotonic across the process and never reused, so an id stays
//! meaningful even after the object is gone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use relay_protocol::{
    format_timestamp, BufferData, BufferKey, BufferKind, ColorMode, LineData, Nick, NickGroup,
};
use relay_text::{color_code, encode_ansi, strip_colors};

/// Renders internal color tokens for the wire per the requested mode.
pub fn render_colors(mode: ColorMode, s: &str) -> String {
    match mode {
        ColorMode::Ansi => encode_ansi(s),
        ColorMode::Weechat => s.to_owned(),
        ColorMode::Strip => strip_colors(s),
    }
}

fn render_named_color(mode: ColorMode, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    render_colors(mode, &color_code(name))
}

#[derive(Debug, Clone)]
pub struct Line {
    pub id: i64,
    pub y: i32,
    pub date: DateTime<Utc>,
    pub date_printed: DateTime<Utc>,
    pub displayed: bool,
    pub highlight: bool,
    pub notify_level: i32,
    pub prefix: String,
    pub message: String,
    pub tags: Vec<String>,
}

impl Line {
    pub fn to_wire(&self, colors: ColorMode) -> LineData {
        LineData {
            id: self.id,
            y: self.y,
            date: format_timestamp(self.date),
            date_printed: format_timestamp(self.date_printed),
            displayed: self.displayed,
            highlight: self.highlight,
            notify_level: self.notify_level,
            prefix: render_colors(colors, &self.prefix),
            message: render_colors(colors, &self.message),
            tags: self.tags.clone(),
        }
    }
}

/// One nicklist group. The root group has `parent: None` and is never
/// shown by name on the wire with a parent id other than -1.
#[derive(Debug, Clone)]
pub struct NickGroupNode {
    pub id: i64,
    pub parent: Option<i64>,
    pub name: String,
    pub color: String,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct NickNode {
    pub id: i64,
    /// Owning group; `None` means root-owned.
    pub group: Option<i64>,
    pub prefix: String,
    pub prefix_color: String,
    pub name: String,
    pub color: String,
    pub visible: bool,
}

impl NickNode {
    pub fn to_wire(&self, colors: ColorMode) -> Nick {
        Nick {
            id: self.id,
            parent_group_id: self.group.unwrap_or(-1),
            prefix: self.prefix.clone(),
            prefix_color_name: self.prefix_color.clone(),
            prefix_color: render_named_color(colors, &self.prefix_color),
            name: self.name.clone(),
            color_name: self.color.clone(),
            color: render_named_color(colors, &self.color),
            visible: self.visible,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: i64,
    /// Full name, `plugin.name`.
    pub full_name: String,
    pub short_name: String,
    pub number: i32,
    pub kind: BufferKind,
    pub hidden: bool,
    pub title: String,
    pub modes: String,
    pub input_prompt: String,
    pub input: String,
    pub input_position: i32,
    pub input_multiline: bool,
    pub nicklist_enabled: bool,
    pub nicklist_case_sensitive: bool,
    pub nicklist_display_groups: bool,
    pub time_displayed: bool,
    pub local_variables: BTreeMap<String, String>,
    pub keys: Vec<BufferKey>,
    pub lines: Vec<Line>,
    /// Nicklist storage, insertion-ordered; the root group is implicit
    /// (id reported as the buffer's `root_group_id`).
    pub groups: Vec<NickGroupNode>,
    pub nicks: Vec<NickNode>,
    pub root_group_id: i64,
}

impl Buffer {
    pub fn new(id: i64, root_group_id: i64, full_name: &str, kind: BufferKind) -> Self {
        let short_name = full_name
            .rsplit('.')
            .next()
            .unwrap_or(full_name)
            .to_owned();
        Self {
            id,
            full_name: full_name.to_owned(),
            short_name,
            number: 1,
            kind,
            hidden: false,
            title: String::new(),
            modes: String::new(),
            input_prompt: String::new(),
            input: String::new(),
            input_position: 0,
            input_multiline: false,
            nicklist_enabled: false,
            nicklist_case_sensitive: false,
            nicklist_display_groups: true,
            time_displayed: true,
            local_variables: BTreeMap::new(),
            keys: Vec::new(),
            lines: Vec::new(),
            groups: vec![NickGroupNode {
                id: root_group_id,
                parent: None,
                name: "root".to_owned(),
                color: String::new(),
                visible: false,
            }],
            nicks: Vec::new(),
            root_group_id,
        }
    }

    /// Selects lines for the wire: positive `count` takes the first
    /// `count` lines, negative takes the last `|count|` (in forward
    /// order), 0 takes none, `i64::MAX` takes all.
    pub fn lines_to_wire(&self, count: i64, colors: ColorMode) -> Vec<LineData> {
        if count == 0 {
            return Vec::new();
        }
        let total = self.lines.len();
        let selected: &[Line] = if count < 0 {
            let take = usize::try_from(-count).unwrap_or(usize::MAX).min(total);
            &self.lines[total - take..]
        } else {
            let take = usize::try_from(count).unwrap_or(usize::MAX).min(total);
            &self.lines[..take]
        };
        selected.iter().map(|line| line.to_wire(colors)).collect()
    }

    pub fn group_by_id(&self, id: i64) -> Option<&NickGroupNode> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn nick_by_id(&self, id: i64) -> Option<&NickNode> {
        self.nicks.iter().find(|n| n.id == id)
    }

    /// Builds the wire nicklist subtree rooted at `group_id`.
    pub fn nick_group_to_wire(&self, group_id: i64, colors: ColorMode) -> Option<NickGroup> {
        let group = self.group_by_id(group_id)?;
        let groups = self
            .groups
            .iter()
            .filter(|g| g.parent == Some(group_id))
            .filter_map(|g| self.nick_group_to_wire(g.id, colors))
            .collect();
        let nicks = self
            .nicks
            .iter()
            .filter(|n| match n.group {
                Some(owner) => owner == group_id,
                None => group_id == self.root_group_id,
            })
            .map(|n| n.to_wire(colors))
            .collect();
        Some(NickGroup {
            id: group.id,
            parent_group_id: group.parent.unwrap_or(-1),
            name: group.name.clone(),
            color_name: group.color.clone(),
            color: render_named_color(colors, &group.color),
            visible: group.visible,
            groups,
            nicks,
        })
    }

    /// Builds the wire buffer object. `lines` / `lines_free` follow the
    /// request parameters (free-kind buffers use `lines_free`).
    pub fn to_wire(
        &self,
        lines: i64,
        lines_free: i64,
        nicks: bool,
        colors: ColorMode,
    ) -> BufferData {
        let line_count = if self.kind == BufferKind::Free {
            lines_free
        } else {
            lines
        };
        BufferData {
            id: self.id,
            name: self.full_name.clone(),
            short_name: self.short_name.clone(),
            number: self.number,
            kind: self.kind,
            hidden: self.hidden,
            title: render_colors(colors, &self.title),
            modes: render_colors(colors, &self.modes),
            input_prompt: render_colors(colors, &self.input_prompt),
            input: self.input.clone(),
            input_position: self.input_position,
            input_multiline: self.input_multiline,
            nicklist: self.nicklist_enabled,
            nicklist_case_sensitive: self.nicklist_case_sensitive,
            nicklist_display_groups: self.nicklist_display_groups,
            time_displayed: self.time_displayed,
            local_variables: self.local_variables.clone(),
            keys: self.keys.clone(),
            lines: (line_count != 0).then(|| self.lines_to_wire(line_count, colors)),
            nicklist_root: nicks
                .then(|| self.nick_group_to_wire(self.root_group_id, colors))
                .flatten(),
        }
    }
}
