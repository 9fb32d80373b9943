//! Internal color tokens and their ANSI rendering.
//!
//! A color token is `\x19[spec]` where `spec` is a comma-separated
//! foreground/background pair or an attribute keyword. The renderer
//! and the wire encoder are the only consumers; everything in between
//! treats tokens as opaque.

/// Marker byte starting every color token.
pub const COLOR_MARKER: char = '\x19';

/// Builds the internal token for a color or attribute spec, e.g.
/// `color_code("green")`, `color_code("*red,blue")`, `color_code("bold")`.
pub fn color_code(spec: &str) -> String {
    format!("{COLOR_MARKER}[{spec}]")
}

/// One lexed piece of a string carrying color tokens.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    /// The spec inside `\x19[...]`, brackets excluded.
    Color(&'a str),
}

pub(crate) fn segments(input: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = input;
    while let Some(pos) = rest.find(COLOR_MARKER) {
        if pos > 0 {
            out.push(Segment::Text(&rest[..pos]));
        }
        let after = &rest[pos + 1..];
        if let Some(stripped) = after.strip_prefix('[') {
            if let Some(end) = stripped.find(']') {
                out.push(Segment::Color(&stripped[..end]));
                rest = &stripped[end + 1..];
                continue;
            }
        }
        // lone marker without a well-formed token: drop the marker
        rest = after;
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

/// Removes every color token, keeping only visible text.
pub fn strip_colors(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for segment in segments(input) {
        if let Segment::Text(text) = segment {
            out.push_str(text);
        }
    }
    out
}

/// Renders color tokens as ANSI SGR sequences.
pub fn encode_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for segment in segments(input) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Color(spec) => out.push_str(&ansi_for_spec(spec)),
        }
    }
    out
}

fn ansi_for_spec(spec: &str) -> String {
    let mut codes: Vec<String> = Vec::new();
    match spec {
        "reset" | "" => return "\x1b[0m".to_owned(),
        "bold" => codes.push("1".to_owned()),
        "-bold" => codes.push("22".to_owned()),
        "italic" => codes.push("3".to_owned()),
        "-italic" => codes.push("23".to_owned()),
        "underline" => codes.push("4".to_owned()),
        "-underline" => codes.push("24".to_owned()),
        "reverse" => codes.push("7".to_owned()),
        "-reverse" => codes.push("27".to_owned()),
        _ => {
            let mut parts = spec.splitn(2, ',');
            if let Some(fg) = parts.next() {
                let mut fg = fg;
                if let Some(rest) = fg.strip_prefix('*') {
                    codes.push("1".to_owned());
                    fg = rest;
                }
                if !fg.is_empty() {
                    if let Some(code) = color_sgr(fg, false) {
                        codes.push(code);
                    }
                }
            }
            if let Some(bg) = parts.next() {
                if let Some(code) = color_sgr(bg, true) {
                    codes.push(code);
                }
            }
        }
    }
    if codes.is_empty() {
        String::new()
    } else {
        format!("\x1b[{}m", codes.join(";"))
    }
}

fn color_sgr(name: &str, background: bool) -> Option<String> {
    // 256-color palette index
    if let Ok(index) = name.parse::<u8>() {
        return Some(if background {
            format!("48;5;{index}")
        } else {
            format!("38;5;{index}")
        });
    }
    let base: i32 = match name {
        "default" => 9,
        "black" => 0,
        "red" | "darkred" => 1,
        "green" | "darkgreen" => 2,
        "brown" | "yellow" => 3,
        "blue" | "darkblue" => 4,
        "magenta" => 5,
        "cyan" => 6,
        "gray" | "grey" => 7,
        "darkgray" | "darkgrey" => 60,
        "lightred" => 61,
        "lightgreen" => 62,
        "lightyellow" => 63,
        "lightblue" => 64,
        "lightmagenta" => 65,
        "lightcyan" => 66,
        "white" => 67,
        _ => return None,
    };
    let offset = if background { 40 } else { 30 };
    // 60+ values map to the bright range (90-97 / 100-107)
    Some(if base >= 60 {
        (base - 60 + offset + 60).to_string()
    } else {
        (base + offset).to_string()
    })
}
