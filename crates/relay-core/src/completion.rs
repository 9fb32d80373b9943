//! Input-line completion: context detection, base word extraction and
//! candidate collection.

use relay_protocol::CompletionData;

/// Completes `input` at byte `position` (clamped to the input length).
///
/// Context rules: empty input completes nothing (`"null"`), a leading
/// `/` completes command names while the cursor is in the first word
/// and command arguments afterwards, anything else is `"auto"` (nick
/// completion on the buffer).
pub fn complete(
    input: &str,
    position: usize,
    commands: &[String],
    nicks: &[String],
) -> CompletionData {
    let position = position.min(input.len());
    let position = floor_char_boundary(input, position);
    let (start, base_word) = base_word_at(input, position);

    let (context, candidates): (&str, Vec<&String>) = if input.is_empty() {
        ("null", Vec::new())
    } else if input.starts_with('/') {
        let first_word_end = input.find(' ').unwrap_or(input.len());
        if position <= first_word_end {
            ("command", commands.iter().collect())
        } else {
            ("command_arg", nicks.iter().collect())
        }
    } else {
        ("auto", nicks.iter().collect())
    };

    let base_lower = base_word.to_lowercase();
    let mut list: Vec<String> = candidates
        .into_iter()
        .filter(|word| word.to_lowercase().starts_with(&base_lower))
        .cloned()
        .collect();
    list.sort();
    list.dedup();

    CompletionData {
        context: context.to_owned(),
        base_word: base_word.to_owned(),
        position_replace: i32::try_from(start).unwrap_or(0),
        add_space: true,
        list,
    }
}

/// Returns the start offset and text of the word under the cursor
/// (from the last space before `position` up to `position`).
fn base_word_at(input: &str, position: usize) -> (usize, &str) {
    let before = &input[..position];
    let start = before.rfind(' ').map_or(0, |i| i + 1);
    (start, &before[start..])
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> Vec<String> {
        ["/buffer", "/clear", "/close", "/print"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    }

    fn nicks() -> Vec<String> {
        ["alice", "Alfred", "bob"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    }

    #[test]
    fn empty_input_has_null_context() {
        let completion = complete("", 0, &commands(), &nicks());
        assert_eq!(completion.context, "null");
        assert!(completion.list.is_empty());
    }

    #[test]
    fn command_context_completes_command_names() {
        let completion = complete("/cl", 3, &commands(), &nicks());
        assert_eq!(completion.context, "command");
        assert_eq!(completion.base_word, "/cl");
        assert_eq!(completion.position_replace, 0);
        assert_eq!(completion.list, vec!["/clear", "/close"]);
    }

    #[test]
    fn command_arg_context_completes_nicks() {
        let input = "/msg al";
        let completion = complete(input, input.len(), &commands(), &nicks());
        assert_eq!(completion.context, "command_arg");
        assert_eq!(completion.base_word, "al");
        assert_eq!(completion.position_replace, 5);
        // prefix match is case-insensitive
        assert_eq!(completion.list, vec!["Alfred", "alice"]);
    }

    #[test]
    fn auto_context_for_plain_text() {
        let input = "hello bo";
        let completion = complete(input, input.len(), &commands(), &nicks());
        assert_eq!(completion.context, "auto");
        assert_eq!(completion.base_word, "bo");
        assert_eq!(completion.list, vec!["bob"]);
        assert!(completion.add_space);
    }

    #[test]
    fn position_is_clamped_and_kept_on_char_boundary() {
        let completion = complete("noël", 100, &commands(), &nicks());
        assert_eq!(completion.context, "auto");
        assert_eq!(completion.base_word, "noël");
    }
}
