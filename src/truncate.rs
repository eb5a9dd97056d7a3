use crate::i18n::I18n;

/// Budget for raw piped input, sized for large context windows
pub const PIPE_INPUT_LIMIT: usize = 400 * 1024;

/// Budget for command output fed back into the running conversation
pub const COMMAND_OUTPUT_LIMIT: usize = 32 * 1024;

/// Characters reserved for the omission notice
const NOTICE_RESERVE: usize = 100;

/// Share of the budget kept from the start of the text, in percent
const HEAD_PERCENT: usize = 60;

/// Bound `text` to roughly `max_chars` characters, keeping its head and tail.
///
/// Lengths are counted in characters, never bytes, so multi-byte output is never split.
/// When truncation happens the result is `head + notice + tail`, where the notice states how
/// many lines were dropped from the middle.
pub fn truncate_output(text: &str, max_chars: usize, i18n: &I18n) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let head_len = max_chars * HEAD_PERCENT / 100;
    let tail_len = max_chars
        .saturating_sub(head_len)
        .saturating_sub(NOTICE_RESERVE);

    let head_end = byte_offset(text, head_len);
    let tail_start = byte_offset(text, total - tail_len);

    let omitted_lines = text[head_end..tail_start].matches('\n').count();
    let notice = i18n.tf("output.truncated", &[&omitted_lines]);

    format!(
        "{}\n... [{}] ...\n{}",
        &text[..head_end],
        notice,
        &text[tail_start..]
    )
}

/// Byte offset of the `char_index`-th character, or the end of the string
fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}
