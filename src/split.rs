//! Message splitting — long responses into platform-safe chunks.
//!
//! All length accounting is in Unicode scalar values (chars), never bytes.
//! Fenced code blocks are kept intact where possible; when a block cannot
//! fit in one chunk it is closed with a synthetic fence and reopened in the
//! next chunk with the original header so language tagging survives.

/// Split `content` into chunks of at most `max_len` chars.
///
/// A `max_len` of 0 disables splitting: the whole content comes back as a
/// single chunk (or no chunks at all for empty content).
///
/// A reserve buffer (10% of `max_len`, at least 50, at most half) keeps room
/// below the ceiling for closing fences. Natural break points are preferred:
/// the last newline within a 200-char window below the effective ceiling,
/// then the last space or tab within a 100-char window, then a hard cut.
pub fn split_message(content: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        if content.is_empty() {
            return Vec::new();
        }
        return vec![content.to_string()];
    }

    let mut chars: Vec<char> = content.chars().collect();
    let mut messages = Vec::new();

    // Dynamic buffer: 10% of max_len, but at least 50 chars if possible.
    let mut buffer = max_len / 10;
    if buffer < 50 {
        buffer = 50;
    }
    if buffer > max_len / 2 {
        buffer = max_len / 2;
    }

    while !chars.is_empty() {
        if chars.len() <= max_len {
            messages.push(chars.iter().collect());
            break;
        }

        // Effective ceiling: max_len minus the buffer, floored at half.
        let mut effective = max_len - buffer;
        if effective < max_len / 2 {
            effective = max_len / 2;
        }

        let mut msg_end = find_last_newline(&chars[..effective], 200)
            .filter(|&i| i > 0)
            .or_else(|| find_last_space(&chars[..effective], 100).filter(|&i| i > 0))
            .unwrap_or(effective);

        // Would this chunk end inside an unclosed code block?
        if let Some(open_idx) = find_last_unclosed_fence(&chars[..msg_end]) {
            match find_next_closing_fence(&chars, msg_end).filter(|&end| end <= max_len) {
                Some(end) => {
                    // The closing fence still fits: extend the cut past it.
                    msg_end = end;
                }
                None => {
                    // Block is too long for one chunk, or never closes.
                    let header_end = find_newline(&chars[open_idx..]);
                    let header: String = match header_end {
                        Some(rel) => chars[open_idx..open_idx + rel].iter().collect(),
                        None => chars[open_idx..open_idx + 3].iter().collect(),
                    };
                    let header = header.trim().to_string();
                    let header_end_idx = match header_end {
                        Some(rel) => open_idx + rel,
                        None => open_idx + header.chars().count(),
                    };

                    if msg_end > header_end_idx + 20 {
                        // Enough body before the cut: split inside the block,
                        // close to max_len, leaving room for "\n```".
                        let inner_limit = max_len.saturating_sub(5).max(1);
                        msg_end = find_last_newline(&chars[..inner_limit], 200)
                            .filter(|&i| i > header_end_idx)
                            .unwrap_or(inner_limit);
                        chars = push_fenced_chunk(&mut messages, &chars, msg_end, &header);
                        continue;
                    }

                    // Too little body: try to cut before the block opens.
                    let before = find_last_newline(&chars[..open_idx], 200)
                        .filter(|&i| i > 0)
                        .or_else(|| find_last_space(&chars[..open_idx], 100).filter(|&i| i > 0));
                    match before {
                        Some(i) => msg_end = i,
                        None if open_idx > 20 => msg_end = open_idx,
                        None => {
                            // Last resort: forced split inside the block.
                            msg_end = max_len.saturating_sub(5).max(1);
                            chars = push_fenced_chunk(&mut messages, &chars, msg_end, &header);
                            continue;
                        }
                    }
                }
            }
        }

        messages.push(chars[..msg_end].iter().collect());
        let remaining: String = chars[msg_end..].iter().collect();
        chars = remaining.trim().chars().collect();
    }

    messages
}

/// Emit `chars[..msg_end]` with a synthetic closing fence and return the
/// remainder with the fence header prepended, ready for the next iteration.
fn push_fenced_chunk(
    messages: &mut Vec<String>,
    chars: &[char],
    msg_end: usize,
    header: &str,
) -> Vec<char> {
    let body: String = chars[..msg_end].iter().collect();
    let chunk = format!("{}\n```", body.trim_end_matches([' ', '\t', '\n', '\r']));
    messages.push(chunk);

    let rest: String = chars[msg_end..].iter().collect();
    let remaining = format!("{header}\n{rest}");
    remaining.trim().chars().collect()
}

/// Find the last triple-backtick fence that opens a block without a matching
/// close. Returns the char index of the opening fence.
fn find_last_unclosed_fence(chars: &[char]) -> Option<usize> {
    let mut in_block = false;
    let mut last_open = None;

    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i] == '`' && chars[i + 1] == '`' && chars[i + 2] == '`' {
            // Fences toggle block state; only record the opening ones.
            if !in_block {
                last_open = Some(i);
            }
            in_block = !in_block;
            i += 2;
        }
        i += 1;
    }

    if in_block { last_open } else { None }
}

/// Find the next closing fence at or after `start`. Returns the char index
/// just past the closing backticks.
fn find_next_closing_fence(chars: &[char], start: usize) -> Option<usize> {
    for i in start..chars.len() {
        if i + 2 < chars.len() && chars[i] == '`' && chars[i + 1] == '`' && chars[i + 2] == '`' {
            return Some(i + 3);
        }
    }
    None
}

/// First newline in the slice.
fn find_newline(chars: &[char]) -> Option<usize> {
    chars.iter().position(|&c| c == '\n')
}

/// Last newline within the final `window` chars of the slice.
fn find_last_newline(chars: &[char], window: usize) -> Option<usize> {
    let start = chars.len().saturating_sub(window);
    (start..chars.len()).rev().find(|&i| chars[i] == '\n')
}

/// Last space or tab within the final `window` chars of the slice.
fn find_last_space(chars: &[char], window: usize) -> Option<usize> {
    let start = chars.len().saturating_sub(window);
    (start..chars.len())
        .rev()
        .find(|&i| chars[i] == ' ' || chars[i] == '\t')
}
