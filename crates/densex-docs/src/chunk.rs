//! Paragraph chunking for ingestion

/// Split `text` into passages of at most `max_chars` characters.
///
/// Paragraphs are separated by blank lines and have their internal
/// whitespace collapsed. Paragraphs longer than `max_chars` are split on
/// whitespace; a single word longer than `max_chars` is split inside the
/// word. Blank passages are dropped.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();

    for paragraph in paragraphs(text) {
        if paragraph.chars().count() <= max_chars {
            chunks.push(paragraph);
        } else {
            split_long(&paragraph, max_chars, &mut chunks);
        }
    }
    chunks
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs);
        } else {
            current.extend(line.split_whitespace());
        }
    }
    flush(&mut current, &mut paragraphs);
    paragraphs
}

fn flush(words: &mut Vec<&str>, out: &mut Vec<String>) {
    if !words.is_empty() {
        out.push(words.join(" "));
        words.clear();
    }
}

fn split_long(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0;

    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                out.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
}
