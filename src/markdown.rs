use colored::Colorize;

/// Minimal markdown renderer for generated text.
/// Not a full parser: handles headings, bullet lists, **bold**, *italic*,
/// `inline code` and fenced code blocks, which covers most model output.
pub fn render(text: &str) -> String {
    let mut output = Vec::new();
    let mut in_code_block = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            let lang = trimmed.trim_start_matches('`').trim();
            if in_code_block && !lang.is_empty() {
                output.push(format!("  {}", lang.dimmed()));
            }
            continue;
        }

        if in_code_block {
            output.push(format!("  {}", line.cyan()));
            continue;
        }

        output.push(render_line(line));
    }

    output.join("\n")
}

fn render_line(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
        let title = render_inline(trimmed[hashes..].trim());
        return title.bold().underline().to_string();
    }

    for marker in ["- ", "* ", "+ "] {
        if let Some(item) = trimmed.strip_prefix(marker) {
            return format!("{}• {}", indent, render_inline(item));
        }
    }

    render_inline(line)
}

/// Handle **bold**, *italic* and `inline code` within a single line.
fn render_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut result = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '`' {
            if let Some(end) = find_closing(&chars, i + 1, &['`']) {
                let code: String = chars[i + 1..end].iter().collect();
                result.push_str(&code.cyan().to_string());
                i = end + 1;
                continue;
            }
        }

        if chars[i] == '*' && chars.get(i + 1) == Some(&'*') {
            if let Some(end) = find_closing(&chars, i + 2, &['*', '*']) {
                let bold: String = chars[i + 2..end].iter().collect();
                result.push_str(&bold.bold().to_string());
                i = end + 2;
                continue;
            }
        }

        if chars[i] == '*' && chars.get(i + 1).is_some_and(|&c| c != '*' && !c.is_whitespace()) {
            if let Some(end) = find_closing(&chars, i + 1, &['*']) {
                let italic: String = chars[i + 1..end].iter().collect();
                result.push_str(&italic.italic().to_string());
                i = end + 1;
                continue;
            }
        }

        result.push(chars[i]);
        i += 1;
    }

    result
}

fn find_closing(chars: &[char], start: usize, pattern: &[char]) -> Option<usize> {
    // at least one character between the delimiters
    (start + 1..chars.len()).find(|&i| chars[i..].starts_with(pattern))
}
