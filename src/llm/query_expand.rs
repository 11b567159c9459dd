//! Paraphrase prompt and parsing for multi-query expansion.

/// Sampling temperature used for paraphrase generation.
pub const PARAPHRASE_TEMPERATURE: f32 = 0.3;

/// Build the prompt asking for `count` alternative phrasings of a question.
pub fn build_paraphrase_prompt(original_query: &str, count: usize) -> String {
    format!(
        "You are an AI assistant helping to search a document collection. Given a \
         user question, generate exactly {count} alternative phrasings that capture \
         different aspects or synonyms of the intent. The alternatives should help \
         find relevant passages that the original wording might miss.\n\n\
         Original question: \"{original_query}\"\n\n\
         Respond with ONLY a JSON array of {count} strings. No explanation.\n\
         Example: [\"alternative phrasing 1\", \"alternative phrasing 2\"]"
    )
}

/// Parse up to `count` query variants from a completion.
///
/// Accepts a JSON array (possibly wrapped in prose or a code fence). If no
/// array parses, falls back to one variant per non-empty line with list
/// markers stripped.
pub fn parse_expanded_queries(content: &str, count: usize) -> Vec<String> {
    let json_str = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };

    match serde_json::from_str::<Vec<String>>(json_str) {
        Ok(queries) => queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(count)
            .collect(),
        Err(e) => {
            tracing::debug!("Paraphrases are not a JSON array ({e}), parsing lines");
            parse_lines(content, count)
        }
    }
}

fn parse_lines(content: &str, count: usize) -> Vec<String> {
    content
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .take(count)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim().trim_matches('"');
        }
    }
    line.trim_matches('"')
}
