use docrag_core::types::{Context, SearchResult};

pub const ELLIPSIS: &str = "...";
const SEPARATOR: &str = "\n\n";
/// Budget that must remain before a later block is worth truncating into.
const MIN_TRUNCATION_BUDGET: usize = 100;

/// Join `results` (best first) into `"[filename] text"` blocks under a
/// character budget.
///
/// Whole blocks are added while the running length, separators included,
/// stays within `max_len`. The first block that does not fit is cut to the
/// remaining budget and marked with `...` when it is the very first block or
/// when more than 100 characters remain; assembly stops there either way.
pub fn assemble_context(results: &[SearchResult], max_len: usize) -> Context {
    if results.is_empty() {
        return Context::NoRelevantDocument;
    }

    let mut parts: Vec<String> = Vec::with_capacity(results.len());
    let mut used = 0usize;
    for result in results {
        let block = format!("[{}] {}", result.filename, result.chunk_text);
        let separator = if parts.is_empty() { 0 } else { SEPARATOR.len() };
        let block_len = block.chars().count();
        if used + separator + block_len <= max_len {
            used += separator + block_len;
            parts.push(block);
            continue;
        }

        let remaining = max_len.saturating_sub(used + separator);
        if remaining > MIN_TRUNCATION_BUDGET || (parts.is_empty() && remaining > 0) {
            let prefix: String = result.chunk_text.chars().take(remaining).collect();
            parts.push(format!("[{}] {prefix}{ELLIPSIS}", result.filename));
        }
        break;
    }
    Context::Found(parts.join(SEPARATOR))
}
