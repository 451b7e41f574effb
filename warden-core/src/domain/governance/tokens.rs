// warden-core/src/domain/governance/tokens.rs

// Column names are compared token by token, never by substring: `username` is one
// token and does not contain the hint `name`.

/// Tokens that turn the following word into catalog metadata (`schema_name`, `file_name`).
const METADATA_QUALIFIERS: &[&str] = &[
    "schema", "table", "column", "file", "host", "db", "database", "index", "type", "class",
    "field", "key", "bucket", "queue", "topic", "job", "task", "server", "domain",
];

fn is_qualifier(token: &str) -> bool {
    METADATA_QUALIFIERS.contains(&token)
}

/// Lower-cased tokens of an identifier, split on separators and camelCase boundaries.
pub fn tokenize(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for part in name.split(|c: char| matches!(c, '_' | '-' | '.' | ' ' | '/')) {
        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0 && c.is_uppercase() && {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            };
            if boundary && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

/// One column-name hint of a PII rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameHint {
    /// `^token$`: only the whole column name matches.
    Exact(Vec<String>),
    /// Matches the whole name or a contiguous token run not preceded by a metadata qualifier.
    Tokens(Vec<String>),
}

impl NameHint {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (exact, body) = match trimmed.strip_prefix('^').and_then(|s| s.strip_suffix('$')) {
            Some(inner) => (true, inner),
            None => (false, trimmed),
        };
        let tokens = tokenize(body);
        if tokens.is_empty() {
            return None;
        }
        Some(if exact {
            Self::Exact(tokens)
        } else {
            Self::Tokens(tokens)
        })
    }

    pub fn matches(&self, column_tokens: &[String]) -> bool {
        match self {
            Self::Exact(hint) => column_tokens == hint.as_slice(),
            Self::Tokens(hint) => {
                if column_tokens == hint.as_slice() {
                    return true;
                }
                if hint.len() > column_tokens.len() {
                    return false;
                }
                column_tokens
                    .windows(hint.len())
                    .enumerate()
                    .any(|(start, window)| {
                        window == hint.as_slice()
                            && (start == 0 || !is_qualifier(&column_tokens[start - 1]))
                    })
            }
        }
    }
}
