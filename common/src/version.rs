pub const VERSION_KEY: &str = "current_version";
pub const ARTIFACT_KEY: &str = "artifact";
pub const SHA256_KEY: &str = "sha256";

pub fn extract_assignment(text: &str, key: &str) -> Option<String> {
    let needle = format!("{key} =");
    text.lines()
        .filter_map(|line| {
            let pos = line.find(&needle)?;
            if !is_key_boundary(line, pos) {
                return None;
            }
            assignment_value(&line[pos + needle.len()..])
        })
        .next()
}

pub fn extract_version(text: &str) -> Option<String> {
    extract_assignment(text, VERSION_KEY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateManifest {
    pub version: Option<String>,
    pub artifact_url: Option<String>,
    pub sha256: Option<String>,
}

impl UpdateManifest {
    pub fn parse(text: &str) -> Self {
        Self {
            version: extract_version(text),
            artifact_url: extract_assignment(text, ARTIFACT_KEY),
            sha256: extract_assignment(text, SHA256_KEY).map(|value| value.to_ascii_lowercase()),
        }
    }

    pub fn is_newer_than(&self, current: &str) -> bool {
        self.version
            .as_deref()
            .is_some_and(|remote| remote != current)
    }
}

fn is_key_boundary(line: &str, pos: usize) -> bool {
    line[..pos]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
}

fn assignment_value(rest: &str) -> Option<String> {
    if let Some(start) = rest.find('"') {
        let quoted = &rest[start + 1..];
        let end = quoted.find('"')?;
        return Some(quoted[..end].to_string());
    }

    let literal: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if literal.chars().any(|c| c.is_ascii_digit()) {
        Some(literal)
    } else {
        None
    }
}
