use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::ParamVec;
use crate::error::{Error, Result};

/// How specific a path template is; greater is more specific.
///
/// Literal segments count first, then the template with fewer catch-alls,
/// fewer single-segment wildcards and fewer variables wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specificity {
    pub literals: usize,
    pub catch_all: bool,
    pub wildcards: usize,
    pub variables: usize,
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.literals
            .cmp(&other.literals)
            .then_with(|| other.catch_all.cmp(&self.catch_all))
            .then_with(|| other.wildcards.cmp(&self.wildcards))
            .then_with(|| other.variables.cmp(&self.variables))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compiled path template such as `/users/{id}/posts/*` or `/assets/**`.
///
/// Segments are literals, `{name}` variables, `*` (exactly one segment) or a
/// final `**` (any remainder, including nothing). Templates are matched
/// against normalized request paths.
#[derive(Clone)]
pub struct PathTemplate {
    pattern: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    specificity: Specificity,
}

impl PathTemplate {
    /// Compile a template into an anchored regex and its ordered variable names
    pub fn parse(template: &str) -> Result<Self> {
        let trimmed = template.trim();
        if !trimmed.starts_with('/') {
            return Err(Error::InvalidMapping(format!(
                "path template must start with '/': {template}"
            )));
        }

        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let mut pattern = String::with_capacity(trimmed.len());
        let mut regex_src = String::with_capacity(trimmed.len() + 8);
        regex_src.push('^');
        let mut param_names = Vec::with_capacity(trimmed.matches('{').count());
        let mut specificity = Specificity {
            literals: 0,
            catch_all: false,
            wildcards: 0,
            variables: 0,
        };

        for (idx, segment) in segments.iter().enumerate() {
            pattern.push('/');
            pattern.push_str(segment);
            if *segment == "**" {
                if idx != segments.len() - 1 {
                    return Err(Error::InvalidMapping(format!(
                        "'**' is only allowed as the last segment: {template}"
                    )));
                }
                regex_src.push_str("(?:/.*)?");
                specificity.catch_all = true;
            } else if *segment == "*" {
                regex_src.push_str("/[^/]+");
                specificity.wildcards += 1;
            } else if let Some(name) = segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                    return Err(Error::InvalidMapping(format!(
                        "invalid path variable '{segment}' in {template}"
                    )));
                }
                regex_src.push_str("/([^/]+)");
                param_names.push(Arc::from(name));
                specificity.variables += 1;
            } else if segment.contains('{') || segment.contains('}') {
                return Err(Error::InvalidMapping(format!(
                    "path variables must span a whole segment: {template}"
                )));
            } else {
                regex_src.push('/');
                regex_src.push_str(&regex::escape(segment));
                specificity.literals += 1;
            }
        }

        if segments.is_empty() {
            pattern.push('/');
            regex_src.push('/');
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| Error::InvalidMapping(format!("{template}: {e}")))?;

        Ok(Self {
            pattern,
            regex,
            param_names,
            specificity,
        })
    }

    /// Match a normalized path, returning captured variables on success
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                params.push((Arc::clone(name), m.as_str().to_string()));
            }
        }
        Some(params)
    }

    /// Template text, normalized (no trailing slash)
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    /// Whether the template has no variables or wildcards
    pub fn is_exact(&self) -> bool {
        let s = self.specificity;
        s.variables == 0 && s.wildcards == 0 && !s.catch_all
    }
}

impl fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathTemplate").field(&self.pattern).finish()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
