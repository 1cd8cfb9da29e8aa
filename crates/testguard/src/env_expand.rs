//! Environment variable expansion for configuration files.
//!
//! Two forms are recognized in the raw config text:
//!
//! - `${VAR}` is replaced with the value of `VAR`; an unset variable is an error.
//! - `${VAR:-default}` falls back to `default` when `VAR` is unset or empty.
//!
//! A `$` not followed by `{` is left alone, so regex anchors survive.

use std::borrow::Cow;

use anyhow::{Result, bail};

/// Expand references against the process environment.
pub fn expand_env_vars(text: &str) -> Result<Cow<'_, str>> {
    expand_env_vars_with(text, |name| std::env::var(name).ok())
}

/// Expand references, resolving names through `lookup`.
pub fn expand_env_vars_with<L>(text: &str, lookup: L) -> Result<Cow<'_, str>>
where
    L: Fn(&str) -> Option<String>,
{
    if !text.contains("${") {
        return Ok(Cow::Borrowed(text));
    }

    let mut result = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' || !matches!(chars.peek(), Some(&(_, '{'))) {
            result.push(c);
            continue;
        }
        chars.next();

        let mut content = String::new();
        let mut depth = 1;
        let mut closed = false;
        for (_, ch) in chars.by_ref() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                }
                _ => {}
            }
            content.push(ch);
        }

        if !closed {
            let preview: String = content.chars().take(20).collect();
            bail!("unclosed environment variable reference at offset {i}: ${{{preview}...");
        }

        result.push_str(&expand_single_var(&content, &lookup)?);
    }

    Ok(Cow::Owned(result))
}

fn expand_single_var<L>(content: &str, lookup: &L) -> Result<String>
where
    L: Fn(&str) -> Option<String>,
{
    if let Some((name, default)) = content.split_once(":-") {
        validate_var_name(name)?;
        return Ok(match lookup(name) {
            Some(val) if !val.is_empty() => val,
            _ => default.to_string(),
        });
    }

    validate_var_name(content)?;
    match lookup(content) {
        Some(val) => Ok(val),
        None => bail!(
            "environment variable '{content}' is not set; \
             use ${{{content}:-default}} to provide a fallback"
        ),
    }
}

fn validate_var_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        bail!("empty environment variable name in ${{}}");
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        bail!("invalid environment variable name '{name}': must start with a letter or underscore");
    }
    if let Some(bad) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        bail!("invalid environment variable name '{name}': contains invalid character '{bad}'");
    }
    Ok(())
}
